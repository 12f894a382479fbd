//! Geo-targeted: narrows eligibility to a target country/region, optionally
//! falling back to a secondary strategy when no match exists.

use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::error::{ProxyWhirlError, Result};
use crate::proxy::Proxy;
use crate::strategy::{eligible, no_match_error, SelectionContext, Strategy};

#[derive(Debug)]
pub struct GeoTargeted {
    fallback: Option<Box<dyn Strategy>>,
}

impl GeoTargeted {
    /// `fallback = Some(..)` reselects from the unfiltered eligible set when
    /// no proxy matches the requested country/region; `None` fails with
    /// `NoMatch` (surfaced as `NoEligibleProxy`, since the taxonomy has no
    /// separate geo-specific variant).
    pub fn new(fallback: Option<Box<dyn Strategy>>) -> Self {
        Self { fallback }
    }
}

impl Strategy for GeoTargeted {
    fn select(
        &self,
        pool_snapshot: &[Proxy],
        context: &SelectionContext,
        breakers: &CircuitBreakerRegistry,
    ) -> Result<Proxy> {
        let candidates = eligible(pool_snapshot, context, breakers);

        let matches: Vec<&Proxy> = candidates
            .iter()
            .filter(|p| {
                let country_ok = context
                    .target_country
                    .as_ref()
                    .map(|c| p.country.as_deref() == Some(c.as_str()))
                    .unwrap_or(true);
                let region_ok = context
                    .target_region
                    .as_ref()
                    .map(|r| p.region.as_deref() == Some(r.as_str()))
                    .unwrap_or(true);
                country_ok && region_ok
            })
            .copied()
            .collect();

        if let Some(proxy) = matches.first() {
            return Ok((*proxy).clone());
        }

        match &self.fallback {
            Some(fallback) => fallback.select(pool_snapshot, context, breakers),
            None => Err(if candidates.is_empty() {
                no_match_error(pool_snapshot)
            } else {
                ProxyWhirlError::NoEligibleProxy
            }),
        }
    }

    fn record_outcome(&self, proxy_id: uuid::Uuid, success: bool, response_time_ms: f64) {
        if let Some(fallback) = &self.fallback {
            fallback.record_outcome(proxy_id, success, response_time_ms);
        }
    }

    fn name(&self) -> &'static str {
        "geo_targeted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::clock::MonotonicClock;
    use crate::proxy::Scheme;
    use crate::strategy::round_robin::RoundRobin;
    use std::sync::Arc;

    fn pool() -> Vec<Proxy> {
        let mut de = Proxy::new(Scheme::Http, "de.example", 80).unwrap();
        de.country = Some("DE".into());
        let mut us = Proxy::new(Scheme::Http, "us.example", 80).unwrap();
        us.country = Some("US".into());
        vec![de, us]
    }

    #[test]
    fn selects_matching_country() {
        let strategy = GeoTargeted::new(None);
        let breakers =
            CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), Arc::new(MonotonicClock::default()));
        let mut context = SelectionContext::new();
        context.target_country = Some("DE".into());
        let chosen = strategy.select(&pool(), &context, &breakers).unwrap();
        assert_eq!(chosen.host, "de.example");
    }

    #[test]
    fn no_match_without_fallback_fails() {
        let strategy = GeoTargeted::new(None);
        let breakers =
            CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), Arc::new(MonotonicClock::default()));
        let mut context = SelectionContext::new();
        context.target_country = Some("FR".into());
        assert!(strategy.select(&pool(), &context, &breakers).is_err());
    }

    #[test]
    fn no_match_with_fallback_reselects() {
        let strategy = GeoTargeted::new(Some(Box::new(RoundRobin::new())));
        let breakers =
            CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), Arc::new(MonotonicClock::default()));
        let mut context = SelectionContext::new();
        context.target_country = Some("FR".into());
        assert!(strategy.select(&pool(), &context, &breakers).is_ok());
    }
}
