//! Performance-based: weight = `1 / max(eps, EMA_ms)`, with round-robin
//! exploration for proxies that haven't accumulated enough samples yet.

use rand::Rng;

use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::error::Result;
use crate::proxy::Proxy;
use crate::strategy::{eligible, no_match_error, SelectionContext, Strategy};

const EPSILON_MS: f64 = 1.0;
const DEFAULT_EXPLORATION_COUNT: u64 = 5;

#[derive(Debug)]
pub struct Performance {
    exploration_count: u64,
    round_robin: std::sync::atomic::AtomicU64,
}

impl Default for Performance {
    fn default() -> Self {
        Self::new()
    }
}

impl Performance {
    pub fn new() -> Self {
        Self::with_exploration_count(DEFAULT_EXPLORATION_COUNT)
    }

    pub fn with_exploration_count(exploration_count: u64) -> Self {
        Self { exploration_count, round_robin: std::sync::atomic::AtomicU64::new(0) }
    }
}

impl Strategy for Performance {
    fn select(
        &self,
        pool_snapshot: &[Proxy],
        context: &SelectionContext,
        breakers: &CircuitBreakerRegistry,
    ) -> Result<Proxy> {
        let candidates = eligible(pool_snapshot, context, breakers);
        if candidates.is_empty() {
            return Err(no_match_error(pool_snapshot));
        }

        let exploring: Vec<_> = candidates
            .iter()
            .filter(|p| p.metrics.total_requests < self.exploration_count)
            .collect();
        if !exploring.is_empty() {
            let index = self.round_robin.fetch_add(1, std::sync::atomic::Ordering::SeqCst) as usize
                % exploring.len();
            return Ok((*exploring[index]).clone());
        }

        let weights: Vec<f64> = candidates
            .iter()
            .map(|p| 1.0 / p.metrics.ema_response_ms.unwrap_or(EPSILON_MS).max(EPSILON_MS))
            .collect();
        let total: f64 = weights.iter().sum();
        let mut target = rand::thread_rng().gen_range(0.0..total);
        for (proxy, weight) in candidates.iter().zip(weights.iter()) {
            if target < *weight {
                return Ok((*proxy).clone());
            }
            target -= weight;
        }
        Ok((*candidates.last().unwrap()).clone())
    }

    fn name(&self) -> &'static str {
        "performance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::clock::MonotonicClock;
    use crate::proxy::{HealthThresholds, Scheme};
    use std::sync::Arc;

    #[test]
    fn new_proxies_are_explored_before_weighting_kicks_in() {
        let strategy = Performance::with_exploration_count(2);
        let breakers =
            CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), Arc::new(MonotonicClock::default()));
        let thresholds = HealthThresholds::default();

        let mut seasoned = Proxy::new(Scheme::Http, "seasoned.example", 80).unwrap();
        for _ in 0..10 {
            seasoned.record_outcome(true, 5.0, &thresholds, 0);
        }
        let fresh = Proxy::new(Scheme::Http, "fresh.example", 80).unwrap();

        let pool = vec![seasoned, fresh];
        let chosen = strategy.select(&pool, &SelectionContext::new(), &breakers).unwrap();
        assert_eq!(chosen.host, "fresh.example");
    }

    #[test]
    fn faster_proxy_is_favored_once_seasoned() {
        let strategy = Performance::with_exploration_count(1);
        let breakers =
            CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), Arc::new(MonotonicClock::default()));
        let thresholds = HealthThresholds::default();

        let mut fast = Proxy::new(Scheme::Http, "fast.example", 80).unwrap();
        fast.record_outcome(true, 5.0, &thresholds, 0);
        let mut slow = Proxy::new(Scheme::Http, "slow.example", 80).unwrap();
        slow.record_outcome(true, 500.0, &thresholds, 0);

        let pool = vec![fast, slow];
        let mut fast_count = 0;
        for _ in 0..200 {
            let chosen = strategy.select(&pool, &SelectionContext::new(), &breakers).unwrap();
            if chosen.host == "fast.example" {
                fast_count += 1;
            }
        }
        assert!(fast_count > 150, "expected the faster proxy to dominate, got {fast_count}/200");
    }
}
