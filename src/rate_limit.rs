//! Sliding-window rate limiter (C7): per-(identifier, endpoint) counters with
//! a tier hierarchy and an optional shared backend.

pub mod store;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use store::TokenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Free,
    Standard,
    Premium,
}

#[derive(Debug, Clone, Copy)]
pub struct TierLimit {
    pub limit: u32,
    pub window: Duration,
}

/// Whether a shared-backend failure should admit (fail-open) or deny
/// (fail-closed) while the backend is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradationPolicy {
    FailOpen,
    FailClosed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allowed { limit: u32, remaining: u32, reset_at_millis: u64 },
    Denied { limit: u32, retry_after: Duration },
}

/// Keyed by (identifier, endpoint); holds the tier hierarchy and the default
/// tier used when a key hasn't been assigned one explicitly.
///
/// Tiers and degradation policy sit behind a mutex so the control interface
/// can replace the config atomically without swapping the whole limiter
/// (and the `Arc` the dispatcher holds onto it).
#[derive(Debug)]
pub struct RateLimiter {
    config: Mutex<LimiterConfig>,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    whitelist: Mutex<std::collections::HashSet<String>>,
}

#[derive(Debug, Clone)]
struct LimiterConfig {
    tiers: HashMap<Tier, TierLimit>,
    default_tier: Tier,
    degradation: DegradationPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>) -> Self {
        let mut tiers = HashMap::new();
        tiers.insert(Tier::Free, TierLimit { limit: 5, window: Duration::from_secs(1) });
        tiers.insert(Tier::Standard, TierLimit { limit: 50, window: Duration::from_secs(1) });
        tiers.insert(Tier::Premium, TierLimit { limit: 500, window: Duration::from_secs(1) });
        Self {
            config: Mutex::new(LimiterConfig { tiers, default_tier: Tier::Free, degradation: DegradationPolicy::FailOpen }),
            store,
            clock,
            whitelist: Mutex::new(std::collections::HashSet::new()),
        }
    }

    pub fn with_tier_limit(self, tier: Tier, limit: TierLimit) -> Self {
        self.config.lock().unwrap().tiers.insert(tier, limit);
        self
    }

    pub fn with_degradation_policy(self, policy: DegradationPolicy) -> Self {
        self.config.lock().unwrap().degradation = policy;
        self
    }

    /// Replace the tier table and degradation policy atomically, in place,
    /// so every holder of this `Arc<RateLimiter>` observes the new config.
    pub fn replace_config(&self, tiers: HashMap<Tier, TierLimit>, degradation: DegradationPolicy) {
        let mut config = self.config.lock().unwrap();
        config.tiers = tiers;
        config.degradation = degradation;
    }

    pub fn tier_limits(&self) -> HashMap<Tier, TierLimit> {
        self.config.lock().unwrap().tiers.clone()
    }

    /// Identifiers in the whitelist bypass rate limiting with unlimited quota.
    pub fn whitelist(&self, identifier: impl Into<String>) {
        self.whitelist.lock().unwrap().insert(identifier.into());
    }

    pub fn un_whitelist(&self, identifier: &str) {
        self.whitelist.lock().unwrap().remove(identifier);
    }

    /// Admit or deny one request for `(identifier, endpoint)` under `tier`,
    /// maintaining a timestamp-ordered sliding window of prior admits.
    pub async fn check(&self, identifier: &str, endpoint: &str, tier: Tier) -> Decision {
        if self.whitelist.lock().unwrap().contains(identifier) {
            return Decision::Allowed { limit: u32::MAX, remaining: u32::MAX, reset_at_millis: self.clock.now_millis() };
        }

        let (tier_limit, degradation) = {
            let config = self.config.lock().unwrap();
            let limit = *config.tiers.get(&tier).unwrap_or_else(|| config.tiers.get(&config.default_tier).unwrap());
            (limit, config.degradation)
        };
        let key = format!("{identifier}\u{0}{endpoint}");
        let now = self.clock.now_millis();
        let window_millis = tier_limit.window.as_millis() as u64;

        match self.store.admit(&key, now, window_millis, tier_limit.limit).await {
            Ok(store::AdmitResult::Admitted { remaining }) => {
                Decision::Allowed { limit: tier_limit.limit, remaining, reset_at_millis: now + window_millis }
            }
            Ok(store::AdmitResult::Denied { oldest_in_window_millis }) => {
                let retry_after_millis = (oldest_in_window_millis + window_millis).saturating_sub(now);
                Decision::Denied {
                    limit: tier_limit.limit,
                    retry_after: Duration::from_millis(retry_after_millis),
                }
            }
            Err(_) => match degradation {
                DegradationPolicy::FailOpen => {
                    Decision::Allowed { limit: tier_limit.limit, remaining: tier_limit.limit, reset_at_millis: now + window_millis }
                }
                DegradationPolicy::FailClosed => {
                    Decision::Denied { limit: tier_limit.limit, retry_after: tier_limit.window }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use store::InMemoryTokenStore;

    fn limiter(clock: Arc<ManualClock>) -> RateLimiter {
        RateLimiter::new(Arc::new(InMemoryTokenStore::new()), clock)
            .with_tier_limit(Tier::Free, TierLimit { limit: 5, window: Duration::from_secs(1) })
    }

    #[tokio::test]
    async fn admits_up_to_limit_then_denies() {
        let clock = Arc::new(ManualClock::new());
        let limiter = limiter(clock.clone());
        for _ in 0..5 {
            let decision = limiter.check("x", "/q", Tier::Free).await;
            assert!(matches!(decision, Decision::Allowed { .. }));
        }
        let sixth = limiter.check("x", "/q", Tier::Free).await;
        match sixth {
            Decision::Denied { retry_after, .. } => {
                assert!(retry_after >= Duration::from_millis(990));
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn window_slides_forward_with_clock() {
        let clock = Arc::new(ManualClock::new());
        let limiter = limiter(clock.clone());
        for _ in 0..5 {
            limiter.check("x", "/q", Tier::Free).await;
        }
        assert!(matches!(limiter.check("x", "/q", Tier::Free).await, Decision::Denied { .. }));

        clock.advance(1_001);
        assert!(matches!(limiter.check("x", "/q", Tier::Free).await, Decision::Allowed { .. }));
        assert!(matches!(limiter.check("x", "/q", Tier::Free).await, Decision::Denied { .. }));
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let clock = Arc::new(ManualClock::new());
        let limiter = limiter(clock.clone());
        for _ in 0..5 {
            limiter.check("x", "/q", Tier::Free).await;
        }
        assert!(matches!(limiter.check("y", "/q", Tier::Free).await, Decision::Allowed { .. }));
    }
}
