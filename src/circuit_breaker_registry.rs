//! Registry of per-proxy circuit breakers, keyed by proxy id.
//!
//! Backs the control interface's breaker operations: list states, reset one
//! by proxy id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
use crate::clock::Clock;

#[derive(Clone, Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Arc<Mutex<HashMap<Uuid, Arc<CircuitBreaker>>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock, inner: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Fetch the breaker for `proxy_id`, creating one with the registry's
    /// default config on first use.
    pub fn get_or_create(&self, proxy_id: Uuid) -> Arc<CircuitBreaker> {
        let mut map = self.inner.lock().unwrap();
        map.entry(proxy_id)
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::with_clock(self.config.clone(), self.clock.clone()))
            })
            .clone()
    }

    pub fn get(&self, proxy_id: Uuid) -> Option<Arc<CircuitBreaker>> {
        self.inner.lock().unwrap().get(&proxy_id).cloned()
    }

    /// Reset a breaker by proxy id. Returns `false` if no breaker exists yet
    /// for that id (nothing to reset, not an error: an unseen proxy is
    /// implicitly closed).
    pub fn reset(&self, proxy_id: Uuid) -> bool {
        if let Some(breaker) = self.get(proxy_id) {
            breaker.reset();
            true
        } else {
            false
        }
    }

    /// Snapshot of all known breaker states, sorted by proxy id.
    pub fn snapshot(&self) -> Vec<(Uuid, BreakerState)> {
        let map = self.inner.lock().unwrap();
        let mut entries: Vec<(Uuid, BreakerState)> =
            map.iter().map(|(id, breaker)| (*id, breaker.state())).collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn creates_breaker_on_first_use_and_reuses_it() {
        let registry = CircuitBreakerRegistry::new(
            CircuitBreakerConfig::default(),
            Arc::new(ManualClock::new()),
        );
        let id = Uuid::new_v4();
        let first = registry.get_or_create(id);
        let second = registry.get_or_create(id);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn reset_on_unknown_id_returns_false() {
        let registry = CircuitBreakerRegistry::new(
            CircuitBreakerConfig::default(),
            Arc::new(ManualClock::new()),
        );
        assert!(!registry.reset(Uuid::new_v4()));
    }

    #[test]
    fn snapshot_reflects_tripped_breakers() {
        let config = CircuitBreakerConfig { failure_threshold: 1, ..Default::default() };
        let registry = CircuitBreakerRegistry::new(config, Arc::new(ManualClock::new()));
        let id = Uuid::new_v4();
        let breaker = registry.get_or_create(id);
        breaker.record_failure();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot, vec![(id, BreakerState::Open)]);

        assert!(registry.reset(id));
        assert_eq!(registry.snapshot(), vec![(id, BreakerState::Closed)]);
    }
}
