//! Holds the dispatcher's current strategy behind an `Adaptive` handle so it
//! can be hot-swapped without blocking in-flight requests.

use std::sync::Arc;

use crate::adaptive::Adaptive;
use crate::strategy::Strategy;

#[derive(Clone)]
pub struct StrategyRegistry {
    current: Adaptive<Arc<dyn Strategy>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry").field("current", &self.current.get().name()).finish()
    }
}

impl StrategyRegistry {
    pub fn new(initial: Arc<dyn Strategy>) -> Self {
        Self { current: Adaptive::new(initial) }
    }

    /// The strategy in effect for a new request. In-flight requests that
    /// already captured a prior `Arc` finish under it; there is no shared
    /// mutable state to tear mid-call.
    pub fn current(&self) -> Arc<dyn Strategy> {
        (*self.current.get()).clone()
    }

    pub fn swap(&self, next: Arc<dyn Strategy>) {
        self.current.set(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::random::Random;
    use crate::strategy::round_robin::RoundRobin;

    #[test]
    fn swap_takes_effect_for_new_reads() {
        let registry = StrategyRegistry::new(Arc::new(RoundRobin::new()));
        assert_eq!(registry.current().name(), "round_robin");
        registry.swap(Arc::new(Random::new()));
        assert_eq!(registry.current().name(), "random");
    }
}
