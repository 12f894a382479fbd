//! Round-robin: a monotonic counter indexes into the stable eligible order.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::error::Result;
use crate::proxy::Proxy;
use crate::strategy::{eligible, no_match_error, SelectionContext, Strategy};

#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicU64,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for RoundRobin {
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
        let index = self.counter.fetch_add(1, Ordering::SeqCst) as usize % candidates.len();
        Ok(candidates[index].clone())
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
