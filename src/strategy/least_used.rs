//! Least-used: smallest total request count, ties broken by earliest last-used.

use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::error::Result;
use crate::proxy::Proxy;
use crate::strategy::{eligible, no_match_error, SelectionContext, Strategy};

#[derive(Debug, Default)]
pub struct LeastUsed;

impl LeastUsed {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for LeastUsed {
    fn select(
        &self,
        pool_snapshot: &[Proxy],
        context: &SelectionContext,
        breakers: &CircuitBreakerRegistry,
    ) -> Result<Proxy> {
        let candidates = eligible(pool_snapshot, context, breakers);
        candidates
            .into_iter()
            .min_by_key(|p| (p.metrics.total_requests, p.metrics.last_used_millis.unwrap_or(0)))
            .map(|p| p.clone())
            .ok_or_else(|| no_match_error(pool_snapshot))
    }

    fn name(&self) -> &'static str {
        "least_used"
    }
}
