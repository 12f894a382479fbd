//! Uniform random pick from the eligible set.

use rand::seq::SliceRandom;

use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::error::Result;
use crate::proxy::Proxy;
use crate::strategy::{eligible, no_match_error, SelectionContext, Strategy};

#[derive(Debug, Default)]
pub struct Random;

impl Random {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for Random {
    fn select(
        &self,
        pool_snapshot: &[Proxy],
        context: &SelectionContext,
        breakers: &CircuitBreakerRegistry,
    ) -> Result<Proxy> {
        let candidates = eligible(pool_snapshot, context, breakers);
        candidates
            .choose(&mut rand::thread_rng())
            .map(|p| (*p).clone())
            .ok_or_else(|| no_match_error(pool_snapshot))
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
