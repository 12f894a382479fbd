//! Weighted random selection: weight = override or `max(0.1, success_rate)`.

use rand::Rng;

use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::error::Result;
use crate::proxy::Proxy;
use crate::strategy::{eligible, no_match_error, SelectionContext, Strategy};

const WEIGHT_FLOOR: f64 = 0.1;

fn weight_of(proxy: &Proxy) -> f64 {
    proxy.metrics.success_rate().max(WEIGHT_FLOOR)
}

/// Weighted-random pick via cumulative sum + linear scan (candidate sets are
/// small enough that a binary search buys nothing in practice).
#[derive(Debug, Default)]
pub struct Weighted;

impl Weighted {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for Weighted {
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

        let weights: Vec<f64> = candidates.iter().map(|p| weight_of(p)).collect();
        let total: f64 = weights.iter().sum();
        let mut target = rand::thread_rng().gen_range(0.0..total);
        for (proxy, weight) in candidates.iter().zip(weights.iter()) {
            if target < *weight {
                return Ok((*proxy).clone());
            }
            target -= weight;
        }
        // Floating point edge case: fall back to the last candidate.
        Ok((*candidates.last().unwrap()).clone())
    }

    fn name(&self) -> &'static str {
        "weighted"
    }
}
