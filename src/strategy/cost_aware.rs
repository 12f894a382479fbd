//! Cost-aware: filters by a per-call cost ceiling, scores by inverse cost
//! with a boost for free proxies, then weighted-random by score.

use rand::Rng;

use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::error::Result;
use crate::proxy::Proxy;
use crate::strategy::{eligible, no_match_error, SelectionContext, Strategy};

const DEFAULT_FREE_BOOST: f64 = 10.0;

#[derive(Debug)]
pub struct CostAware {
    free_boost: f64,
}

impl Default for CostAware {
    fn default() -> Self {
        Self::new()
    }
}

impl CostAware {
    pub fn new() -> Self {
        Self::with_free_boost(DEFAULT_FREE_BOOST)
    }

    pub fn with_free_boost(free_boost: f64) -> Self {
        Self { free_boost }
    }

    fn score(&self, proxy: &Proxy) -> f64 {
        if proxy.is_free() {
            self.free_boost
        } else {
            1.0 / proxy.cost_per_request
        }
    }
}

impl Strategy for CostAware {
    fn select(
        &self,
        pool_snapshot: &[Proxy],
        context: &SelectionContext,
        breakers: &CircuitBreakerRegistry,
    ) -> Result<Proxy> {
        let candidates: Vec<&Proxy> = eligible(pool_snapshot, context, breakers)
            .into_iter()
            .filter(|p| {
                context
                    .max_cost_per_request
                    .map(|ceiling| p.cost_per_request <= ceiling)
                    .unwrap_or(true)
            })
            .collect();
        if candidates.is_empty() {
            return Err(no_match_error(pool_snapshot));
        }

        let weights: Vec<f64> = candidates.iter().map(|p| self.score(p)).collect();
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
        "cost_aware"
    }
}
