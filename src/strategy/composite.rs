//! Composite: an ordered list of filter strategies narrows the eligible set,
//! then one selector strategy picks from the survivors.

use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::error::{ProxyWhirlError, Result};
use crate::proxy::Proxy;
use crate::strategy::{SelectionContext, Strategy};

/// A filter restricts the candidate set without itself making the final pick.
pub trait Filter: Send + Sync + std::fmt::Debug {
    fn filter<'a>(&self, candidates: Vec<&'a Proxy>, context: &SelectionContext) -> Vec<&'a Proxy>;
}

#[derive(Debug)]
pub struct Composite {
    filters: Vec<Box<dyn Filter>>,
    selector: Box<dyn Strategy>,
}

impl Composite {
    pub fn new(filters: Vec<Box<dyn Filter>>, selector: Box<dyn Strategy>) -> Self {
        Self { filters, selector }
    }
}

impl Strategy for Composite {
    fn select(
        &self,
        pool_snapshot: &[Proxy],
        context: &SelectionContext,
        breakers: &CircuitBreakerRegistry,
    ) -> Result<Proxy> {
        let mut survivors: Vec<&Proxy> = crate::strategy::healthy_and_not_failed(pool_snapshot, context);
        for filter in &self.filters {
            survivors = filter.filter(survivors, context);
            if survivors.is_empty() {
                return Err(ProxyWhirlError::NoEligibleProxy);
            }
        }
        let narrowed: Vec<Proxy> = survivors.into_iter().cloned().collect();
        self.selector.select(&narrowed, &without_failed_filter(context), breakers)
    }

    fn record_outcome(&self, proxy_id: uuid::Uuid, success: bool, response_time_ms: f64) {
        self.selector.record_outcome(proxy_id, success, response_time_ms);
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}

/// The filter stage has already applied breaker/failed-id exclusion; give the
/// selector a context whose `failed_proxy_ids` won't re-exclude the narrowed
/// candidates (the narrowed slice itself already respects it).
fn without_failed_filter(context: &SelectionContext) -> SelectionContext {
    let mut copy = context.clone();
    copy.failed_proxy_ids.clear();
    copy
}
