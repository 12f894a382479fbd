//! Pluggable proxy-selection strategies sharing one contract.

pub mod composite;
pub mod cost_aware;
pub mod geo;
pub mod least_used;
pub mod performance;
pub mod random;
pub mod registry;
pub mod round_robin;
pub mod sticky;
pub mod weighted;

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::error::{ProxyWhirlError, Result};
use crate::proxy::Proxy;

/// Per-call context passed to strategies.
#[derive(Debug, Clone, Default)]
pub struct SelectionContext {
    pub session_id: Option<String>,
    pub target_country: Option<String>,
    pub target_region: Option<String>,
    pub max_cost_per_request: Option<f64>,
    pub failed_proxy_ids: HashSet<Uuid>,
    pub metadata: HashMap<String, String>,
}

impl SelectionContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shared contract every rotation strategy implements.
pub trait Strategy: Send + Sync + std::fmt::Debug {
    /// Select one proxy from `pool_snapshot`, honoring `context` and breaker state.
    fn select(
        &self,
        pool_snapshot: &[Proxy],
        context: &SelectionContext,
        breakers: &CircuitBreakerRegistry,
    ) -> Result<Proxy>;

    /// Optional hook for strategy-local bookkeeping (sticky sessions, counters).
    fn record_outcome(&self, _proxy_id: Uuid, _success: bool, _response_time_ms: f64) {}

    fn name(&self) -> &'static str;
}

/// Health + already-failed-in-this-call filter, with no breaker check. Used
/// by composing strategies (composite, geo) that narrow a candidate set
/// before delegating to a terminal selector, so the breaker's single-trial
/// reservation is only consumed once per call by the terminal `eligible`.
pub fn healthy_and_not_failed<'a>(pool_snapshot: &'a [Proxy], context: &SelectionContext) -> Vec<&'a Proxy> {
    pool_snapshot
        .iter()
        .filter(|p| p.health.is_healthy_enough())
        .filter(|p| !context.failed_proxy_ids.contains(&p.id))
        .collect()
}

/// Apply the universal eligibility filter every strategy starts from: healthy
/// enough, breaker not OPEN, not already failed in this call's retry chain.
///
/// The breaker check here is a read-only peek (`is_open_now`); it does not
/// reserve the single HALF_OPEN trial. That reservation happens once, in the
/// retry executor, via `should_admit` on the proxy actually chosen.
pub fn eligible<'a>(
    pool_snapshot: &'a [Proxy],
    context: &SelectionContext,
    breakers: &CircuitBreakerRegistry,
) -> Vec<&'a Proxy> {
    healthy_and_not_failed(pool_snapshot, context)
        .into_iter()
        .filter(|p| !breakers.get(p.id).map(|b| b.is_open_now()).unwrap_or(false))
        .collect()
}

/// True when every proxy in the healthy-enough, not-yet-failed set has its
/// breaker open — the retry executor's `AllBreakersOpen` fast-fail case.
pub fn all_breakers_open(
    pool_snapshot: &[Proxy],
    context: &SelectionContext,
    breakers: &CircuitBreakerRegistry,
) -> bool {
    let candidates = healthy_and_not_failed(pool_snapshot, context);
    !candidates.is_empty()
        && candidates
            .iter()
            .all(|p| breakers.get(p.id).map(|b| b.is_open_now()).unwrap_or(false))
}

/// Fail with `NoEligibleProxy` if any candidates existed before filtering but
/// none survived, `PoolEmpty` if the snapshot itself was empty.
pub fn no_match_error(pool_snapshot: &[Proxy]) -> ProxyWhirlError {
    if pool_snapshot.is_empty() {
        ProxyWhirlError::PoolEmpty
    } else {
        ProxyWhirlError::NoEligibleProxy
    }
}
