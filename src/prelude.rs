//! Convenient re-exports for common ProxyWhirl types.
pub use crate::{
    backoff::Backoff,
    bulkhead::Bulkhead,
    cache::{entry::CacheEntry, CacheManager},
    circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig},
    circuit_breaker_registry::CircuitBreakerRegistry,
    clock::{Clock, MonotonicClock},
    config::ProxyWhirlConfig,
    control::ControlInterface,
    dispatcher::{CancellationToken, Dispatcher, RequestOptions},
    error::{ProxyWhirlError, Result},
    jitter::Jitter,
    pool::{Pool, PoolFilter, SharedPool},
    proxy::{HealthStatus, Proxy, ProxyCredentials, Scheme},
    rate_limit::{Decision, RateLimiter, Tier},
    request::{Method, RequestSpec, ResponseSpec},
    retry::{RetryExecutor, RetryPolicy},
    strategy::{SelectionContext, Strategy},
};
