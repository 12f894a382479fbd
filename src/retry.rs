//! Policy-driven retry executor (C4): backoff, jitter, idempotency rules,
//! and proxy reselection on each attempt.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::backoff::Backoff;
use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::clock::Clock;
use crate::error::{ProxyWhirlError, RedactedProxyUrl, Result};
use crate::jitter::Jitter;
use crate::pool::Pool;
use crate::proxy::Proxy;
use crate::request::{classify_status, Classification, RequestSpec, ResponseSpec};
use crate::sleeper::Sleeper;
use crate::strategy::{SelectionContext, Strategy};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    Exponential,
    Linear,
    Fixed,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_backoff_delay: Duration,
    pub jitter: bool,
    pub backoff_kind: BackoffKind,
    pub retryable_status_codes: HashSet<u16>,
    pub allow_non_idempotent_retry: bool,
    pub total_deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_backoff_delay: Duration::from_secs(30),
            jitter: true,
            backoff_kind: BackoffKind::Exponential,
            retryable_status_codes: [502, 503, 504, 429, 408].into_iter().collect(),
            allow_non_idempotent_retry: false,
            total_deadline: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> Backoff {
        match self.backoff_kind {
            BackoffKind::Fixed => Backoff::fixed(self.base_delay),
            BackoffKind::Linear => Backoff::linear(self.base_delay),
            BackoffKind::Exponential => {
                Backoff::exponential_with_multiplier(self.base_delay, self.multiplier)
                    .with_max(self.max_backoff_delay)
            }
        }
    }

    fn jitter(&self) -> Jitter {
        if self.jitter {
            Jitter::spread()
        } else {
            Jitter::None
        }
    }
}

/// Runs one logical call (possibly several HTTP attempts) against a pool,
/// strategy, and breaker set.
pub struct RetryExecutor {
    pool: Arc<Pool>,
    breakers: Arc<CircuitBreakerRegistry>,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor").field("pool", &self.pool.name()).finish()
    }
}

impl RetryExecutor {
    pub fn new(
        pool: Arc<Pool>,
        breakers: Arc<CircuitBreakerRegistry>,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { pool, breakers, transport, sleeper, clock }
    }

    pub async fn execute(
        &self,
        request: RequestSpec,
        policy: &RetryPolicy,
        strategy: &dyn Strategy,
        base_context: SelectionContext,
    ) -> Result<ResponseSpec> {
        let deadline_millis = self.clock.now_millis() + policy.total_deadline.as_millis() as u64;
        let mut failed_ids: HashSet<Uuid> = base_context.failed_proxy_ids.clone();
        let mut last_proxy: Option<RedactedProxyUrl> = None;
        let backoff = policy.backoff();
        let jitter = policy.jitter();

        for attempt in 0..policy.max_attempts {
            if self.clock.now_millis() >= deadline_millis {
                return Err(ProxyWhirlError::DeadlineExceeded { attempts: attempt });
            }

            let pool_snapshot = self.pool.snapshot();
            let mut context = base_context.clone();
            context.failed_proxy_ids = failed_ids.clone();

            if crate::strategy::all_breakers_open(&pool_snapshot, &context, &self.breakers) {
                return Err(ProxyWhirlError::AllBreakersOpen);
            }

            let proxy = match strategy.select(&pool_snapshot, &context, &self.breakers) {
                Ok(proxy) => proxy,
                Err(ProxyWhirlError::NoEligibleProxy | ProxyWhirlError::PoolEmpty) if !failed_ids.is_empty() => {
                    return Err(ProxyWhirlError::AllAttemptsFailed { attempts: attempt, last_proxy });
                }
                Err(e) => return Err(e),
            };

            let breaker = self.breakers.get_or_create(proxy.id);
            if !breaker.should_admit() {
                // Lost the race for this breaker's HALF_OPEN trial (or it
                // re-closed to OPEN between selection and here). Treat the
                // proxy as failed-for-this-call and keep looping without
                // burning an attempt slot.
                failed_ids.insert(proxy.id);
                continue;
            }

            let redacted_proxy = RedactedProxyUrl::new(proxy.scheme.as_str(), &proxy.host, proxy.port);
            last_proxy = Some(redacted_proxy.clone());

            let start = self.clock.now_millis();
            let outcome = self.transport.execute(&proxy, &request).await;
            let elapsed_ms = self.clock.now_millis().saturating_sub(start) as f64;

            let (classification, result): (Classification, Result<ResponseSpec>) = match outcome {
                Ok(response) => {
                    let classification = classify_status(response.status, &policy.retryable_status_codes);
                    (classification, Ok(response))
                }
                Err(ProxyWhirlError::AuthFailure { .. }) => {
                    (Classification::AuthFailure, Err(ProxyWhirlError::AuthFailure { proxy: Some(redacted_proxy.clone()) }))
                }
                Err(e @ (ProxyWhirlError::ConnectionError { .. } | ProxyWhirlError::UpstreamTimeout { .. })) => {
                    (Classification::Retryable, Err(e))
                }
                Err(e) => (Classification::Permanent, Err(e)),
            };

            let success = classification == Classification::Success;
            self.pool.record_outcome(proxy.id, success, elapsed_ms);
            strategy.record_outcome(proxy.id, success, elapsed_ms);
            if success {
                breaker.record_success();
            } else {
                breaker.record_failure();
            }

            match classification {
                Classification::Success => return result,
                Classification::AuthFailure => return result,
                Classification::Permanent => return result,
                Classification::Retryable => {
                    if !request.method.is_idempotent() && !policy.allow_non_idempotent_retry {
                        return result;
                    }
                    failed_ids.insert(proxy.id);

                    if attempt + 1 >= policy.max_attempts {
                        break;
                    }

                    let mut delay = backoff.delay(attempt);
                    delay = jitter.apply(delay);
                    let now = self.clock.now_millis();
                    if now + delay.as_millis() as u64 >= deadline_millis {
                        return Err(ProxyWhirlError::DeadlineExceeded { attempts: attempt + 1 });
                    }
                    self.sleeper.sleep(delay).await;
                }
            }
        }

        Err(ProxyWhirlError::AllAttemptsFailed { attempts: policy.max_attempts, last_proxy })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::clock::ManualClock;
    use crate::proxy::Scheme;
    use crate::request::Method;
    use crate::sleeper::InstantSleeper;
    use crate::strategy::round_robin::RoundRobin;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct ScriptedTransport {
        responses: Mutex<std::collections::HashMap<String, Vec<Result<ResponseSpec>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn script(host: &str, outcomes: Vec<Result<ResponseSpec>>) -> Self {
            let mut map = std::collections::HashMap::new();
            map.insert(host.to_string(), outcomes);
            Self { responses: Mutex::new(map), calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, proxy: &Proxy, _request: &RequestSpec) -> Result<ResponseSpec> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut map = self.responses.lock().unwrap();
            let queue = map.entry(proxy.host.clone()).or_insert_with(Vec::new);
            if queue.is_empty() {
                Ok(ResponseSpec { status: 200, headers: Default::default(), body: vec![] })
            } else {
                queue.remove(0)
            }
        }
    }

    fn ok_response() -> Result<ResponseSpec> {
        Ok(ResponseSpec { status: 200, headers: Default::default(), body: vec![] })
    }

    fn status(code: u16) -> Result<ResponseSpec> {
        Ok(ResponseSpec { status: code, headers: Default::default(), body: vec![] })
    }

    fn make_executor(pool: Arc<Pool>, transport: Arc<dyn Transport>) -> RetryExecutor {
        RetryExecutor::new(
            pool,
            Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), Arc::new(ManualClock::new()))),
            transport,
            Arc::new(InstantSleeper),
            Arc::new(ManualClock::new()),
        )
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let pool = Arc::new(Pool::new("p"));
        pool.add(Proxy::new(Scheme::Http, "a.example", 80).unwrap()).unwrap();
        let transport = Arc::new(ScriptedTransport::script("a.example", vec![ok_response()]));
        let executor = make_executor(pool, transport);
        let strategy = RoundRobin::new();
        let request = RequestSpec::new(Method::Get, "http://target.example/").with_timeout(Duration::from_secs(5));
        let result = executor.execute(request, &RetryPolicy::default(), &strategy, SelectionContext::new()).await;
        assert!(result.unwrap().is_success());
    }

    #[tokio::test]
    async fn retries_through_a_different_proxy_on_failure() {
        let pool = Arc::new(Pool::new("p"));
        pool.add(Proxy::new(Scheme::Http, "a.example", 80).unwrap()).unwrap();
        pool.add(Proxy::new(Scheme::Http, "b.example", 80).unwrap()).unwrap();

        let mut responses = std::collections::HashMap::new();
        responses.insert("a.example".to_string(), vec![status(502)]);
        responses.insert("b.example".to_string(), vec![ok_response()]);
        let transport = Arc::new(ScriptedTransport { responses: Mutex::new(responses), calls: AtomicUsize::new(0) });

        let executor = make_executor(pool.clone(), transport);
        let strategy = RoundRobin::new();
        let policy = RetryPolicy { max_attempts: 3, ..Default::default() };
        let request = RequestSpec::new(Method::Get, "http://target.example/").with_timeout(Duration::from_secs(5));
        let result = executor.execute(request, &policy, &strategy, SelectionContext::new()).await;
        assert!(result.unwrap().is_success());

        let a = pool.get_by_id(pool.snapshot()[0].id).unwrap();
        assert_eq!(a.metrics.total_requests, 1);
        assert_eq!(a.metrics.successful_requests, 0);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_surfaces_all_attempts_failed() {
        let pool = Arc::new(Pool::new("p"));
        pool.add(Proxy::new(Scheme::Http, "a.example", 80).unwrap()).unwrap();
        let transport =
            Arc::new(ScriptedTransport::script("a.example", vec![status(503), status(503), status(503)]));
        let executor = make_executor(pool, transport);
        let strategy = RoundRobin::new();
        let policy = RetryPolicy { max_attempts: 3, ..Default::default() };
        let request = RequestSpec::new(Method::Get, "http://target.example/").with_timeout(Duration::from_secs(5));
        let result = executor.execute(request, &policy, &strategy, SelectionContext::new()).await;
        assert!(matches!(result.unwrap_err(), ProxyWhirlError::AllAttemptsFailed { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn non_idempotent_method_is_not_retried_by_default() {
        let pool = Arc::new(Pool::new("p"));
        pool.add(Proxy::new(Scheme::Http, "a.example", 80).unwrap()).unwrap();
        let transport = Arc::new(ScriptedTransport::script("a.example", vec![status(503)]));
        let executor = make_executor(pool, transport);
        let strategy = RoundRobin::new();
        let policy = RetryPolicy { max_attempts: 3, ..Default::default() };
        let request = RequestSpec::new(Method::Post, "http://target.example/").with_timeout(Duration::from_secs(5));
        let result = executor.execute(request, &policy, &strategy, SelectionContext::new()).await;
        assert_eq!(result.unwrap().status, 503);
    }

    #[tokio::test]
    async fn permanent_4xx_is_returned_without_retry() {
        let pool = Arc::new(Pool::new("p"));
        pool.add(Proxy::new(Scheme::Http, "a.example", 80).unwrap()).unwrap();
        let transport = Arc::new(ScriptedTransport::script("a.example", vec![status(404)]));
        let executor = make_executor(pool, transport);
        let strategy = RoundRobin::new();
        let request = RequestSpec::new(Method::Get, "http://target.example/").with_timeout(Duration::from_secs(5));
        let result = executor.execute(request, &RetryPolicy::default(), &strategy, SelectionContext::new()).await;
        assert_eq!(result.unwrap().status, 404);
    }

    #[tokio::test]
    async fn empty_pool_surfaces_pool_empty() {
        let pool = Arc::new(Pool::new("p"));
        let transport = Arc::new(ScriptedTransport::default());
        let executor = make_executor(pool, transport);
        let strategy = RoundRobin::new();
        let request = RequestSpec::new(Method::Get, "http://target.example/").with_timeout(Duration::from_secs(5));
        let result = executor.execute(request, &RetryPolicy::default(), &strategy, SelectionContext::new()).await;
        assert!(matches!(result.unwrap_err(), ProxyWhirlError::PoolEmpty));
    }

    #[tokio::test]
    async fn max_attempts_one_performs_exactly_one_attempt() {
        let pool = Arc::new(Pool::new("p"));
        pool.add(Proxy::new(Scheme::Http, "a.example", 80).unwrap()).unwrap();
        let transport = Arc::new(ScriptedTransport::script("a.example", vec![status(503)]));
        let executor = make_executor(pool, transport.clone());
        let strategy = RoundRobin::new();
        let policy = RetryPolicy { max_attempts: 1, ..Default::default() };
        let request = RequestSpec::new(Method::Get, "http://target.example/").with_timeout(Duration::from_secs(5));
        let _ = executor.execute(request, &policy, &strategy, SelectionContext::new()).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
