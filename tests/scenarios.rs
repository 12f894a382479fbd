//! End-to-end scenarios driven through `RetryExecutor` against a scripted
//! transport, mirroring the literal input/output cases used to validate
//! proxy rotation, breaker trips, and sticky sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use proxywhirl::circuit_breaker::CircuitBreakerConfig;
use proxywhirl::circuit_breaker_registry::CircuitBreakerRegistry;
use proxywhirl::clock::ManualClock;
use proxywhirl::error::{ProxyWhirlError, Result};
use proxywhirl::pool::Pool;
use proxywhirl::proxy::{Proxy, Scheme};
use proxywhirl::request::{Method, RequestSpec, ResponseSpec};
use proxywhirl::retry::{RetryExecutor, RetryPolicy};
use proxywhirl::sleeper::InstantSleeper;
use proxywhirl::strategy::round_robin::RoundRobin;
use proxywhirl::strategy::sticky::SessionSticky;
use proxywhirl::strategy::SelectionContext;
use proxywhirl::transport::Transport;

#[derive(Debug, Default)]
struct ScriptedTransport {
    responses: Mutex<HashMap<String, Vec<Result<ResponseSpec>>>>,
    call_log: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    fn with_scripts(scripts: Vec<(&str, Vec<Result<ResponseSpec>>)>) -> Self {
        let map = scripts.into_iter().map(|(host, outcomes)| (host.to_string(), outcomes)).collect();
        Self { responses: Mutex::new(map), call_log: Mutex::new(Vec::new()), calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, proxy: &Proxy, _request: &RequestSpec) -> Result<ResponseSpec> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_log.lock().unwrap().push(proxy.host.clone());
        let mut map = self.responses.lock().unwrap();
        let queue = map.entry(proxy.host.clone()).or_default();
        if queue.is_empty() {
            Ok(ResponseSpec { status: 200, headers: Default::default(), body: vec![] })
        } else {
            queue.remove(0)
        }
    }
}

fn get_request() -> RequestSpec {
    RequestSpec::new(Method::Get, "http://target.example/")
}

#[tokio::test]
async fn round_robin_cycles_each_proxy_equally_over_nine_calls() {
    let pool = Arc::new(Pool::new("p"));
    for host in ["a.example", "b.example", "c.example"] {
        pool.add(Proxy::new(Scheme::Http, host, 80).unwrap()).unwrap();
    }
    let transport = Arc::new(ScriptedTransport::default());
    let breakers =
        Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), Arc::new(ManualClock::new())));
    let executor =
        RetryExecutor::new(pool.clone(), breakers, transport.clone(), Arc::new(InstantSleeper), Arc::new(ManualClock::new()));
    let strategy = RoundRobin::new();

    for _ in 0..9 {
        let result = executor.execute(get_request(), &RetryPolicy::default(), &strategy, SelectionContext::new()).await;
        assert!(result.unwrap().is_success());
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for host in transport.call_log.lock().unwrap().iter() {
        *counts.entry(host.clone()).or_insert(0) += 1;
    }
    assert_eq!(counts.len(), 3);
    for count in counts.values() {
        assert_eq!(*count, 3);
    }
    for proxy in pool.snapshot() {
        assert_eq!(proxy.metrics.successful_requests, 3);
    }
}

#[tokio::test]
async fn breaker_opens_after_threshold_and_fails_fast_without_more_io() {
    let pool = Arc::new(Pool::new("p"));
    pool.add(Proxy::new(Scheme::Http, "a.example", 80).unwrap()).unwrap();
    let transport = Arc::new(ScriptedTransport::with_scripts(vec![(
        "a.example",
        vec![
            Err(ProxyWhirlError::ConnectionError { proxy: None, message: "refused".into() }),
            Err(ProxyWhirlError::ConnectionError { proxy: None, message: "refused".into() }),
            Err(ProxyWhirlError::ConnectionError { proxy: None, message: "refused".into() }),
        ],
    )]));
    let clock = Arc::new(ManualClock::new());
    let config = CircuitBreakerConfig { failure_threshold: 3, ..Default::default() };
    let breakers = Arc::new(CircuitBreakerRegistry::new(config, clock.clone()));
    let executor = RetryExecutor::new(pool, breakers, transport.clone(), Arc::new(InstantSleeper), clock);
    let strategy = RoundRobin::new();
    let policy = RetryPolicy { max_attempts: 1, ..Default::default() };

    for _ in 0..3 {
        let result = executor.execute(get_request(), &policy, &strategy, SelectionContext::new()).await;
        assert!(matches!(result.unwrap_err(), ProxyWhirlError::ConnectionError { .. }));
    }

    let calls_before_trip = transport.calls.load(Ordering::SeqCst);
    let result = executor.execute(get_request(), &policy, &strategy, SelectionContext::new()).await;
    assert!(matches!(result.unwrap_err(), ProxyWhirlError::AllBreakersOpen));
    assert_eq!(transport.calls.load(Ordering::SeqCst), calls_before_trip);
}

#[tokio::test]
async fn sticky_session_pins_every_call_to_the_same_proxy() {
    let pool = Arc::new(Pool::new("p"));
    for host in ["a.example", "b.example", "c.example"] {
        pool.add(Proxy::new(Scheme::Http, host, 80).unwrap()).unwrap();
    }
    let transport = Arc::new(ScriptedTransport::default());
    let clock = Arc::new(ManualClock::new());
    let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), clock.clone()));
    let executor =
        RetryExecutor::new(pool.clone(), breakers, transport.clone(), Arc::new(InstantSleeper), clock.clone());
    let strategy = SessionSticky::new(Box::new(RoundRobin::new()));

    let mut context = SelectionContext::new();
    context.session_id = Some("s1".to_string());

    for _ in 0..100 {
        let result = executor.execute(get_request(), &RetryPolicy::default(), &strategy, context.clone()).await;
        assert!(result.unwrap().is_success());
    }

    let log = transport.call_log.lock().unwrap();
    let first = log[0].clone();
    assert!(log.iter().all(|host| *host == first));

    let pinned = pool.snapshot().into_iter().find(|p| p.host == first).unwrap();
    assert_eq!(pinned.metrics.total_requests, 100);
    assert_eq!(pinned.metrics.successful_requests, 100);
    for other in pool.snapshot().into_iter().filter(|p| p.host != first) {
        assert_eq!(other.metrics.total_requests, 0);
    }
}

#[tokio::test]
async fn pool_of_zero_fails_every_dispatch_with_pool_empty() {
    let pool = Arc::new(Pool::new("p"));
    let transport = Arc::new(ScriptedTransport::default());
    let breakers =
        Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), Arc::new(ManualClock::new())));
    let executor = RetryExecutor::new(pool, breakers, transport, Arc::new(InstantSleeper), Arc::new(ManualClock::new()));
    let strategy = RoundRobin::new();
    let result = executor.execute(get_request(), &RetryPolicy::default(), &strategy, SelectionContext::new()).await;
    assert!(matches!(result.unwrap_err(), ProxyWhirlError::PoolEmpty));
}
