//! Public request dispatcher (C5): binds strategy selection, retry, circuit
//! breaking, and rate limiting behind one thread-safe, re-entrant API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, instrument};

use crate::bulkhead::Bulkhead;
use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::clock::Clock;
use crate::error::{ProxyWhirlError, Result};
use crate::pool::SharedPool;
use crate::rate_limit::{RateLimiter, Tier};
use crate::request::{Method, RequestSpec, ResponseSpec};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::strategy::registry::StrategyRegistry;
use crate::strategy::SelectionContext;
use crate::transport::Transport;

/// Cooperative cancellation signal shared across one dispatcher call's
/// suspension points. Cheap to clone; flipping `cancel()` is observed at the
/// next suspension point (retry backoff sleep, outbound I/O).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-call admission parameters for the rate limiter.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub identifier: String,
    pub tier: Tier,
    pub selection: SelectionContext,
    pub cancellation: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            tier: Tier::Free,
            selection: SelectionContext::new(),
            cancellation: None,
        }
    }
}

/// Scoped lifecycle: opened, used, closed. A closed dispatcher refuses new
/// requests with `Closed`; the flag is checked at the top of every call.
pub struct Dispatcher {
    pool: SharedPool,
    strategies: Arc<StrategyRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
    executor: RetryExecutor,
    bulkhead: Bulkhead,
    closed: AtomicBool,
}

impl Dispatcher {
    pub fn new(
        pool: SharedPool,
        strategies: Arc<StrategyRegistry>,
        breakers: Arc<CircuitBreakerRegistry>,
        limiter: Arc<RateLimiter>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn crate::sleeper::Sleeper>,
        retry_policy: RetryPolicy,
        max_concurrent_batch: usize,
    ) -> Self {
        let executor = RetryExecutor::new(pool.clone(), breakers.clone(), transport, sleeper, clock);
        Self {
            pool,
            strategies,
            breakers,
            limiter,
            retry_policy,
            executor,
            bulkhead: Bulkhead::new(max_concurrent_batch),
            closed: AtomicBool::new(false),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ProxyWhirlError::Closed)
        } else {
            Ok(())
        }
    }

    #[instrument(skip(self, request, options), fields(method = request.method.as_str(), url = %request.url))]
    pub async fn request(&self, request: RequestSpec, options: &RequestOptions) -> Result<ResponseSpec> {
        self.ensure_open()?;

        if let Some(token) = &options.cancellation {
            if token.is_cancelled() {
                return Err(ProxyWhirlError::Cancelled);
            }
        }

        let endpoint = request.url.clone();
        let decision = self.limiter.check(&options.identifier, &endpoint, options.tier).await;
        if let crate::rate_limit::Decision::Denied { retry_after, .. } = decision {
            return Err(ProxyWhirlError::RateLimited { retry_after });
        }

        let strategy = self.strategies.current();
        let started = std::time::Instant::now();
        let result = self
            .executor
            .execute(request, &self.retry_policy, strategy.as_ref(), options.selection.clone())
            .await;

        match &result {
            Ok(response) => info!(
                status = response.status,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "request completed"
            ),
            Err(error) => info!(
                %error,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "request failed"
            ),
        }
        result
    }

    pub async fn get(&self, url: impl Into<String>, options: &RequestOptions) -> Result<ResponseSpec> {
        self.request(RequestSpec::new(Method::Get, url), options).await
    }

    pub async fn post(
        &self,
        url: impl Into<String>,
        body: Vec<u8>,
        options: &RequestOptions,
    ) -> Result<ResponseSpec> {
        self.request(RequestSpec::new(Method::Post, url).with_body(body), options).await
    }

    pub async fn put(
        &self,
        url: impl Into<String>,
        body: Vec<u8>,
        options: &RequestOptions,
    ) -> Result<ResponseSpec> {
        self.request(RequestSpec::new(Method::Put, url).with_body(body), options).await
    }

    pub async fn delete(&self, url: impl Into<String>, options: &RequestOptions) -> Result<ResponseSpec> {
        self.request(RequestSpec::new(Method::Delete, url), options).await
    }

    /// Schedule `urls.len()` `get` calls under a concurrency cap, returning
    /// results positionally; a failed item's error is captured rather than
    /// aborting the batch.
    pub async fn batch_get(
        &self,
        urls: Vec<String>,
        options: &RequestOptions,
    ) -> Vec<Result<ResponseSpec>> {
        let futures = urls.into_iter().map(|url| {
            let options = options.clone();
            async move {
                let _permit = self.bulkhead.acquire().await;
                self.get(url, &options).await
            }
        });
        futures::future::join_all(futures).await
    }

    pub fn pool(&self) -> &SharedPool {
        &self.pool
    }
}
