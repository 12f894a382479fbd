#![forbid(unsafe_code)]

//! # ProxyWhirl
//!
//! A resilient HTTP client built around a rotating pool of proxies: pluggable
//! rotation strategies, per-proxy circuit breakers, a policy-driven retry
//! executor, a three-tier cache, and a sliding-window rate limiter, all bound
//! together behind one request dispatcher.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use proxywhirl::adaptive::Adaptive;
//! use proxywhirl::circuit_breaker_registry::CircuitBreakerRegistry;
//! use proxywhirl::circuit_breaker::CircuitBreakerConfig;
//! use proxywhirl::clock::MonotonicClock;
//! use proxywhirl::dispatcher::{Dispatcher, RequestOptions};
//! use proxywhirl::pool::Pool;
//! use proxywhirl::proxy::{Proxy, Scheme};
//! use proxywhirl::rate_limit::RateLimiter;
//! use proxywhirl::rate_limit::store::InMemoryTokenStore;
//! use proxywhirl::retry::RetryPolicy;
//! use proxywhirl::sleeper::TokioSleeper;
//! use proxywhirl::strategy::registry::StrategyRegistry;
//! use proxywhirl::strategy::round_robin::RoundRobin;
//! use proxywhirl::transport::ReqwestTransport;
//!
//! # async fn run() -> proxywhirl::error::Result<()> {
//! let pool = Arc::new(Pool::new("default"));
//! pool.add(Proxy::new(Scheme::Http, "proxy.example", 8080)?)?;
//!
//! let clock = Arc::new(MonotonicClock::default());
//! let strategies = Arc::new(StrategyRegistry::new(Arc::new(RoundRobin::new())));
//! let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), clock.clone()));
//! let limiter = Arc::new(RateLimiter::new(Arc::new(InMemoryTokenStore::new()), clock.clone()));
//! let transport = Arc::new(ReqwestTransport::new());
//!
//! let dispatcher = Dispatcher::new(
//!     pool, strategies, breakers, limiter, transport, clock,
//!     Arc::new(TokioSleeper), RetryPolicy::default(), 16,
//! );
//!
//! let response = dispatcher.get("https://example.com", &RequestOptions::new("client-a")).await?;
//! println!("status: {}", response.status);
//! # Ok(())
//! # }
//! ```

pub mod adaptive;
pub mod backoff;
pub mod bulkhead;
pub mod cache;
pub mod circuit_breaker;
pub mod circuit_breaker_registry;
pub mod clock;
pub mod config;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod ingestion;
pub mod jitter;
pub mod pool;
pub mod proxy;
pub mod rate_limit;
pub mod request;
pub mod retry;
pub mod sleeper;
pub mod strategy;
pub mod timeout;
pub mod transport;

pub mod prelude;
