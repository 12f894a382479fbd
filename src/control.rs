//! Control interface consumed by an out-of-scope CLI/API layer: pool, cache,
//! rate-limit, and circuit-breaker administration in one place.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::cache::{stats::CacheStatisticsSnapshot, CacheManager, DuplicateStrategy, WarmFormat};
use crate::circuit_breaker::BreakerState;
use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::error::Result;
use crate::pool::{Pool, PoolFilter};
use crate::proxy::{HealthStatus, Proxy};
use crate::rate_limit::{DegradationPolicy, RateLimiter, Tier, TierLimit};

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub dead: usize,
}

/// Thin administrative facade; holds no state of its own beyond references
/// to the live pool, cache, limiter, and breaker registry.
pub struct ControlInterface {
    pool: Arc<Pool>,
    cache: Arc<CacheManager>,
    limiter: Arc<RateLimiter>,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl ControlInterface {
    pub fn new(
        pool: Arc<Pool>,
        cache: Arc<CacheManager>,
        limiter: Arc<RateLimiter>,
        breakers: Arc<CircuitBreakerRegistry>,
    ) -> Self {
        Self { pool, cache, limiter, breakers }
    }

    // Pool ops.

    pub fn add_proxy(&self, proxy: Proxy) -> Result<Uuid> {
        self.pool.add(proxy)
    }

    pub fn remove_proxy(&self, id: Uuid) -> bool {
        self.pool.remove(id)
    }

    pub fn list_proxies(&self, filter: &PoolFilter) -> Vec<Proxy> {
        self.pool.list(filter)
    }

    pub fn clear_pool(&self) {
        for proxy in self.pool.snapshot() {
            self.pool.remove(proxy.id);
        }
    }

    pub fn health_report(&self) -> HealthReport {
        let snapshot = self.pool.snapshot();
        let mut report = HealthReport { total: snapshot.len(), healthy: 0, degraded: 0, unhealthy: 0, dead: 0 };
        for proxy in snapshot {
            match proxy.health {
                HealthStatus::Healthy | HealthStatus::Unknown => report.healthy += 1,
                HealthStatus::Degraded => report.degraded += 1,
                HealthStatus::Unhealthy => report.unhealthy += 1,
                HealthStatus::Dead => report.dead += 1,
            }
        }
        report
    }

    // Cache ops.

    pub async fn warm_cache_from_file(
        &self,
        path: PathBuf,
        format: WarmFormat,
        default_ttl: Duration,
    ) -> Result<usize> {
        self.cache.warm_from_file(&path, format, default_ttl, DuplicateStrategy::Skip).await
    }

    pub async fn export_cache_to_file(&self, path: PathBuf) -> Result<usize> {
        self.cache.export_to_file(&path).await
    }

    pub fn cache_statistics(&self) -> CacheStatisticsSnapshot {
        self.cache.stats()
    }

    pub async fn invalidate_cache_entry(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    pub async fn invalidate_cache_where<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&crate::cache::entry::CacheEntry) -> bool,
    {
        self.cache.invalidate_where(predicate).await
    }

    pub async fn clear_cache(&self) -> Result<usize> {
        self.cache.clear().await
    }

    // Rate-limit ops.

    pub fn rate_limit_tiers(&self) -> HashMap<Tier, TierLimit> {
        self.limiter.tier_limits()
    }

    pub fn replace_rate_limit_config(&self, tiers: HashMap<Tier, TierLimit>, degradation: DegradationPolicy) {
        self.limiter.replace_config(tiers, degradation);
    }

    // Circuit-breaker ops.

    pub fn breaker_states(&self) -> Vec<(Uuid, BreakerState)> {
        self.breakers.snapshot()
    }

    pub fn reset_breaker(&self, proxy_id: Uuid) -> bool {
        self.breakers.reset(proxy_id)
    }
}
