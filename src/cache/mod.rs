//! Three-tier cache manager (C6): L1 in-memory, L2 encrypted sharded file,
//! L3 embedded SQL. Cascading reads promote upward; writes go through all
//! enabled tiers. A tier that fails `CONSECUTIVE_FAILURE_THRESHOLD` times in
//! a row is marked degraded and skipped until its retry cooldown elapses; a
//! degraded tier's entry point is logged as
//! [`crate::error::ProxyWhirlError::CacheDegraded`] and reflected in
//! [`stats::CacheStatisticsSnapshot`].

pub mod encryption;
pub mod entry;
pub mod l1;
pub mod l2;
pub mod l3;
pub mod stats;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::clock::Clock;
use crate::error::{ProxyWhirlError, Result};
use crate::proxy::Proxy;
use entry::CacheEntry;
use l1::L1Cache;
use l2::L2Cache;
use l3::L3Cache;
use stats::{CacheStatistics, CacheStatisticsSnapshot, CacheTier, EvictionReason};

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_TTL_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Consecutive tier failures before it is marked degraded.
const CONSECUTIVE_FAILURE_THRESHOLD: u32 = 3;
/// How long a degraded tier is skipped before a probe is let through again.
const DEGRADATION_RETRY_INTERVAL_MILLIS: u64 = 30_000;

const TIER_ENABLED: u8 = 0;
const TIER_DEGRADED: u8 = 1;

/// What to do when `warm_from_file` encounters a key already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateStrategy {
    Skip,
    Replace,
    Merge,
}

/// Which tier degraded, for the informational `CacheDegraded` signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTierName {
    L2,
    L3,
}

impl std::fmt::Display for CacheTierName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTierName::L2 => write!(f, "L2"),
            CacheTierName::L3 => write!(f, "L3"),
        }
    }
}

/// Per-tier failure accounting mirroring the circuit breaker's
/// closed/open shape: `CONSECUTIVE_FAILURE_THRESHOLD` failures in a row
/// marks the tier degraded; once `DEGRADATION_RETRY_INTERVAL_MILLIS` has
/// elapsed, one probe is let through and re-degrades the tier immediately
/// if it also fails.
#[derive(Debug)]
struct TierDegradation {
    consecutive_failures: AtomicU32,
    state: AtomicU8,
    degraded_since_millis: AtomicU64,
}

impl TierDegradation {
    fn new() -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            state: AtomicU8::new(TIER_ENABLED),
            degraded_since_millis: AtomicU64::new(0),
        }
    }

    /// Read-only: current degraded flag, without probing the cooldown.
    fn is_degraded(&self) -> bool {
        self.state.load(Ordering::SeqCst) == TIER_DEGRADED
    }

    /// Whether this operation should be skipped right now. Past the
    /// cooldown, clears the flag to admit one probe; a failing probe
    /// re-degrades via `record_failure`.
    fn should_skip(&self, now_millis: u64) -> bool {
        if self.state.load(Ordering::SeqCst) != TIER_DEGRADED {
            return false;
        }
        let since = self.degraded_since_millis.load(Ordering::SeqCst);
        if now_millis.saturating_sub(since) >= DEGRADATION_RETRY_INTERVAL_MILLIS {
            self.state.store(TIER_ENABLED, Ordering::SeqCst);
            false
        } else {
            true
        }
    }

    /// Records a failure; returns `true` if this call just tripped the tier
    /// into degraded (so the caller logs the transition once, not on every
    /// subsequent failure).
    fn record_failure(&self, now_millis: u64) -> bool {
        let count = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= CONSECUTIVE_FAILURE_THRESHOLD {
            self.degraded_since_millis.store(now_millis, Ordering::SeqCst);
            self.state.swap(TIER_DEGRADED, Ordering::SeqCst) != TIER_DEGRADED
        } else {
            false
        }
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.state.store(TIER_ENABLED, Ordering::SeqCst);
    }
}

pub struct CacheManager {
    l1: L1Cache,
    l2: Option<L2Cache>,
    l3: Option<L3Cache>,
    clock: Arc<dyn Clock>,
    stats: CacheStatistics,
    default_ttl: Duration,
    l2_degradation: TierDegradation,
    l3_degradation: TierDegradation,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("l2_enabled", &self.l2.is_some())
            .field("l3_enabled", &self.l3.is_some())
            .finish()
    }
}

impl CacheManager {
    /// L1-only manager; L2/L3 can be disabled entirely (e.g. in tests), in
    /// which case the manager degrades to in-memory-only behavior.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            l1: L1Cache::new(),
            l2: None,
            l3: None,
            clock,
            stats: CacheStatistics::default(),
            default_ttl: DEFAULT_TTL,
            l2_degradation: TierDegradation::new(),
            l3_degradation: TierDegradation::new(),
        }
    }

    pub fn with_l2(mut self, l2: L2Cache) -> Self {
        self.l2 = Some(l2);
        self
    }

    pub fn with_l3(mut self, l3: L3Cache) -> Self {
        self.l3 = Some(l3);
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn stats(&self) -> CacheStatisticsSnapshot {
        let mut snapshot = self.stats.snapshot();
        snapshot.l2_degraded = self.l2.is_some() && self.l2_degradation.is_degraded();
        snapshot.l3_degraded = self.l3.is_some() && self.l3_degradation.is_degraded();
        snapshot
    }

    fn warn_degraded(&self, tier: CacheTierName) {
        let error = ProxyWhirlError::CacheDegraded { tier: tier.to_string() };
        warn!(%error, threshold = CONSECUTIVE_FAILURE_THRESHOLD, "cache tier degraded");
    }

    /// Cascade L1 -> L2 -> L3, promoting a lower-tier hit back up to L1 (and
    /// L2, when the hit came from L3).
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now_millis();

        if let Some(mut entry) = self.l1.get(key) {
            if entry.is_expired(now) {
                if self.l1.remove(key).is_some() {
                    self.stats.record_eviction(EvictionReason::Expired);
                }
            } else {
                entry.touch(now);
                if self.l1.put(entry.clone()).is_some() {
                    self.stats.record_eviction(EvictionReason::Lru);
                }
                self.stats.record_hit(CacheTier::L1);
                return Some(entry);
            }
        }

        if let Some(l2) = &self.l2 {
            if let Some(mut entry) = l2.get(key) {
                if entry.is_expired(now) {
                    if l2.remove(key).is_some() {
                        self.stats.record_eviction(EvictionReason::Expired);
                    }
                } else {
                    entry.touch(now);
                    if self.l1.put(entry.clone()).is_some() {
                        self.stats.record_eviction(EvictionReason::Lru);
                    }
                    self.stats.record_hit(CacheTier::L2);
                    return Some(entry);
                }
            }
        }

        if let Some(l3) = &self.l3 {
            if !self.l3_degradation.should_skip(now) {
                match l3.get(key).await {
                    Ok(Some(mut entry)) => {
                        self.l3_degradation.record_success();
                        if entry.is_expired(now) {
                            if matches!(l3.remove(key).await, Ok(true)) {
                                self.stats.record_eviction(EvictionReason::Expired);
                            }
                        } else {
                            entry.touch(now);
                            if self.l1.put(entry.clone()).is_some() {
                                self.stats.record_eviction(EvictionReason::Lru);
                            }
                            if let Some(l2) = &self.l2 {
                                if let Err(error) = l2.put(entry.clone()) {
                                    warn!(%error, "cache L2 promotion write degraded");
                                }
                            }
                            self.stats.record_hit(CacheTier::L3);
                            return Some(entry);
                        }
                    }
                    Ok(None) => self.l3_degradation.record_success(),
                    Err(error) => {
                        warn!(%error, "cache L3 read degraded");
                        if self.l3_degradation.record_failure(now) {
                            self.warn_degraded(CacheTierName::L3);
                        }
                    }
                }
            }
        }

        self.stats.record_miss();
        None
    }

    /// Write through every enabled, non-degraded tier. The in-process (L1)
    /// view reflects the write immediately regardless of L2/L3 outcome.
    pub async fn put(&self, entry: CacheEntry) {
        self.stats.record_write();
        let now = self.clock.now_millis();
        if self.l1.put(entry.clone()).is_some() {
            self.stats.record_eviction(EvictionReason::Lru);
        }

        if let Some(l2) = &self.l2 {
            if !self.l2_degradation.should_skip(now) {
                match l2.put(entry.clone()) {
                    Ok(evicted) => {
                        if evicted.is_some() {
                            self.stats.record_eviction(EvictionReason::Lru);
                        }
                        self.l2_degradation.record_success();
                    }
                    Err(error) => {
                        warn!(%error, "cache L2 write degraded");
                        if self.l2_degradation.record_failure(now) {
                            self.warn_degraded(CacheTierName::L2);
                        }
                    }
                }
            }
        }

        if let Some(l3) = &self.l3 {
            if !self.l3_degradation.should_skip(now) {
                match l3.put(&entry).await {
                    Ok(()) => self.l3_degradation.record_success(),
                    Err(error) => {
                        warn!(%error, "cache L3 write degraded");
                        if self.l3_degradation.record_failure(now) {
                            self.warn_degraded(CacheTierName::L3);
                        }
                    }
                }
            }
        }
    }

    /// Remove one key from every tier, counted as an explicit invalidation
    /// rather than an eviction under memory/capacity pressure.
    pub async fn remove(&self, key: &str) {
        self.remove_with_reason(key, EvictionReason::Invalidated).await;
    }

    async fn remove_with_reason(&self, key: &str, reason: EvictionReason) {
        if self.l1.remove(key).is_some() {
            self.stats.record_eviction(reason);
        }
        if let Some(l2) = &self.l2 {
            if l2.remove(key).is_some() {
                self.stats.record_eviction(reason);
            }
        }
        if let Some(l3) = &self.l3 {
            match l3.remove(key).await {
                Ok(true) => self.stats.record_eviction(reason),
                Ok(false) => {}
                Err(error) => warn!(%error, "cache L3 remove degraded"),
            }
        }
    }

    /// Invalidate one key across all tiers. Alias for [`Self::remove`] under
    /// the name the cache interface's invalidation operations share.
    pub async fn invalidate(&self, key: &str) {
        self.remove(key).await;
    }

    /// Invalidate every entry across every tier for which `predicate`
    /// returns `true`. Returns the number of entries removed.
    pub async fn invalidate_where<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&CacheEntry) -> bool,
    {
        let keys = self.all_keys().await?;
        let mut removed = 0usize;
        for key in keys {
            if let Some(entry) = self.lookup_any_tier(&key).await {
                if predicate(&entry) {
                    self.remove_with_reason(&key, EvictionReason::Invalidated).await;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Remove a proxy's cache entry once its live pool metrics have
    /// accumulated `failure_threshold` consecutive failures. Returns `true`
    /// if the entry was invalidated.
    pub async fn invalidate_unhealthy(&self, proxy: &Proxy, failure_threshold: u32) -> bool {
        if proxy.metrics.consecutive_failures >= failure_threshold {
            self.remove_with_reason(&proxy.id.to_string(), EvictionReason::Invalidated).await;
            true
        } else {
            false
        }
    }

    /// Remove every entry from every tier. Returns the number removed.
    pub async fn clear(&self) -> Result<usize> {
        let keys = self.all_keys().await?;
        for key in &keys {
            self.remove_with_reason(key, EvictionReason::Invalidated).await;
        }
        Ok(keys.len())
    }

    async fn lookup_any_tier(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.l1.get(key) {
            return Some(entry);
        }
        if let Some(l2) = &self.l2 {
            if let Some(entry) = l2.get(key) {
                return Some(entry);
            }
        }
        if let Some(l3) = &self.l3 {
            if let Ok(Some(entry)) = l3.get(key).await {
                return Some(entry);
            }
        }
        None
    }

    async fn all_keys(&self) -> Result<Vec<String>> {
        let mut keys: HashSet<String> = self.l1.keys_snapshot().into_iter().collect();
        if let Some(l2) = &self.l2 {
            keys.extend(l2.keys_snapshot());
        }
        if let Some(l3) = &self.l3 {
            keys.extend(l3.keys_snapshot().await?);
        }
        Ok(keys.into_iter().collect())
    }

    pub fn entry_for_proxy(&self, proxy: &Proxy, now_millis: u64) -> CacheEntry {
        let mut entry =
            CacheEntry::new(proxy.id.to_string(), proxy.canonical_url(), now_millis, self.default_ttl.as_millis() as u64);
        entry.source = proxy.source.clone();
        entry.health_status = proxy.health.clone();
        entry.consecutive_failures = proxy.metrics.consecutive_failures;
        if let Some(credentials) = &proxy.credentials {
            entry.username = Some(credentials.username.clone());
            entry.password = Some(credentials.password().to_string());
        }
        entry
    }

    /// Parse line-delimited/JSON-array/CSV records from `path` and insert
    /// them with `default_ttl`, honoring `strategy` for keys already present.
    /// Returns the count inserted.
    pub async fn warm_from_file(
        &self,
        path: &PathBuf,
        format: WarmFormat,
        default_ttl: Duration,
        strategy: DuplicateStrategy,
    ) -> Result<usize> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProxyWhirlError::ValidationError { message: format!("cannot read {}: {e}", path.display()) })?;
        let records = parse_warm_records(&contents, format)?;
        let now = self.clock.now_millis();
        let mut inserted = 0usize;
        for (key, canonical_url) in records {
            if self.l1.get(&key).is_some() && strategy == DuplicateStrategy::Skip {
                continue;
            }
            let mut entry = CacheEntry::new(key, canonical_url, now, default_ttl.as_millis() as u64);
            if strategy == DuplicateStrategy::Merge {
                if let Some(existing) = self.l1.get(&entry.key) {
                    entry.access_count = existing.access_count;
                    entry.source = existing.source.or(entry.source);
                }
            }
            self.put(entry).await;
            inserted += 1;
        }
        Ok(inserted)
    }

    pub async fn export_to_file(&self, path: &PathBuf) -> Result<usize> {
        let mut lines = Vec::new();
        for key in self.l1.keys_snapshot() {
            if let Some(entry) = self.l1.get(&key) {
                lines.push(format!("{}\t{}", entry.key, entry.canonical_url));
            }
        }
        let body = lines.join("\n");
        tokio::fs::write(path, body)
            .await
            .map_err(|e| ProxyWhirlError::ValidationError { message: format!("cannot write {}: {e}", path.display()) })?;
        Ok(lines.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmFormat {
    LineDelimited,
    JsonArray,
    Csv,
}

fn parse_warm_records(contents: &str, format: WarmFormat) -> Result<Vec<(String, String)>> {
    match format {
        WarmFormat::LineDelimited | WarmFormat::Csv => Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let mut parts = line.splitn(2, |c| c == '\t' || c == ',');
                let url = parts.next().unwrap_or_default().trim().to_string();
                (url.clone(), url)
            })
            .collect()),
        WarmFormat::JsonArray => {
            let values: Vec<serde_json::Value> = serde_json::from_str(contents)
                .map_err(|e| ProxyWhirlError::ValidationError { message: format!("invalid warm-file JSON: {e}") })?;
            Ok(values
                .into_iter()
                .filter_map(|value| value.as_str().map(|s| (s.to_string(), s.to_string())))
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn manager() -> CacheManager {
        CacheManager::new(Arc::new(ManualClock::new()))
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = manager();
        let entry = CacheEntry::new("k".into(), "http://h:1".into(), 0, 60_000);
        cache.put(entry.clone()).await;
        let fetched = cache.get("k").await.unwrap();
        assert_eq!(fetched.canonical_url, entry.canonical_url);
    }

    #[tokio::test]
    async fn invalidate_removes_from_l1() {
        let cache = manager();
        cache.put(CacheEntry::new("k".into(), "http://h:1".into(), 0, 60_000)).await;
        cache.invalidate("k").await;
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.stats().evictions_invalidated, 1);
    }

    #[tokio::test]
    async fn clear_empties_every_key() {
        let cache = manager();
        cache.put(CacheEntry::new("a".into(), "http://a".into(), 0, 60_000)).await;
        cache.put(CacheEntry::new("b".into(), "http://b".into(), 0, 60_000)).await;
        let removed = cache.clear().await.unwrap();
        assert_eq!(removed, 2);
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_where_matches_predicate_only() {
        let cache = manager();
        let mut stale = CacheEntry::new("stale".into(), "http://stale".into(), 0, 60_000);
        stale.consecutive_failures = 5;
        cache.put(stale).await;
        cache.put(CacheEntry::new("fresh".into(), "http://fresh".into(), 0, 60_000)).await;

        let removed = cache.invalidate_where(|e| e.consecutive_failures > 0).await.unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get("stale").await.is_none());
        assert!(cache.get("fresh").await.is_some());
    }

}
