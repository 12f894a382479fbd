//! Cache-wide counters surfaced through the control interface.

use std::sync::atomic::{AtomicU64, Ordering};

/// Why an entry left a tier, so eviction pressure can be told apart from
/// plain expiry or an explicit invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    Lru,
    Expired,
    Invalidated,
}

#[derive(Debug, Default)]
pub struct CacheStatistics {
    pub l1_hits: AtomicU64,
    pub l2_hits: AtomicU64,
    pub l3_hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions_lru: AtomicU64,
    pub evictions_expired: AtomicU64,
    pub evictions_invalidated: AtomicU64,
    pub writes: AtomicU64,
}

impl CacheStatistics {
    pub fn snapshot(&self) -> CacheStatisticsSnapshot {
        CacheStatisticsSnapshot {
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            l3_hits: self.l3_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions_lru: self.evictions_lru.load(Ordering::Relaxed),
            evictions_expired: self.evictions_expired.load(Ordering::Relaxed),
            evictions_invalidated: self.evictions_invalidated.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            l2_degraded: false,
            l3_degraded: false,
        }
    }

    pub fn record_hit(&self, tier: CacheTier) {
        match tier {
            CacheTier::L1 => self.l1_hits.fetch_add(1, Ordering::Relaxed),
            CacheTier::L2 => self.l2_hits.fetch_add(1, Ordering::Relaxed),
            CacheTier::L3 => self.l3_hits.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self, reason: EvictionReason) {
        match reason {
            EvictionReason::Lru => self.evictions_lru.fetch_add(1, Ordering::Relaxed),
            EvictionReason::Expired => self.evictions_expired.fetch_add(1, Ordering::Relaxed),
            EvictionReason::Invalidated => self.evictions_invalidated.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    L1,
    L2,
    L3,
}

/// Point-in-time view of [`CacheStatistics`] plus each optional tier's
/// current degradation flag (see [`super::CacheManager`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatisticsSnapshot {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub l3_hits: u64,
    pub misses: u64,
    pub evictions_lru: u64,
    pub evictions_expired: u64,
    pub evictions_invalidated: u64,
    pub writes: u64,
    pub l2_degraded: bool,
    pub l3_degraded: bool,
}

impl CacheStatisticsSnapshot {
    pub fn evictions(&self) -> u64 {
        self.evictions_lru + self.evictions_expired + self.evictions_invalidated
    }

    pub fn total_hits(&self) -> u64 {
        self.l1_hits + self.l2_hits + self.l3_hits
    }

    /// Fraction of `get` calls that hit any tier; `0.0` when nothing has
    /// been looked up yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.total_hits() as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_is_zero_with_no_activity() {
        assert_eq!(CacheStatisticsSnapshot::default().hit_rate(), 0.0);
    }

    #[test]
    fn hit_rate_divides_hits_by_hits_plus_misses() {
        let stats = CacheStatistics::default();
        stats.record_hit(CacheTier::L1);
        stats.record_hit(CacheTier::L2);
        stats.record_miss();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_hits(), 2);
        assert!((snapshot.hit_rate() - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn evictions_are_tallied_by_reason() {
        let stats = CacheStatistics::default();
        stats.record_eviction(EvictionReason::Lru);
        stats.record_eviction(EvictionReason::Lru);
        stats.record_eviction(EvictionReason::Expired);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.evictions_lru, 2);
        assert_eq!(snapshot.evictions_expired, 1);
        assert_eq!(snapshot.evictions(), 3);
    }
}
