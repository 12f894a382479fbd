//! The unit of storage shared by all three cache tiers.

use crate::proxy::HealthStatus;

/// One cached proxy record plus the bookkeeping the cache manager needs to
/// expire, evict, and re-validate it independently of the live pool.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub canonical_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub source: Option<String>,
    pub fetched_at_millis: u64,
    pub last_accessed_millis: u64,
    pub access_count: u64,
    pub ttl_millis: u64,
    pub expires_at_millis: u64,
    pub health_status: HealthStatus,
    pub consecutive_failures: u32,
}

impl CacheEntry {
    pub fn new(key: String, canonical_url: String, now_millis: u64, ttl_millis: u64) -> Self {
        Self {
            key,
            canonical_url,
            username: None,
            password: None,
            source: None,
            fetched_at_millis: now_millis,
            last_accessed_millis: now_millis,
            access_count: 0,
            ttl_millis,
            expires_at_millis: now_millis + ttl_millis,
            health_status: HealthStatus::Unknown,
            consecutive_failures: 0,
        }
    }

    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis >= self.expires_at_millis
    }

    pub fn touch(&mut self, now_millis: u64) {
        self.last_accessed_millis = now_millis;
        self.access_count += 1;
    }
}
