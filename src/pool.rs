//! Concurrent proxy pool: membership, lookup, filtered views, atomic snapshots.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::error::{ProxyWhirlError, Result};
use crate::proxy::{HealthStatus, HealthThresholds, Proxy};

/// Per-call filter applied on top of the health-eligible view.
#[derive(Debug, Clone, Default)]
pub struct PoolFilter {
    pub health: Option<Vec<HealthStatus>>,
    pub tag: Option<String>,
    pub country: Option<String>,
}

/// Named, concurrent collection of proxies with O(1) id/url lookup.
#[derive(Debug)]
pub struct Pool {
    name: String,
    inner: Mutex<HashMap<Uuid, Proxy>>,
    url_index: Mutex<HashMap<String, Uuid>>,
    sequence: AtomicU64,
    max_size: Option<usize>,
    thresholds: HealthThresholds,
}

impl Pool {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, None)
    }

    pub fn with_capacity(name: impl Into<String>, max_size: Option<usize>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(HashMap::new()),
            url_index: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            max_size,
            thresholds: HealthThresholds::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a proxy, or merge into an existing entry with the same
    /// canonical URL (tags unioned, most recent source wins).
    pub fn add(&self, mut proxy: Proxy) -> Result<Uuid> {
        let canonical = proxy.canonical_url();
        let mut url_index = self.url_index.lock().unwrap();
        let mut map = self.inner.lock().unwrap();

        if let Some(&existing_id) = url_index.get(&canonical) {
            let existing = map.get_mut(&existing_id).expect("url_index entry must exist in map");
            existing.tags.extend(proxy.tags.drain());
            if proxy.source.is_some() {
                existing.source = proxy.source;
            }
            return Ok(existing_id);
        }

        if let Some(max) = self.max_size {
            if map.len() >= max {
                return Err(ProxyWhirlError::validation(format!(
                    "pool '{}' is at capacity ({})",
                    self.name, max
                )));
            }
        }

        proxy.sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let id = proxy.id;
        url_index.insert(canonical, id);
        map.insert(id, proxy);
        Ok(id)
    }

    /// Returns whether a proxy with this id was present.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut map = self.inner.lock().unwrap();
        if let Some(proxy) = map.remove(&id) {
            self.url_index.lock().unwrap().remove(&proxy.canonical_url());
            true
        } else {
            false
        }
    }

    pub fn get_by_id(&self, id: Uuid) -> Option<Proxy> {
        self.inner.lock().unwrap().get(&id).cloned()
    }

    pub fn get_by_url(&self, canonical_url: &str) -> Option<Proxy> {
        let id = *self.url_index.lock().unwrap().get(canonical_url)?;
        self.get_by_id(id)
    }

    /// Snapshot of the full membership, ordered by insertion sequence.
    pub fn snapshot(&self) -> Vec<Proxy> {
        let map = self.inner.lock().unwrap();
        let mut proxies: Vec<Proxy> = map.values().cloned().collect();
        proxies.sort_by_key(|p| p.sequence);
        proxies
    }

    pub fn list(&self, filter: &PoolFilter) -> Vec<Proxy> {
        self.snapshot()
            .into_iter()
            .filter(|p| filter.health.as_ref().map(|hs| hs.contains(&p.health)).unwrap_or(true))
            .filter(|p| filter.tag.as_ref().map(|t| p.tags.contains(t)).unwrap_or(true))
            .filter(|p| {
                filter
                    .country
                    .as_ref()
                    .map(|c| p.country.as_deref() == Some(c.as_str()))
                    .unwrap_or(true)
            })
            .collect()
    }

    /// The pool's "healthy-enough" view, in stable insertion order, used as
    /// the starting point for every rotation strategy.
    pub fn healthy_enough_snapshot(&self) -> Vec<Proxy> {
        self.snapshot().into_iter().filter(|p| p.health.is_healthy_enough()).collect()
    }

    /// Only mutator for health metrics; returns the proxy's new health status.
    pub fn record_outcome(&self, id: Uuid, success: bool, response_time_ms: f64) -> Option<HealthStatus> {
        let now = crate::proxy::now_millis();
        let mut map = self.inner.lock().unwrap();
        let proxy = map.get_mut(&id)?;
        proxy.record_outcome(success, response_time_ms, &self.thresholds, now);
        Some(proxy.health.clone())
    }

    pub fn mark_dead(&self, id: Uuid) -> bool {
        let mut map = self.inner.lock().unwrap();
        match map.get_mut(&id) {
            Some(proxy) => {
                proxy.mark_dead();
                true
            }
            None => false,
        }
    }
}

pub type SharedPool = Arc<Pool>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::Scheme;

    fn proxy(host: &str, port: u16) -> Proxy {
        Proxy::new(Scheme::Http, host, port).unwrap()
    }

    #[test]
    fn add_assigns_stable_sequence() {
        let pool = Pool::new("p");
        let a = pool.add(proxy("a.example", 80)).unwrap();
        let b = pool.add(proxy("b.example", 80)).unwrap();
        let snapshot = pool.snapshot();
        assert_eq!(snapshot[0].id, a);
        assert_eq!(snapshot[1].id, b);
    }

    #[test]
    fn duplicate_canonical_url_merges_tags_instead_of_duplicating() {
        let pool = Pool::new("p");
        let mut first = proxy("a.example", 80);
        first.tags.insert("fast".into());
        let id1 = pool.add(first).unwrap();

        let mut second = proxy("a.example", 80);
        second.tags.insert("eu".into());
        second.source = Some("feed-2".into());
        let id2 = pool.add(second).unwrap();

        assert_eq!(id1, id2);
        assert_eq!(pool.len(), 1);
        let merged = pool.get_by_id(id1).unwrap();
        assert!(merged.tags.contains("fast"));
        assert!(merged.tags.contains("eu"));
        assert_eq!(merged.source.as_deref(), Some("feed-2"));
    }

    #[test]
    fn remove_is_idempotent() {
        let pool = Pool::new("p");
        let id = pool.add(proxy("a.example", 80)).unwrap();
        assert!(pool.remove(id));
        assert!(!pool.remove(id));
    }

    #[test]
    fn capacity_is_enforced() {
        let pool = Pool::with_capacity("p", Some(1));
        pool.add(proxy("a.example", 80)).unwrap();
        assert!(pool.add(proxy("b.example", 80)).is_err());
    }

    #[test]
    fn healthy_enough_snapshot_excludes_dead_and_unhealthy() {
        let pool = Pool::new("p");
        let dead_id = pool.add(proxy("dead.example", 80)).unwrap();
        pool.add(proxy("ok.example", 80)).unwrap();
        pool.mark_dead(dead_id);
        let eligible = pool.healthy_enough_snapshot();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].host, "ok.example");
    }
}
