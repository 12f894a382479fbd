//! L1: in-memory LRU, O(1) operations, cleartext credentials never leave the process.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use super::entry::CacheEntry;

const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug)]
pub struct L1Cache {
    inner: Mutex<LruCache<String, CacheEntry>>,
}

impl L1Cache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self { inner: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    /// Insert or overwrite, returning the entry evicted to make room, if any.
    /// `LruCache::push` also returns the old value when `entry.key` was
    /// already present; that is a replace, not an eviction, so it is
    /// filtered out here.
    pub fn put(&self, entry: CacheEntry) -> Option<CacheEntry> {
        let key = entry.key.clone();
        match self.inner.lock().unwrap().push(key.clone(), entry) {
            Some((evicted_key, evicted)) if evicted_key != key => Some(evicted),
            _ => None,
        }
    }

    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.inner.lock().unwrap().pop(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys_snapshot(&self) -> Vec<String> {
        self.inner.lock().unwrap().iter().map(|(key, _)| key.clone()).collect()
    }
}

impl Default for L1Cache {
    fn default() -> Self {
        Self::new()
    }
}
