//! L2: sharded append-mostly JSON-line files, fsync'd on flush, credentials
//! encrypted at rest. Sharded by key prefix to reduce lock contention.

use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lru::LruCache;
use serde::{Deserialize, Serialize};

use super::encryption::CacheCipher;
use super::entry::CacheEntry;
use crate::error::{ProxyWhirlError, Result};
use crate::proxy::HealthStatus;

const DEFAULT_CAPACITY: usize = 5000;
const DEFAULT_SHARD_COUNT: usize = 4;

#[derive(Debug, Serialize, Deserialize)]
struct L2Record {
    key: String,
    canonical_url: String,
    username_enc: Option<String>,
    password_enc: Option<String>,
    source: Option<String>,
    fetched_at_millis: u64,
    last_accessed_millis: u64,
    access_count: u64,
    ttl_millis: u64,
    expires_at_millis: u64,
    health_status: String,
    consecutive_failures: u32,
}

fn health_to_str(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Unknown => "unknown",
        HealthStatus::Healthy => "healthy",
        HealthStatus::Degraded => "degraded",
        HealthStatus::Unhealthy => "unhealthy",
        HealthStatus::Dead => "dead",
    }
}

fn health_from_str(text: &str) -> HealthStatus {
    match text {
        "healthy" => HealthStatus::Healthy,
        "degraded" => HealthStatus::Degraded,
        "unhealthy" => HealthStatus::Unhealthy,
        "dead" => HealthStatus::Dead,
        _ => HealthStatus::Unknown,
    }
}

struct Shard {
    path: PathBuf,
    entries: Mutex<LruCache<String, CacheEntry>>,
}

/// On-disk tier. Each shard keeps an in-memory LRU view matching its file's
/// contents so reads never touch disk; writes append a record and fsync.
pub struct L2Cache {
    shards: Vec<Shard>,
    cipher: CacheCipher,
}

impl std::fmt::Debug for L2Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("L2Cache").field("shards", &self.shards.len()).finish()
    }
}

impl L2Cache {
    pub fn open(dir: &Path, key_bytes: &[u8; 32]) -> Result<Self> {
        Self::open_with(dir, key_bytes, DEFAULT_SHARD_COUNT, DEFAULT_CAPACITY)
    }

    pub fn open_with(dir: &Path, key_bytes: &[u8; 32], shard_count: usize, capacity: usize) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| ProxyWhirlError::ValidationError {
            message: format!("cannot create cache dir {}: {e}", dir.display()),
        })?;
        let per_shard_capacity = (capacity / shard_count.max(1)).max(1);
        let cipher = CacheCipher::new(key_bytes);
        let mut shards = Vec::with_capacity(shard_count);
        for shard_index in 0..shard_count {
            let path = dir.join(format!("shard-{shard_index}.jsonl"));
            let entries = Mutex::new(rehydrate(&path, per_shard_capacity, &cipher)?);
            shards.push(Shard { path, entries });
        }
        Ok(Self { shards, cipher })
    }

    fn shard_for(&self, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.shard_for(key).entries.lock().unwrap().get(key).cloned()
    }

    /// Append a record for `entry`, update the in-memory shard view, and
    /// report the entry evicted to make room, if any (a same-key overwrite
    /// does not count as an eviction).
    pub fn put(&self, entry: CacheEntry) -> Result<Option<CacheEntry>> {
        let shard = self.shard_for(&entry.key);
        let record = L2Record {
            key: entry.key.clone(),
            canonical_url: entry.canonical_url.clone(),
            username_enc: entry.username.as_deref().map(|u| self.cipher.encrypt(u)).transpose()?,
            password_enc: entry.password.as_deref().map(|p| self.cipher.encrypt(p)).transpose()?,
            source: entry.source.clone(),
            fetched_at_millis: entry.fetched_at_millis,
            last_accessed_millis: entry.last_accessed_millis,
            access_count: entry.access_count,
            ttl_millis: entry.ttl_millis,
            expires_at_millis: entry.expires_at_millis,
            health_status: health_to_str(entry.health_status).to_string(),
            consecutive_failures: entry.consecutive_failures,
        };
        append_and_fsync(&shard.path, &record)?;
        let key = entry.key.clone();
        let evicted = match shard.entries.lock().unwrap().push(key.clone(), entry) {
            Some((evicted_key, evicted)) if evicted_key != key => Some(evicted),
            _ => None,
        };
        Ok(evicted)
    }

    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.shard_for(key).entries.lock().unwrap().pop(key)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.entries.lock().unwrap().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys_snapshot(&self) -> Vec<String> {
        self.shards
            .iter()
            .flat_map(|s| s.entries.lock().unwrap().iter().map(|(k, _)| k.clone()).collect::<Vec<_>>())
            .collect()
    }
}

fn append_and_fsync(path: &Path, record: &L2Record) -> Result<()> {
    let line = serde_json::to_string(record)
        .map_err(|e| ProxyWhirlError::ValidationError { message: format!("cache record encode failed: {e}") })?;
    let mut file = OpenOptions::new().create(true).append(true).open(path).map_err(|e| {
        ProxyWhirlError::ValidationError { message: format!("cannot open {}: {e}", path.display()) }
    })?;
    writeln!(file, "{line}")
        .map_err(|e| ProxyWhirlError::ValidationError { message: format!("cache write failed: {e}") })?;
    file.sync_all()
        .map_err(|e| ProxyWhirlError::ValidationError { message: format!("cache fsync failed: {e}") })?;
    Ok(())
}

/// Replay a shard file into an LRU cache, last record per key wins. Entries
/// whose credentials fail to decrypt under the current key are dropped
/// (key rotation case): they rehydrate as cleartext-free, unusable entries.
fn rehydrate(path: &Path, capacity: usize, cipher: &CacheCipher) -> Result<LruCache<String, CacheEntry>> {
    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
    let mut cache = LruCache::new(capacity);
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return Ok(cache),
    };
    for line in BufReader::new(file).lines() {
        let line = line
            .map_err(|e| ProxyWhirlError::ValidationError { message: format!("cache read failed: {e}") })?;
        if line.trim().is_empty() {
            continue;
        }
        let record: L2Record = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(_) => continue,
        };
        let username = record.username_enc.as_deref().and_then(|v| cipher.decrypt(v));
        let password = record.password_enc.as_deref().and_then(|v| cipher.decrypt(v));
        let entry = CacheEntry {
            key: record.key.clone(),
            canonical_url: record.canonical_url,
            username,
            password,
            source: record.source,
            fetched_at_millis: record.fetched_at_millis,
            last_accessed_millis: record.last_accessed_millis,
            access_count: record.access_count,
            ttl_millis: record.ttl_millis,
            expires_at_millis: record.expires_at_millis,
            health_status: health_from_str(&record.health_status),
            consecutive_failures: record.consecutive_failures,
        };
        cache.put(record.key, entry);
    }
    Ok(cache)
}
