//! Storage backends for the sliding-window rate limiter.
//!
//! A store only needs to answer one question: given a key's window of prior
//! admits, should this call be admitted too? The in-memory implementation
//! keeps a timestamp deque per key; a shared backend (Redis, etc.) would
//! implement the same contract against a remote structure.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitResult {
    Admitted { remaining: u32 },
    Denied { oldest_in_window_millis: u64 },
}

#[derive(Debug, Clone)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rate limit store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait TokenStore: Send + Sync + fmt::Debug {
    /// Record an admit attempt for `key` at `now_millis` and decide whether
    /// it falls within `limit` admits over the trailing `window_millis`.
    async fn admit(
        &self,
        key: &str,
        now_millis: u64,
        window_millis: u64,
        limit: u32,
    ) -> Result<AdmitResult, StoreError>;
}

/// In-memory sliding-window store: one timestamp deque per key, pruned to
/// the window on every call.
#[derive(Default, Debug)]
pub struct InMemoryTokenStore {
    windows: Arc<Mutex<HashMap<String, VecDeque<u64>>>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn admit(
        &self,
        key: &str,
        now_millis: u64,
        window_millis: u64,
        limit: u32,
    ) -> Result<AdmitResult, StoreError> {
        let mut guard = self.windows.lock().unwrap();
        let deque = guard.entry(key.to_string()).or_default();

        while let Some(&oldest) = deque.front() {
            if now_millis.saturating_sub(oldest) >= window_millis {
                deque.pop_front();
            } else {
                break;
            }
        }

        if deque.len() as u32 >= limit {
            let oldest_in_window_millis = *deque.front().unwrap_or(&now_millis);
            return Ok(AdmitResult::Denied { oldest_in_window_millis });
        }

        deque.push_back(now_millis);
        Ok(AdmitResult::Admitted { remaining: limit - deque.len() as u32 })
    }
}
