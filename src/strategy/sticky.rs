//! Session-sticky: binds a session id to a proxy id until it expires or the
//! bound proxy stops being eligible.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::clock::{Clock, MonotonicClock};
use crate::error::{ProxyWhirlError, Result};
use crate::proxy::Proxy;
use crate::strategy::{eligible, SelectionContext, Strategy};

const DEFAULT_TTL: Duration = Duration::from_secs(3600);
const DEFAULT_MAX_SESSIONS: usize = 10_000;
const CLEANUP_INTERVAL_OPS: u64 = 64;

#[derive(Debug, Clone)]
struct SessionEntry {
    proxy_id: Uuid,
    created_at_millis: u64,
    last_used_millis: u64,
}

/// Mapping of session_id to bound proxy id, with TTL and LRU eviction.
#[derive(Debug)]
struct SessionTable {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    ttl: Duration,
    max_sessions: usize,
    ops_since_cleanup: AtomicU64,
}

impl SessionTable {
    fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            max_sessions,
            ops_since_cleanup: AtomicU64::new(0),
        }
    }

    fn maybe_cleanup(&self, now_millis: u64) {
        if self.ops_since_cleanup.fetch_add(1, Ordering::SeqCst) % CLEANUP_INTERVAL_OPS != 0 {
            return;
        }
        self.evict_expired(now_millis);
    }

    fn evict_expired(&self, now_millis: u64) {
        let ttl_millis = self.ttl.as_millis() as u64;
        let mut sessions = self.sessions.lock().unwrap();
        sessions.retain(|_, entry| now_millis.saturating_sub(entry.created_at_millis) < ttl_millis);
    }

    fn get(&self, session_id: &str, now_millis: u64) -> Option<Uuid> {
        self.maybe_cleanup(now_millis);
        let mut sessions = self.sessions.lock().unwrap();
        let ttl_millis = self.ttl.as_millis() as u64;
        let entry = sessions.get_mut(session_id)?;
        if now_millis.saturating_sub(entry.created_at_millis) >= ttl_millis {
            sessions.remove(session_id);
            return None;
        }
        entry.last_used_millis = now_millis;
        Some(entry.proxy_id)
    }

    fn bind(&self, session_id: String, proxy_id: Uuid, now_millis: u64) {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.len() >= self.max_sessions && !sessions.contains_key(&session_id) {
            if let Some(lru_key) = sessions
                .iter()
                .min_by_key(|(_, e)| e.last_used_millis)
                .map(|(k, _)| k.clone())
            {
                sessions.remove(&lru_key);
            }
        }
        sessions.insert(
            session_id,
            SessionEntry { proxy_id, created_at_millis: now_millis, last_used_millis: now_millis },
        );
    }

    fn close(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().remove(session_id).is_some()
    }
}

/// Session-sticky strategy: requires `context.session_id`. Falls back to a
/// configurable strategy (default round-robin) to pick and bind new sessions.
#[derive(Debug)]
pub struct SessionSticky {
    sessions: SessionTable,
    fallback: Box<dyn Strategy>,
    clock: Arc<dyn Clock>,
}

impl SessionSticky {
    pub fn new(fallback: Box<dyn Strategy>) -> Self {
        Self::with_config(fallback, DEFAULT_TTL, DEFAULT_MAX_SESSIONS, Arc::new(MonotonicClock::default()))
    }

    pub fn with_config(
        fallback: Box<dyn Strategy>,
        ttl: Duration,
        max_sessions: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { sessions: SessionTable::new(ttl, max_sessions), fallback, clock }
    }

    pub fn close_session(&self, session_id: &str) -> bool {
        self.sessions.close(session_id)
    }
}

impl Strategy for SessionSticky {
    fn select(
        &self,
        pool_snapshot: &[Proxy],
        context: &SelectionContext,
        breakers: &CircuitBreakerRegistry,
    ) -> Result<Proxy> {
        let session_id = context
            .session_id
            .as_ref()
            .ok_or_else(|| ProxyWhirlError::validation("session-sticky strategy requires session_id"))?;

        let now = self.clock.now_millis();
        let candidates = eligible(pool_snapshot, context, breakers);

        if let Some(bound_id) = self.sessions.get(session_id, now) {
            if let Some(proxy) = candidates.iter().find(|p| p.id == bound_id) {
                return Ok((*proxy).clone());
            }
        }

        let selected = self.fallback.select(pool_snapshot, context, breakers)?;
        self.sessions.bind(session_id.clone(), selected.id, now);
        Ok(selected)
    }

    fn record_outcome(&self, proxy_id: Uuid, success: bool, response_time_ms: f64) {
        self.fallback.record_outcome(proxy_id, success, response_time_ms);
    }

    fn name(&self) -> &'static str {
        "session_sticky"
    }
}
