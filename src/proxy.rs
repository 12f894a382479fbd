//! Proxy entity: identity, credentials, metadata, health, and rolling metrics.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::error::{ProxyWhirlError, Result};

/// Default exponential moving average smoothing factor for response time.
pub const DEFAULT_EMA_ALPHA: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl Scheme {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            "socks4" => Some(Scheme::Socks4),
            "socks5" => Some(Scheme::Socks5),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Socks4 => "socks4",
            Scheme::Socks5 => "socks5",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
            Scheme::Socks4 | Scheme::Socks5 => 1080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
    Dead,
}

impl HealthStatus {
    /// Eligible for selection: unknown/healthy/degraded proxies are tried,
    /// unhealthy/dead ones are excluded from normal rotation.
    pub fn is_healthy_enough(&self) -> bool {
        matches!(self, HealthStatus::Unknown | HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

/// Secret credential pair. `Debug`/`Display` never reveal the password, and
/// the username is shown only as a fixed redaction marker.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    pub username: String,
    password: String,
}

impl ProxyCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyCredentials").field("username", &"<redacted>").field("password", &"<redacted>").finish()
    }
}

/// Rolling health and performance metrics for a single proxy.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub consecutive_failures: u32,
    /// Consecutive failures accumulated since the proxy entered DEGRADED.
    pub consecutive_failures_since_degraded: u32,
    /// Exponential moving average of response time in ms; `None` until the first sample.
    pub ema_response_ms: Option<f64>,
    pub last_used_millis: Option<u64>,
    pub last_checked_millis: Option<u64>,
    /// Ring of the last `recent_window` outcomes (true = success), newest last.
    recent_outcomes: std::collections::VecDeque<bool>,
}

impl Metrics {
    pub fn success_rate(&self) -> f64 {
        self.successful_requests as f64 / (self.total_requests.max(1)) as f64
    }

    /// Success rate over the last `window` recorded outcomes.
    pub fn recent_success_rate(&self, window: usize) -> f64 {
        if self.recent_outcomes.is_empty() {
            return 1.0;
        }
        let take = window.min(self.recent_outcomes.len());
        let successes = self.recent_outcomes.iter().rev().take(take).filter(|s| **s).count();
        successes as f64 / take as f64
    }

    fn record(&mut self, success: bool, response_time_ms: f64, now_millis: u64, alpha: f64, recent_window: usize) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
        self.ema_response_ms = Some(match self.ema_response_ms {
            Some(prior) => alpha * response_time_ms + (1.0 - alpha) * prior,
            None => response_time_ms,
        });
        self.last_used_millis = Some(now_millis);
        self.last_checked_millis = Some(now_millis);
        self.recent_outcomes.push_back(success);
        while self.recent_outcomes.len() > recent_window {
            self.recent_outcomes.pop_front();
        }
    }
}

/// Thresholds governing health-status transitions, per spec defaults.
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    pub degrade_after_consecutive_failures: u32,
    pub degrade_recent_window: usize,
    pub degrade_success_rate_floor: f64,
    pub unhealthy_after_consecutive_failures_since_degraded: u32,
    pub dead_after_consecutive_failures: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            degrade_after_consecutive_failures: 3,
            degrade_recent_window: 20,
            degrade_success_rate_floor: 0.5,
            unhealthy_after_consecutive_failures_since_degraded: 5,
            dead_after_consecutive_failures: 20,
        }
    }
}

/// A single upstream proxy endpoint.
#[derive(Debug, Clone)]
pub struct Proxy {
    pub id: Uuid,
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub credentials: Option<ProxyCredentials>,
    pub tags: HashSet<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub cost_per_request: f64,
    pub source: Option<String>,
    pub health: HealthStatus,
    pub metrics: Metrics,
    /// Insertion sequence, used by round-robin to give `eligible` a stable order.
    pub(crate) sequence: u64,
}

impl Proxy {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ProxyWhirlError::validation("proxy host must not be empty"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            scheme,
            host,
            port,
            credentials: None,
            tags: HashSet::new(),
            country: None,
            region: None,
            cost_per_request: 0.0,
            source: None,
            health: HealthStatus::Unknown,
            metrics: Metrics::default(),
            sequence: 0,
        })
    }

    pub fn with_credentials(mut self, credentials: ProxyCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Canonical dedup key: `scheme://host:port`, lowercased.
    pub fn canonical_url(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host.to_ascii_lowercase(), self.port)
    }

    pub fn is_free(&self) -> bool {
        self.cost_per_request == 0.0
    }

    /// Apply the spec's health-status transition rules after one outcome.
    pub fn record_outcome(
        &mut self,
        success: bool,
        response_time_ms: f64,
        thresholds: &HealthThresholds,
        now_millis: u64,
    ) {
        let was_degraded = self.health == HealthStatus::Degraded;
        self.metrics.record(success, response_time_ms, now_millis, DEFAULT_EMA_ALPHA, thresholds.degrade_recent_window);

        if success {
            self.health = HealthStatus::Healthy;
            self.metrics.consecutive_failures_since_degraded = 0;
            return;
        }

        if was_degraded {
            self.metrics.consecutive_failures_since_degraded += 1;
        }

        if self.metrics.consecutive_failures >= thresholds.dead_after_consecutive_failures {
            self.health = HealthStatus::Dead;
        } else if self.metrics.consecutive_failures_since_degraded
            >= thresholds.unhealthy_after_consecutive_failures_since_degraded
        {
            self.health = HealthStatus::Unhealthy;
        } else if self.metrics.consecutive_failures >= thresholds.degrade_after_consecutive_failures
            || self.metrics.recent_success_rate(thresholds.degrade_recent_window) < thresholds.degrade_success_rate_floor
        {
            if self.health != HealthStatus::Unhealthy && self.health != HealthStatus::Dead {
                self.health = HealthStatus::Degraded;
            }
        }
    }

    /// Explicit admin mark, bypassing the usual failure-streak path.
    pub fn mark_dead(&mut self) {
        self.health = HealthStatus::Dead;
    }

    /// Clear a DEAD mark after an explicit successful probe.
    pub fn clear_dead(&mut self) {
        if self.health == HealthStatus::Dead {
            self.health = HealthStatus::Unknown;
            self.metrics.consecutive_failures = 0;
            self.metrics.consecutive_failures_since_degraded = 0;
        }
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}
