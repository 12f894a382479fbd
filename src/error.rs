//! Error taxonomy surfaced to dispatcher callers.

use std::time::Duration;

/// A proxy URL with credentials stripped, safe to log or return to a caller.
///
/// Construction is the only place a [`crate::proxy::Proxy`] URL is ever rendered
/// to a string outside the cache encryption path; every other code path goes
/// through this type instead of formatting the proxy directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactedProxyUrl(String);

impl RedactedProxyUrl {
    pub fn new(scheme: &str, host: &str, port: u16) -> Self {
        Self(format!("{scheme}://{host}:{port}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RedactedProxyUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Crate-wide error taxonomy. Variant names and semantics match the error
/// kinds enumerated for the dispatcher's public surface: validation, pool
/// state, breaker state, transport/upstream classification, and terminal
/// retry/deadline/cancellation outcomes.
#[derive(Debug, thiserror::Error, Clone)]
pub enum ProxyWhirlError {
    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("proxy pool is empty")]
    PoolEmpty,

    #[error("no eligible proxy for this call")]
    NoEligibleProxy,

    #[error("all circuit breakers are open")]
    AllBreakersOpen,

    #[error("proxy authentication failed (proxy={proxy})")]
    AuthFailure { proxy: Option<RedactedProxyUrl> },

    #[error("connection error via {proxy:?}: {message}")]
    ConnectionError { proxy: Option<RedactedProxyUrl>, message: String },

    #[error("upstream timeout via {proxy:?}")]
    UpstreamTimeout { proxy: Option<RedactedProxyUrl> },

    #[error("upstream transient error via {proxy:?}: status {status}")]
    UpstreamTransient { proxy: Option<RedactedProxyUrl>, status: u16 },

    #[error("upstream permanent error via {proxy:?}: status {status}")]
    UpstreamPermanent { proxy: Option<RedactedProxyUrl>, status: u16 },

    #[error("call deadline exceeded after {attempts} attempt(s)")]
    DeadlineExceeded { attempts: usize },

    #[error("all {attempts} attempt(s) failed, last proxy {last_proxy:?}")]
    AllAttemptsFailed { attempts: usize, last_proxy: Option<RedactedProxyUrl> },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("call cancelled")]
    Cancelled,

    #[error("dispatcher is closed")]
    Closed,

    /// Informational only; never raised to a request caller, only published
    /// as a health signal (see [`crate::cache::stats::CacheStatistics`]).
    #[error("cache tier degraded: {tier}")]
    CacheDegraded { tier: String },
}

impl ProxyWhirlError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError { message: message.into() }
    }

    /// Non-retryable terminal kinds the retry executor must not loop on.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ValidationError { .. }
                | Self::PoolEmpty
                | Self::NoEligibleProxy
                | Self::AllBreakersOpen
                | Self::AuthFailure { .. }
                | Self::UpstreamPermanent { .. }
                | Self::DeadlineExceeded { .. }
                | Self::AllAttemptsFailed { .. }
                | Self::RateLimited { .. }
                | Self::Cancelled
                | Self::Closed
        )
    }

    /// Transport and upstream outcomes the retry executor is allowed to absorb.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError { .. } | Self::UpstreamTimeout { .. } | Self::UpstreamTransient { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ProxyWhirlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacted_url_hides_nothing_but_host_and_port() {
        let r = RedactedProxyUrl::new("http", "proxy.example", 8080);
        assert_eq!(r.as_str(), "http://proxy.example:8080");
    }

    #[test]
    fn terminal_and_retryable_are_disjoint() {
        let cases = [
            ProxyWhirlError::PoolEmpty,
            ProxyWhirlError::ConnectionError { proxy: None, message: "x".into() },
            ProxyWhirlError::UpstreamTimeout { proxy: None },
            ProxyWhirlError::UpstreamTransient { proxy: None, status: 503 },
            ProxyWhirlError::UpstreamPermanent { proxy: None, status: 404 },
            ProxyWhirlError::Cancelled,
        ];
        for e in cases {
            assert!(!(e.is_terminal() && e.is_retryable()), "{e:?}");
        }
    }

    #[test]
    fn display_never_contains_credentials() {
        let e = ProxyWhirlError::AuthFailure {
            proxy: Some(RedactedProxyUrl::new("http", "proxy.example", 8080)),
        };
        let msg = e.to_string();
        assert!(!msg.contains("user"));
        assert!(!msg.contains("pw"));
    }
}
