//! Process configuration: environment-backed settings loaded once at startup.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ProxyWhirlError, Result};

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_ttl_cleanup_interval_secs() -> u64 {
    60
}

fn default_rate_limit_window_secs() -> u64 {
    1
}

fn default_retry_total_deadline_secs() -> u64 {
    60
}

fn default_bulkhead_max_concurrent() -> usize {
    16
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyWhirlConfig {
    /// 32-byte URL-safe key for L2/L3 credential encryption, required when
    /// either tier is enabled.
    pub cache_encryption_key: Option<String>,
    pub cache_l2_dir: Option<String>,
    pub cache_l3_database_url: Option<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_default_ttl_secs: u64,
    #[serde(default = "default_ttl_cleanup_interval_secs")]
    pub cache_ttl_cleanup_interval_secs: u64,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    #[serde(default = "default_retry_total_deadline_secs")]
    pub retry_total_deadline_secs: u64,
    #[serde(default = "default_bulkhead_max_concurrent")]
    pub bulkhead_max_concurrent: usize,
}

impl ProxyWhirlConfig {
    /// Load from process environment (optionally seeded by a `.env` file),
    /// with the `PROXYWHIRL_` prefix, e.g. `PROXYWHIRL_CACHE_DEFAULT_TTL_SECS`.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("PROXYWHIRL").try_parsing(true))
            .build()
            .map_err(|e| ProxyWhirlError::ValidationError { message: format!("config load failed: {e}") })?;
        settings
            .try_deserialize()
            .map_err(|e| ProxyWhirlError::ValidationError { message: format!("config parse failed: {e}") })
    }

    pub fn cache_default_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_default_ttl_secs)
    }

    pub fn cache_ttl_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_cleanup_interval_secs)
    }

    pub fn retry_total_deadline(&self) -> Duration {
        Duration::from_secs(self.retry_total_deadline_secs)
    }

    /// Decode `cache_encryption_key` into the 32 raw bytes AEAD needs.
    pub fn cache_encryption_key_bytes(&self) -> Result<[u8; 32]> {
        let encoded = self.cache_encryption_key.as_deref().ok_or_else(|| ProxyWhirlError::ValidationError {
            message: "cache encryption key not configured".into(),
        })?;
        let bytes = encoded.as_bytes();
        if bytes.len() != 32 {
            return Err(ProxyWhirlError::ValidationError {
                message: format!("cache encryption key must be 32 bytes, got {}", bytes.len()),
            });
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(bytes);
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_is_absent() {
        // SAFETY: test runs single-threaded within this crate's test binary.
        for var in [
            "PROXYWHIRL_CACHE_DEFAULT_TTL_SECS",
            "PROXYWHIRL_RETRY_TOTAL_DEADLINE_SECS",
            "PROXYWHIRL_BULKHEAD_MAX_CONCURRENT",
        ] {
            std::env::remove_var(var);
        }
        let config = ProxyWhirlConfig::load().unwrap();
        assert_eq!(config.cache_default_ttl_secs, 3600);
        assert_eq!(config.retry_total_deadline_secs, 60);
        assert_eq!(config.bulkhead_max_concurrent, 16);
    }

    #[test]
    fn rejects_encryption_key_of_wrong_length() {
        let config = ProxyWhirlConfig {
            cache_encryption_key: Some("too-short".into()),
            cache_l2_dir: None,
            cache_l3_database_url: None,
            cache_default_ttl_secs: 3600,
            cache_ttl_cleanup_interval_secs: 60,
            rate_limit_window_secs: 1,
            retry_total_deadline_secs: 60,
            bulkhead_max_concurrent: 16,
        };
        assert!(config.cache_encryption_key_bytes().is_err());
    }
}
