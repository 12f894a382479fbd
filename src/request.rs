//! Request/response shapes shared by the retry executor, dispatcher, and transport.

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    /// POST/PUT/PATCH are not retried unless explicitly enabled by policy.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Method::Post | Method::Put | Method::Patch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ResponseSpec {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ResponseSpec {
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// Classification of one attempt's outcome, per the retry executor's rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    Retryable,
    AuthFailure,
    Permanent,
}

pub fn classify_status(status: u16, retryable_status_codes: &std::collections::HashSet<u16>) -> Classification {
    if (200..400).contains(&status) {
        Classification::Success
    } else if status == 407 {
        Classification::AuthFailure
    } else if retryable_status_codes.contains(&status) {
        Classification::Retryable
    } else {
        Classification::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_idempotent_methods_are_flagged() {
        assert!(!Method::Post.is_idempotent());
        assert!(!Method::Put.is_idempotent());
        assert!(!Method::Patch.is_idempotent());
        assert!(Method::Get.is_idempotent());
        assert!(Method::Delete.is_idempotent());
    }

    #[test]
    fn classifies_status_codes() {
        let retryable: std::collections::HashSet<u16> = [502, 503, 504, 429, 408].into_iter().collect();
        assert_eq!(classify_status(200, &retryable), Classification::Success);
        assert_eq!(classify_status(503, &retryable), Classification::Retryable);
        assert_eq!(classify_status(407, &retryable), Classification::AuthFailure);
        assert_eq!(classify_status(404, &retryable), Classification::Permanent);
    }
}
