//! HTTP execution through a selected forward proxy.

use async_trait::async_trait;
use reqwest::{Client, Proxy as ReqwestProxy};

use crate::error::{ProxyWhirlError, RedactedProxyUrl, Result};
use crate::proxy::Proxy;
use crate::request::{RequestSpec, ResponseSpec};
use crate::timeout::TimeoutPolicy;

/// Abstraction over "issue this request through this proxy", so the retry
/// executor can be driven against a fake in tests without a network.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn execute(&self, proxy: &Proxy, request: &RequestSpec) -> Result<ResponseSpec>;
}

fn redacted(proxy: &Proxy) -> RedactedProxyUrl {
    RedactedProxyUrl::new(proxy.scheme.as_str(), &proxy.host, proxy.port)
}

fn proxy_url(proxy: &Proxy) -> Result<String> {
    Ok(format!("{}://{}:{}", proxy.scheme.as_str(), proxy.host, proxy.port))
}

/// Production transport backed by `reqwest`, building a fresh client per
/// proxy (reqwest's connection pool is keyed by the underlying proxy config
/// anyway, and proxies rotate too often to make a shared client worthwhile).
#[derive(Debug, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }

    fn build_client(&self, proxy: &Proxy, timeout: std::time::Duration) -> Result<Client> {
        let url = proxy_url(proxy)?;
        let mut reqwest_proxy = ReqwestProxy::all(&url).map_err(|e| ProxyWhirlError::ConnectionError {
            proxy: Some(redacted(proxy)),
            message: e.to_string(),
        })?;
        if let Some(creds) = &proxy.credentials {
            reqwest_proxy = reqwest_proxy.basic_auth(&creds.username, creds.password());
        }
        Client::builder()
            .proxy(reqwest_proxy)
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyWhirlError::ConnectionError { proxy: Some(redacted(proxy)), message: e.to_string() })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, proxy: &Proxy, request: &RequestSpec) -> Result<ResponseSpec> {
        let client = self.build_client(proxy, request.timeout)?;
        let timeout_policy = TimeoutPolicy::new(request.timeout)
            .map_err(|_| ProxyWhirlError::ValidationError { message: "invalid request timeout".into() })?;

        let method = match request.method {
            crate::request::Method::Get => reqwest::Method::GET,
            crate::request::Method::Post => reqwest::Method::POST,
            crate::request::Method::Put => reqwest::Method::PUT,
            crate::request::Method::Patch => reqwest::Method::PATCH,
            crate::request::Method::Delete => reqwest::Method::DELETE,
            crate::request::Method::Head => reqwest::Method::HEAD,
            crate::request::Method::Options => reqwest::Method::OPTIONS,
        };

        let mut builder = client.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let proxy_for_error = proxy.clone();
        let result = timeout_policy
            .execute(move || async move { builder.send().await })
            .await;

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                if e.is_connect() {
                    return Err(ProxyWhirlError::ConnectionError {
                        proxy: Some(redacted(&proxy_for_error)),
                        message: e.to_string(),
                    });
                }
                if e.is_timeout() {
                    return Err(ProxyWhirlError::UpstreamTimeout { proxy: Some(redacted(&proxy_for_error)) });
                }
                return Err(ProxyWhirlError::ConnectionError {
                    proxy: Some(redacted(&proxy_for_error)),
                    message: e.to_string(),
                });
            }
            Err(_elapsed) => {
                return Err(ProxyWhirlError::UpstreamTimeout { proxy: Some(redacted(&proxy_for_error)) });
            }
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ProxyWhirlError::ConnectionError { proxy: Some(redacted(&proxy_for_error)), message: e.to_string() })?;

        Ok(ResponseSpec { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::Scheme;

    #[test]
    fn proxy_url_uses_canonical_scheme_host_port() {
        let proxy = Proxy::new(Scheme::Http, "proxy.example", 8080).unwrap();
        assert_eq!(proxy_url(&proxy).unwrap(), "http://proxy.example:8080");
    }
}
