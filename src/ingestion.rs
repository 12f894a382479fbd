//! Ingestion interface consumed by external fetcher modules (out of scope:
//! the fetchers themselves, just the contract they write through).

use tracing::debug;
use uuid::Uuid;

use crate::pool::Pool;
use crate::proxy::{Proxy, ProxyCredentials, Scheme};

/// One row as handed in by a fetcher, before validation.
#[derive(Debug, Clone, Default)]
pub struct ProxyRecord {
    pub url: String,
    pub protocol: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub country: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RejectedRecord {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub accepted: Vec<Uuid>,
    pub rejected: Vec<RejectedRecord>,
}

/// Validate and dedupe `records` against `pool` by canonical URL, inserting
/// every record that parses.
pub fn ingest(pool: &Pool, records: Vec<ProxyRecord>) -> IngestReport {
    let mut report = IngestReport::default();
    for record in records {
        match parse_record(&record) {
            Ok(mut proxy) => {
                proxy.country = record.country;
                match pool.add(proxy) {
                    Ok(id) => report.accepted.push(id),
                    Err(error) => {
                        debug!(url = %record.url, %error, "ingest rejected");
                        report.rejected.push(RejectedRecord { url: record.url, reason: error.to_string() });
                    }
                }
            }
            Err(reason) => report.rejected.push(RejectedRecord { url: record.url, reason }),
        }
    }
    report
}

fn parse_record(record: &ProxyRecord) -> std::result::Result<Proxy, String> {
    let parsed = url::Url::parse(&record.url).map_err(|e| format!("invalid URL: {e}"))?;
    let scheme = match record.protocol.as_deref().or(Some(parsed.scheme())) {
        Some(raw) => Scheme::parse(raw).ok_or_else(|| format!("unsupported scheme: {raw}"))?,
        None => return Err("missing scheme".into()),
    };
    let host = parsed.host_str().ok_or_else(|| "missing host".to_string())?.to_string();
    let port = parsed.port_or_known_default().unwrap_or(scheme.default_port());

    let mut proxy = Proxy::new(scheme, host, port).map_err(|e| e.to_string())?;
    proxy.source = record.source.clone();

    let username = record.username.clone().or_else(|| {
        let u = parsed.username();
        (!u.is_empty()).then(|| u.to_string())
    });
    let password = record.password.clone().or_else(|| parsed.password().map(str::to_string));
    if let Some(username) = username {
        proxy.credentials = Some(ProxyCredentials::new(username, password.unwrap_or_default()));
    }

    Ok(proxy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_records_and_rejects_malformed_urls() {
        let pool = Pool::new("ingest-test");
        let report = ingest(
            &pool,
            vec![
                ProxyRecord { url: "http://proxy.example:8080".into(), ..Default::default() },
                ProxyRecord { url: "not a url".into(), ..Default::default() },
            ],
        );
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn dedupes_against_existing_pool_by_canonical_url() {
        let pool = Pool::new("ingest-test");
        ingest(&pool, vec![ProxyRecord { url: "http://proxy.example:8080".into(), ..Default::default() }]);
        let report =
            ingest(&pool, vec![ProxyRecord { url: "http://proxy.example:8080".into(), ..Default::default() }]);
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn extracts_credentials_embedded_in_url() {
        let pool = Pool::new("ingest-test");
        let report =
            ingest(&pool, vec![ProxyRecord { url: "http://user:pw@proxy.example:8080".into(), ..Default::default() }]);
        let id = report.accepted[0];
        let proxy = pool.get_by_id(id).unwrap();
        assert_eq!(proxy.credentials.unwrap().username, "user");
    }
}
