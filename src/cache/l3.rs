//! L3: embedded SQL store for the unbounded, durable tier.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use super::encryption::CacheCipher;
use super::entry::CacheEntry;
use crate::error::{ProxyWhirlError, Result};
use crate::proxy::HealthStatus;

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

#[derive(Debug)]
pub struct L3Cache {
    pool: SqlitePool,
    cipher: CacheCipher,
}

impl L3Cache {
    pub async fn connect(database_url: &str, key_bytes: &[u8; 32]) -> Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(1).connect(database_url).await.map_err(|e| {
            ProxyWhirlError::ValidationError { message: format!("cache db connect failed: {e}") }
        })?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                canonical_url TEXT NOT NULL,
                username_enc TEXT,
                password_enc TEXT,
                source TEXT,
                fetched_at_millis INTEGER NOT NULL,
                last_accessed_millis INTEGER NOT NULL,
                access_count INTEGER NOT NULL,
                ttl_millis INTEGER NOT NULL,
                expires_at_millis INTEGER NOT NULL,
                health_status TEXT NOT NULL,
                consecutive_failures INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ProxyWhirlError::ValidationError { message: format!("cache schema init failed: {e}") })?;

        for column in ["expires_at_millis", "last_accessed_millis", "source", "health_status"] {
            let sql = format!(
                "CREATE INDEX IF NOT EXISTS idx_cache_entries_{column} ON cache_entries({column})"
            );
            sqlx::query(&sql).execute(&pool).await.map_err(|e| {
                ProxyWhirlError::ValidationError { message: format!("cache index init failed: {e}") }
            })?;
        }

        Ok(Self { pool, cipher: CacheCipher::new(key_bytes) })
    }

    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query("SELECT * FROM cache_entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ProxyWhirlError::ValidationError { message: format!("cache read failed: {e}") })?;
        Ok(row.map(|row| self.row_to_entry(&row)))
    }

    pub async fn put(&self, entry: &CacheEntry) -> Result<()> {
        let username_enc = entry.username.as_deref().map(|u| self.cipher.encrypt(u)).transpose()?;
        let password_enc = entry.password.as_deref().map(|p| self.cipher.encrypt(p)).transpose()?;
        sqlx::query(
            "INSERT INTO cache_entries
                (key, canonical_url, username_enc, password_enc, source, fetched_at_millis,
                 last_accessed_millis, access_count, ttl_millis, expires_at_millis, health_status, consecutive_failures)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(key) DO UPDATE SET
                canonical_url = excluded.canonical_url,
                username_enc = excluded.username_enc,
                password_enc = excluded.password_enc,
                source = excluded.source,
                last_accessed_millis = excluded.last_accessed_millis,
                access_count = excluded.access_count,
                ttl_millis = excluded.ttl_millis,
                expires_at_millis = excluded.expires_at_millis,
                health_status = excluded.health_status,
                consecutive_failures = excluded.consecutive_failures",
        )
        .bind(&entry.key)
        .bind(&entry.canonical_url)
        .bind(username_enc)
        .bind(password_enc)
        .bind(&entry.source)
        .bind(entry.fetched_at_millis as i64)
        .bind(entry.last_accessed_millis as i64)
        .bind(entry.access_count as i64)
        .bind(entry.ttl_millis as i64)
        .bind(entry.expires_at_millis as i64)
        .bind(health_to_str(entry.health_status))
        .bind(entry.consecutive_failures as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| ProxyWhirlError::ValidationError { message: format!("cache write failed: {e}") })?;
        Ok(())
    }

    pub async fn keys_snapshot(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM cache_entries")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ProxyWhirlError::ValidationError { message: format!("cache key scan failed: {e}") })?;
        Ok(rows.iter().map(|row| row.get("key")).collect())
    }

    pub async fn remove(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| ProxyWhirlError::ValidationError { message: format!("cache delete failed: {e}") })?;
        Ok(result.rows_affected() > 0)
    }

    fn row_to_entry(&self, row: &sqlx::sqlite::SqliteRow) -> CacheEntry {
        let username_enc: Option<String> = row.get("username_enc");
        let password_enc: Option<String> = row.get("password_enc");
        CacheEntry {
            key: row.get("key"),
            canonical_url: row.get("canonical_url"),
            username: username_enc.as_deref().and_then(|v| self.cipher.decrypt(v)),
            password: password_enc.as_deref().and_then(|v| self.cipher.decrypt(v)),
            source: row.get("source"),
            fetched_at_millis: row.get::<i64, _>("fetched_at_millis") as u64,
            last_accessed_millis: row.get::<i64, _>("last_accessed_millis") as u64,
            access_count: row.get::<i64, _>("access_count") as u64,
            ttl_millis: row.get::<i64, _>("ttl_millis") as u64,
            expires_at_millis: row.get::<i64, _>("expires_at_millis") as u64,
            health_status: health_from_str(row.get("health_status")),
            consecutive_failures: row.get::<i64, _>("consecutive_failures") as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips_and_decrypts() {
        let cache = L3Cache::connect("sqlite::memory:", &[3u8; 32]).await.unwrap();
        let mut entry = CacheEntry::new("k".into(), "http://h:1".into(), 0, 60_000);
        entry.username = Some("user".into());
        entry.password = Some("pw".into());
        cache.put(&entry).await.unwrap();

        let fetched = cache.get("k").await.unwrap().unwrap();
        assert_eq!(fetched.username.as_deref(), Some("user"));
        assert_eq!(fetched.password.as_deref(), Some("pw"));
    }

    #[tokio::test]
    async fn remove_reports_whether_a_row_existed() {
        let cache = L3Cache::connect("sqlite::memory:", &[4u8; 32]).await.unwrap();
        assert!(!cache.remove("missing").await.unwrap());
        cache.put(&CacheEntry::new("k".into(), "http://h:1".into(), 0, 60_000)).await.unwrap();
        assert!(cache.remove("k").await.unwrap());
    }
}
