//! Persistent (L2) cache tier backed by the service database
//!
//! Rows carry their own expiry; reads can ask for fresh-only or
//! any-record (the stale-serving fallback needs expired rows). Prefix
//! deletion uses a `LIKE` scan since SQLite has no wildcard key
//! matching on a plain primary key.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::{Row, SqlitePool};
use std::time::Duration;

/// A record read back from the persistent tier
#[derive(Debug, Clone)]
pub struct PersistentRecord {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl PersistentRecord {
    pub fn is_fresh(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// SQLite-backed key-value tier
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch a record regardless of freshness. The tiered cache decides
    /// whether a stale row is servable.
    pub async fn get_any(&self, key: &str) -> Result<Option<PersistentRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT value, expires_at FROM cache_records WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let value: String = row.get("value");
                let expires_at: String = row.get("expires_at");
                let expires_at = DateTime::parse_from_rfc3339(&expires_at)
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
                    .with_timezone(&Utc);
                Ok(Some(PersistentRecord { value, expires_at }))
            }
            None => Ok(None),
        }
    }

    pub async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), sqlx::Error> {
        let expires_at = Utc::now()
            + ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(3600));

        sqlx::query(
            r#"
            INSERT INTO cache_records (key, value, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM cache_records WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Prefix-filtered delete. `_` and `%` in the prefix are escaped so a
    /// literal prefix never behaves as a pattern.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<u64, sqlx::Error> {
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let result = sqlx::query("DELETE FROM cache_records WHERE key LIKE ? ESCAPE '\\'")
            .bind(format!("{}%", escaped))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Drop rows whose TTL lapsed. Run at startup; stale-serving only needs
    /// records from the current process lifetime's fetch failures.
    pub async fn purge_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cache_records WHERE expires_at < ?")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
