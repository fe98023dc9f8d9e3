//! Stored user credentials
//!
//! Bearer tokens for the list platform live in the `user_credentials`
//! table, written by whatever auth flow provisions them. The provider
//! here is the production implementation of the credential seam: a
//! refresh simply re-reads the table, picking up a token the auth flow
//! has rotated underneath us.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::services::upstream::{CredentialProvider, UpstreamError};

/// Store or replace a user's bearer token.
pub async fn upsert_token(pool: &SqlitePool, user_id: i64, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_credentials (user_id, token, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            token = excluded.token,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(token)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

async fn fetch_token(pool: &SqlitePool, user_id: i64) -> Result<String, UpstreamError> {
    let row = sqlx::query("SELECT token FROM user_credentials WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| UpstreamError::Transient {
            platform: "anilist",
            status: 0,
            message: format!("credential lookup failed: {}", e),
        })?;

    match row {
        Some(row) => Ok(row.get("token")),
        None => Err(UpstreamError::AuthExpired("anilist")),
    }
}

/// Credential provider backed by the `user_credentials` table.
pub struct StoredCredentialProvider {
    pool: SqlitePool,
}

impl StoredCredentialProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialProvider for StoredCredentialProvider {
    async fn bearer_token(&self, user_id: i64) -> Result<String, UpstreamError> {
        fetch_token(&self.pool, user_id).await
    }

    async fn refresh_credential(&self, user_id: i64) -> Result<String, UpstreamError> {
        tracing::debug!(user_id, "Re-reading stored credential after auth failure");
        fetch_token(&self.pool, user_id).await
    }
}
