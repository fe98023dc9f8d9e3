//! Link persistence
//!
//! A link is never silently overwritten: manual re-linking requires an
//! explicit unlink first, and the reconciliation job's insert steps
//! aside when a row already exists.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::Link;

/// Insert a new link, surfacing `Conflict` when the `(user, anilist_id)`
/// pair is already linked. Used by the manual link path.
pub async fn insert_link(
    pool: &SqlitePool,
    user_id: i64,
    anilist_id: &str,
    mangadex_id: &str,
    confidence: f64,
) -> Result<Link, ApiError> {
    let link = Link {
        link_id: Uuid::new_v4(),
        user_id,
        anilist_id: anilist_id.to_string(),
        mangadex_id: mangadex_id.to_string(),
        confidence,
        created_at: Utc::now(),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO links (link_id, user_id, anilist_id, mangadex_id, confidence, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(link.link_id.to_string())
    .bind(link.user_id)
    .bind(&link.anilist_id)
    .bind(&link.mangadex_id)
    .bind(link.confidence)
    .bind(link.created_at.to_rfc3339())
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(link),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(ApiError::Conflict(format!(
            "Entry {} is already linked for user {}; unlink it first",
            anilist_id, user_id
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Insert a link unless the pair is already linked. Returns the link when
/// created, `None` when an existing row (e.g. a racing manual link) won.
/// Used by the reconciliation job.
pub async fn insert_link_if_absent(
    pool: &SqlitePool,
    user_id: i64,
    anilist_id: &str,
    mangadex_id: &str,
    confidence: f64,
) -> Result<Option<Link>, sqlx::Error> {
    let link = Link {
        link_id: Uuid::new_v4(),
        user_id,
        anilist_id: anilist_id.to_string(),
        mangadex_id: mangadex_id.to_string(),
        confidence,
        created_at: Utc::now(),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO links (link_id, user_id, anilist_id, mangadex_id, confidence, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, anilist_id) DO NOTHING
        "#,
    )
    .bind(link.link_id.to_string())
    .bind(link.user_id)
    .bind(&link.anilist_id)
    .bind(&link.mangadex_id)
    .bind(link.confidence)
    .bind(link.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok((result.rows_affected() > 0).then_some(link))
}

/// Delete one link, scoped to its owner. Returns false when nothing matched.
pub async fn delete_link(pool: &SqlitePool, link_id: Uuid, user_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM links WHERE link_id = ? AND user_id = ?")
        .bind(link_id.to_string())
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// AniList ids already linked for a user; the reconciliation job excludes
/// these before counting its workload.
pub async fn linked_anilist_ids(pool: &SqlitePool, user_id: i64) -> Result<HashSet<String>, sqlx::Error> {
    let rows = sqlx::query("SELECT anilist_id FROM links WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|row| row.get("anilist_id")).collect())
}
