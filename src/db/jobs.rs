//! Sync job persistence
//!
//! Counters are written with a single-row upsert after every entry, so a
//! crash loses at most the entry in flight. The startup scan moves jobs
//! orphaned by a dead process to INTERRUPTED rather than resuming or
//! discarding them.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::models::{JobState, SyncJob};

/// Upsert the full job record.
///
/// Inserting a second non-terminal job for a user violates the partial
/// unique index on active jobs; callers creating jobs must treat that
/// unique violation as a conflict.
pub async fn save_job(pool: &SqlitePool, job: &SyncJob) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sync_jobs (
            job_id, user_id, state, total, processed, linked, failed,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(job_id) DO UPDATE SET
            state = excluded.state,
            total = excluded.total,
            processed = excluded.processed,
            linked = excluded.linked,
            failed = excluded.failed,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(job.job_id.to_string())
    .bind(job.user_id)
    .bind(job.state.as_str())
    .bind(job.total)
    .bind(job.processed)
    .bind(job.linked)
    .bind(job.failed)
    .bind(job.created_at.to_rfc3339())
    .bind(job.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// The user's current or most recent job, for status polling.
pub async fn latest_job(pool: &SqlitePool, user_id: i64) -> Result<Option<SyncJob>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT job_id, user_id, state, total, processed, linked, failed,
               created_at, updated_at
        FROM sync_jobs
        WHERE user_id = ?
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.map(row_to_job).transpose()
}

/// The user's non-terminal job, if any. The partial unique index on
/// active jobs guarantees at most one row matches.
pub async fn active_job(pool: &SqlitePool, user_id: i64) -> Result<Option<SyncJob>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT job_id, user_id, state, total, processed, linked, failed,
               created_at, updated_at
        FROM sync_jobs
        WHERE user_id = ? AND state IN ('PENDING', 'RUNNING')
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.map(row_to_job).transpose()
}

/// Startup scan: any job still PENDING or RUNNING has no worker behind it
/// (workers die with the process) and will never progress. Mark these
/// INTERRUPTED; they are never silently resumed.
pub async fn mark_interrupted_jobs(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE sync_jobs
        SET state = 'INTERRUPTED', updated_at = ?
        WHERE state IN ('PENDING', 'RUNNING')
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<SyncJob, sqlx::Error> {
    let job_id: String = row.get("job_id");
    let job_id = uuid::Uuid::parse_str(&job_id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    let state: String = row.get("state");
    let state = JobState::parse(&state).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown job state '{}'", state).into())
    })?;

    let created_at: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
        .with_timezone(&Utc);

    let updated_at: String = row.get("updated_at");
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
        .with_timezone(&Utc);

    Ok(SyncJob {
        job_id,
        user_id: row.get("user_id"),
        state,
        total: row.get("total"),
        processed: row.get("processed"),
        linked: row.get("linked"),
        failed: row.get("failed"),
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_pool;

    #[tokio::test]
    async fn store_rejects_a_second_active_job_per_user() {
        let pool = init_test_pool().await.unwrap();

        let mut first = SyncJob::new(7);
        save_job(&pool, &first).await.unwrap();

        let second = SyncJob::new(7);
        let err = save_job(&pool, &second).await.unwrap_err();
        assert!(matches!(&err, sqlx::Error::Database(e) if e.is_unique_violation()));

        // Progress upserts on the existing job still go through
        first.transition_to(JobState::Running).unwrap();
        first.processed = 3;
        save_job(&pool, &first).await.unwrap();

        // Once the first job is terminal a new one is allowed
        first.transition_to(JobState::Completed).unwrap();
        save_job(&pool, &first).await.unwrap();
        save_job(&pool, &second).await.unwrap();

        // Different users never contend
        save_job(&pool, &SyncJob::new(8)).await.unwrap();
    }
}
