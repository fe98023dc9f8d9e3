//! Reconciliation orchestrator
//!
//! Runs one background job per user that walks the unlinked entries of
//! their reading list, searches the content platform for each, and
//! persists a link for every auto-link-confident match. Progress
//! counters hit the database after every entry, so status polling and
//! crash recovery both see the true position. Cancellation is
//! cooperative and lands only at entry boundaries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, TieredCache};
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{CatalogEntity, JobState, SyncJob, UserListEntry};
use crate::services::matcher::{MatchDecision, MatchEngine};
use crate::services::platforms::{CatalogPlatform, ListPlatform};
use crate::services::upstream::UpstreamError;
use sqlx::SqlitePool;

/// Candidates requested from the content platform per entry
const CANDIDATE_LIMIT: u32 = 10;

/// Outcome of resolving one list entry
enum EntryOutcome {
    /// A link was created
    Linked,
    /// No auto-link-confident match
    Unmatched,
    /// Someone else (a manual link) linked the entry mid-run; counted as
    /// processed only
    AlreadyLinked,
}

/// Cache TTLs the orchestrator applies to its own lookups
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub l1: Duration,
    pub l2: Duration,
}

/// Per-user reconciliation job runner
pub struct SyncOrchestrator {
    pool: SqlitePool,
    cache: Arc<TieredCache>,
    list_platform: Arc<dyn ListPlatform>,
    catalog: Arc<dyn CatalogPlatform>,
    engine: MatchEngine,
    ttls: CacheTtls,
    /// Cancellation handle per user with an active job
    cancel_tokens: RwLock<HashMap<i64, CancellationToken>>,
}

impl SyncOrchestrator {
    pub fn new(
        pool: SqlitePool,
        cache: Arc<TieredCache>,
        list_platform: Arc<dyn ListPlatform>,
        catalog: Arc<dyn CatalogPlatform>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            pool,
            cache,
            list_platform,
            catalog,
            engine: MatchEngine::new(),
            ttls,
            cancel_tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Start a reconciliation job for one user.
    ///
    /// Fetches the list up front so the caller learns about upstream or
    /// credential trouble immediately, then hands the workload to a
    /// background task. One non-terminal job per user; a second start
    /// while one is active is a conflict.
    pub async fn start(self: &Arc<Self>, user_id: i64) -> ApiResult<SyncJob> {
        if let Some(active) = db::jobs::active_job(&self.pool, user_id).await? {
            return Err(ApiError::Conflict(format!(
                "Sync job {} is already {} for user {}",
                active.job_id,
                active.state.as_str(),
                user_id
            )));
        }

        let entries = self.fetch_user_list(user_id).await?;
        let linked = db::links::linked_anilist_ids(&self.pool, user_id).await?;
        let workload: Vec<UserListEntry> = entries
            .into_iter()
            .filter(|e| !linked.contains(&e.media.platform_id))
            .collect();

        let mut job = SyncJob::new(user_id);
        job.total = workload.len() as i64;

        // The check above is advisory; the store's unique index on active
        // jobs is what actually decides a race between two starts.
        if let Err(e) = db::jobs::save_job(&self.pool, &job).await {
            if matches!(&e, sqlx::Error::Database(db_err) if db_err.is_unique_violation()) {
                return Err(ApiError::Conflict(format!(
                    "A sync job is already active for user {}",
                    user_id
                )));
            }
            return Err(e.into());
        }

        let token = CancellationToken::new();
        self.cancel_tokens.write().await.insert(user_id, token.clone());

        info!(user_id, job_id = %job.job_id, total = job.total, "Sync job created");

        let orchestrator = Arc::clone(self);
        let spawned = job.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run_job(spawned, workload, token).await {
                warn!(user_id, error = %e, "Sync job worker failed");
            }
            orchestrator.cancel_tokens.write().await.remove(&user_id);
        });

        Ok(job)
    }

    /// The user's current or most recent job.
    pub async fn status(&self, user_id: i64) -> ApiResult<SyncJob> {
        db::jobs::latest_job(&self.pool, user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("No sync job for user {}", user_id)))
    }

    /// Request cancellation of the user's active job.
    ///
    /// The worker observes the request at the next entry boundary; work
    /// already persisted stays persisted. Returns the job as last saved,
    /// so the state may still read RUNNING until the worker lands.
    pub async fn cancel(&self, user_id: i64) -> ApiResult<SyncJob> {
        let job = db::jobs::active_job(&self.pool, user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("No active sync job for user {}", user_id)))?;

        if let Some(token) = self.cancel_tokens.read().await.get(&user_id) {
            token.cancel();
            info!(user_id, job_id = %job.job_id, "Cancellation requested");
        }

        Ok(job)
    }

    /// The user's manga list through the cache; serves last-known data
    /// when the list platform is down but a stale record survives.
    async fn fetch_user_list(&self, user_id: i64) -> Result<Vec<UserListEntry>, UpstreamError> {
        let key = CacheKey::new("anilist", "user_list", &user_id.to_string(), &[]);
        let cached = self
            .cache
            .get_or_fetch(&key, self.ttls.l1, self.ttls.l2, || {
                self.list_platform.user_manga_list(user_id)
            })
            .await?;

        if cached.stale {
            warn!(user_id, "Reconciling against a stale copy of the user's list");
        }
        Ok(cached.value)
    }

    async fn run_job(
        &self,
        mut job: SyncJob,
        workload: Vec<UserListEntry>,
        token: CancellationToken,
    ) -> anyhow::Result<()> {
        let user_id = job.user_id;

        if token.is_cancelled() {
            job.transition_to(JobState::Cancelled)?;
            db::jobs::save_job(&self.pool, &job).await?;
            return Ok(());
        }

        job.transition_to(JobState::Running)?;
        db::jobs::save_job(&self.pool, &job).await?;

        for entry in &workload {
            if token.is_cancelled() {
                job.transition_to(JobState::Cancelled)?;
                db::jobs::save_job(&self.pool, &job).await?;
                info!(user_id, job_id = %job.job_id, processed = job.processed, "Sync job cancelled");
                return Ok(());
            }

            match self.process_entry(user_id, entry).await {
                Ok(EntryOutcome::Linked) => job.linked += 1,
                Ok(EntryOutcome::Unmatched) => job.failed += 1,
                Ok(EntryOutcome::AlreadyLinked) => {}
                // One bad entry never aborts the batch
                Err(e) => {
                    warn!(
                        user_id,
                        title = %entry.media.title,
                        error = %e,
                        "Entry failed, continuing with the rest"
                    );
                    job.failed += 1;
                }
            }

            job.processed += 1;
            job.updated_at = chrono::Utc::now();
            db::jobs::save_job(&self.pool, &job).await?;
        }

        job.transition_to(JobState::Completed)?;
        db::jobs::save_job(&self.pool, &job).await?;

        // Links changed underneath the cached list; force a refetch next time
        let key = CacheKey::new("anilist", "user_list", &user_id.to_string(), &[]);
        self.cache.invalidate(&key).await;

        info!(
            user_id,
            job_id = %job.job_id,
            processed = job.processed,
            linked = job.linked,
            failed = job.failed,
            "Sync job completed"
        );
        Ok(())
    }

    /// Resolve one list entry.
    async fn process_entry(&self, user_id: i64, entry: &UserListEntry) -> ApiResult<EntryOutcome> {
        let candidates = self.search_catalog(&entry.media.title).await?;

        let Some((candidate, outcome)) = self.engine.best_match(&entry.media, &candidates) else {
            debug!(user_id, title = %entry.media.title, "No candidate survived matching");
            return Ok(EntryOutcome::Unmatched);
        };

        if outcome.decision != MatchDecision::AutoLink {
            debug!(
                user_id,
                title = %entry.media.title,
                confidence = outcome.confidence,
                "Best match below auto-link confidence"
            );
            return Ok(EntryOutcome::Unmatched);
        }

        let created = db::links::insert_link_if_absent(
            &self.pool,
            user_id,
            &entry.media.platform_id,
            &candidate.platform_id,
            outcome.confidence,
        )
        .await?;

        match created {
            Some(link) => {
                info!(
                    user_id,
                    link_id = %link.link_id,
                    anilist_id = %link.anilist_id,
                    mangadex_id = %link.mangadex_id,
                    confidence = link.confidence,
                    stage = ?outcome.stage,
                    "Auto-linked"
                );
                Ok(EntryOutcome::Linked)
            }
            None => {
                // A manual link landed first; theirs wins
                debug!(user_id, anilist_id = %entry.media.platform_id, "Already linked, skipping");
                Ok(EntryOutcome::AlreadyLinked)
            }
        }
    }

    async fn search_catalog(&self, title: &str) -> Result<Vec<CatalogEntity>, UpstreamError> {
        let limit = CANDIDATE_LIMIT.to_string();
        let key = CacheKey::new(
            "mangadex",
            "search",
            "manga",
            &[("title", title), ("limit", limit.as_str())],
        );

        let cached = self
            .cache
            .get_or_fetch(&key, self.ttls.l1, self.ttls.l2, || {
                self.catalog.search(title, CANDIDATE_LIMIT)
            })
            .await?;
        Ok(cached.value)
    }
}
