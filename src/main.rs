//! mangalink - AniList/MangaDex reconciliation service
//!
//! Resolves which MangaDex entry corresponds to each title on a user's
//! AniList reading list and keeps the resulting links queryable over a
//! small HTTP API.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mangalink::cache::{MemoryStore, TieredCache};
use mangalink::config::Config;
use mangalink::db::credentials::StoredCredentialProvider;
use mangalink::services::sync_orchestrator::CacheTtls;
use mangalink::services::{AniListClient, MangaDexClient, RetryPolicy};
use mangalink::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting mangalink");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load();
    info!("Database: {}", config.database_path.display());

    let db_pool = mangalink::db::init_database_pool(&config.database_path).await?;
    info!("Database connection established");

    // Jobs left active by a previous process will never progress
    let interrupted = mangalink::db::jobs::mark_interrupted_jobs(&db_pool).await?;
    if interrupted > 0 {
        warn!(interrupted, "Marked orphaned sync jobs as interrupted");
    }

    let cache = Arc::new(TieredCache::new(Arc::new(MemoryStore::new()), db_pool.clone()));
    cache.purge_expired().await;

    let credentials = Arc::new(StoredCredentialProvider::new(db_pool.clone()));
    let anilist = AniListClient::new(
        config.anilist.base_url.clone(),
        config.anilist.requests_per_minute,
        RetryPolicy::default(),
        credentials,
    )?;
    let mangadex = MangaDexClient::new(
        config.mangadex.base_url.clone(),
        config.mangadex.requests_per_second,
        RetryPolicy::default(),
    )?;

    let ttls = CacheTtls {
        l1: Duration::from_secs(config.cache.l1_ttl_secs),
        l2: Duration::from_secs(config.cache.l2_ttl_secs),
    };

    let state = AppState::new(db_pool, cache, Arc::new(anilist), Arc::new(mangadex), ttls);
    let app = mangalink::build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", config.port)).await?;
    info!("Listening on http://127.0.0.1:{}", config.port);
    info!("Health check: http://127.0.0.1:{}/health", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
