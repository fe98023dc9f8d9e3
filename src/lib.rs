//! mangalink library interface
//!
//! Exposes the service's modules for integration testing and hosts the
//! shared application state plus the router builder.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cache::TieredCache;
use crate::services::platforms::{CatalogPlatform, ListPlatform};
use crate::services::sync_orchestrator::{CacheTtls, SyncOrchestrator};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Two-tier response cache
    pub cache: Arc<TieredCache>,
    /// List platform client (AniList in production)
    pub list_platform: Arc<dyn ListPlatform>,
    /// Content platform client (MangaDex in production)
    pub catalog: Arc<dyn CatalogPlatform>,
    /// Reconciliation job runner
    pub orchestrator: Arc<SyncOrchestrator>,
    /// Cache TTLs applied by handlers
    pub ttls: CacheTtls,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        cache: Arc<TieredCache>,
        list_platform: Arc<dyn ListPlatform>,
        catalog: Arc<dyn CatalogPlatform>,
        ttls: CacheTtls,
    ) -> Self {
        let orchestrator = Arc::new(SyncOrchestrator::new(
            db.clone(),
            Arc::clone(&cache),
            Arc::clone(&list_platform),
            Arc::clone(&catalog),
            ttls,
        ));

        Self {
            db,
            cache,
            list_platform,
            catalog,
            orchestrator,
            ttls,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::search_routes())
        .merge(api::link_routes())
        .merge(api::sync_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
