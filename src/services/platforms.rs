//! Platform seams
//!
//! The orchestrator and HTTP handlers call upstream platforms through
//! these traits, never through the concrete clients. Tests substitute
//! in-memory fakes; production wires in the real clients below.

use async_trait::async_trait;

use crate::models::{CatalogEntity, UserListEntry};
use crate::services::anilist_client::AniListClient;
use crate::services::mangadex_client::MangaDexClient;
use crate::services::upstream::UpstreamError;

/// The list platform: per-user reading lists plus its own catalog
#[async_trait]
pub trait ListPlatform: Send + Sync {
    /// The user's full manga list with embedded media records.
    async fn user_manga_list(&self, user_id: i64) -> Result<Vec<UserListEntry>, UpstreamError>;

    async fn search(&self, title: &str, limit: u32) -> Result<Vec<CatalogEntity>, UpstreamError>;

    async fn get_entity(&self, id: &str) -> Result<CatalogEntity, UpstreamError>;
}

/// The content platform: the canonical catalog links point into
#[async_trait]
pub trait CatalogPlatform: Send + Sync {
    async fn search(&self, title: &str, limit: u32) -> Result<Vec<CatalogEntity>, UpstreamError>;

    async fn get_entity(&self, id: &str) -> Result<CatalogEntity, UpstreamError>;
}

#[async_trait]
impl ListPlatform for AniListClient {
    async fn user_manga_list(&self, user_id: i64) -> Result<Vec<UserListEntry>, UpstreamError> {
        self.get_user_manga_list(user_id).await
    }

    async fn search(&self, title: &str, limit: u32) -> Result<Vec<CatalogEntity>, UpstreamError> {
        self.search_manga(title, limit).await
    }

    async fn get_entity(&self, id: &str) -> Result<CatalogEntity, UpstreamError> {
        // AniList ids are numeric; a non-numeric id cannot name anything
        let id: i64 = id.parse().map_err(|_| UpstreamError::NotFound {
            platform: "anilist",
            resource: format!("media {}", id),
        })?;
        self.get_manga(id).await
    }
}

#[async_trait]
impl CatalogPlatform for MangaDexClient {
    async fn search(&self, title: &str, limit: u32) -> Result<Vec<CatalogEntity>, UpstreamError> {
        self.search_manga(title, limit).await
    }

    async fn get_entity(&self, id: &str) -> Result<CatalogEntity, UpstreamError> {
        self.get_manga(id).await
    }
}
