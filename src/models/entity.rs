//! Canonical entity types shared by both platform integrations
//!
//! Upstream payloads are mapped into these types at the client boundary;
//! nothing downstream of the clients ever sees a raw platform response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upstream platform identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// AniList: the list platform holding per-user reading progress
    Anilist,
    /// MangaDex: the content platform holding canonical title/chapter data
    Mangadex,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Anilist => "anilist",
            Platform::Mangadex => "mangadex",
        }
    }
}

/// A title as known by one platform
///
/// Immutable once fetched for a cache epoch; a re-fetch replaces the cached
/// copy wholesale, it never mutates in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntity {
    /// Platform-native identifier
    pub platform_id: String,
    /// Primary display title
    pub title: String,
    /// Alternate titles / synonyms
    pub alt_titles: Vec<String>,
    /// First release year, if known
    pub release_year: Option<i32>,
    /// Publication status as reported by the platform
    pub status: Option<String>,
    /// Which platform this record came from
    pub source_platform: Platform,
}

/// A user's record on the list platform. Read-only input to this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEntry {
    /// List-platform entity id this entry refers to
    pub platform_entity_id: String,
    pub user_id: i64,
    /// Chapters read
    pub progress: i64,
    /// List status (CURRENT, PLANNING, COMPLETED, ...)
    pub user_status: Option<String>,
    pub user_score: Option<f64>,
}

/// A list entry paired with the media record the list platform embeds in it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListEntry {
    pub entry: ListEntry,
    pub media: CatalogEntity,
}

/// Persisted outcome of entity resolution: one AniList entity tied to one
/// MangaDex entity for one user. Unique per `(user_id, anilist_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub link_id: Uuid,
    pub user_id: i64,
    pub anilist_id: String,
    pub mangadex_id: String,
    /// Match confidence at creation time; 1.0 for manual links
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}
