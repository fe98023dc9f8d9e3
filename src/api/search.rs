//! Cross-platform search
//!
//! Queries both platforms through the cache, merges the result sets, and
//! drops duplicate titles per platform. One platform being down does not
//! empty the response; its absence is logged and the other side's
//! results still come back.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

use crate::cache::CacheKey;
use crate::error::{ApiError, ApiResult};
use crate::models::CatalogEntity;
use crate::services::normalizer::normalize;
use crate::AppState;

/// Results requested from each platform
const SEARCH_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
}

/// GET /search response
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<CatalogEntity>,
    /// True when any contributing record was served past its TTL because
    /// the upstream fetch failed
    pub stale: bool,
}

/// GET /search?query=
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let query = params.query.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    let limit = SEARCH_LIMIT.to_string();

    let anilist_key = CacheKey::new(
        "anilist",
        "search",
        "manga",
        &[("search", query), ("limit", limit.as_str())],
    );
    let mangadex_key = CacheKey::new(
        "mangadex",
        "search",
        "manga",
        &[("title", query), ("limit", limit.as_str())],
    );

    let (anilist, mangadex) = tokio::join!(
        state.cache.get_or_fetch(&anilist_key, state.ttls.l1, state.ttls.l2, || {
            state.list_platform.search(query, SEARCH_LIMIT)
        }),
        state.cache.get_or_fetch(&mangadex_key, state.ttls.l1, state.ttls.l2, || {
            state.catalog.search(query, SEARCH_LIMIT)
        }),
    );

    let mut results = Vec::new();
    let mut stale = false;
    let mut failures = Vec::new();

    for side in [anilist, mangadex] {
        match side {
            Ok(cached) => {
                stale |= cached.stale;
                results.extend(cached.value);
            }
            Err(e) => {
                warn!(query, error = %e, "One platform unavailable for search");
                failures.push(e);
            }
        }
    }

    // Both sides down and nothing cached: nothing useful to return
    if results.is_empty() {
        if let Some(e) = failures.into_iter().next() {
            return Err(e.into());
        }
    }

    Ok(Json(SearchResponse {
        results: dedupe_by_title(results),
        stale,
    }))
}

/// Drop repeated titles within each platform's result set. The same work
/// appearing once per platform is kept; those pairs are exactly what a
/// manual link needs.
fn dedupe_by_title(results: Vec<CatalogEntity>) -> Vec<CatalogEntity> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|entity| seen.insert((entity.source_platform, normalize(&entity.title))))
        .collect()
}

pub fn search_routes() -> Router<AppState> {
    Router::new().route("/search", get(search))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;

    fn entity(title: &str, platform: Platform) -> CatalogEntity {
        CatalogEntity {
            platform_id: "x".to_string(),
            title: title.to_string(),
            alt_titles: vec![],
            release_year: None,
            status: None,
            source_platform: platform,
        }
    }

    #[test]
    fn dedupe_drops_repeats_within_a_platform() {
        let results = vec![
            entity("One Piece", Platform::Mangadex),
            entity("ONE PIECE", Platform::Mangadex),
            entity("Berserk", Platform::Mangadex),
        ];
        let deduped = dedupe_by_title(results);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn dedupe_keeps_one_record_per_platform() {
        let results = vec![
            entity("One Piece", Platform::Anilist),
            entity("One Piece", Platform::Mangadex),
        ];
        assert_eq!(dedupe_by_title(results).len(), 2);
    }
}
