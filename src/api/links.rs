//! Manual link management
//!
//! A manual link is the user asserting identity between two entities;
//! it is stored at full confidence and outranks anything the
//! reconciliation job would compute.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::cache::CacheKey;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::Link;
use crate::AppState;

/// POST /links request
#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    pub user_id: i64,
    pub anilist_id: String,
    pub mangadex_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub user_id: i64,
}

/// POST /links
///
/// Both entities must actually exist upstream before the pair is stored;
/// a typo'd id surfaces as 404, not as a dangling link.
pub async fn create_link(
    State(state): State<AppState>,
    Json(request): Json<CreateLinkRequest>,
) -> ApiResult<(StatusCode, Json<Link>)> {
    if request.anilist_id.trim().is_empty() || request.mangadex_id.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "anilist_id and mangadex_id must not be empty".to_string(),
        ));
    }

    let anilist_key = CacheKey::new("anilist", "manga", &request.anilist_id, &[]);
    state
        .cache
        .get_or_fetch(&anilist_key, state.ttls.l1, state.ttls.l2, || {
            state.list_platform.get_entity(&request.anilist_id)
        })
        .await?;

    let mangadex_key = CacheKey::new("mangadex", "manga", &request.mangadex_id, &[]);
    state
        .cache
        .get_or_fetch(&mangadex_key, state.ttls.l1, state.ttls.l2, || {
            state.catalog.get_entity(&request.mangadex_id)
        })
        .await?;

    let link = db::links::insert_link(
        &state.db,
        request.user_id,
        &request.anilist_id,
        &request.mangadex_id,
        1.0,
    )
    .await?;

    tracing::info!(
        user_id = request.user_id,
        link_id = %link.link_id,
        anilist_id = %link.anilist_id,
        mangadex_id = %link.mangadex_id,
        "Manual link created"
    );

    Ok((StatusCode::CREATED, Json(link)))
}

/// DELETE /links/{link_id}?user_id=
pub async fn remove_link(
    State(state): State<AppState>,
    Path(link_id): Path<Uuid>,
    Query(owner): Query<OwnerQuery>,
) -> ApiResult<StatusCode> {
    let deleted = db::links::delete_link(&state.db, link_id, owner.user_id).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!(
            "No link {} for user {}",
            link_id, owner.user_id
        )));
    }

    tracing::info!(user_id = owner.user_id, link_id = %link_id, "Link removed");
    Ok(StatusCode::NO_CONTENT)
}

pub fn link_routes() -> Router<AppState> {
    Router::new()
        .route("/links", post(create_link))
        .route("/links/:link_id", delete(remove_link))
}
