//! AniList API client (list platform)
//!
//! GraphQL over POST. Every attempt of the shared transient-retry loop,
//! retries included, waits on a token bucket sized to AniList's
//! published budget. Authenticated calls detect an expired bearer
//! token and replay the request once after a silent credential refresh;
//! the refresh does not consume retry budget.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{CatalogEntity, ListEntry, Platform, UserListEntry};
use crate::services::upstream::{send_with_retry, CredentialProvider, RetryPolicy, UpstreamError};

const PLATFORM: &str = "anilist";
const USER_AGENT: &str = concat!("mangalink/", env!("CARGO_PKG_VERSION"));

const MEDIA_FIELDS: &str = r#"
    id
    title { english romaji native }
    synonyms
    startDate { year }
    status
    chapters
"#;

/// AniList GraphQL payload shapes (subset this service needs)
#[derive(Debug, Deserialize)]
struct GqlResponse<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ListCollectionData {
    #[serde(rename = "MediaListCollection")]
    collection: Option<ListCollection>,
}

#[derive(Debug, Deserialize)]
struct ListCollection {
    lists: Vec<ListGroup>,
}

#[derive(Debug, Deserialize)]
struct ListGroup {
    entries: Vec<RawListEntry>,
}

#[derive(Debug, Deserialize)]
struct RawListEntry {
    status: Option<String>,
    progress: Option<i64>,
    score: Option<f64>,
    media: RawMedia,
}

#[derive(Debug, Deserialize)]
struct PageData {
    #[serde(rename = "Page")]
    page: Option<PageInner>,
}

#[derive(Debug, Deserialize)]
struct PageInner {
    media: Vec<RawMedia>,
}

#[derive(Debug, Deserialize)]
struct MediaData {
    #[serde(rename = "Media")]
    media: Option<RawMedia>,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    id: i64,
    title: RawTitle,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(rename = "startDate")]
    start_date: Option<RawStartDate>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTitle {
    english: Option<String>,
    romaji: Option<String>,
    native: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStartDate {
    year: Option<i32>,
}

impl RawMedia {
    /// Map into the canonical type, failing fast on a record with no title
    /// rather than letting it reach the matching engine.
    fn into_entity(self) -> Result<CatalogEntity, UpstreamError> {
        let title = self
            .title
            .english
            .or(self.title.romaji)
            .or(self.title.native)
            .ok_or(UpstreamError::Parse {
                platform: PLATFORM,
                message: format!("media {} has no title in any language", self.id),
            })?;

        Ok(CatalogEntity {
            platform_id: self.id.to_string(),
            title,
            alt_titles: self.synonyms,
            release_year: self.start_date.and_then(|d| d.year),
            status: self.status,
            source_platform: Platform::Anilist,
        })
    }
}

/// Rate-limited, retrying AniList client
pub struct AniListClient {
    http: reqwest::Client,
    base_url: String,
    limiter: DefaultDirectRateLimiter,
    retry: RetryPolicy,
    credentials: Arc<dyn CredentialProvider>,
}

impl AniListClient {
    pub fn new(
        base_url: String,
        requests_per_minute: u32,
        retry: RetryPolicy,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| UpstreamError::Transient {
                platform: PLATFORM,
                status: 0,
                message: format!("client init failed: {}", e),
            })?;

        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http,
            base_url,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            retry,
            credentials,
        })
    }

    /// Fetch the user's full manga list with the embedded media records.
    ///
    /// Requires the user's bearer credential; a 401 triggers one silent
    /// refresh-and-replay before surfacing `AuthExpired`.
    pub async fn get_user_manga_list(&self, user_id: i64) -> Result<Vec<UserListEntry>, UpstreamError> {
        let query = format!(
            r#"query ($userId: Int) {{
                MediaListCollection(userId: $userId, type: MANGA) {{
                    lists {{ entries {{ status progress score media {{ {} }} }} }}
                }}
            }}"#,
            MEDIA_FIELDS
        );
        let variables = json!({ "userId": user_id });

        let token = self.credentials.bearer_token(user_id).await?;
        let mut response = self.post_graphql(&query, &variables, Some(&token)).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            tracing::info!(user_id, "AniList credential rejected, refreshing once");
            let token = self.credentials.refresh_credential(user_id).await?;
            response = self.post_graphql(&query, &variables, Some(&token)).await?;
            if response.status() == reqwest::StatusCode::UNAUTHORIZED {
                return Err(UpstreamError::AuthExpired(PLATFORM));
            }
        }

        let body: GqlResponse<ListCollectionData> = decode(response).await?;
        let collection = body
            .data
            .and_then(|d| d.collection)
            .ok_or(UpstreamError::NotFound {
                platform: PLATFORM,
                resource: format!("user {} manga list", user_id),
            })?;

        let mut entries = Vec::new();
        for raw in collection.lists.into_iter().flat_map(|g| g.entries) {
            let media = raw.media.into_entity()?;
            entries.push(UserListEntry {
                entry: ListEntry {
                    platform_entity_id: media.platform_id.clone(),
                    user_id,
                    progress: raw.progress.unwrap_or(0),
                    user_status: raw.status,
                    user_score: raw.score,
                },
                media,
            });
        }

        tracing::debug!(user_id, entries = entries.len(), "Fetched AniList manga list");
        Ok(entries)
    }

    /// Search the catalog. Unauthenticated.
    pub async fn search_manga(&self, search: &str, per_page: u32) -> Result<Vec<CatalogEntity>, UpstreamError> {
        let query = format!(
            r#"query ($search: String, $perPage: Int) {{
                Page(page: 1, perPage: $perPage) {{
                    media(search: $search, type: MANGA) {{ {} }}
                }}
            }}"#,
            MEDIA_FIELDS
        );
        let variables = json!({ "search": search, "perPage": per_page });

        let response = self.post_graphql(&query, &variables, None).await?;
        let body: GqlResponse<PageData> = decode(response).await?;

        body.data
            .and_then(|d| d.page)
            .map(|p| p.media)
            .unwrap_or_default()
            .into_iter()
            .map(RawMedia::into_entity)
            .collect()
    }

    /// Look up one media record by id. Unauthenticated.
    pub async fn get_manga(&self, id: i64) -> Result<CatalogEntity, UpstreamError> {
        let query = format!(
            r#"query ($id: Int) {{ Media(id: $id, type: MANGA) {{ {} }} }}"#,
            MEDIA_FIELDS
        );
        let variables = json!({ "id": id });

        let response = self.post_graphql(&query, &variables, None).await?;

        // AniList answers an unknown id with HTTP 404
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound {
                platform: PLATFORM,
                resource: format!("media {}", id),
            });
        }

        let body: GqlResponse<MediaData> = decode(response).await?;
        body.data
            .and_then(|d| d.media)
            .ok_or(UpstreamError::NotFound {
                platform: PLATFORM,
                resource: format!("media {}", id),
            })?
            .into_entity()
    }

    async fn post_graphql(
        &self,
        query: &str,
        variables: &serde_json::Value,
        token: Option<&str>,
    ) -> Result<reqwest::Response, UpstreamError> {
        let payload = json!({ "query": query, "variables": variables });
        let payload = &payload;
        let limiter = &self.limiter;
        let http = &self.http;
        let base_url = &self.base_url;

        send_with_retry(PLATFORM, &self.retry, move || async move {
            // Each attempt takes its own token, retries included
            limiter.until_ready().await;
            let mut request = http.post(base_url).json(payload);
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            request.send().await
        })
        .await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, UpstreamError> {
    let status = response.status();
    if !status.is_success() {
        return Err(UpstreamError::Transient {
            platform: PLATFORM,
            status: status.as_u16(),
            message: format!("HTTP {}", status),
        });
    }
    response.json().await.map_err(|e| UpstreamError::Parse {
        platform: PLATFORM,
        message: e.to_string(),
    })
}
