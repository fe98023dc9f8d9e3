//! MangaDex API client (content platform)
//!
//! Plain REST. Same shape as the AniList client: a token-bucket wait
//! before every attempt of the shared retry loop. No authentication;
//! MangaDex's public catalog endpoints are all this service needs.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

use crate::models::{CatalogEntity, Platform};
use crate::services::upstream::{send_with_retry, RetryPolicy, UpstreamError};

const PLATFORM: &str = "mangadex";
const USER_AGENT: &str = concat!("mangalink/", env!("CARGO_PKG_VERSION"));

/// MangaDex payload shapes (subset this service needs)
#[derive(Debug, Deserialize)]
struct MangaListResponse {
    data: Vec<RawManga>,
}

#[derive(Debug, Deserialize)]
struct MangaResponse {
    data: RawManga,
}

#[derive(Debug, Deserialize)]
struct RawManga {
    id: String,
    attributes: RawMangaAttributes,
}

#[derive(Debug, Deserialize)]
struct RawMangaAttributes {
    /// Localized title map, e.g. {"en": "...", "ja": "..."}
    title: HashMap<String, String>,
    /// Each element is its own one-entry locale map
    #[serde(rename = "altTitles", default)]
    alt_titles: Vec<HashMap<String, String>>,
    year: Option<i32>,
    status: Option<String>,
}

impl RawManga {
    /// Map into the canonical type: English title preferred, else the
    /// first locale present; a record with no title at all fails fast.
    fn into_entity(self) -> Result<CatalogEntity, UpstreamError> {
        let attrs = self.attributes;
        let title = attrs
            .title
            .get("en")
            .cloned()
            .or_else(|| attrs.title.values().next().cloned())
            .ok_or(UpstreamError::Parse {
                platform: PLATFORM,
                message: format!("manga {} has no title", self.id),
            })?;

        let alt_titles: Vec<String> = attrs
            .alt_titles
            .into_iter()
            .flat_map(|locale_map| locale_map.into_values())
            .collect();

        Ok(CatalogEntity {
            platform_id: self.id,
            title,
            alt_titles,
            release_year: attrs.year,
            status: attrs.status,
            source_platform: Platform::Mangadex,
        })
    }
}

/// Rate-limited, retrying MangaDex client
pub struct MangaDexClient {
    http: reqwest::Client,
    base_url: String,
    limiter: DefaultDirectRateLimiter,
    retry: RetryPolicy,
}

impl MangaDexClient {
    pub fn new(base_url: String, requests_per_second: u32, retry: RetryPolicy) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| UpstreamError::Transient {
                platform: PLATFORM,
                status: 0,
                message: format!("client init failed: {}", e),
            })?;

        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http,
            base_url,
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
            retry,
        })
    }

    /// Title search over the catalog.
    pub async fn search_manga(&self, title: &str, limit: u32) -> Result<Vec<CatalogEntity>, UpstreamError> {
        let url = format!("{}/manga", self.base_url);
        let limit = limit.to_string();
        let params = [("title", title), ("limit", limit.as_str())];

        let response = self.get(&url, &params).await?;
        let body: MangaListResponse = decode(response, || format!("search '{}'", title)).await?;

        let results: Result<Vec<_>, _> = body.data.into_iter().map(RawManga::into_entity).collect();
        let results = results?;
        tracing::debug!(title, results = results.len(), "MangaDex search complete");
        Ok(results)
    }

    /// Look up one manga by its MangaDex id.
    pub async fn get_manga(&self, manga_id: &str) -> Result<CatalogEntity, UpstreamError> {
        let url = format!("{}/manga/{}", self.base_url, manga_id);
        let response = self.get(&url, &[]).await?;
        let body: MangaResponse = decode(response, || format!("manga {}", manga_id)).await?;
        body.data.into_entity()
    }

    async fn get(&self, url: &str, params: &[(&str, &str)]) -> Result<reqwest::Response, UpstreamError> {
        let limiter = &self.limiter;
        let http = &self.http;

        send_with_retry(PLATFORM, &self.retry, move || async move {
            // Each attempt takes its own token, retries included
            limiter.until_ready().await;
            http.get(url).query(params).send().await
        })
        .await
    }
}

async fn decode<T, F>(response: reqwest::Response, resource: F) -> Result<T, UpstreamError>
where
    T: serde::de::DeserializeOwned,
    F: FnOnce() -> String,
{
    let status = response.status();

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(UpstreamError::NotFound {
            platform: PLATFORM,
            resource: resource(),
        });
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manga_maps_to_entity_with_english_preference() {
        let body = r#"{
            "id": "a96676e5-8ae2-425e-b549-7f15dd34a6d8",
            "attributes": {
                "title": { "ja": "ワンピース", "en": "One Piece" },
                "altTitles": [ { "ja-ro": "Wan Pisu" }, { "fr": "One Piece (FR)" } ],
                "year": 1997,
                "status": "ongoing"
            }
        }"#;

        let raw: RawManga = serde_json::from_str(body).unwrap();
        let entity = raw.into_entity().unwrap();
        assert_eq!(entity.title, "One Piece");
        assert_eq!(entity.alt_titles.len(), 2);
        assert_eq!(entity.release_year, Some(1997));
        assert_eq!(entity.source_platform, Platform::Mangadex);
    }

    #[test]
    fn manga_without_titles_fails_fast() {
        let body = r#"{ "id": "x", "attributes": { "title": {}, "altTitles": [], "year": null, "status": null } }"#;
        let raw: RawManga = serde_json::from_str(body).unwrap();
        assert!(matches!(raw.into_entity(), Err(UpstreamError::Parse { .. })));
    }

}
