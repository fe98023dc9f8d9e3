//! Shared test fixtures: in-memory fakes for both platform seams and a
//! helper that wires them into a full application state.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

use mangalink::cache::{MemoryStore, TieredCache};
use mangalink::models::{CatalogEntity, ListEntry, Platform, UserListEntry};
use mangalink::services::sync_orchestrator::CacheTtls;
use mangalink::services::{CatalogPlatform, ListPlatform, UpstreamError};
use mangalink::AppState;

pub fn anilist_entity(id: &str, title: &str, year: Option<i32>) -> CatalogEntity {
    CatalogEntity {
        platform_id: id.to_string(),
        title: title.to_string(),
        alt_titles: vec![],
        release_year: year,
        status: None,
        source_platform: Platform::Anilist,
    }
}

pub fn mangadex_entity(id: &str, title: &str, year: Option<i32>) -> CatalogEntity {
    CatalogEntity {
        platform_id: id.to_string(),
        title: title.to_string(),
        alt_titles: vec![],
        release_year: year,
        status: None,
        source_platform: Platform::Mangadex,
    }
}

pub fn list_entry(user_id: i64, media: CatalogEntity) -> UserListEntry {
    UserListEntry {
        entry: ListEntry {
            platform_entity_id: media.platform_id.clone(),
            user_id,
            progress: 0,
            user_status: Some("CURRENT".to_string()),
            user_score: None,
        },
        media,
    }
}

/// List platform fake serving a fixed list. Like [`FakeCatalog`], each
/// list fetch can announce itself on `entered` and wait for a permit.
pub struct FakeListPlatform {
    pub entries: Vec<UserListEntry>,
    pub list_calls: AtomicU32,
    pub gate: Option<Arc<Semaphore>>,
    pub entered: Option<mpsc::UnboundedSender<()>>,
}

impl FakeListPlatform {
    pub fn new(entries: Vec<UserListEntry>) -> Self {
        Self {
            entries,
            list_calls: AtomicU32::new(0),
            gate: None,
            entered: None,
        }
    }

    pub fn gated(entries: Vec<UserListEntry>) -> (Self, Arc<Semaphore>, mpsc::UnboundedReceiver<()>) {
        let gate = Arc::new(Semaphore::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let fake = Self {
            entries,
            list_calls: AtomicU32::new(0),
            gate: Some(Arc::clone(&gate)),
            entered: Some(tx),
        };
        (fake, gate, rx)
    }
}

#[async_trait]
impl ListPlatform for FakeListPlatform {
    async fn user_manga_list(&self, _user_id: i64) -> Result<Vec<UserListEntry>, UpstreamError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(entered) = &self.entered {
            let _ = entered.send(());
        }
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.map_err(|_| UpstreamError::Transient {
                platform: "anilist",
                status: 0,
                message: "gate closed".to_string(),
            })?;
            permit.forget();
        }

        Ok(self.entries.clone())
    }

    async fn search(&self, title: &str, _limit: u32) -> Result<Vec<CatalogEntity>, UpstreamError> {
        Ok(self
            .entries
            .iter()
            .map(|e| e.media.clone())
            .filter(|m| m.title.to_lowercase().contains(&title.to_lowercase()))
            .collect())
    }

    async fn get_entity(&self, id: &str) -> Result<CatalogEntity, UpstreamError> {
        self.entries
            .iter()
            .map(|e| &e.media)
            .find(|m| m.platform_id == id)
            .cloned()
            .ok_or(UpstreamError::NotFound {
                platform: "anilist",
                resource: format!("media {}", id),
            })
    }
}

/// Catalog fake. Each search optionally announces itself on `entered` and
/// then waits for a permit, so tests can hold the orchestrator at a known
/// position.
pub struct FakeCatalog {
    pub catalog: Vec<CatalogEntity>,
    pub search_calls: AtomicU32,
    pub gate: Option<Arc<Semaphore>>,
    pub entered: Option<mpsc::UnboundedSender<()>>,
}

impl FakeCatalog {
    pub fn new(catalog: Vec<CatalogEntity>) -> Self {
        Self {
            catalog,
            search_calls: AtomicU32::new(0),
            gate: None,
            entered: None,
        }
    }

    pub fn gated(catalog: Vec<CatalogEntity>) -> (Self, Arc<Semaphore>, mpsc::UnboundedReceiver<()>) {
        let gate = Arc::new(Semaphore::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let fake = Self {
            catalog,
            search_calls: AtomicU32::new(0),
            gate: Some(Arc::clone(&gate)),
            entered: Some(tx),
        };
        (fake, gate, rx)
    }
}

#[async_trait]
impl CatalogPlatform for FakeCatalog {
    async fn search(&self, title: &str, _limit: u32) -> Result<Vec<CatalogEntity>, UpstreamError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(entered) = &self.entered {
            let _ = entered.send(());
        }
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.map_err(|_| UpstreamError::Transient {
                platform: "mangadex",
                status: 0,
                message: "gate closed".to_string(),
            })?;
            permit.forget();
        }

        Ok(self
            .catalog
            .iter()
            .filter(|m| m.title.to_lowercase().contains(&title.to_lowercase()))
            .cloned()
            .collect())
    }

    async fn get_entity(&self, id: &str) -> Result<CatalogEntity, UpstreamError> {
        self.catalog
            .iter()
            .find(|m| m.platform_id == id)
            .cloned()
            .ok_or(UpstreamError::NotFound {
                platform: "mangadex",
                resource: format!("manga {}", id),
            })
    }
}

pub fn short_ttls() -> CacheTtls {
    CacheTtls {
        l1: Duration::from_secs(60),
        l2: Duration::from_secs(60),
    }
}

/// Full application state over an in-memory database and the given fakes.
pub async fn test_state(
    list_platform: Arc<FakeListPlatform>,
    catalog: Arc<FakeCatalog>,
) -> AppState {
    let pool = mangalink::db::init_test_pool().await.expect("test pool");
    let cache = Arc::new(TieredCache::new(Arc::new(MemoryStore::new()), pool.clone()));

    AppState::new(pool, cache, list_platform, catalog, short_ttls())
}
