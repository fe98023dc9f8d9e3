//! Volatile (L1) store
//!
//! The trait is the seam the tiered cache depends on: the contract is
//! get/put/delete plus native prefix-wildcard deletion, and the promise
//! that unavailability surfaces as `StoreError::Unavailable` so the
//! cache can degrade instead of failing the caller.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// Volatile store failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached. Never propagated past the cache
    /// boundary; the cache degrades to L2-only for the outage.
    #[error("volatile store unavailable: {0}")]
    Unavailable(String),
}

/// Volatile key-value store with TTLs and native prefix deletion
#[async_trait]
pub trait VolatileStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError>;
}

/// In-process volatile store. Expired records are dropped lazily on read.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl VolatileStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let expired = {
            let records = self.records.read().await;
            match records.get(key) {
                Some((value, expires_at)) => {
                    if Instant::now() < *expires_at {
                        return Ok(Some(value.clone()));
                    }
                    true
                }
                None => false,
            }
        };

        if expired {
            self.records.write().await.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = MemoryStore::new();
        store
            .put("k", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn expired_records_vanish() {
        let store = MemoryStore::new();
        store
            .put("k", "v".to_string(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn delete_prefix_is_selective() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.put("anilist:manga:1:aa", "a".into(), ttl).await.unwrap();
        store.put("anilist:manga:2:bb", "b".into(), ttl).await.unwrap();
        store.put("mangadex:manga:1:cc", "c".into(), ttl).await.unwrap();

        store.delete_prefix("anilist:manga:").await.unwrap();

        assert_eq!(store.get("anilist:manga:1:aa").await.unwrap(), None);
        assert_eq!(store.get("anilist:manga:2:bb").await.unwrap(), None);
        assert!(store.get("mangadex:manga:1:cc").await.unwrap().is_some());
    }
}
