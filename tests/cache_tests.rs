//! Two-tier cache integration tests
//!
//! Exercises the lookup order, invalidation, volatile-outage degradation,
//! and the stale-serving fallback against a real SQLite persistent tier.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mangalink::cache::{CacheKey, MemoryStore, SqliteStore, StoreError, TieredCache, VolatileStore};
use mangalink::services::UpstreamError;

/// Volatile store that refuses every call, standing in for a dead
/// external cache process.
struct DeadStore;

#[async_trait]
impl VolatileStore for DeadStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
    async fn put(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
    async fn delete_prefix(&self, _prefix: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

async fn memory_cache() -> TieredCache {
    let pool = mangalink::db::init_test_pool().await.expect("pool");
    TieredCache::new(Arc::new(MemoryStore::new()), pool)
}

fn key(id: &str) -> CacheKey {
    CacheKey::new("mangadex", "manga", id, &[])
}

const TTL: Duration = Duration::from_secs(60);

#[tokio::test]
async fn repeated_lookups_fetch_once() {
    let cache = memory_cache().await;
    let fetches = AtomicU32::new(0);
    let k = key("1");

    for _ in 0..5 {
        let cached = cache
            .get_or_fetch(&k, TTL, TTL, || async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok::<_, UpstreamError>("value".to_string())
            })
            .await
            .expect("fetch");
        assert_eq!(cached.value, "value");
        assert!(!cached.stale);
    }

    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalidation_forces_a_refetch() {
    let cache = memory_cache().await;
    let fetches = AtomicU32::new(0);
    let k = key("2");

    let fetch = || async {
        fetches.fetch_add(1, Ordering::SeqCst);
        Ok::<_, UpstreamError>("value".to_string())
    };

    cache.get_or_fetch(&k, TTL, TTL, fetch).await.expect("fetch");
    cache.invalidate(&k).await;
    cache.get_or_fetch(&k, TTL, TTL, fetch).await.expect("fetch");

    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn prefix_invalidation_is_selective() {
    let cache = memory_cache().await;
    let fetches = AtomicU32::new(0);

    let fetch = || async {
        fetches.fetch_add(1, Ordering::SeqCst);
        Ok::<_, UpstreamError>("value".to_string())
    };

    let manga = key("3");
    let search = CacheKey::new("mangadex", "search", "manga", &[("title", "x")]);

    cache.get_or_fetch(&manga, TTL, TTL, fetch).await.expect("fetch");
    cache.get_or_fetch(&search, TTL, TTL, fetch).await.expect("fetch");
    assert_eq!(fetches.load(Ordering::SeqCst), 2);

    cache.invalidate_prefix(&CacheKey::prefix("mangadex", "search")).await;

    // The search entry refetches, the manga entry does not
    cache.get_or_fetch(&manga, TTL, TTL, fetch).await.expect("fetch");
    cache.get_or_fetch(&search, TTL, TTL, fetch).await.expect("fetch");
    assert_eq!(fetches.load(Ordering::SeqCst), 3);
}

/// A persistent-tier hit after the volatile copy is gone still avoids the
/// upstream fetch.
#[tokio::test]
async fn persistent_hit_avoids_refetch() {
    let pool = mangalink::db::init_test_pool().await.expect("pool");
    let k = key("4");

    // Seed the persistent tier directly, as if written by an earlier process
    SqliteStore::new(pool.clone())
        .put(k.as_str(), "\"seeded\"", TTL)
        .await
        .expect("seed");

    let cache = TieredCache::new(Arc::new(MemoryStore::new()), pool);
    let cached = cache
        .get_or_fetch::<String, _, _>(&k, TTL, TTL, || async {
            panic!("upstream must not be called on a persistent hit")
        })
        .await
        .expect("lookup");

    assert_eq!(cached.value, "seeded");
    assert!(!cached.stale);
}

/// An unreachable volatile tier degrades the cache instead of failing the
/// caller; the persistent tier keeps serving.
#[tokio::test]
async fn volatile_outage_degrades_not_fails() {
    let pool = mangalink::db::init_test_pool().await.expect("pool");
    let cache = TieredCache::new(Arc::new(DeadStore), pool);
    let fetches = AtomicU32::new(0);
    let k = key("5");

    let fetch = || async {
        fetches.fetch_add(1, Ordering::SeqCst);
        Ok::<_, UpstreamError>("value".to_string())
    };

    let first = cache.get_or_fetch(&k, TTL, TTL, fetch).await.expect("fetch");
    assert_eq!(first.value, "value");

    // Second lookup is served by the persistent tier
    let second = cache.get_or_fetch(&k, TTL, TTL, fetch).await.expect("fetch");
    assert_eq!(second.value, "value");
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

/// When the upstream fetch fails and only an expired record exists, the
/// record is served flagged stale.
#[tokio::test]
async fn expired_record_served_stale_on_fetch_failure() {
    let pool = mangalink::db::init_test_pool().await.expect("pool");
    let k = key("6");

    // Already-expired record
    SqliteStore::new(pool.clone())
        .put(k.as_str(), "\"last known\"", Duration::ZERO)
        .await
        .expect("seed");

    let cache = TieredCache::new(Arc::new(MemoryStore::new()), pool);
    let cached = cache
        .get_or_fetch::<String, _, _>(&k, TTL, TTL, || async {
            Err(UpstreamError::Transient {
                platform: "mangadex",
                status: 503,
                message: "down".to_string(),
            })
        })
        .await
        .expect("stale fallback");

    assert_eq!(cached.value, "last known");
    assert!(cached.stale);
}

/// With no record at all, the fetch failure propagates.
#[tokio::test]
async fn fetch_failure_without_fallback_propagates() {
    let cache = memory_cache().await;
    let k = key("7");

    let result = cache
        .get_or_fetch::<String, _, _>(&k, TTL, TTL, || async {
            Err(UpstreamError::Transient {
                platform: "mangadex",
                status: 503,
                message: "down".to_string(),
            })
        })
        .await;

    assert!(matches!(result, Err(UpstreamError::Transient { status: 503, .. })));
}
