//! Two-tier cache
//!
//! Shields both upstream platforms from redundant traffic. Lookup order
//! is L1 (volatile) → L2 (persistent) → `fetch_fn`; an L2 hit
//! repopulates L1, and a full miss writes the fetched value to both
//! tiers. Availability beats strict freshness twice over: an
//! unreachable L1 degrades the cache to L2-only rather than failing the
//! caller, and when the upstream itself is down an expired L2 record is
//! served flagged stale rather than propagating the failure.

pub mod key;
pub mod memory;
pub mod persistent;

pub use key::CacheKey;
pub use memory::{MemoryStore, StoreError, VolatileStore};
pub use persistent::SqliteStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::services::upstream::UpstreamError;

/// A cached value plus its freshness
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    /// True when the value came from an expired record served because the
    /// upstream fetch failed. Callers degrade gracefully (last-known data
    /// with a warning) instead of failing the whole request.
    pub stale: bool,
}

/// Volatile-then-persistent cache over any fetch operation
pub struct TieredCache {
    l1: Arc<dyn VolatileStore>,
    l2: SqliteStore,
    /// Set while the volatile tier is unreachable, so the outage is logged
    /// once rather than per call.
    degraded: AtomicBool,
}

impl TieredCache {
    pub fn new(l1: Arc<dyn VolatileStore>, pool: SqlitePool) -> Self {
        Self {
            l1,
            l2: SqliteStore::new(pool),
            degraded: AtomicBool::new(false),
        }
    }

    /// Look the key up through both tiers, calling `fetch` only on a full
    /// miss. The L1 TTL is clamped to the L2 TTL: the volatile tier exists
    /// to absorb bursts, never to outlive the persistent record.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl_l1: Duration,
        ttl_l2: Duration,
        fetch: F,
    ) -> Result<Cached<T>, UpstreamError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let ttl_l1 = ttl_l1.min(ttl_l2);

        // L1
        if let Some(raw) = self.l1_get(key).await {
            match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(key = %key, "L1 hit");
                    return Ok(Cached { value, stale: false });
                }
                Err(e) => {
                    // An unreadable record is as good as a miss
                    warn!(key = %key, error = %e, "Discarding undecodable L1 record");
                    let _ = self.l1.delete(key.as_str()).await;
                }
            }
        }

        // L2; a read failure here is treated as a miss, never surfaced
        let l2_record = match self.l2.get_any(key.as_str()).await {
            Ok(record) => record,
            Err(e) => {
                warn!(key = %key, error = %e, "Persistent tier read failed, treating as miss");
                None
            }
        };

        if let Some(record) = &l2_record {
            if record.is_fresh() {
                if let Ok(value) = serde_json::from_str(&record.value) {
                    debug!(key = %key, "L2 hit, repopulating L1");
                    self.l1_put(key, &record.value, ttl_l1).await;
                    return Ok(Cached { value, stale: false });
                }
                warn!(key = %key, "Discarding undecodable L2 record");
                let _ = self.l2.delete(key.as_str()).await;
            }
        }

        // Full miss (or only an expired record): fetch upstream
        match fetch().await {
            Ok(value) => {
                match serde_json::to_string(&value) {
                    Ok(raw) => {
                        if let Err(e) = self.l2.put(key.as_str(), &raw, ttl_l2).await {
                            warn!(key = %key, error = %e, "Persistent tier write failed");
                        }
                        self.l1_put(key, &raw, ttl_l1).await;
                    }
                    Err(e) => warn!(key = %key, error = %e, "Value not serializable, not cached"),
                }
                Ok(Cached { value, stale: false })
            }
            Err(fetch_err) => {
                // Stale-serving fallback: an expired record beats no answer
                if let Some(record) = l2_record {
                    if let Ok(value) = serde_json::from_str(&record.value) {
                        warn!(
                            key = %key,
                            error = %fetch_err,
                            expired_at = %record.expires_at,
                            "Upstream fetch failed, serving stale record"
                        );
                        return Ok(Cached { value, stale: true });
                    }
                }
                Err(fetch_err)
            }
        }
    }

    /// Remove one record from both tiers.
    pub async fn invalidate(&self, key: &CacheKey) {
        if let Err(StoreError::Unavailable(reason)) = self.l1.delete(key.as_str()).await {
            self.note_degraded(&reason);
        }
        if let Err(e) = self.l2.delete(key.as_str()).await {
            warn!(key = %key, error = %e, "Persistent tier invalidation failed");
        }
    }

    /// Remove every record under a key prefix from both tiers. Called
    /// whenever the data a record was derived from changes; staleness by
    /// TTL alone is not acceptable for linking decisions.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        if let Err(StoreError::Unavailable(reason)) = self.l1.delete_prefix(prefix).await {
            self.note_degraded(&reason);
        }
        match self.l2.delete_prefix(prefix).await {
            Ok(removed) => debug!(prefix, removed, "Persistent tier prefix invalidation"),
            Err(e) => warn!(prefix, error = %e, "Persistent tier prefix invalidation failed"),
        }
    }

    /// Startup hygiene: drop expired persistent rows.
    pub async fn purge_expired(&self) {
        match self.l2.purge_expired().await {
            Ok(removed) if removed > 0 => info!(removed, "Purged expired cache records"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Expired-record purge failed"),
        }
    }

    async fn l1_get(&self, key: &CacheKey) -> Option<String> {
        match self.l1.get(key.as_str()).await {
            Ok(hit) => {
                self.note_recovered();
                hit
            }
            Err(StoreError::Unavailable(reason)) => {
                self.note_degraded(&reason);
                None
            }
        }
    }

    async fn l1_put(&self, key: &CacheKey, raw: &str, ttl: Duration) {
        match self.l1.put(key.as_str(), raw.to_string(), ttl).await {
            Ok(()) => self.note_recovered(),
            Err(StoreError::Unavailable(reason)) => self.note_degraded(&reason),
        }
    }

    fn note_degraded(&self, reason: &str) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(reason, "Volatile cache tier unreachable, degrading to persistent tier only");
        }
    }

    fn note_recovered(&self) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            info!("Volatile cache tier reachable again");
        }
    }
}
