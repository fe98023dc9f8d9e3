//! Cache key construction
//!
//! Bit-exact format relied on by invalidation logic:
//! `{platform}:{resource_type}:{resource_id}:{sorted_params_hash}`.
//! Parameters are sorted before hashing so key identity is independent
//! of the encoding order callers happen to use.

use sha2::{Digest, Sha256};
use std::fmt;

/// A fully-formed cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(platform: &str, resource_type: &str, resource_id: &str, params: &[(&str, &str)]) -> Self {
        let mut sorted: Vec<(&str, &str)> = params.to_vec();
        sorted.sort_unstable();

        let mut hasher = Sha256::new();
        for (k, v) in &sorted {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
            hasher.update(b"&");
        }
        let digest = hasher.finalize();
        let hash: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();

        CacheKey(format!("{}:{}:{}:{}", platform, resource_type, resource_id, hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix covering every key for one resource type on one platform,
    /// for wildcard invalidation.
    pub fn prefix(platform: &str, resource_type: &str) -> String {
        format!("{}:{}:", platform, resource_type)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
