//! Configuration resolution for mangalink
//!
//! TOML file with environment-variable overrides. The file is optional;
//! every field has a usable default so the service starts bare.
//!
//! Resolution priority: ENV > TOML > built-in default.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listen port
    pub port: u16,
    /// SQLite database path
    pub database_path: PathBuf,
    pub anilist: AniListConfig,
    pub mangadex: MangaDexConfig,
    pub cache: CacheConfig,
}

/// AniList (list platform) client settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AniListConfig {
    pub base_url: String,
    /// Token-bucket refill budget
    pub requests_per_minute: u32,
}

/// MangaDex (content platform) client settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MangaDexConfig {
    pub base_url: String,
    pub requests_per_second: u32,
}

/// Two-tier cache TTLs, seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Volatile tier TTL; must not exceed the persistent TTL
    pub l1_ttl_secs: u64,
    /// Persistent tier TTL
    pub l2_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5760,
            database_path: PathBuf::from("mangalink.db"),
            anilist: AniListConfig::default(),
            mangadex: MangaDexConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for AniListConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graphql.anilist.co".to_string(),
            requests_per_minute: 90,
        }
    }
}

impl Default for MangaDexConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.mangadex.org".to_string(),
            requests_per_second: 5,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_ttl_secs: 300,      // 5 minutes: absorbs burst traffic only
            l2_ttl_secs: 3600,     // 1 hour
        }
    }
}

impl Config {
    /// Load configuration from `MANGALINK_CONFIG` (or `mangalink.toml` in the
    /// working directory), then apply environment overrides.
    pub fn load() -> Self {
        let path = std::env::var("MANGALINK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("mangalink.toml"));

        let mut config = Self::from_file(&path);
        config.apply_env_overrides();

        // The volatile tier exists only to absorb bursts; a longer L1 TTL
        // would serve data the persistent tier already considers expired.
        if config.cache.l1_ttl_secs > config.cache.l2_ttl_secs {
            warn!(
                l1_ttl_secs = config.cache.l1_ttl_secs,
                l2_ttl_secs = config.cache.l2_ttl_secs,
                "L1 TTL exceeds L2 TTL, clamping L1 down"
            );
            config.cache.l1_ttl_secs = config.cache.l2_ttl_secs;
        }

        config
    }

    fn from_file(path: &Path) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "No config file found, using defaults");
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!(path = %path.display(), "Configuration loaded");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Config parse failed, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Config read failed, using defaults");
                Self::default()
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("MANGALINK_PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!(value = %port, "Ignoring unparseable MANGALINK_PORT"),
            }
        }
        if let Ok(path) = std::env::var("MANGALINK_DATABASE") {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("MANGALINK_ANILIST_URL") {
            self.anilist.base_url = url;
        }
        if let Ok(url) = std::env::var("MANGALINK_MANGADEX_URL") {
            self.mangadex.base_url = url;
        }
    }
}
