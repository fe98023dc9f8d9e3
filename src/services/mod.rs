//! Core services: normalization, matching, upstream clients, and the
//! reconciliation orchestrator.

pub mod anilist_client;
pub mod mangadex_client;
pub mod matcher;
pub mod normalizer;
pub mod platforms;
pub mod sync_orchestrator;
pub mod upstream;

pub use anilist_client::AniListClient;
pub use mangadex_client::MangaDexClient;
pub use matcher::{MatchDecision, MatchEngine, MatchOutcome, MatchStage};
pub use platforms::{CatalogPlatform, ListPlatform};
pub use sync_orchestrator::{CacheTtls, SyncOrchestrator};
pub use upstream::{CredentialProvider, RetryPolicy, UpstreamError};
