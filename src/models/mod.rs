//! Data models

pub mod entity;
pub mod sync_job;

pub use entity::{CatalogEntity, Link, ListEntry, Platform, UserListEntry};
pub use sync_job::{JobState, SyncJob};
