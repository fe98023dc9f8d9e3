//! HTTP API handlers for mangalink

pub mod health;
pub mod links;
pub mod search;
pub mod sync;

pub use health::health_routes;
pub use links::link_routes;
pub use search::search_routes;
pub use sync::sync_routes;
