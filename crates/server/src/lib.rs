//! HTTP API server for the depot artifact repository.
//!
//! This crate provides:
//! - Store definition management
//! - Content retrieval through hosted, remote and group stores, and uploads
//! - Path promotion and rollback

pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use bootstrap::build_state;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
