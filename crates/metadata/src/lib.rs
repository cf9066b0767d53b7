//! Store definitions for depot.
//!
//! This crate provides the control-plane data model:
//! - `StoreDataManager`, the concurrent map of store definitions
//! - Group membership expansion with cycle detection
//! - SQLite persistence of store definitions

pub mod error;
pub mod manager;
pub mod membership;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use manager::{StoreChangeListener, StoreDataManager, StoreQuery};
pub use membership::{ExpandOptions, Expansion, StoreSnapshot};
pub use repos::StoreRepo;
pub use store::SqliteStore;

use depot_core::config::MetadataConfig;
use std::sync::Arc;

/// Create the store repository described by configuration.
///
/// `Memory` means no persistence at all.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Option<Arc<dyn StoreRepo>>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            tracing::info!(path = %path.display(), "Opening SQLite store repository");
            let store = SqliteStore::new(path).await?;
            Ok(Some(Arc::new(store) as Arc<dyn StoreRepo>))
        }
        MetadataConfig::Memory => Ok(None),
    }
}
