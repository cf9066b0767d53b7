//! Store definition repository trait.

use crate::error::MetadataResult;
use async_trait::async_trait;
use depot_core::{ArtifactStore, StoreKey};

/// Durable storage for store definitions.
#[async_trait]
pub trait StoreRepo: Send + Sync {
    /// Load every persisted definition, ordered by key.
    async fn load_stores(&self) -> MetadataResult<Vec<ArtifactStore>>;

    /// Insert or replace a definition.
    async fn upsert_store(&self, store: &ArtifactStore) -> MetadataResult<()>;

    /// Delete a definition. Returns false if it was not present.
    async fn delete_store(&self, key: &StoreKey) -> MetadataResult<bool>;

    /// Check connectivity.
    async fn health_check(&self) -> MetadataResult<()>;
}
