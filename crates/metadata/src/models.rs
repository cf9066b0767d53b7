//! Database row types.

use depot_core::ArtifactStore;
use sqlx::FromRow;
use time::OffsetDateTime;

/// A persisted store definition.
#[derive(Debug, Clone, FromRow)]
pub struct StoreRow {
    pub store_key: String,
    pub package_type: String,
    pub store_type: String,
    pub name: String,
    /// The full definition as JSON.
    pub definition: String,
    pub updated_at: OffsetDateTime,
}

impl StoreRow {
    pub fn from_store(store: &ArtifactStore) -> Result<Self, serde_json::Error> {
        Ok(Self {
            store_key: store.key.to_string(),
            package_type: store.key.package_type().to_string(),
            store_type: store.key.store_type().to_string(),
            name: store.key.name().to_string(),
            definition: serde_json::to_string(store)?,
            updated_at: OffsetDateTime::now_utc(),
        })
    }

    pub fn into_store(self) -> Result<ArtifactStore, serde_json::Error> {
        serde_json::from_str(&self.definition)
    }
}
