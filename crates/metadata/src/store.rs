//! SQLite persistence for store definitions.

use crate::error::MetadataResult;
use crate::models::StoreRow;
use crate::repos::StoreRepo;
use async_trait::async_trait;
use depot_core::{ArtifactStore, StoreKey};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite-backed store repository.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        Self::connect(opts).await
    }

    /// A private in-memory database. Useful in tests.
    pub async fn in_memory() -> MetadataResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(opts).await
    }

    async fn connect(opts: SqliteConnectOptions) -> MetadataResult<Self> {
        let pool = SqlitePoolOptions::new()
            // One connection: SQLite serializes writers anyway, and an
            // in-memory database only exists on its own connection.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl StoreRepo for SqliteStore {
    async fn load_stores(&self) -> MetadataResult<Vec<ArtifactStore>> {
        let rows = sqlx::query_as::<_, StoreRow>("SELECT * FROM stores ORDER BY store_key")
            .fetch_all(&self.pool)
            .await?;

        let mut stores = Vec::with_capacity(rows.len());
        for row in rows {
            let key = row.store_key.clone();
            match row.into_store() {
                Ok(store) => stores.push(store),
                Err(e) => {
                    tracing::error!(store = %key, error = %e, "Skipping unreadable store definition");
                }
            }
        }
        Ok(stores)
    }

    async fn upsert_store(&self, store: &ArtifactStore) -> MetadataResult<()> {
        let row = StoreRow::from_store(store)?;
        sqlx::query(
            r#"
            INSERT INTO stores (store_key, package_type, store_type, name, definition, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(store_key) DO UPDATE SET
                definition = excluded.definition,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.store_key)
        .bind(&row.package_type)
        .bind(&row.store_type)
        .bind(&row.name)
        .bind(&row.definition)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_store(&self, key: &StoreKey) -> MetadataResult<bool> {
        let result = sqlx::query("DELETE FROM stores WHERE store_key = ?")
            .bind(key.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS stores (
    store_key TEXT PRIMARY KEY,
    package_type TEXT NOT NULL,
    store_type TEXT NOT NULL,
    name TEXT NOT NULL,
    definition TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_stores_package_type ON stores(package_type, store_type);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> StoreKey {
        StoreKey::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_load_delete() {
        let temp = tempfile::tempdir().unwrap();
        let repo = SqliteStore::new(temp.path().join("meta/depot.db"))
            .await
            .unwrap();

        let hosted = ArtifactStore::hosted(key("maven:hosted:local"));
        let group = ArtifactStore::group(key("maven:group:public"), [hosted.key.clone()]);
        repo.upsert_store(&group).await.unwrap();
        repo.upsert_store(&hosted).await.unwrap();

        let loaded = repo.load_stores().await.unwrap();
        assert_eq!(loaded, vec![group.clone(), hosted.clone()]);

        let mut updated = hosted.clone();
        updated.description = Some("local builds".to_string());
        repo.upsert_store(&updated).await.unwrap();
        let loaded = repo.load_stores().await.unwrap();
        assert_eq!(loaded[1].description.as_deref(), Some("local builds"));

        assert!(repo.delete_store(&hosted.key).await.unwrap());
        assert!(!repo.delete_store(&hosted.key).await.unwrap());
        assert_eq!(repo.load_stores().await.unwrap(), vec![group]);
    }

    #[tokio::test]
    async fn test_in_memory_health() {
        let repo = SqliteStore::in_memory().await.unwrap();
        repo.health_check().await.unwrap();
        assert!(repo.load_stores().await.unwrap().is_empty());
    }
}
