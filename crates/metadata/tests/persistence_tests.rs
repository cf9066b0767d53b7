// Store definitions survive a restart and failed writes never reach the map.

use async_trait::async_trait;
use depot_core::{ArtifactStore, ChangeSummary, NoopEventSink, StoreKey};
use depot_metadata::{
    ExpandOptions, MetadataError, MetadataResult, SqliteStore, StoreDataManager, StoreRepo,
};
use std::sync::Arc;
use tempfile::TempDir;

fn key(s: &str) -> StoreKey {
    StoreKey::parse(s).unwrap()
}

fn change() -> ChangeSummary {
    ChangeSummary::new("admin", "integration test")
}

/// Repo whose writes always fail.
struct BrokenRepo;

#[async_trait]
impl StoreRepo for BrokenRepo {
    async fn load_stores(&self) -> MetadataResult<Vec<ArtifactStore>> {
        Ok(Vec::new())
    }

    async fn upsert_store(&self, _store: &ArtifactStore) -> MetadataResult<()> {
        Err(MetadataError::Internal("disk on fire".to_string()))
    }

    async fn delete_store(&self, _key: &StoreKey) -> MetadataResult<bool> {
        Err(MetadataError::Internal("disk on fire".to_string()))
    }

    async fn health_check(&self) -> MetadataResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_definitions_reload_after_restart() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("depot.db");

    {
        let repo: Arc<dyn StoreRepo> = Arc::new(SqliteStore::new(&db).await.unwrap());
        let manager = StoreDataManager::load(Some(repo), Arc::new(NoopEventSink))
            .await
            .unwrap();
        manager
            .put(ArtifactStore::hosted(key("maven:hosted:releases")), change())
            .await
            .unwrap();
        manager
            .put(
                ArtifactStore::remote(key("maven:remote:central"), "https://repo.example.org/maven2"),
                change(),
            )
            .await
            .unwrap();
        manager
            .put(
                ArtifactStore::group(
                    key("maven:group:public"),
                    [key("maven:hosted:releases"), key("maven:remote:central")],
                ),
                change(),
            )
            .await
            .unwrap();
        manager
            .put(ArtifactStore::hosted(key("maven:hosted:scratch")), change())
            .await
            .unwrap();
        manager
            .delete(&key("maven:hosted:scratch"), change())
            .await
            .unwrap();
    }

    let repo: Arc<dyn StoreRepo> = Arc::new(SqliteStore::new(&db).await.unwrap());
    let manager = StoreDataManager::load(Some(repo), Arc::new(NoopEventSink))
        .await
        .unwrap();
    assert_eq!(manager.len(), 3);
    assert!(!manager.contains(&key("maven:hosted:scratch")));

    let expansion = manager
        .expand(&key("maven:group:public"), ExpandOptions::default())
        .unwrap();
    assert_eq!(
        expansion.keys(),
        vec![key("maven:hosted:releases"), key("maven:remote:central")]
    );
    manager.health_check().await.unwrap();
}

#[tokio::test]
async fn test_failed_persistence_leaves_map_unchanged() {
    let manager = StoreDataManager::load(
        Some(Arc::new(BrokenRepo) as Arc<dyn StoreRepo>),
        Arc::new(NoopEventSink),
    )
    .await
    .unwrap();

    let result = manager
        .put(ArtifactStore::hosted(key("npm:hosted:local")), change())
        .await;
    assert!(matches!(result, Err(MetadataError::Internal(_))));
    assert!(manager.is_empty());
}

#[tokio::test]
async fn test_invalid_definition_rejected_before_persistence() {
    let temp = TempDir::new().unwrap();
    let repo = Arc::new(SqliteStore::new(temp.path().join("depot.db")).await.unwrap());
    let manager = StoreDataManager::load(
        Some(repo.clone() as Arc<dyn StoreRepo>),
        Arc::new(NoopEventSink),
    )
    .await
    .unwrap();

    let bad_url = ArtifactStore::remote(key("maven:remote:ftp"), "ftp://example.org");
    assert!(matches!(
        manager.put(bad_url, change()).await,
        Err(MetadataError::Validation(_))
    ));
    assert!(repo.load_stores().await.unwrap().is_empty());
}
