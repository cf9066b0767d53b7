pub mod mocks;

use bytes::Bytes;
use depot_content::{ContentManager, ContentResult, PromotionEngine, TransferBody};
use depot_core::config::{ContentConfig, PromotionConfig};
use depot_core::{
    ArtifactStore, BroadcastEventSink, ChangeSummary, DepotEvent, GroupPromotionCompletedEvent,
    PromotionResult, StoreKey, StoreKind,
};
use depot_metadata::StoreDataManager;
use depot_storage::{ObjectStore, StoreAccessors};
use std::sync::Arc;
use tokio::sync::broadcast;

#[allow(unused_imports)]
pub use mocks::{FailingBackend, FaultyBackend, SlowBackend};

#[allow(dead_code)]
pub fn key(s: &str) -> StoreKey {
    StoreKey::parse(s).unwrap()
}

#[allow(dead_code)]
pub fn test_change() -> ChangeSummary {
    ChangeSummary::new("tester", "integration test")
}

/// Content manager, promotion engine and event stream over in-memory stores.
#[allow(dead_code)]
pub struct Harness {
    pub events: Arc<BroadcastEventSink>,
    pub receiver: broadcast::Receiver<DepotEvent>,
    pub accessors: Arc<StoreAccessors>,
    pub content: Arc<ContentManager>,
    pub promotions: PromotionEngine,
}

#[allow(dead_code)]
impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_content_config(), PromotionConfig::default()).await
    }

    pub async fn with_config(content: ContentConfig, promotion: PromotionConfig) -> Self {
        let events = Arc::new(BroadcastEventSink::new(1024));
        let receiver = events.subscribe();
        let accessors = Arc::new(StoreAccessors::in_memory());
        let manager = ContentManager::open(None, events.clone(), accessors.clone(), &content)
            .await
            .expect("open content manager");
        let content = Arc::new(manager);
        let promotions = PromotionEngine::new(content.clone(), events.clone(), &promotion);
        Self {
            events,
            receiver,
            accessors,
            content,
            promotions,
        }
    }

    pub fn stores(&self) -> &Arc<StoreDataManager> {
        self.content.stores()
    }

    pub async fn put_store(&self, store: ArtifactStore) {
        self.stores()
            .put(store, test_change())
            .await
            .expect("put store");
    }

    pub async fn hosted(&self, k: &str) -> StoreKey {
        let key = key(k);
        self.put_store(ArtifactStore::hosted(key.clone())).await;
        key
    }

    /// A remote store whose upstream is `backend` instead of HTTP.
    pub async fn remote(&self, k: &str, backend: Arc<dyn ObjectStore>) -> StoreKey {
        self.remote_with_timeout(k, backend, None).await
    }

    pub async fn remote_with_timeout(
        &self,
        k: &str,
        backend: Arc<dyn ObjectStore>,
        timeout_secs: Option<u64>,
    ) -> StoreKey {
        let key = key(k);
        self.accessors.register(key.clone(), backend);
        let mut store = ArtifactStore::remote(key.clone(), format!("http://{}.invalid", key.name()));
        if let StoreKind::Remote(remote) = &mut store.kind {
            remote.timeout_secs = timeout_secs;
        }
        self.put_store(store).await;
        key
    }

    pub async fn group(&self, k: &str, members: &[&StoreKey]) -> StoreKey {
        let key = key(k);
        self.put_store(ArtifactStore::group(
            key.clone(),
            members.iter().map(|m| (*m).clone()),
        ))
        .await;
        key
    }

    pub async fn upload(&self, store: &StoreKey, path: &str, body: &str) {
        self.content
            .store(store, path, Bytes::from(body.to_string()))
            .await
            .expect("upload");
    }

    /// Retrieve a file, returning its origin and body.
    pub async fn read(&self, store: &StoreKey, path: &str) -> ContentResult<(StoreKey, Bytes)> {
        let transfer = self.content.retrieve(store, path).await?;
        let origin = transfer.origin.clone();
        Ok((origin, transfer.into_bytes().await?))
    }

    /// Retrieve a directory listing.
    pub async fn list(&self, store: &StoreKey, path: &str) -> ContentResult<(StoreKey, Vec<String>)> {
        let transfer = self.content.retrieve(store, path).await?;
        match transfer.body {
            TransferBody::Directory(names) => Ok((transfer.origin, names)),
            other => panic!("expected a directory listing, got {other:?}"),
        }
    }

    /// Promotion results published so far that have not been drained yet.
    pub fn drain_promotion_events(&mut self) -> Vec<PromotionResult> {
        let mut results = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            if let DepotEvent::PromotionCompleted(e) = event {
                results.push(e.result);
            }
        }
        results
    }

    /// Group promotion events published so far that have not been drained yet.
    pub fn drain_group_promotion_events(&mut self) -> Vec<GroupPromotionCompletedEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            if let DepotEvent::GroupPromotionCompleted(e) = event {
                events.push(e);
            }
        }
        events
    }
}

#[allow(dead_code)]
pub fn test_content_config() -> ContentConfig {
    ContentConfig {
        upstream_timeout_secs: 5,
        ..ContentConfig::default()
    }
}

/// True when the sandbox allows binding a local port for an HTTP mock.
#[allow(dead_code)]
pub fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}
