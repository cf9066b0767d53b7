//! The content resolution chain.
//!
//! Stores are consulted sequentially in declaration order, so the result
//! never depends on which upstream answers first.

use crate::error::{ContentError, ContentResult};
use crate::strategy::StrategyRegistry;
use crate::transfer::Transfer;
use bytes::Bytes;
use depot_core::{ArtifactStore, StoreKey};
use depot_storage::{ByteStream, ObjectStore, StorageResult, StoreAccessors};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of asking one store for one path.
#[derive(Debug)]
pub enum LookupOutcome<T> {
    Found(T),
    Missing,
    Failed(String),
}

/// Results of asking several stores for the same path.
#[derive(Debug, Default)]
pub struct Gathered {
    /// Holders of the path, in precedence order.
    pub found: Vec<(StoreKey, Bytes)>,
    pub failures: Vec<(StoreKey, String)>,
}

/// Time-bounded access to individual stores' content.
pub struct StoreLookup {
    accessors: Arc<StoreAccessors>,
    default_timeout: Duration,
}

impl StoreLookup {
    pub fn new(accessors: Arc<StoreAccessors>, default_timeout: Duration) -> Self {
        Self {
            accessors,
            default_timeout,
        }
    }

    /// The remote's own budget, else the global upstream timeout.
    pub fn timeout_for(&self, store: &ArtifactStore) -> Duration {
        store
            .remote_settings()
            .and_then(|r| r.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
    }

    async fn bounded<T, F>(&self, store: &ArtifactStore, op: F) -> LookupOutcome<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        let budget = self.timeout_for(store);
        match tokio::time::timeout(budget, op).await {
            Ok(Ok(value)) => LookupOutcome::Found(value),
            Ok(Err(e)) if e.is_not_found() => LookupOutcome::Missing,
            Ok(Err(e)) => {
                tracing::warn!(store = %store.key, error = %e, "Store lookup failed");
                LookupOutcome::Failed(e.to_string())
            }
            Err(_) => {
                tracing::warn!(store = %store.key, timeout_ms = budget.as_millis() as u64, "Store lookup timed out");
                LookupOutcome::Failed(format!("timed out after {}ms", budget.as_millis()))
            }
        }
    }

    async fn accessor(&self, store: &ArtifactStore) -> LookupOutcome<Arc<dyn ObjectStore>> {
        match self.accessors.accessor(store).await {
            Ok(Some(accessor)) => LookupOutcome::Found(accessor),
            Ok(None) => LookupOutcome::Missing,
            Err(e) => {
                tracing::warn!(store = %store.key, error = %e, "Cannot open store");
                LookupOutcome::Failed(e.to_string())
            }
        }
    }

    /// Read `path` from `store` into memory.
    pub async fn fetch(&self, store: &ArtifactStore, path: &str) -> LookupOutcome<Bytes> {
        match self.accessor(store).await {
            LookupOutcome::Found(a) => self.bounded(store, a.get(path)).await,
            LookupOutcome::Missing => LookupOutcome::Missing,
            LookupOutcome::Failed(e) => LookupOutcome::Failed(e),
        }
    }

    /// Open `path` in `store` for streaming. Only opening is time-bounded.
    pub async fn open(&self, store: &ArtifactStore, path: &str) -> LookupOutcome<ByteStream> {
        match self.accessor(store).await {
            LookupOutcome::Found(a) => self.bounded(store, a.get_stream(path)).await,
            LookupOutcome::Missing => LookupOutcome::Missing,
            LookupOutcome::Failed(e) => LookupOutcome::Failed(e),
        }
    }

    pub async fn exists(&self, store: &ArtifactStore, path: &str) -> LookupOutcome<()> {
        let accessor = match self.accessor(store).await {
            LookupOutcome::Found(a) => a,
            LookupOutcome::Missing => return LookupOutcome::Missing,
            LookupOutcome::Failed(e) => return LookupOutcome::Failed(e),
        };
        match self.bounded(store, accessor.exists(path)).await {
            LookupOutcome::Found(true) => LookupOutcome::Found(()),
            LookupOutcome::Found(false) | LookupOutcome::Missing => LookupOutcome::Missing,
            LookupOutcome::Failed(e) => LookupOutcome::Failed(e),
        }
    }

    /// Names directly under the directory `path` (which ends with `/`).
    pub async fn list_dir(&self, store: &ArtifactStore, path: &str) -> LookupOutcome<Vec<String>> {
        let accessor = match self.accessor(store).await {
            LookupOutcome::Found(a) => a,
            LookupOutcome::Missing => return LookupOutcome::Missing,
            LookupOutcome::Failed(e) => return LookupOutcome::Failed(e),
        };
        let prefix = if path == "/" { "" } else { path };
        match self.bounded(store, accessor.list(prefix)).await {
            LookupOutcome::Found(keys) if keys.is_empty() => LookupOutcome::Missing,
            LookupOutcome::Found(keys) => LookupOutcome::Found(child_names(path, &keys)),
            other => other,
        }
    }

    /// Read `path` from every store, in order, keeping holders and failures.
    pub async fn fetch_all(&self, stores: &[Arc<ArtifactStore>], path: &str) -> Gathered {
        let mut gathered = Gathered::default();
        for store in stores {
            match self.fetch(store, path).await {
                LookupOutcome::Found(data) => gathered.found.push((store.key.clone(), data)),
                LookupOutcome::Missing => {}
                LookupOutcome::Failed(e) => gathered.failures.push((store.key.clone(), e)),
            }
        }
        gathered
    }
}

fn child_names(dir: &str, keys: &[String]) -> Vec<String> {
    let prefix = if dir == "/" { "" } else { dir };
    let names: BTreeSet<String> = keys
        .iter()
        .filter_map(|k| k.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty())
        .map(|rest| match rest.find('/') {
            Some(pos) => rest[..=pos].to_string(),
            None => rest.to_string(),
        })
        .collect();
    names.into_iter().collect()
}

/// `NotFound`, unless every one of `candidates` failed with an error.
pub fn absent_or_failed(
    requested: &StoreKey,
    path: &str,
    candidates: usize,
    failures: Vec<(StoreKey, String)>,
) -> ContentError {
    if candidates > 0 && failures.len() == candidates {
        ContentError::AllUpstreamsFailed {
            path: path.to_string(),
            failures,
        }
    } else {
        ContentError::not_found(requested, path)
    }
}

/// Resolves a path over an expanded store list using the package type's
/// strategies, falling back to first-found.
pub struct ResolutionChain {
    lookup: StoreLookup,
    registry: Arc<StrategyRegistry>,
}

impl ResolutionChain {
    pub fn new(
        accessors: Arc<StoreAccessors>,
        registry: Arc<StrategyRegistry>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            lookup: StoreLookup::new(accessors, default_timeout),
            registry,
        }
    }

    pub fn lookup(&self) -> &StoreLookup {
        &self.lookup
    }

    /// Resolve `path` for `requested` over `stores` (its expansion).
    ///
    /// Disabled stores and groups in `stores` are skipped.
    pub async fn resolve(
        &self,
        requested: &StoreKey,
        stores: &[Arc<ArtifactStore>],
        path: &str,
    ) -> ContentResult<Transfer> {
        let candidates: Vec<Arc<ArtifactStore>> = stores
            .iter()
            .filter(|s| s.is_enabled() && !s.is_group())
            .cloned()
            .collect();

        if path.ends_with('/') {
            return self.list_directory(requested, &candidates, path).await;
        }

        if let Some(retriever) = self.registry.retriever_for(requested.package_type(), path) {
            tracing::trace!(store = %requested, path, retriever = retriever.name(), "Using retriever");
            return retriever
                .handle(&self.lookup, requested, &candidates, path)
                .await;
        }

        self.first_found(requested, &candidates, path).await
    }

    async fn first_found(
        &self,
        requested: &StoreKey,
        candidates: &[Arc<ArtifactStore>],
        path: &str,
    ) -> ContentResult<Transfer> {
        let mut failures = Vec::new();
        for store in candidates {
            match self.lookup.open(store, path).await {
                LookupOutcome::Found(stream) => {
                    tracing::debug!(store = %requested, origin = %store.key, path, "Resolved");
                    return Ok(Transfer::stream(store.key.clone(), path, stream));
                }
                LookupOutcome::Missing => {}
                LookupOutcome::Failed(e) => failures.push((store.key.clone(), e)),
            }
        }
        Err(absent_or_failed(requested, path, candidates.len(), failures))
    }

    /// Union of the directory's children across every candidate.
    async fn list_directory(
        &self,
        requested: &StoreKey,
        candidates: &[Arc<ArtifactStore>],
        path: &str,
    ) -> ContentResult<Transfer> {
        let mut children = BTreeSet::new();
        let mut holders = Vec::new();
        let mut failures = Vec::new();
        for store in candidates {
            match self.lookup.list_dir(store, path).await {
                LookupOutcome::Found(names) => {
                    holders.push(store.key.clone());
                    children.extend(names);
                }
                LookupOutcome::Missing => {}
                LookupOutcome::Failed(e) => failures.push((store.key.clone(), e)),
            }
        }
        let origin = match holders.as_slice() {
            [] => return Err(absent_or_failed(requested, path, candidates.len(), failures)),
            [only] => only.clone(),
            _ => requested.clone(),
        };
        Ok(Transfer::directory(origin, path, children.into_iter().collect()))
    }
}
