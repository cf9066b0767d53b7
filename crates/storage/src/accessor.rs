//! Maps store definitions to the object store that holds their content.

use crate::backends::{
    filesystem::FilesystemBackend, hashed::HashedLayout, http::HttpBackend, memory::MemoryBackend,
};
use crate::error::{StorageError, StorageResult};
use crate::traits::ObjectStore;
use dashmap::DashMap;
use depot_core::config::StorageConfig;
use depot_core::{ArtifactStore, PathStyle, StoreKey, StoreKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Where hosted store content lives.
#[derive(Clone, Debug)]
pub enum HostedRoot {
    /// One directory per store under this root.
    Filesystem(PathBuf),
    /// One in-memory backend per store.
    Memory,
}

/// Provides a content accessor per store and caches them by key.
///
/// Hosted stores map to `<root>/<package_type>/<name>` (or their own
/// `storage_root`), laid out per their `path_style`. Remote stores map to
/// an HTTP client, groups to nothing.
pub struct StoreAccessors {
    hosted_root: HostedRoot,
    upstream_timeout: Duration,
    cache: DashMap<StoreKey, Arc<dyn ObjectStore>>,
    overrides: DashMap<StoreKey, Arc<dyn ObjectStore>>,
    /// In-memory hosted content, kept across evictions like files on disk.
    memory: DashMap<StoreKey, Arc<MemoryBackend>>,
}

impl StoreAccessors {
    pub fn new(hosted_root: HostedRoot, upstream_timeout: Duration) -> Self {
        Self {
            hosted_root,
            upstream_timeout,
            cache: DashMap::new(),
            overrides: DashMap::new(),
            memory: DashMap::new(),
        }
    }

    /// Build from the storage section of the configuration.
    pub fn from_config(config: &StorageConfig, upstream_timeout: Duration) -> StorageResult<Self> {
        config.validate().map_err(StorageError::Config)?;
        let hosted_root = match config {
            StorageConfig::Filesystem { path } => HostedRoot::Filesystem(path.clone()),
            StorageConfig::Memory => HostedRoot::Memory,
        };
        Ok(Self::new(hosted_root, upstream_timeout))
    }

    /// In-memory accessors, for tests and ephemeral use.
    pub fn in_memory() -> Self {
        Self::new(HostedRoot::Memory, Duration::from_secs(30))
    }

    /// Pin a specific backend for `key`. Survives [`StoreAccessors::evict`].
    pub fn register(&self, key: StoreKey, store: Arc<dyn ObjectStore>) {
        self.overrides.insert(key, store);
    }

    /// Drop the cached accessor for `key`, e.g. after its definition changed.
    pub fn evict(&self, key: &StoreKey) {
        self.cache.remove(key);
    }

    /// The accessor for `store`, or `None` for groups.
    pub async fn accessor(&self, store: &ArtifactStore) -> StorageResult<Option<Arc<dyn ObjectStore>>> {
        if let Some(pinned) = self.overrides.get(&store.key) {
            return Ok(Some(pinned.value().clone()));
        }
        if store.is_group() {
            return Ok(None);
        }
        if let Some(cached) = self.cache.get(&store.key) {
            return Ok(Some(cached.value().clone()));
        }

        let created = self.create(store).await?;
        // A concurrent caller may have raced us; keep whichever landed first.
        let entry = self
            .cache
            .entry(store.key.clone())
            .or_insert(created)
            .value()
            .clone();
        Ok(Some(entry))
    }

    async fn create(&self, store: &ArtifactStore) -> StorageResult<Arc<dyn ObjectStore>> {
        match &store.kind {
            StoreKind::Hosted(hosted) => {
                let backend: Arc<dyn ObjectStore> =
                    match (&self.hosted_root, &hosted.storage_root) {
                        (_, Some(own_root)) => Arc::new(FilesystemBackend::new(own_root).await?),
                        (HostedRoot::Filesystem(root), None) => {
                            let dir = root.join(store.key.package_type()).join(store.key.name());
                            Arc::new(FilesystemBackend::new(dir).await?)
                        }
                        (HostedRoot::Memory, None) => self
                            .memory
                            .entry(store.key.clone())
                            .or_insert_with(|| Arc::new(MemoryBackend::new()))
                            .clone(),
                    };
                Ok(match store.path_style {
                    PathStyle::Plain => backend,
                    PathStyle::Hashed => Arc::new(HashedLayout::new(backend)),
                })
            }
            StoreKind::Remote(remote) => {
                Ok(Arc::new(HttpBackend::new(remote, self.upstream_timeout)?))
            }
            StoreKind::Group(_) => Err(StorageError::Config(format!(
                "group {} has no backing storage",
                store.key
            ))),
        }
    }
}
