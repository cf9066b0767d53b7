//! The content manager: retrieval through the index and resolution chain,
//! and uploads and deletes on hosted stores.

use crate::error::{ContentError, ContentResult};
use crate::index::{ContentIndex, IndexLookup};
use crate::maven;
use crate::propagation::ChangePropagator;
use crate::resolver::{LookupOutcome, ResolutionChain, absent_or_failed};
use crate::strategy::StrategyRegistry;
use crate::transfer::Transfer;
use bytes::Bytes;
use depot_core::config::ContentConfig;
use depot_core::{ArtifactStore, EventSink, MAVEN_PKG_KEY, StoreKey};
use depot_metadata::{ExpandOptions, StoreDataManager, StoreRepo};
use depot_storage::{ObjectStore, StoreAccessors};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Normalize a request path: no leading slash, no `..` or empty segments.
/// The root directory is `/`.
pub fn normalize_path(path: &str) -> ContentResult<String> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok("/".to_string());
    }
    let body = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if body
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(ContentError::Validation(format!("invalid path: {path}")));
    }
    Ok(trimmed.to_string())
}

/// Ties store definitions, accessors, the content index and the resolution
/// chain together.
pub struct ContentManager {
    stores: Arc<StoreDataManager>,
    accessors: Arc<StoreAccessors>,
    index: Arc<ContentIndex>,
    chain: ResolutionChain,
    cache_missing: bool,
}

impl ContentManager {
    pub fn new(
        stores: Arc<StoreDataManager>,
        accessors: Arc<StoreAccessors>,
        index: Arc<ContentIndex>,
        registry: Arc<StrategyRegistry>,
        config: &ContentConfig,
    ) -> Self {
        Self {
            chain: ResolutionChain::new(accessors.clone(), registry, config.upstream_timeout()),
            stores,
            accessors,
            index,
            cache_missing: config.cache_missing,
        }
    }

    /// Load store definitions from `repo` and wire change propagation into
    /// a fresh index, using the standard strategies.
    pub async fn open(
        repo: Option<Arc<dyn StoreRepo>>,
        events: Arc<dyn EventSink>,
        accessors: Arc<StoreAccessors>,
        config: &ContentConfig,
    ) -> ContentResult<Self> {
        let registry = Arc::new(StrategyRegistry::standard());
        let index = Arc::new(if config.index_enabled {
            ContentIndex::new(registry.clone())
        } else {
            ContentIndex::disabled(registry.clone())
        });
        let propagator = Arc::new(ChangePropagator::new(index.clone(), accessors.clone()));
        let stores = StoreDataManager::load(repo, events)
            .await?
            .with_listener(propagator);
        Ok(Self::new(
            Arc::new(stores),
            accessors,
            index,
            registry,
            config,
        ))
    }

    pub fn stores(&self) -> &Arc<StoreDataManager> {
        &self.stores
    }

    pub fn index(&self) -> &Arc<ContentIndex> {
        &self.index
    }

    pub fn accessors(&self) -> &Arc<StoreAccessors> {
        &self.accessors
    }

    /// Resolve `path` through `key`.
    pub async fn retrieve(&self, key: &StoreKey, path: &str) -> ContentResult<Transfer> {
        let path = normalize_path(path)?;
        let store = self.stores.get(key)?;
        if store.disabled {
            return Err(ContentError::not_found(key, &path));
        }

        // Taken before anything is read, so that entries recorded below are
        // dropped if an invalidation lands while this resolution runs.
        let seen = self.index.generation(key);
        if !self.listed(&store, &path, seen).await? {
            tracing::trace!(store = %key, path, "Not in authoritative listing");
            return Err(ContentError::not_found(key, &path));
        }
        match self.index.lookup(key, &path) {
            IndexLookup::Missing => return Err(ContentError::not_found(key, &path)),
            IndexLookup::Hit(origin) => {
                if self.hit_keeps_precedence(&store, &origin, &path).await?
                    && let Some(transfer) = self.open_indexed(&origin, &path).await
                {
                    tracing::trace!(store = %key, origin = %origin, path, "Index hit");
                    return Ok(transfer);
                }
            }
            IndexLookup::Miss => {}
        }

        let expansion = self.stores.expand(key, ExpandOptions::enabled_only())?;
        let candidates_seen: Vec<(StoreKey, u64)> = expansion
            .stores
            .iter()
            .filter(|s| !s.is_group() && s.key != *key)
            .map(|s| (s.key.clone(), self.index.generation(&s.key)))
            .collect();
        match self.chain.resolve(key, &expansion.stores, &path).await {
            Ok(transfer) => {
                if !transfer.is_directory() {
                    self.index.record(key, &path, transfer.origin.clone(), seen);
                    if let Some((origin, origin_seen)) =
                        candidates_seen.iter().find(|(k, _)| *k == transfer.origin)
                    {
                        self.index.record(origin, &path, origin.clone(), *origin_seen);
                    }
                }
                Ok(transfer)
            }
            Err(e) => {
                if self.cache_missing && store.is_group() && matches!(e, ContentError::NotFound(_))
                {
                    self.index.record_missing(key, &path, seen);
                }
                Err(e)
            }
        }
    }

    /// Whether `path` may exist in `store`. Only hosted stores with an
    /// authoritative index can say no; their listing is loaded on first use.
    async fn listed(&self, store: &ArtifactStore, path: &str, seen: u64) -> ContentResult<bool> {
        if !store.authoritative_index
            || !self.index.is_enabled()
            || store.hosted_settings().is_none()
            || path.ends_with('/')
        {
            return Ok(true);
        }
        if let Some(listed) = self.index.listing_contains(&store.key, path) {
            return Ok(listed);
        }
        let Some(accessor) = self.accessors.accessor(store).await? else {
            return Ok(true);
        };
        let paths = accessor.list("").await?;
        let listed = paths.iter().any(|p| p == path);
        let count = paths.len();
        if self.index.set_listing(&store.key, paths, seen) {
            tracing::debug!(store = %store.key, paths = count, "Loaded authoritative listing");
        }
        Ok(listed)
    }

    /// Whether an index hit on `origin` still names the first member of
    /// `store` holding `path`.
    ///
    /// Entries are often shared by a whole directory, so for a group the
    /// members ahead of `origin` are checked for this exact path first.
    async fn hit_keeps_precedence(
        &self,
        store: &ArtifactStore,
        origin: &StoreKey,
        path: &str,
    ) -> ContentResult<bool> {
        if !store.is_group() || self.index.index_path(&store.key, path) == path {
            return Ok(true);
        }
        let expansion = self.stores.expand(&store.key, ExpandOptions::enabled_only())?;
        let concrete: Vec<_> = expansion.stores.iter().filter(|s| !s.is_group()).collect();
        let Some(position) = concrete.iter().position(|s| s.key == *origin) else {
            return Ok(false);
        };
        for earlier in &concrete[..position] {
            match self.chain.lookup().exists(earlier, path).await {
                LookupOutcome::Missing => {}
                LookupOutcome::Found(()) | LookupOutcome::Failed(_) => {
                    tracing::trace!(
                        store = %store.key,
                        origin = %origin,
                        earlier = %earlier.key,
                        path,
                        "Index hit shadowed by an earlier member"
                    );
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Open `path` directly in the store the index points at.
    async fn open_indexed(&self, origin: &StoreKey, path: &str) -> Option<Transfer> {
        let store = self.stores.try_get(origin)?;
        if store.is_group() || store.disabled {
            return None;
        }
        match self.chain.lookup().open(&store, path).await {
            LookupOutcome::Found(stream) => Some(Transfer::stream(origin.clone(), path, stream)),
            LookupOutcome::Missing | LookupOutcome::Failed(_) => None,
        }
    }

    /// Whether `path` resolves through `key`.
    pub async fn exists(&self, key: &StoreKey, path: &str) -> ContentResult<bool> {
        let path = normalize_path(path)?;
        if path.ends_with('/') {
            return match self.retrieve(key, &path).await {
                Ok(_) => Ok(true),
                Err(ContentError::NotFound(_)) => Ok(false),
                Err(e) => Err(e),
            };
        }

        let store = self.stores.get(key)?;
        if store.disabled {
            return Ok(false);
        }
        let expansion = self.stores.expand(key, ExpandOptions::enabled_only())?;
        let candidates: Vec<_> = expansion.stores.iter().filter(|s| !s.is_group()).collect();
        let mut failures = Vec::new();
        for candidate in &candidates {
            match self.chain.lookup().exists(candidate, &path).await {
                LookupOutcome::Found(()) => return Ok(true),
                LookupOutcome::Missing => {}
                LookupOutcome::Failed(e) => failures.push((candidate.key.clone(), e)),
            }
        }
        match absent_or_failed(key, &path, candidates.len(), failures) {
            ContentError::NotFound(_) => Ok(false),
            e => Err(e),
        }
    }

    /// The writable hosted store at `key` and its accessor.
    pub(crate) async fn writable(
        &self,
        key: &StoreKey,
    ) -> ContentResult<(Arc<ArtifactStore>, Arc<dyn ObjectStore>)> {
        let store = self.stores.get(key)?;
        let Some(hosted) = store.hosted_settings() else {
            return Err(ContentError::Validation(format!(
                "{key} is not a hosted store"
            )));
        };
        if hosted.readonly {
            return Err(ContentError::Validation(format!("{key} is readonly")));
        }
        if store.disabled {
            return Err(ContentError::Validation(format!("{key} is disabled")));
        }
        let accessor = self
            .accessors
            .accessor(&store)
            .await?
            .ok_or_else(|| ContentError::Validation(format!("{key} has no storage")))?;
        Ok((store, accessor))
    }

    /// Upload `data` to `path` in the hosted store `key`.
    pub async fn store(&self, key: &StoreKey, path: &str, data: Bytes) -> ContentResult<()> {
        let path = normalize_path(path)?;
        if path.ends_with('/') {
            return Err(ContentError::Validation(format!(
                "cannot store content at directory path {path}"
            )));
        }
        let (store, accessor) = self.writable(key).await?;

        if key.package_type() == MAVEN_PKG_KEY
            && let Some(hosted) = store.hosted_settings()
        {
            let snapshot = maven::is_snapshot_path(&path);
            if snapshot && !hosted.allow_snapshots {
                return Err(ContentError::Validation(format!(
                    "{key} does not accept snapshots: {path}"
                )));
            }
            if !snapshot && !hosted.allow_releases {
                return Err(ContentError::Validation(format!(
                    "{key} does not accept releases: {path}"
                )));
            }
        }

        let size = data.len();
        accessor.put(&path, data).await?;
        self.path_stored(key, &path);
        tracing::info!(store = %key, path, size, "Stored content");
        Ok(())
    }

    /// Delete `path` from the hosted store `key`. Returns `false` if absent.
    pub async fn delete(&self, key: &StoreKey, path: &str) -> ContentResult<bool> {
        let path = normalize_path(path)?;
        let (_, accessor) = self.writable(key).await?;
        if !accessor.exists(&path).await? {
            return Ok(false);
        }
        accessor.delete(&path).await?;
        self.path_removed(key, &path);
        tracing::info!(store = %key, path, "Deleted content");
        Ok(true)
    }

    /// Every path held by the concrete, enabled stores of `key`, sorted.
    pub async fn list_paths(&self, key: &StoreKey) -> ContentResult<Vec<String>> {
        let expansion = self.stores.expand(key, ExpandOptions::enabled_only())?;
        let mut paths = BTreeSet::new();
        for store in expansion.stores.iter().filter(|s| !s.is_group()) {
            if let Some(accessor) = self.accessors.accessor(store).await? {
                paths.extend(accessor.list("").await?);
            }
        }
        Ok(paths.into_iter().collect())
    }

    /// Drop index entries for `path` in `key` and every group containing it.
    pub fn invalidate_path(&self, key: &StoreKey, path: &str) {
        self.index.invalidate(key, path);
        for group in self.stores.groups_containing(key) {
            self.index.invalidate(&group, path);
        }
    }

    /// `path` was just written to the hosted store `key`.
    pub(crate) fn path_stored(&self, key: &StoreKey, path: &str) {
        self.invalidate_path(key, path);
        self.index.listing_insert(key, path);
    }

    /// `path` was just deleted from the hosted store `key`.
    pub(crate) fn path_removed(&self, key: &StoreKey, path: &str) {
        self.invalidate_path(key, path);
        self.index.listing_remove(key, path);
    }
}
