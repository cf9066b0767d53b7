//! The store data manager: the authoritative, concurrent map of store
//! definitions.

use crate::error::{MetadataError, MetadataResult};
use crate::membership::{ExpandOptions, Expansion, StoreSnapshot};
use crate::repos::StoreRepo;
use dashmap::DashMap;
use depot_core::{
    ArtifactStore, ChangeSummary, DepotEvent, EventSink, NoopEventSink, StoreChangeType,
    StoreKey, StoreType, StoreUpdatedEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Notified synchronously, before `put`/`delete` return, whenever a store
/// definition changes.
pub trait StoreChangeListener: Send + Sync {
    /// A group's member list changed. `snapshot` already holds the new value.
    fn group_membership_changed(
        &self,
        snapshot: &StoreSnapshot,
        group: &StoreKey,
        old_members: &[StoreKey],
        new_members: &[StoreKey],
    );

    /// Any store was added or updated. `snapshot` already holds the new value.
    fn store_updated(&self, _snapshot: &StoreSnapshot, _store: &ArtifactStore) {}

    /// A store was deleted. `before` is the snapshot taken just before removal.
    fn store_deleted(&self, before: &StoreSnapshot, store: &ArtifactStore);
}

/// Filter for [`StoreDataManager::query`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreQuery {
    pub package_type: Option<String>,
    pub store_type: Option<StoreType>,
    pub enabled_only: bool,
}

impl StoreQuery {
    pub fn package_type(mut self, package_type: impl Into<String>) -> Self {
        self.package_type = Some(package_type.into());
        self
    }

    pub fn store_type(mut self, store_type: StoreType) -> Self {
        self.store_type = Some(store_type);
        self
    }

    pub fn enabled_only(mut self) -> Self {
        self.enabled_only = true;
        self
    }

    fn matches(&self, store: &ArtifactStore) -> bool {
        self.package_type
            .as_deref()
            .is_none_or(|p| store.key.package_type() == p)
            && self.store_type.is_none_or(|t| store.key.store_type() == t)
            && (!self.enabled_only || store.is_enabled())
    }
}

/// Concurrent map of store definitions with per-key write serialization,
/// optional persistence and change notification.
pub struct StoreDataManager {
    stores: DashMap<StoreKey, Arc<ArtifactStore>>,
    locks: DashMap<StoreKey, Arc<Mutex<()>>>,
    /// Serializes group writes so two concurrent membership changes cannot
    /// each pass the cycle check and together form a cycle.
    topology: Mutex<()>,
    repo: Option<Arc<dyn StoreRepo>>,
    events: Arc<dyn EventSink>,
    listeners: Vec<Arc<dyn StoreChangeListener>>,
}

impl StoreDataManager {
    /// An empty manager with no persistence.
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            stores: DashMap::new(),
            locks: DashMap::new(),
            topology: Mutex::new(()),
            repo: None,
            events,
            listeners: Vec::new(),
        }
    }

    /// An empty, unpersisted manager that discards events.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(NoopEventSink))
    }

    /// Build a manager from every definition persisted in `repo`.
    ///
    /// Definitions that fail validation are logged and skipped.
    pub async fn load(
        repo: Option<Arc<dyn StoreRepo>>,
        events: Arc<dyn EventSink>,
    ) -> MetadataResult<Self> {
        let mut manager = Self::new(events);
        if let Some(repo) = repo {
            for store in repo.load_stores().await? {
                if let Err(e) = store.validate() {
                    tracing::error!(store = %store.key, error = %e, "Ignoring invalid persisted store");
                    continue;
                }
                manager.stores.insert(store.key.clone(), Arc::new(store));
            }
            tracing::info!(stores = manager.stores.len(), "Loaded store definitions");
            manager.repo = Some(repo);
        }
        Ok(manager)
    }

    /// Register a listener. Listeners run in registration order.
    pub fn with_listener(mut self, listener: Arc<dyn StoreChangeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn get(&self, key: &StoreKey) -> MetadataResult<Arc<ArtifactStore>> {
        self.try_get(key)
            .ok_or_else(|| MetadataError::NotFound(key.to_string()))
    }

    pub fn try_get(&self, key: &StoreKey) -> Option<Arc<ArtifactStore>> {
        self.stores.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &StoreKey) -> bool {
        self.stores.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Immutable point-in-time copy of every definition.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot::new(
            self.stores
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        )
    }

    /// Stores matching `query`, sorted by key.
    pub fn query(&self, query: &StoreQuery) -> Vec<Arc<ArtifactStore>> {
        let mut stores: Vec<_> = self
            .stores
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        stores.sort_by(|a, b| a.key.cmp(&b.key));
        stores
    }

    pub fn expand(&self, key: &StoreKey, options: ExpandOptions) -> MetadataResult<Expansion> {
        self.snapshot().expand(key, options)
    }

    pub fn groups_containing(&self, key: &StoreKey) -> Vec<StoreKey> {
        self.snapshot().groups_containing(key)
    }

    fn lock_for(&self, key: &StoreKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Add or replace a store definition. Returns the previous value.
    ///
    /// Validation and persistence happen before the map is touched, so any
    /// error leaves it unchanged.
    pub async fn put(
        &self,
        store: ArtifactStore,
        change: ChangeSummary,
    ) -> MetadataResult<Option<Arc<ArtifactStore>>> {
        store.validate()?;

        let _topology = if store.is_group() {
            Some(self.topology.lock().await)
        } else {
            None
        };
        let lock = self.lock_for(&store.key);
        let _guard = lock.lock().await;

        let store = Arc::new(store);
        if let Some(members) = store.constituents() {
            let current = self.snapshot();
            if let Some(missing) = members.iter().find(|m| !current.contains(m)) {
                return Err(MetadataError::Validation(format!(
                    "group {} references unknown store {}",
                    store.key, missing
                )));
            }
            current
                .with_store(store.clone())
                .expand(&store.key, ExpandOptions::default())?;
        }

        if let Some(repo) = &self.repo {
            repo.upsert_store(&store).await?;
        }

        let previous = self.stores.insert(store.key.clone(), store.clone());

        let snapshot = self.snapshot();
        if let Some(new_members) = store.constituents() {
            let old_members = previous
                .as_ref()
                .and_then(|p| p.constituents())
                .unwrap_or_default();
            if old_members != new_members {
                tracing::debug!(
                    group = %store.key,
                    old = old_members.len(),
                    new = new_members.len(),
                    "Group membership changed"
                );
                for listener in &self.listeners {
                    listener.group_membership_changed(
                        &snapshot,
                        &store.key,
                        old_members,
                        new_members,
                    );
                }
            }
        }
        for listener in &self.listeners {
            listener.store_updated(&snapshot, &store);
        }

        let change_type = if previous.is_some() {
            StoreChangeType::Updated
        } else {
            StoreChangeType::Added
        };
        tracing::info!(store = %store.key, change_type = ?change_type, "Stored store definition");
        self.events
            .publish(DepotEvent::StoreUpdated(StoreUpdatedEvent {
                key: store.key.clone(),
                change_type,
                change,
            }));

        Ok(previous)
    }

    /// Delete a store definition. Returns `false` if it did not exist.
    ///
    /// Groups that still reference the key keep the dangling reference.
    pub async fn delete(&self, key: &StoreKey, change: ChangeSummary) -> MetadataResult<bool> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let Some(existing) = self.try_get(key) else {
            return Ok(false);
        };
        if existing.hosted_settings().is_some_and(|h| h.readonly) {
            return Err(MetadataError::Validation(format!(
                "store {key} is readonly and cannot be deleted"
            )));
        }

        if let Some(repo) = &self.repo {
            repo.delete_store(key).await?;
        }

        let before = self.snapshot();
        self.stores.remove(key);

        for listener in &self.listeners {
            listener.store_deleted(&before, &existing);
        }

        let referrers = before.groups_containing(key);
        tracing::info!(
            store = %key,
            referenced_by = referrers.len(),
            "Deleted store definition"
        );
        self.events
            .publish(DepotEvent::StoreUpdated(StoreUpdatedEvent {
                key: key.clone(),
                change_type: StoreChangeType::Deleted,
                change,
            }));

        Ok(true)
    }

    /// Check the persistence layer, if any.
    pub async fn health_check(&self) -> MetadataResult<()> {
        match &self.repo {
            Some(repo) => repo.health_check().await,
            None => Ok(()),
        }
    }
}
