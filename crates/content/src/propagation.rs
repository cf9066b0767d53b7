//! Keeps the content index and cached accessors in step with store
//! definition changes.

use crate::index::ContentIndex;
use depot_core::{ArtifactStore, StoreKey};
use depot_metadata::{ExpandOptions, StoreChangeListener, StoreSnapshot};
use depot_storage::StoreAccessors;
use std::collections::HashSet;
use std::sync::Arc;

/// Members in `new` but not `old`, and members in `old` but not `new`.
pub fn get_diff(new: &[StoreKey], old: &[StoreKey]) -> (HashSet<StoreKey>, HashSet<StoreKey>) {
    let new_set: HashSet<&StoreKey> = new.iter().collect();
    let old_set: HashSet<&StoreKey> = old.iter().collect();
    let added = new_set.difference(&old_set).map(|k| (*k).clone()).collect();
    let removed = old_set.difference(&new_set).map(|k| (*k).clone()).collect();
    (added, removed)
}

/// Symmetric difference of the two member lists.
pub fn get_diverged(new: &[StoreKey], old: &[StoreKey]) -> HashSet<StoreKey> {
    let (added, removed) = get_diff(new, old);
    added.union(&removed).cloned().collect()
}

/// Invalidates index entries made stale by store changes, and drops cached
/// accessors of changed stores.
pub struct ChangePropagator {
    index: Arc<ContentIndex>,
    accessors: Arc<StoreAccessors>,
}

impl ChangePropagator {
    pub fn new(index: Arc<ContentIndex>, accessors: Arc<StoreAccessors>) -> Self {
        Self { index, accessors }
    }

    /// `group` plus every group that contains it.
    fn affected_groups(snapshot: &StoreSnapshot, group: &StoreKey) -> Vec<StoreKey> {
        let mut affected = vec![group.clone()];
        affected.extend(snapshot.groups_containing(group));
        affected
    }

    /// In each affected group, drop entries served by a store that may now
    /// lose precedence to one of `added`, plus tombstones.
    fn invalidate_after_added(
        &self,
        snapshot: &StoreSnapshot,
        affected: &[StoreKey],
        added: &HashSet<StoreKey>,
    ) -> usize {
        let added_concrete: HashSet<StoreKey> = added
            .iter()
            .flat_map(|k| snapshot.reachable_concrete(k))
            .collect();
        let mut removed = 0;
        for group in affected {
            let order = match snapshot.expand(group, ExpandOptions::default()) {
                Ok(expansion) => expansion.keys(),
                Err(e) => {
                    tracing::warn!(group = %group, error = %e, "Cannot expand group, clearing its index");
                    removed += self.index.invalidate_all(group);
                    continue;
                }
            };
            let earliest = order
                .iter()
                .position(|k| added_concrete.contains(k))
                .unwrap_or(order.len());
            removed += self.index.invalidate_from_position(group, &order, earliest);
        }
        removed
    }
}

impl StoreChangeListener for ChangePropagator {
    fn group_membership_changed(
        &self,
        snapshot: &StoreSnapshot,
        group: &StoreKey,
        old_members: &[StoreKey],
        new_members: &[StoreKey],
    ) {
        let (added, removed) = get_diff(new_members, old_members);
        let affected = Self::affected_groups(snapshot, group);

        if added.is_empty() && removed.is_empty() {
            // Same members, new order: any entry may have lost precedence.
            let invalidated: usize = affected.iter().map(|g| self.index.invalidate_all(g)).sum();
            tracing::debug!(group = %group, invalidated, "Group members reordered");
            return;
        }

        // Content served by a diverged member, or merged from the old
        // membership, is stale in every affected group.
        let mut stale: HashSet<StoreKey> = added
            .iter()
            .chain(removed.iter())
            .flat_map(|k| snapshot.reachable_concrete(k))
            .collect();
        stale.extend(affected.iter().cloned());

        let mut invalidated: usize = affected
            .iter()
            .map(|g| self.index.invalidate_origins(g, &stale))
            .sum();
        if !added.is_empty() {
            invalidated += self.invalidate_after_added(snapshot, &affected, &added);
        }

        tracing::debug!(
            group = %group,
            added = added.len(),
            removed = removed.len(),
            affected_groups = affected.len(),
            invalidated,
            "Propagated membership change"
        );
    }

    fn store_updated(&self, snapshot: &StoreSnapshot, store: &ArtifactStore) {
        self.accessors.evict(&store.key);
        if store.is_group() {
            return;
        }

        // A concrete store's settings changed (url, enabled flag, ...): what it
        // served before may be wrong now, and it may now win where it did not.
        self.index.invalidate_all(&store.key);
        let containing = snapshot.groups_containing(&store.key);
        if containing.is_empty() {
            return;
        }
        let origins = HashSet::from([store.key.clone()]);
        for group in &containing {
            self.index.invalidate_origins(group, &origins);
        }
        self.invalidate_after_added(snapshot, &containing, &origins);
    }

    fn store_deleted(&self, before: &StoreSnapshot, store: &ArtifactStore) {
        self.accessors.evict(&store.key);
        self.index.invalidate_all(&store.key);

        let containing = before.groups_containing(&store.key);
        let mut stale: HashSet<StoreKey> =
            before.reachable_concrete(&store.key).into_iter().collect();
        stale.insert(store.key.clone());
        stale.extend(containing.iter().cloned());
        for group in &containing {
            self.index.invalidate_origins(group, &stale);
        }
        tracing::debug!(store = %store.key, groups = containing.len(), "Propagated store deletion");
    }
}
