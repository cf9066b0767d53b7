//! Group membership resolution over a point-in-time view of the store map.

use crate::error::{MetadataError, MetadataResult};
use depot_core::{ArtifactStore, StoreKey};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Controls what [`StoreSnapshot::expand`] emits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Emit group stores themselves, at their first-seen position.
    pub include_groups: bool,
    /// Leave out disabled stores (and everything reached only through a
    /// disabled group).
    pub enabled_only: bool,
}

impl ExpandOptions {
    pub fn enabled_only() -> Self {
        Self {
            include_groups: false,
            enabled_only: true,
        }
    }
}

/// Result of expanding a store key.
#[derive(Clone, Debug, Default)]
pub struct Expansion {
    /// Stores in precedence order, each at most once.
    pub stores: Vec<Arc<ArtifactStore>>,
    /// Member keys that named no existing store. They are skipped.
    pub dangling: Vec<StoreKey>,
}

impl Expansion {
    pub fn keys(&self) -> Vec<StoreKey> {
        self.stores.iter().map(|s| s.key.clone()).collect()
    }
}

/// Immutable view of every store definition at one instant.
///
/// Expansion over a snapshot is consistent even while the live map changes.
#[derive(Clone, Debug, Default)]
pub struct StoreSnapshot {
    stores: HashMap<StoreKey, Arc<ArtifactStore>>,
}

impl StoreSnapshot {
    pub fn new(stores: HashMap<StoreKey, Arc<ArtifactStore>>) -> Self {
        Self { stores }
    }

    pub fn get(&self, key: &StoreKey) -> Option<&Arc<ArtifactStore>> {
        self.stores.get(key)
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

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ArtifactStore>> {
        self.stores.values()
    }

    /// A copy of this snapshot with `store` put in place.
    pub fn with_store(&self, store: Arc<ArtifactStore>) -> Self {
        let mut stores = self.stores.clone();
        stores.insert(store.key.clone(), store);
        Self { stores }
    }

    /// A copy of this snapshot without `key`.
    pub fn without(&self, key: &StoreKey) -> Self {
        let mut stores = self.stores.clone();
        stores.remove(key);
        Self { stores }
    }

    /// Expand `key` into its transitive, deduplicated members.
    ///
    /// Members are visited depth-first in declaration order and the first
    /// occurrence wins. A non-group key expands to itself. Re-entering a group
    /// that is still being expanded fails with [`MetadataError::StoreCycle`].
    pub fn expand(&self, key: &StoreKey, options: ExpandOptions) -> MetadataResult<Expansion> {
        let root = self
            .stores
            .get(key)
            .ok_or_else(|| MetadataError::NotFound(key.to_string()))?;

        let mut expansion = Expansion::default();
        let mut seen = HashSet::new();
        let mut visiting = Vec::new();
        self.visit(root, options, &mut visiting, &mut seen, &mut expansion)?;

        if !expansion.dangling.is_empty() {
            tracing::warn!(
                store = %key,
                dangling = expansion.dangling.len(),
                "Group expansion skipped members that do not exist"
            );
        }

        Ok(expansion)
    }

    fn visit(
        &self,
        store: &Arc<ArtifactStore>,
        options: ExpandOptions,
        visiting: &mut Vec<StoreKey>,
        seen: &mut HashSet<StoreKey>,
        out: &mut Expansion,
    ) -> MetadataResult<()> {
        seen.insert(store.key.clone());
        if options.enabled_only && store.disabled {
            return Ok(());
        }

        let Some(members) = store.constituents() else {
            out.stores.push(store.clone());
            return Ok(());
        };

        if options.include_groups {
            out.stores.push(store.clone());
        }

        visiting.push(store.key.clone());
        for member in members {
            if let Some(pos) = visiting.iter().position(|k| k == member) {
                let mut cycle = visiting[pos..].to_vec();
                cycle.push(member.clone());
                return Err(MetadataError::StoreCycle { cycle });
            }
            if seen.contains(member) {
                continue;
            }
            match self.stores.get(member) {
                Some(next) => self.visit(next, options, visiting, seen, out)?,
                None => {
                    seen.insert(member.clone());
                    out.dangling.push(member.clone());
                }
            }
        }
        visiting.pop();

        Ok(())
    }

    /// Every concrete store key reachable from `key`, tolerating cycles and
    /// missing stores. A key that is not in the snapshot reaches only itself.
    pub fn reachable_concrete(&self, key: &StoreKey) -> Vec<StoreKey> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![key.clone()];
        while let Some(next) = stack.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            match self.stores.get(&next).and_then(|s| s.constituents()) {
                Some(members) => stack.extend(members.iter().rev().cloned()),
                None if !next.is_group() => out.push(next),
                None => {}
            }
        }
        out
    }

    /// Every group that contains `key` directly or through other groups.
    ///
    /// Sorted by key. Never includes `key` itself.
    pub fn groups_containing(&self, key: &StoreKey) -> Vec<StoreKey> {
        let mut found: HashSet<StoreKey> = HashSet::new();
        let mut frontier = vec![key.clone()];
        while let Some(current) = frontier.pop() {
            for store in self.stores.values() {
                if store.key != *key
                    && !found.contains(&store.key)
                    && store
                        .constituents()
                        .is_some_and(|members| members.contains(&current))
                {
                    found.insert(store.key.clone());
                    frontier.push(store.key.clone());
                }
            }
        }
        let mut groups: Vec<StoreKey> = found.into_iter().collect();
        groups.sort();
        groups
    }
}
