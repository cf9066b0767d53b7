//! The content index: where a store's content was last found.
//!
//! Entries are keyed by the package type's index path, which is often the
//! parent directory, so a hit only says where to look first. Tombstones are
//! recorded at the exact raw path.

use crate::strategy::StrategyRegistry;
use dashmap::DashMap;
use depot_core::StoreKey;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One index entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexEntry {
    /// Content was served from `origin`.
    Found { origin: StoreKey },
    /// A full resolution found nothing.
    Missing,
}

/// Result of [`ContentIndex::lookup`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexLookup {
    Hit(StoreKey),
    Missing,
    Miss,
}

/// Entries of one store, with a counter bumped by every invalidation.
#[derive(Default)]
struct StoreEntries {
    generation: u64,
    entries: HashMap<String, IndexEntry>,
    /// Every path of a hosted store with an authoritative index, once known.
    listing: Option<HashSet<String>>,
}

impl StoreEntries {
    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Concurrent index of resolved content, one map per store.
///
/// Removal is synchronous, so an invalidation happens-before any later
/// lookup. Writers pass the generation they saw before resolving; a write
/// is dropped if the store was invalidated in between, so a resolution that
/// raced a membership or content change cannot reinstate a stale entry.
pub struct ContentIndex {
    entries: DashMap<StoreKey, StoreEntries>,
    registry: Arc<StrategyRegistry>,
    enabled: bool,
}

impl ContentIndex {
    pub fn new(registry: Arc<StrategyRegistry>) -> Self {
        Self {
            entries: DashMap::new(),
            registry,
            enabled: true,
        }
    }

    /// An index that never records anything, so every lookup misses.
    pub fn disabled(registry: Arc<StrategyRegistry>) -> Self {
        Self {
            enabled: false,
            ..Self::new(registry)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn index_path(&self, store: &StoreKey, raw_path: &str) -> String {
        self.registry.index_path(store, raw_path)
    }

    /// Current invalidation generation of `store`.
    pub fn generation(&self, store: &StoreKey) -> u64 {
        self.entries.get(store).map(|e| e.generation).unwrap_or(0)
    }

    pub fn lookup(&self, store: &StoreKey, raw_path: &str) -> IndexLookup {
        let Some(store_entries) = self.entries.get(store) else {
            return IndexLookup::Miss;
        };
        let entries = &store_entries.entries;
        if let Some(IndexEntry::Missing) = entries.get(raw_path) {
            return IndexLookup::Missing;
        }
        match entries.get(&self.index_path(store, raw_path)) {
            Some(IndexEntry::Found { origin }) => IndexLookup::Hit(origin.clone()),
            Some(IndexEntry::Missing) | None => IndexLookup::Miss,
        }
    }

    /// Record that `raw_path` requested through `store` came from `origin`.
    /// Returns `false` if `store` was invalidated since `seen`.
    pub fn record(&self, store: &StoreKey, raw_path: &str, origin: StoreKey, seen: u64) -> bool {
        if !self.enabled {
            return false;
        }
        let index_path = self.index_path(store, raw_path);
        let mut store_entries = self.entries.entry(store.clone()).or_default();
        if store_entries.generation != seen {
            tracing::trace!(store = %store, path = raw_path, "Dropped index entry from a stale resolution");
            return false;
        }
        let entries = &mut store_entries.entries;
        if index_path != raw_path && entries.get(raw_path) == Some(&IndexEntry::Missing) {
            entries.remove(raw_path);
        }
        entries.insert(index_path, IndexEntry::Found { origin });
        true
    }

    /// Record that resolving `raw_path` through `store` found nothing.
    /// Returns `false` if `store` was invalidated since `seen`.
    pub fn record_missing(&self, store: &StoreKey, raw_path: &str, seen: u64) -> bool {
        if !self.enabled {
            return false;
        }
        let mut store_entries = self.entries.entry(store.clone()).or_default();
        if store_entries.generation != seen {
            return false;
        }
        store_entries
            .entries
            .insert(raw_path.to_string(), IndexEntry::Missing);
        true
    }

    /// Drop the entry covering `raw_path` and any tombstone at it.
    pub fn invalidate(&self, store: &StoreKey, raw_path: &str) {
        let index_path = self.index_path(store, raw_path);
        let mut store_entries = self.entries.entry(store.clone()).or_default();
        store_entries.bump();
        store_entries.entries.remove(&index_path);
        store_entries.entries.remove(raw_path);
    }

    /// Drop every entry of `store`, and its listing.
    pub fn invalidate_all(&self, store: &StoreKey) -> usize {
        let mut store_entries = self.entries.entry(store.clone()).or_default();
        store_entries.bump();
        store_entries.listing = None;
        let removed = store_entries.entries.len();
        store_entries.entries.clear();
        removed
    }

    /// Whether the complete listing of `store` holds `raw_path`, or `None`
    /// if no listing is held.
    pub fn listing_contains(&self, store: &StoreKey, raw_path: &str) -> Option<bool> {
        let store_entries = self.entries.get(store)?;
        store_entries
            .listing
            .as_ref()
            .map(|listing| listing.contains(raw_path))
    }

    /// Hold `paths` as the complete listing of `store`. Returns `false` if
    /// `store` was invalidated since `seen`.
    pub fn set_listing(
        &self,
        store: &StoreKey,
        paths: impl IntoIterator<Item = String>,
        seen: u64,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        let mut store_entries = self.entries.entry(store.clone()).or_default();
        if store_entries.generation != seen {
            return false;
        }
        store_entries.listing = Some(paths.into_iter().collect());
        true
    }

    /// Add `raw_path` to the listing of `store`, if one is held.
    pub fn listing_insert(&self, store: &StoreKey, raw_path: &str) {
        if let Some(mut store_entries) = self.entries.get_mut(store)
            && let Some(listing) = store_entries.listing.as_mut()
        {
            listing.insert(raw_path.to_string());
        }
    }

    /// Remove `raw_path` from the listing of `store`, if one is held.
    pub fn listing_remove(&self, store: &StoreKey, raw_path: &str) {
        if let Some(mut store_entries) = self.entries.get_mut(store)
            && let Some(listing) = store_entries.listing.as_mut()
        {
            listing.remove(raw_path);
        }
    }

    /// Drop entries of `store` matching `stale`. Returns how many went.
    pub fn invalidate_matching(
        &self,
        store: &StoreKey,
        stale: impl Fn(&IndexEntry) -> bool,
    ) -> usize {
        let mut store_entries = self.entries.entry(store.clone()).or_default();
        store_entries.bump();
        let entries = &mut store_entries.entries;
        let before = entries.len();
        entries.retain(|_, entry| !stale(entry));
        before - entries.len()
    }

    /// Drop entries of `store` whose origin is in `origins`.
    pub fn invalidate_origins(&self, store: &StoreKey, origins: &HashSet<StoreKey>) -> usize {
        self.invalidate_matching(store, |entry| {
            matches!(entry, IndexEntry::Found { origin } if origins.contains(origin))
        })
    }

    /// Drop entries of `store` whose origin sits at or after `position` in
    /// `order` (or is not in it at all), together with every tombstone.
    pub fn invalidate_from_position(
        &self,
        store: &StoreKey,
        order: &[StoreKey],
        position: usize,
    ) -> usize {
        self.invalidate_matching(store, |entry| match entry {
            IndexEntry::Missing => true,
            IndexEntry::Found { origin } => order
                .iter()
                .position(|k| k == origin)
                .is_none_or(|p| p >= position),
        })
    }

    /// Number of entries held for `store`.
    pub fn entries_for(&self, store: &StoreKey) -> usize {
        self.entries.get(store).map(|e| e.entries.len()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> StoreKey {
        StoreKey::parse(s).unwrap()
    }

    fn index() -> ContentIndex {
        ContentIndex::new(Arc::new(StrategyRegistry::standard()))
    }

    #[test]
    fn test_record_lookup_invalidate() {
        let idx = index();
        let g = key("maven:group:public");
        let a = key("maven:hosted:a");

        assert_eq!(idx.lookup(&g, "org/foo/1.0/foo-1.0.jar"), IndexLookup::Miss);
        idx.record(&g, "org/foo/1.0/foo-1.0.jar", a.clone(), 0);
        assert_eq!(idx.lookup(&g, "org/foo/1.0/foo-1.0.jar"), IndexLookup::Hit(a.clone()));
        // Directory granular: a sibling hits the same entry.
        assert_eq!(idx.lookup(&g, "org/foo/1.0/foo-1.0.pom"), IndexLookup::Hit(a.clone()));

        idx.invalidate(&g, "org/foo/1.0/foo-1.0.pom");
        assert_eq!(idx.lookup(&g, "org/foo/1.0/foo-1.0.jar"), IndexLookup::Miss);
    }

    #[test]
    fn test_tombstones_are_exact() {
        let idx = index();
        let g = key("maven:group:public");
        idx.record_missing(&g, "org/foo/1.0/missing.jar", 0);
        assert_eq!(idx.lookup(&g, "org/foo/1.0/missing.jar"), IndexLookup::Missing);
        assert_eq!(idx.lookup(&g, "org/foo/1.0/other.jar"), IndexLookup::Miss);

        // Finding the path later clears its tombstone.
        idx.record(&g, "org/foo/1.0/missing.jar", key("maven:hosted:a"), 0);
        assert_eq!(
            idx.lookup(&g, "org/foo/1.0/missing.jar"),
            IndexLookup::Hit(key("maven:hosted:a"))
        );
    }

    #[test]
    fn test_invalidate_origins_and_positions() {
        let idx = index();
        let g = key("maven:group:public");
        let (a, b, c) = (key("maven:hosted:a"), key("maven:hosted:b"), key("maven:remote:c"));
        idx.record(&g, "x/1/x.jar", a.clone(), 0);
        idx.record(&g, "y/1/y.jar", b.clone(), 0);
        idx.record(&g, "z/1/z.jar", c.clone(), 0);
        idx.record_missing(&g, "w/1/w.jar", 0);

        let removed = idx.invalidate_origins(&g, &HashSet::from([b.clone()]));
        assert_eq!(removed, 1);
        assert_eq!(idx.lookup(&g, "y/1/y.jar"), IndexLookup::Miss);

        // b re-added at position 1: everything from there on goes.
        let removed = idx.invalidate_from_position(&g, &[a.clone(), b, c], 1);
        assert_eq!(removed, 2);
        assert_eq!(idx.lookup(&g, "x/1/x.jar"), IndexLookup::Hit(a));
        assert_eq!(idx.entries_for(&g), 1);
    }

    #[test]
    fn test_disabled_index_never_hits() {
        let idx = ContentIndex::disabled(Arc::new(StrategyRegistry::standard()));
        let g = key("npm:group:g");
        idx.record(&g, "jquery", key("npm:hosted:a"), 0);
        idx.record_missing(&g, "left-pad", 0);
        assert_eq!(idx.lookup(&g, "jquery"), IndexLookup::Miss);
        assert!(idx.is_empty());
    }

    #[test]
    fn test_invalidate_all() {
        let idx = index();
        let g = key("npm:group:g");
        idx.record(&g, "jquery", key("npm:hosted:a"), 0);
        idx.record(&g, "lodash", key("npm:hosted:a"), 0);
        assert_eq!(idx.invalidate_all(&g), 2);
        assert_eq!(idx.invalidate_all(&g), 0);
    }

    #[test]
    fn test_record_after_invalidation_is_dropped() {
        let idx = index();
        let g = key("maven:group:public");
        let removed = key("maven:hosted:removed");

        let seen = idx.generation(&g);
        // A membership change lands while the resolution is in flight.
        idx.invalidate_origins(&g, &HashSet::from([removed.clone()]));
        assert!(!idx.record(&g, "org/foo/1.0/foo-1.0.jar", removed, seen));
        assert!(!idx.record_missing(&g, "org/foo/1.0/other.jar", seen));
        assert_eq!(idx.lookup(&g, "org/foo/1.0/foo-1.0.jar"), IndexLookup::Miss);
        assert_eq!(idx.lookup(&g, "org/foo/1.0/other.jar"), IndexLookup::Miss);

        let seen = idx.generation(&g);
        assert!(idx.record(&g, "org/foo/1.0/foo-1.0.jar", key("maven:hosted:a"), seen));
        idx.invalidate_all(&g);
        assert_ne!(idx.generation(&g), seen);
    }

    #[test]
    fn test_listing_follows_writes_until_invalidated() {
        let idx = index();
        let h = key("maven:hosted:a");
        assert_eq!(idx.listing_contains(&h, "a/1/a.jar"), None);

        let seen = idx.generation(&h);
        assert!(idx.set_listing(&h, ["a/1/a.jar".to_string()], seen));
        assert_eq!(idx.listing_contains(&h, "a/1/a.jar"), Some(true));
        assert_eq!(idx.listing_contains(&h, "b/1/b.jar"), Some(false));

        idx.listing_insert(&h, "b/1/b.jar");
        idx.listing_remove(&h, "a/1/a.jar");
        assert_eq!(idx.listing_contains(&h, "b/1/b.jar"), Some(true));
        assert_eq!(idx.listing_contains(&h, "a/1/a.jar"), Some(false));

        idx.invalidate_all(&h);
        assert_eq!(idx.listing_contains(&h, "b/1/b.jar"), None);
        // A listing taken before the invalidation is refused.
        assert!(!idx.set_listing(&h, Vec::new(), seen));
    }
}
