//! Per-package-type retrieval and indexing strategies.

use crate::error::{ContentError, ContentResult};
use crate::resolver::StoreLookup;
use crate::transfer::Transfer;
use crate::{maven, npm};
use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{ArtifactStore, GENERIC_PKG_KEY, MAVEN_PKG_KEY, NPM_PKG_KEY, StoreKey};
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves a class of paths over an expanded store list.
#[async_trait]
pub trait PathRetriever: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, path: &str) -> bool;

    /// Resolve `path` for `requested` over `stores`, which are concrete,
    /// enabled and in precedence order.
    async fn handle(
        &self,
        lookup: &StoreLookup,
        requested: &StoreKey,
        stores: &[Arc<ArtifactStore>],
        path: &str,
    ) -> ContentResult<Transfer>;
}

/// Maps a raw path to the key it is indexed under.
pub trait IndexingStrategy: Send + Sync {
    fn index_path(&self, raw_path: &str) -> String;
}

/// Indexes every path as itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawPathIndexing;

impl IndexingStrategy for RawPathIndexing {
    fn index_path(&self, raw_path: &str) -> String {
        raw_path.to_string()
    }
}

/// Indexes paths at their parent directory, except those `keep_exact` claims.
#[derive(Clone, Copy, Debug)]
pub struct DirectoryIndexing {
    keep_exact: fn(&str) -> bool,
}

impl DirectoryIndexing {
    pub fn new(keep_exact: fn(&str) -> bool) -> Self {
        Self { keep_exact }
    }
}

impl IndexingStrategy for DirectoryIndexing {
    fn index_path(&self, raw_path: &str) -> String {
        if (self.keep_exact)(raw_path) {
            return raw_path.to_string();
        }
        match raw_path.trim_end_matches('/').rfind('/') {
            Some(pos) => raw_path[..=pos].to_string(),
            None => "/".to_string(),
        }
    }
}

/// Merges the documents several stores hold at the same metadata path.
pub trait MetadataMerger: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_merge(&self, path: &str) -> bool;

    /// Merge `documents`, given in precedence order. Members whose document
    /// cannot be read are skipped; fails only if none can.
    fn merge(&self, path: &str, documents: &[(StoreKey, Bytes)]) -> ContentResult<Bytes>;
}

/// Fetches a metadata path from every member that has it and merges the
/// results into one document owned by the requested store.
pub struct MergingRetriever<M> {
    merger: M,
}

impl<M: MetadataMerger> MergingRetriever<M> {
    pub fn new(merger: M) -> Self {
        Self { merger }
    }

    pub fn merger(&self) -> &M {
        &self.merger
    }
}

#[async_trait]
impl<M: MetadataMerger + 'static> PathRetriever for MergingRetriever<M> {
    fn name(&self) -> &'static str {
        self.merger.name()
    }

    fn can_handle(&self, path: &str) -> bool {
        self.merger.can_merge(path)
    }

    async fn handle(
        &self,
        lookup: &StoreLookup,
        requested: &StoreKey,
        stores: &[Arc<ArtifactStore>],
        path: &str,
    ) -> ContentResult<Transfer> {
        let gathered = lookup.fetch_all(stores, path).await;
        let mut found = gathered.found;
        match found.len() {
            0 => Err(crate::resolver::absent_or_failed(
                requested,
                path,
                stores.len(),
                gathered.failures,
            )),
            1 => {
                let (origin, data) = found.remove(0);
                Ok(Transfer::bytes(origin, path, data))
            }
            n => {
                tracing::debug!(
                    store = %requested,
                    path,
                    members = n,
                    merger = self.merger.name(),
                    "Merging metadata"
                );
                let merged = self.merger.merge(path, &found)?;
                Ok(Transfer::bytes(requested.clone(), path, merged))
            }
        }
    }
}

/// The strategies registered for one package type.
#[derive(Clone)]
pub struct PackageStrategies {
    pub retrievers: Vec<Arc<dyn PathRetriever>>,
    pub indexing: Arc<dyn IndexingStrategy>,
}

impl Default for PackageStrategies {
    fn default() -> Self {
        Self {
            retrievers: Vec::new(),
            indexing: Arc::new(RawPathIndexing),
        }
    }
}

/// Package type → strategies. Built once at startup and shared by `Arc`.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    by_type: HashMap<String, PackageStrategies>,
    fallback: PackageStrategies,
}

impl StrategyRegistry {
    /// A registry where every package type uses raw-path indexing and no
    /// special retrievers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Maven, npm and generic-http.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(MAVEN_PKG_KEY, maven::strategies());
        registry.register(NPM_PKG_KEY, npm::strategies());
        registry.register(GENERIC_PKG_KEY, PackageStrategies::default());
        registry
    }

    pub fn register(&mut self, package_type: impl Into<String>, strategies: PackageStrategies) {
        self.by_type.insert(package_type.into(), strategies);
    }

    fn strategies(&self, package_type: &str) -> &PackageStrategies {
        self.by_type.get(package_type).unwrap_or(&self.fallback)
    }

    /// The first retriever of `package_type` that handles `path`.
    pub fn retriever_for(&self, package_type: &str, path: &str) -> Option<&Arc<dyn PathRetriever>> {
        self.strategies(package_type)
            .retrievers
            .iter()
            .find(|r| r.can_handle(path))
    }

    pub fn indexing(&self, package_type: &str) -> &Arc<dyn IndexingStrategy> {
        &self.strategies(package_type).indexing
    }

    /// Index key for `raw_path` in a store of `key`'s package type.
    pub fn index_path(&self, key: &StoreKey, raw_path: &str) -> String {
        self.indexing(key.package_type()).index_path(raw_path)
    }
}

pub(crate) fn merge_error(path: &str) -> ContentError {
    ContentError::Merge(format!("no member document for {path} could be parsed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> StoreKey {
        StoreKey::parse(s).unwrap()
    }

    #[test]
    fn test_directory_indexing() {
        let idx = DirectoryIndexing::new(|p| p.ends_with(".xml"));
        assert_eq!(idx.index_path("org/foo/1.0/foo-1.0.jar"), "org/foo/1.0/");
        assert_eq!(idx.index_path("org/foo/maven-metadata.xml"), "org/foo/maven-metadata.xml");
        assert_eq!(idx.index_path("top.jar"), "/");
        assert_eq!(idx.index_path("org/foo/"), "org/");
    }

    #[test]
    fn test_standard_registry_dispatch() {
        let registry = StrategyRegistry::standard();

        assert!(
            registry
                .retriever_for("maven", "org/foo/maven-metadata.xml")
                .is_some()
        );
        assert!(
            registry
                .retriever_for("maven", "org/foo/1.0/foo-1.0.jar")
                .is_none()
        );
        assert!(registry.retriever_for("npm", "jquery").is_some());
        assert!(registry.retriever_for("npm", "jquery/-/jquery-3.0.0.tgz").is_none());
        assert!(registry.retriever_for("generic-http", "a/b").is_none());

        assert_eq!(
            registry.index_path(&key("maven:group:g"), "org/foo/1.0/foo-1.0.jar"),
            "org/foo/1.0/"
        );
        assert_eq!(
            registry.index_path(&key("npm:group:g"), "jquery/-/jquery-3.0.0.tgz"),
            "jquery/-/"
        );
        assert_eq!(registry.index_path(&key("npm:group:g"), "jquery"), "jquery");
        assert_eq!(registry.index_path(&key("generic-http:hosted:h"), "a/b/c"), "a/b/c");
        assert_eq!(registry.index_path(&key("rubygems:hosted:h"), "a/b/c"), "a/b/c");
    }
}
