//! Maven strategies: `maven-metadata.xml` merging, checksums of merged
//! metadata, and directory-granular indexing.

use crate::error::{ContentError, ContentResult};
use crate::resolver::StoreLookup;
use crate::strategy::{
    DirectoryIndexing, MergingRetriever, MetadataMerger, PackageStrategies, PathRetriever,
    merge_error,
};
use crate::transfer::Transfer;
use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{ArtifactStore, StoreKey};
use serde::{Deserialize, Serialize};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::cmp::Ordering;
use std::sync::Arc;

pub const METADATA_NAME: &str = "maven-metadata.xml";
const ARCHETYPE_CATALOG_NAME: &str = "archetype-catalog.xml";

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// `maven-metadata.xml` and `archetype-catalog.xml`, including checksum
/// siblings.
pub fn is_metadata_path(path: &str) -> bool {
    let name = file_name(path);
    name.starts_with(METADATA_NAME) || name.starts_with(ARCHETYPE_CATALOG_NAME)
}

/// Snapshot paths need a store that allows snapshots; everything else needs
/// one that allows releases.
pub fn is_snapshot_path(path: &str) -> bool {
    path.contains("-SNAPSHOT")
}

pub(crate) fn strategies() -> PackageStrategies {
    PackageStrategies {
        retrievers: vec![
            Arc::new(MergingRetriever::new(MavenMetadataMerger)),
            Arc::new(MetadataChecksumRetriever::new()),
        ],
        indexing: Arc::new(DirectoryIndexing::new(is_metadata_path)),
    }
}

// serde-xml-rs view of maven-metadata.xml. Unknown elements are ignored
// when reading; `None` fields and empty wrappers are left out when writing.

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename = "metadata", rename_all = "camelCase")]
struct Metadata {
    group_id: Option<String>,
    artifact_id: Option<String>,
    version: Option<String>,
    versioning: Option<Versioning>,
    plugins: Option<Plugins>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct Versioning {
    latest: Option<String>,
    release: Option<String>,
    snapshot: Option<Snapshot>,
    versions: Option<VersionList>,
    last_updated: Option<String>,
    snapshot_versions: Option<SnapshotVersionList>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct VersionList {
    #[serde(default)]
    version: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    timestamp: Option<String>,
    build_number: Option<String>,
    local_copy: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotVersionList {
    #[serde(default)]
    snapshot_version: Vec<SnapshotVersion>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
struct SnapshotVersion {
    classifier: Option<String>,
    extension: Option<String>,
    value: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Plugins {
    #[serde(default)]
    plugin: Vec<Plugin>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct Plugin {
    name: Option<String>,
    prefix: Option<String>,
    artifact_id: Option<String>,
}

/// Merged document under construction.
#[derive(Debug, Default)]
struct Merged {
    group_id: Option<String>,
    artifact_id: Option<String>,
    version: Option<String>,
    versions: Vec<String>,
    fallback_latest: Option<String>,
    fallback_release: Option<String>,
    last_updated: Option<String>,
    snapshot: Option<Snapshot>,
    snapshot_versions: Vec<SnapshotVersion>,
    plugins: Vec<Plugin>,
}

impl Merged {
    fn absorb(&mut self, md: Metadata) {
        // Coordinates: later members overwrite earlier ones.
        if md.group_id.is_some() {
            self.group_id = md.group_id;
        }
        if md.artifact_id.is_some() {
            self.artifact_id = md.artifact_id;
        }
        if md.version.is_some() {
            self.version = md.version;
        }

        if let Some(v) = md.versioning {
            if let Some(list) = v.versions {
                for version in list.version {
                    let version = version.trim().to_string();
                    if !version.is_empty() && !self.versions.contains(&version) {
                        self.versions.push(version);
                    }
                }
            }
            self.fallback_latest = max_version(self.fallback_latest.take(), v.latest);
            self.fallback_release = max_version(self.fallback_release.take(), v.release);
            if let Some(updated) = v.last_updated
                && self.last_updated.as_ref().is_none_or(|cur| updated > *cur)
            {
                self.last_updated = Some(updated);
            }
            if self.snapshot.is_none() {
                self.snapshot = v.snapshot;
            }
            if let Some(list) = v.snapshot_versions {
                for sv in list.snapshot_version {
                    if !self.snapshot_versions.contains(&sv) {
                        self.snapshot_versions.push(sv);
                    }
                }
            }
        }

        if let Some(plugins) = md.plugins {
            for plugin in plugins.plugin {
                if !self.plugins.iter().any(|p| p.prefix == plugin.prefix) {
                    self.plugins.push(plugin);
                }
            }
        }
    }

    fn finish(mut self) -> ContentResult<String> {
        self.versions.sort_by(|a, b| compare_versions(a, b));
        self.snapshot_versions.sort_by(|a, b| {
            a.value
                .cmp(&b.value)
                .then_with(|| a.extension.cmp(&b.extension))
        });

        let latest = self.versions.last().cloned().or(self.fallback_latest.take());
        let release = self
            .versions
            .iter()
            .rev()
            .find(|v| !v.to_ascii_uppercase().ends_with("SNAPSHOT"))
            .cloned()
            .or(self.fallback_release.take());

        let versioning = Versioning {
            latest,
            release,
            snapshot: self.snapshot,
            versions: (!self.versions.is_empty()).then_some(VersionList {
                version: self.versions,
            }),
            last_updated: self.last_updated,
            snapshot_versions: (!self.snapshot_versions.is_empty()).then_some(
                SnapshotVersionList {
                    snapshot_version: self.snapshot_versions,
                },
            ),
        };
        let metadata = Metadata {
            group_id: self.group_id,
            artifact_id: self.artifact_id,
            version: self.version,
            versioning: Some(versioning),
            plugins: (!self.plugins.is_empty()).then_some(Plugins {
                plugin: self.plugins,
            }),
        };
        serde_xml_rs::to_string(&metadata)
            .map_err(|e| ContentError::Merge(format!("cannot write merged metadata: {e}")))
    }
}

fn max_version(current: Option<String>, candidate: Option<String>) -> Option<String> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(if compare_versions(&b, &a) == Ordering::Greater { b } else { a }),
        (a, b) => a.or(b),
    }
}

/// Merges `maven-metadata.xml` documents.
#[derive(Clone, Copy, Debug, Default)]
pub struct MavenMetadataMerger;

impl MetadataMerger for MavenMetadataMerger {
    fn name(&self) -> &'static str {
        "maven-metadata"
    }

    fn can_merge(&self, path: &str) -> bool {
        file_name(path) == METADATA_NAME
    }

    fn merge(&self, path: &str, documents: &[(StoreKey, Bytes)]) -> ContentResult<Bytes> {
        let mut merged = Merged::default();
        let mut parsed = 0usize;
        for (origin, data) in documents {
            let text = match std::str::from_utf8(data) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(store = %origin, path, error = %e, "Cannot read metadata");
                    continue;
                }
            };
            match serde_xml_rs::from_str::<Metadata>(text) {
                Ok(md) => {
                    merged.absorb(md);
                    parsed += 1;
                }
                Err(e) => {
                    tracing::error!(store = %origin, path, error = %e, "Cannot parse metadata");
                }
            }
        }
        if parsed == 0 {
            return Err(merge_error(path));
        }
        Ok(Bytes::from(merged.finish()?))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChecksumKind {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumKind {
    const ALL: [(Self, &'static str); 4] = [
        (Self::Md5, ".md5"),
        (Self::Sha1, ".sha1"),
        (Self::Sha256, ".sha256"),
        (Self::Sha512, ".sha512"),
    ];

    fn of(path: &str) -> Option<(Self, &str)> {
        Self::ALL
            .iter()
            .find_map(|(kind, suffix)| path.strip_suffix(suffix).map(|base| (*kind, base)))
    }

    fn digest(self, data: &[u8]) -> String {
        match self {
            Self::Md5 => hex::encode(Md5::digest(data)),
            Self::Sha1 => hex::encode(Sha1::digest(data)),
            Self::Sha256 => hex::encode(Sha256::digest(data)),
            Self::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }
}

/// Serves `.md5`, `.sha1`, `.sha256` and `.sha512` of `maven-metadata.xml`, computed from the
/// resolved (possibly merged) metadata, so checksums always match it.
pub struct MetadataChecksumRetriever {
    metadata: MergingRetriever<MavenMetadataMerger>,
}

impl MetadataChecksumRetriever {
    pub fn new() -> Self {
        Self {
            metadata: MergingRetriever::new(MavenMetadataMerger),
        }
    }
}

impl Default for MetadataChecksumRetriever {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PathRetriever for MetadataChecksumRetriever {
    fn name(&self) -> &'static str {
        "maven-metadata-checksum"
    }

    fn can_handle(&self, path: &str) -> bool {
        ChecksumKind::of(path).is_some_and(|(_, base)| file_name(base) == METADATA_NAME)
    }

    async fn handle(
        &self,
        lookup: &StoreLookup,
        requested: &StoreKey,
        stores: &[Arc<ArtifactStore>],
        path: &str,
    ) -> ContentResult<Transfer> {
        let (kind, base) = ChecksumKind::of(path)
            .ok_or_else(|| ContentError::Validation(format!("not a checksum path: {path}")))?;
        let metadata = self.metadata.handle(lookup, requested, stores, base).await?;
        let origin = metadata.origin.clone();
        let data = metadata.into_bytes().await?;
        Ok(Transfer::bytes(origin, path, Bytes::from(kind.digest(&data))))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Item {
    Int(u64),
    Qualifier(String),
}

fn qualifier_rank(q: &str) -> (u8, &str) {
    match q {
        "alpha" | "a" => (0, ""),
        "beta" | "b" => (1, ""),
        "milestone" | "m" => (2, ""),
        "rc" | "cr" => (3, ""),
        "snapshot" => (4, ""),
        "" | "ga" | "final" | "release" => (5, ""),
        "sp" => (6, ""),
        other => (7, other),
    }
}

fn flush(current: &mut String, digits: bool, items: &mut Vec<Item>) {
    if current.is_empty() {
        return;
    }
    let item = if digits {
        current
            .parse()
            .map(Item::Int)
            .unwrap_or_else(|_| Item::Qualifier(current.clone()))
    } else {
        Item::Qualifier(current.clone())
    };
    items.push(item);
    current.clear();
}

fn tokenize(version: &str) -> Vec<Item> {
    let lower = version.trim().to_ascii_lowercase();
    let mut items = Vec::new();
    let mut current = String::new();
    let mut digits = false;

    for c in lower.chars() {
        if c == '.' || c == '-' || c == '_' {
            flush(&mut current, digits, &mut items);
            continue;
        }
        let is_digit = c.is_ascii_digit();
        if !current.is_empty() && is_digit != digits {
            flush(&mut current, digits, &mut items);
        }
        digits = is_digit;
        current.push(c);
    }
    flush(&mut current, digits, &mut items);

    // 1.0 == 1 and 1.0-final == 1.0
    while let Some(last) = items.last() {
        match last {
            Item::Int(0) => {}
            Item::Qualifier(q) if qualifier_rank(q).0 == 5 => {}
            _ => break,
        }
        items.pop();
    }
    items
}

fn compare_items(a: Option<&Item>, b: Option<&Item>) -> Ordering {
    // A missing item compares like zero against numbers and like a release
    // against qualifiers.
    let zero = Item::Int(0);
    let release = Item::Qualifier(String::new());
    let padding = |other: &Item| matches!(other, Item::Qualifier(_));
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        (Some(a), None) => (a, if padding(a) { &release } else { &zero }),
        (None, Some(b)) => (if padding(b) { &release } else { &zero }, b),
        (None, None) => return Ordering::Equal,
    };
    match (a, b) {
        (Item::Int(x), Item::Int(y)) => x.cmp(y),
        (Item::Int(_), Item::Qualifier(_)) => Ordering::Greater,
        (Item::Qualifier(_), Item::Int(_)) => Ordering::Less,
        (Item::Qualifier(x), Item::Qualifier(y)) => qualifier_rank(x).cmp(&qualifier_rank(y)),
    }
}

/// Maven-style version ordering: numeric segments compare numerically,
/// qualifiers as alpha < beta < milestone < rc < snapshot < release < sp.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = tokenize(a);
    let right = tokenize(b);
    let len = left.len().max(right.len());
    for i in 0..len {
        let ord = compare_items(left.get(i), right.get(i));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
