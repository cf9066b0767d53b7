//! npm strategies: package metadata merging and tarball indexing.

use crate::error::{ContentError, ContentResult};
use crate::strategy::{
    DirectoryIndexing, MergingRetriever, MetadataMerger, PackageStrategies, merge_error,
};
use bytes::Bytes;
use depot_core::StoreKey;
use semver::Version;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Tarballs live under a `/-/` segment; everything else is package metadata.
pub fn is_metadata_path(path: &str) -> bool {
    !path.contains("/-/")
}

pub(crate) fn strategies() -> PackageStrategies {
    PackageStrategies {
        retrievers: vec![Arc::new(MergingRetriever::new(PackageMetadataMerger))],
        indexing: Arc::new(DirectoryIndexing::new(is_metadata_path)),
    }
}

/// Fields merged key by key instead of taken whole from the first member.
const KEYED_FIELDS: [&str; 3] = ["versions", "time", DIST_TAGS];

const DIST_TAGS: &str = "dist-tags";

/// Whether the dist-tag value `incoming` should replace `existing`: only a
/// strictly higher semver does. Anything unparseable keeps what is there.
fn newer_tag(existing: &Value, incoming: &Value) -> bool {
    let parse = |v: &Value| v.as_str().and_then(|s| Version::parse(s.trim()).ok());
    match (parse(existing), parse(incoming)) {
        (Some(existing), Some(incoming)) => incoming > existing,
        _ => false,
    }
}

/// Merges npm package documents. Earlier members take precedence for every
/// scalar field, every version and every time entry; each dist-tag points at
/// the highest version any member tags with it.
#[derive(Clone, Copy, Debug, Default)]
pub struct PackageMetadataMerger;

impl PackageMetadataMerger {
    fn absorb(merged: &mut Map<String, Value>, doc: Map<String, Value>) {
        for (field, value) in doc {
            if KEYED_FIELDS.contains(&field.as_str()) {
                let Value::Object(incoming) = value else {
                    continue;
                };
                let by_version = field == DIST_TAGS;
                let slot = merged
                    .entry(field)
                    .or_insert_with(|| Value::Object(Map::new()));
                let Value::Object(existing) = slot else {
                    continue;
                };
                for (k, v) in incoming {
                    match existing.get_mut(&k) {
                        None => {
                            existing.insert(k, v);
                        }
                        Some(current) => {
                            if by_version && newer_tag(current, &v) {
                                *current = v;
                            }
                        }
                    }
                }
            } else {
                merged.entry(field).or_insert(value);
            }
        }
    }
}

impl MetadataMerger for PackageMetadataMerger {
    fn name(&self) -> &'static str {
        "npm-package"
    }

    fn can_merge(&self, path: &str) -> bool {
        is_metadata_path(path)
    }

    fn merge(&self, path: &str, documents: &[(StoreKey, Bytes)]) -> ContentResult<Bytes> {
        let mut merged = Map::new();
        let mut parsed = 0usize;
        for (origin, data) in documents {
            match serde_json::from_slice::<Value>(data) {
                Ok(Value::Object(doc)) => {
                    Self::absorb(&mut merged, doc);
                    parsed += 1;
                }
                Ok(_) => {
                    tracing::error!(store = %origin, path, "Package metadata is not a JSON object");
                }
                Err(e) => {
                    tracing::error!(store = %origin, path, error = %e, "Cannot parse package metadata");
                }
            }
        }
        if parsed == 0 {
            return Err(merge_error(path));
        }
        let body = serde_json::to_vec(&Value::Object(merged))
            .map_err(|e| ContentError::Merge(e.to_string()))?;
        Ok(Bytes::from(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(s: &str) -> StoreKey {
        StoreKey::parse(s).unwrap()
    }

    fn bytes(v: Value) -> Bytes {
        Bytes::from(serde_json::to_vec(&v).unwrap())
    }

    #[test]
    fn test_merge_precedence() {
        let first = json!({
            "name": "jquery",
            "description": "hosted copy",
            "versions": { "3.0.0": { "dist": "hosted" } },
            "time": { "3.0.0": "2016-06-09" },
            "dist-tags": { "latest": "3.0.0" }
        });
        let second = json!({
            "name": "jquery",
            "description": "upstream copy",
            "readme": "upstream readme",
            "versions": {
                "3.0.0": { "dist": "upstream" },
                "3.1.0": { "dist": "upstream" }
            },
            "time": { "3.0.0": "ignored", "3.1.0": "2016-07-07" },
            "dist-tags": { "latest": "3.1.0", "beta": "3.2.0-beta.1" }
        });

        let merged = PackageMetadataMerger
            .merge(
                "jquery",
                &[
                    (key("npm:hosted:local"), bytes(first)),
                    (key("npm:remote:npmjs"), bytes(second)),
                ],
            )
            .unwrap();
        let merged: Value = serde_json::from_slice(&merged).unwrap();

        assert_eq!(merged["description"], "hosted copy");
        assert_eq!(merged["readme"], "upstream readme");
        assert_eq!(merged["versions"]["3.0.0"]["dist"], "hosted");
        assert_eq!(merged["versions"]["3.1.0"]["dist"], "upstream");
        assert_eq!(merged["time"]["3.0.0"], "2016-06-09");
        assert_eq!(merged["time"]["3.1.0"], "2016-07-07");
        assert_eq!(merged["dist-tags"]["latest"], "3.1.0");
        assert_eq!(merged["dist-tags"]["beta"], "3.2.0-beta.1");
    }

    #[test]
    fn test_dist_tags_keep_highest_version() {
        let docs = [
            json!({ "dist-tags": { "latest": "1.10.0", "next": "2.0.0-rc.2", "odd": "banana" } }),
            json!({ "dist-tags": { "latest": "1.9.3", "next": "2.0.0-rc.10", "odd": "9.9.9" } }),
            json!({ "dist-tags": { "latest": "not-a-version", "next": "2.0.0-beta.1" } }),
        ];
        let documents: Vec<_> = docs
            .into_iter()
            .enumerate()
            .map(|(i, d)| (key(&format!("npm:hosted:m{i}")), bytes(d)))
            .collect();
        let merged = PackageMetadataMerger.merge("pkg", &documents).unwrap();
        let merged: Value = serde_json::from_slice(&merged).unwrap();

        // Numeric, not lexical, comparison.
        assert_eq!(merged["dist-tags"]["latest"], "1.10.0");
        assert_eq!(merged["dist-tags"]["next"], "2.0.0-rc.10");
        assert_eq!(merged["dist-tags"]["odd"], "banana");
    }

    #[test]
    fn test_merge_skips_garbage() {
        let merged = PackageMetadataMerger
            .merge(
                "left-pad",
                &[
                    (key("npm:remote:broken"), Bytes::from_static(b"<html>")),
                    (key("npm:hosted:local"), bytes(json!({ "name": "left-pad" }))),
                ],
            )
            .unwrap();
        let merged: Value = serde_json::from_slice(&merged).unwrap();
        assert_eq!(merged["name"], "left-pad");

        assert!(
            PackageMetadataMerger
                .merge("left-pad", &[(key("npm:remote:broken"), Bytes::from_static(b"[1]"))])
                .is_err()
        );
    }

    #[test]
    fn test_metadata_paths() {
        assert!(is_metadata_path("jquery"));
        assert!(is_metadata_path("@types/node"));
        assert!(!is_metadata_path("jquery/-/jquery-3.0.0.tgz"));
    }
}
