//! Artifact store definitions: hosted repositories, remote proxies and groups.

use crate::key::{StoreKey, StoreType};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// How a hosted store lays its content out in backing storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathStyle {
    /// Paths are stored as requested.
    #[default]
    Plain,
    /// Each path sits under two levels of directories named after the hash
    /// of its parent directory, so no single directory grows without bound.
    Hashed,
}

/// Settings specific to hosted repositories.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedSettings {
    /// Override for the storage location of this repository.
    #[serde(default)]
    pub storage_root: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub allow_snapshots: bool,
    #[serde(default = "default_true")]
    pub allow_releases: bool,
    /// Readonly repositories reject uploads, deletes and promotion targets.
    #[serde(default)]
    pub readonly: bool,
}

impl Default for HostedSettings {
    fn default() -> Self {
        Self {
            storage_root: None,
            allow_snapshots: true,
            allow_releases: true,
            readonly: false,
        }
    }
}

/// Settings specific to remote (proxy) repositories.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Upstream base URL.
    pub url: String,
    /// Per-request budget in seconds. Falls back to the global upstream timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Accept invalid upstream certificates (development only).
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// PEM encoded certificate to trust for this upstream.
    #[serde(default)]
    pub server_certificate_pem: Option<String>,
}

impl RemoteSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: None,
            insecure_skip_verify: false,
            server_certificate_pem: None,
        }
    }
}

/// Settings specific to groups.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSettings {
    /// Ordered members. Duplicates are collapsed on construction.
    #[serde(default, deserialize_with = "deserialize_constituents")]
    pub constituents: Vec<StoreKey>,
}

impl GroupSettings {
    pub fn new(constituents: impl IntoIterator<Item = StoreKey>) -> Self {
        Self {
            constituents: dedup_keys(constituents),
        }
    }
}

/// Variant-specific store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreKind {
    Hosted(HostedSettings),
    Remote(RemoteSettings),
    Group(GroupSettings),
}

impl StoreKind {
    pub fn store_type(&self) -> StoreType {
        match self {
            Self::Hosted(_) => StoreType::Hosted,
            Self::Remote(_) => StoreType::Remote,
            Self::Group(_) => StoreType::Group,
        }
    }
}

/// A store definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactStore {
    pub key: StoreKey,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub path_style: PathStyle,
    /// For hosted stores: the content index holds a complete listing, so a
    /// path missing from it is not found without asking storage.
    #[serde(default)]
    pub authoritative_index: bool,
    #[serde(flatten)]
    pub kind: StoreKind,
}

impl ArtifactStore {
    fn with_kind(key: StoreKey, kind: StoreKind) -> Self {
        Self {
            key,
            disabled: false,
            description: None,
            metadata: BTreeMap::new(),
            path_style: PathStyle::default(),
            authoritative_index: false,
            kind,
        }
    }

    /// A hosted repository with default settings.
    pub fn hosted(key: StoreKey) -> Self {
        Self::with_kind(key, StoreKind::Hosted(HostedSettings::default()))
    }

    /// A remote repository proxying `url`.
    pub fn remote(key: StoreKey, url: impl Into<String>) -> Self {
        Self::with_kind(key, StoreKind::Remote(RemoteSettings::new(url)))
    }

    /// A group over `constituents`, in order.
    pub fn group(key: StoreKey, constituents: impl IntoIterator<Item = StoreKey>) -> Self {
        Self::with_kind(key, StoreKind::Group(GroupSettings::new(constituents)))
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn key(&self) -> &StoreKey {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, StoreKind::Group(_))
    }

    /// Group members, or `None` for concrete stores.
    pub fn constituents(&self) -> Option<&[StoreKey]> {
        match &self.kind {
            StoreKind::Group(group) => Some(&group.constituents),
            _ => None,
        }
    }

    pub fn hosted_settings(&self) -> Option<&HostedSettings> {
        match &self.kind {
            StoreKind::Hosted(hosted) => Some(hosted),
            _ => None,
        }
    }

    pub fn remote_settings(&self) -> Option<&RemoteSettings> {
        match &self.kind {
            StoreKind::Remote(remote) => Some(remote),
            _ => None,
        }
    }

    /// Hosted and not readonly.
    pub fn is_writable(&self) -> bool {
        self.hosted_settings().is_some_and(|h| !h.readonly)
    }

    /// Check structural invariants that hold independently of other stores.
    pub fn validate(&self) -> crate::Result<()> {
        if self.kind.store_type() != self.key.store_type() {
            return Err(crate::Error::Validation(format!(
                "store {} declares type {} but its key says {}",
                self.key,
                self.kind.store_type(),
                self.key.store_type()
            )));
        }

        match &self.kind {
            StoreKind::Group(group) => {
                if group.constituents.contains(&self.key) {
                    return Err(crate::Error::Validation(format!(
                        "group {} cannot contain itself",
                        self.key
                    )));
                }
                if let Some(foreign) = group
                    .constituents
                    .iter()
                    .find(|member| member.package_type() != self.key.package_type())
                {
                    return Err(crate::Error::Validation(format!(
                        "group {} cannot contain {} of a different package type",
                        self.key, foreign
                    )));
                }
            }
            StoreKind::Remote(remote) => {
                if !(remote.url.starts_with("http://") || remote.url.starts_with("https://")) {
                    return Err(crate::Error::Validation(format!(
                        "remote {} has unsupported url: {}",
                        self.key, remote.url
                    )));
                }
            }
            StoreKind::Hosted(_) => {}
        }

        Ok(())
    }
}

fn dedup_keys(keys: impl IntoIterator<Item = StoreKey>) -> Vec<StoreKey> {
    let mut seen = HashSet::new();
    keys.into_iter()
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

fn deserialize_constituents<'de, D>(deserializer: D) -> Result<Vec<StoreKey>, D::Error>
where
    D: Deserializer<'de>,
{
    let keys = Vec::<StoreKey>::deserialize(deserializer)?;
    Ok(dedup_keys(keys))
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> StoreKey {
        StoreKey::parse(s).unwrap()
    }

    #[test]
    fn test_group_constituents_deduplicated() {
        let group = ArtifactStore::group(
            key("maven:group:public"),
            [
                key("maven:hosted:a"),
                key("maven:remote:b"),
                key("maven:hosted:a"),
                key("maven:hosted:c"),
            ],
        );
        assert_eq!(
            group.constituents().unwrap(),
            &[
                key("maven:hosted:a"),
                key("maven:remote:b"),
                key("maven:hosted:c")
            ]
        );
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{
            "key": "maven:group:public",
            "type": "group",
            "constituents": ["maven:hosted:a", "maven:hosted:a", "maven:remote:central"]
        }"#;
        let store: ArtifactStore = serde_json::from_str(json).unwrap();
        assert!(store.is_group());
        assert!(store.is_enabled());
        assert_eq!(store.constituents().unwrap().len(), 2);

        let hosted = ArtifactStore::hosted(key("npm:hosted:local"));
        let value = serde_json::to_value(&hosted).unwrap();
        assert_eq!(value["type"], "hosted");
        assert_eq!(value["key"], "npm:hosted:local");
        assert_eq!(value["allow_snapshots"], true);
    }

    #[test]
    fn test_validate_rejects_type_mismatch() {
        let store = ArtifactStore::hosted(key("maven:remote:central"));
        assert!(matches!(
            store.validate(),
            Err(crate::Error::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_self_reference() {
        let group = ArtifactStore::group(
            key("maven:group:g"),
            [key("maven:hosted:a"), key("maven:group:g")],
        );
        assert!(group.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_foreign_package_type() {
        let group = ArtifactStore::group(key("maven:group:g"), [key("npm:hosted:a")]);
        assert!(group.validate().is_err());
    }

    #[test]
    fn test_validate_remote_url() {
        let ok = ArtifactStore::remote(key("maven:remote:central"), "https://repo1.example.org/");
        assert!(ok.validate().is_ok());
        let bad = ArtifactStore::remote(key("maven:remote:central"), "ftp://example.org/");
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_writable() {
        let mut hosted = ArtifactStore::hosted(key("maven:hosted:a"));
        assert!(hosted.is_writable());
        if let StoreKind::Hosted(settings) = &mut hosted.kind {
            settings.readonly = true;
        }
        assert!(!hosted.is_writable());
        assert!(!ArtifactStore::remote(key("maven:remote:r"), "http://x").is_writable());
    }
}
