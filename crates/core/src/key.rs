//! Store identity: package type, store type and name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Package type for Maven repositories.
pub const MAVEN_PKG_KEY: &str = "maven";

/// Package type for npm registries.
pub const NPM_PKG_KEY: &str = "npm";

/// Package type for plain HTTP content.
pub const GENERIC_PKG_KEY: &str = "generic-http";

/// The three kinds of store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    /// A repository that accepts uploads and stores content locally.
    Hosted,
    /// A caching proxy in front of an upstream repository.
    Remote,
    /// An ordered aggregation of other stores.
    Group,
}

impl StoreType {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "hosted" => Ok(Self::Hosted),
            "remote" => Ok(Self::Remote),
            "group" => Ok(Self::Group),
            _ => Err(crate::Error::InvalidStoreKey(format!(
                "unknown store type: {s}"
            ))),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hosted => "hosted",
            Self::Remote => "remote",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a store: `(package_type, store_type, name)`.
///
/// Ordering and equality follow the tuple. The string form is
/// `package_type:store_type:name` and round-trips through [`StoreKey::parse`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoreKey {
    package_type: String,
    store_type: StoreType,
    name: String,
}

impl StoreKey {
    /// Create from components, validating each part.
    pub fn new(
        package_type: impl Into<String>,
        store_type: StoreType,
        name: impl Into<String>,
    ) -> crate::Result<Self> {
        let package_type = package_type.into();
        let name = name.into();
        validate_package_type(&package_type)?;
        validate_name(&name)?;
        Ok(Self {
            package_type,
            store_type,
            name,
        })
    }

    /// Shorthand for a hosted store key.
    pub fn hosted(package_type: &str, name: &str) -> crate::Result<Self> {
        Self::new(package_type, StoreType::Hosted, name)
    }

    /// Shorthand for a remote store key.
    pub fn remote(package_type: &str, name: &str) -> crate::Result<Self> {
        Self::new(package_type, StoreType::Remote, name)
    }

    /// Shorthand for a group key.
    pub fn group(package_type: &str, name: &str) -> crate::Result<Self> {
        Self::new(package_type, StoreType::Group, name)
    }

    /// Parse the `package_type:store_type:name` form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let mut parts = s.splitn(3, ':');
        let (Some(package_type), Some(store_type), Some(name)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(crate::Error::InvalidStoreKey(format!(
                "expected package_type:store_type:name, got {s}"
            )));
        };
        Self::new(package_type, StoreType::parse(store_type)?, name)
    }

    pub fn package_type(&self) -> &str {
        &self.package_type
    }

    pub fn store_type(&self) -> StoreType {
        self.store_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_group(&self) -> bool {
        self.store_type == StoreType::Group
    }
}

fn validate_package_type(package_type: &str) -> crate::Result<()> {
    if package_type.is_empty() {
        return Err(crate::Error::InvalidStoreKey(
            "package type cannot be empty".to_string(),
        ));
    }
    for c in package_type.chars() {
        if !matches!(c, 'a'..='z' | '0'..='9' | '-') {
            return Err(crate::Error::InvalidStoreKey(format!(
                "invalid character in package type: {c}"
            )));
        }
    }
    Ok(())
}

fn validate_name(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(crate::Error::InvalidStoreKey(
            "store name cannot be empty".to_string(),
        ));
    }
    if name.starts_with('.') {
        return Err(crate::Error::InvalidStoreKey(format!(
            "store name cannot start with '.': {name}"
        )));
    }
    for c in name.chars() {
        if !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.') {
            return Err(crate::Error::InvalidStoreKey(format!(
                "invalid character in store name: {c}"
            )));
        }
    }
    Ok(())
}

impl TryFrom<String> for StoreKey {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<StoreKey> for String {
    fn from(key: StoreKey) -> Self {
        key.to_string()
    }
}

impl std::str::FromStr for StoreKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey({self})")
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.package_type, self.store_type, self.name)
    }
}
