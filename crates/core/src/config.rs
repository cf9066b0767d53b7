//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted upload body size in bytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_upload_size() -> usize {
    512 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// Storage backend for hosted store content.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage. Each hosted store gets `<path>/<package_type>/<name>`.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// Process memory. Content is lost on restart.
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("storage.path cannot be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Where store definitions are persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// Definitions live only in memory.
    Memory,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { path } if path.as_os_str().is_empty() => {
                Err("metadata.path cannot be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Content resolution and indexing configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Budget for a single upstream lookup, in seconds, when the remote
    /// store does not set its own.
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
    /// Consult and populate the content index.
    #[serde(default = "default_index_enabled")]
    pub index_enabled: bool,
    /// Remember negative lookups on groups until the next invalidation.
    #[serde(default)]
    pub cache_missing: bool,
}

fn default_upstream_timeout_secs() -> u64 {
    30
}

fn default_index_enabled() -> bool {
    true
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            upstream_timeout_secs: default_upstream_timeout_secs(),
            index_enabled: default_index_enabled(),
            cache_missing: false,
        }
    }
}

impl ContentConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.upstream_timeout_secs == 0 {
            return Err("content.upstream_timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Promotion configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromotionConfig {
    /// Number of paths processed per batch.
    #[serde(default = "default_promotion_batch_size")]
    pub batch_size: usize,
}

fn default_promotion_batch_size() -> usize {
    100
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_promotion_batch_size(),
        }
    }
}

impl PromotionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("promotion.batch_size must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub promotion: PromotionConfig,
}

impl AppConfig {
    /// Create a test configuration.
    ///
    /// **For testing only.** Keeps everything in memory.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::Memory,
            metadata: MetadataConfig::Memory,
            content: ContentConfig {
                upstream_timeout_secs: 5,
                ..ContentConfig::default()
            },
            promotion: PromotionConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.metadata.validate()?;
        self.content.validate()?;
        self.promotion.validate()?;
        Ok(())
    }
}
