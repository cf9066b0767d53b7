//! Content error types.

use depot_core::StoreKey;
use depot_metadata::MetadataError;
use depot_storage::StorageError;
use thiserror::Error;

fn format_failures(failures: &[(StoreKey, String)]) -> String {
    failures
        .iter()
        .map(|(key, reason)| format!("{key}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Content resolution, upload and promotion errors.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The normal negative result.
    #[error("not found: {0}")]
    NotFound(String),

    /// Every candidate store failed with an error rather than reporting the
    /// path absent.
    #[error("all upstreams failed for {path}: {}", format_failures(.failures))]
    AllUpstreamsFailed {
        path: String,
        failures: Vec<(StoreKey, String)>,
    },

    /// The target already holds different content at this path.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// No member document could be merged.
    #[error("merge error: {0}")]
    Merge(String),
}

impl ContentError {
    pub fn not_found(store: &StoreKey, path: &str) -> Self {
        Self::NotFound(format!("{path} in {store}"))
    }

    /// True for the "path is absent" outcome, as opposed to a failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Storage(e) => e.is_not_found(),
            Self::Metadata(MetadataError::NotFound(_)) => true,
            _ => false,
        }
    }
}

impl From<depot_core::Error> for ContentError {
    fn from(err: depot_core::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Result type for content operations.
pub type ContentResult<T> = std::result::Result<T, ContentError>;
