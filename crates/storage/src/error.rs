//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream {url} returned {status}")]
    Upstream { url: String, status: u16 },

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("backend is read-only: {0}")]
    ReadOnly(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// True for the "object is absent" outcome, as opposed to a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
