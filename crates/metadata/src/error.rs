//! Metadata error types.

use depot_core::StoreKey;
use thiserror::Error;

fn format_cycle(cycle: &[StoreKey]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Store definition and membership errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("store not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("store cycle detected: {}", format_cycle(.cycle))]
    StoreCycle { cycle: Vec<StoreKey> },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<depot_core::Error> for MetadataError {
    fn from(err: depot_core::Error) -> Self {
        match err {
            depot_core::Error::InvalidStoreKey(_) | depot_core::Error::Validation(_) => {
                Self::Validation(err.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
