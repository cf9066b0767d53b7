//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use depot_content::ContentError;
use depot_metadata::MetadataError;
use depot_storage::StorageError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("{0}")]
    Metadata(#[from] MetadataError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Core(#[from] depot_core::Error),
}

fn metadata_status(e: &MetadataError) -> (StatusCode, &'static str) {
    match e {
        MetadataError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        MetadataError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        MetadataError::StoreCycle { .. } => (StatusCode::CONFLICT, "store_cycle"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "metadata_error"),
    }
}

fn storage_status(e: &StorageError) -> (StatusCode, &'static str) {
    match e {
        StorageError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        StorageError::InvalidKey(_) => (StatusCode::BAD_REQUEST, "invalid_path"),
        StorageError::ReadOnly(_) => (StatusCode::BAD_REQUEST, "read_only"),
        StorageError::Http(_) | StorageError::Upstream { .. } => {
            (StatusCode::BAD_GATEWAY, "upstream_error")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
    }
}

impl ApiError {
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            Self::Content(e) => match e {
                ContentError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                ContentError::AllUpstreamsFailed { .. } => {
                    (StatusCode::BAD_GATEWAY, "upstreams_failed")
                }
                ContentError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
                ContentError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
                ContentError::Merge(_) => (StatusCode::BAD_GATEWAY, "merge_failed"),
                ContentError::Metadata(e) => metadata_status(e),
                ContentError::Storage(e) => storage_status(e),
            },
            Self::Metadata(e) => metadata_status(e),
            Self::Storage(e) => storage_status(e),
            Self::Core(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        }
    }

    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        self.classify().1
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), code, error = %self, "Request failed");
        }
        let body = ErrorResponse {
            code: code.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::StoreKey;

    #[test]
    fn test_status_mapping() {
        let cycle = MetadataError::StoreCycle {
            cycle: vec![StoreKey::parse("maven:group:a").unwrap()],
        };
        assert_eq!(ApiError::from(cycle).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(MetadataError::Validation("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );

        let failed = ContentError::AllUpstreamsFailed {
            path: "p".into(),
            failures: vec![],
        };
        let err = ApiError::from(failed);
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.code(), "upstreams_failed");

        let nested = ContentError::Metadata(MetadataError::NotFound("maven:hosted:x".into()));
        assert_eq!(ApiError::from(nested).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(ContentError::Conflict("p".into())).status_code(),
            StatusCode::CONFLICT
        );
    }
}
