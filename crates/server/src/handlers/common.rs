//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use axum::body::Bytes;
use axum::http::HeaderMap;
use depot_core::{ChangeSummary, StoreKey, StoreType};
use serde::de::DeserializeOwned;

/// Header naming the user responsible for a definition change.
pub const CHANGE_USER_HEADER: &str = "x-change-user";

/// Header carrying a free-text reason for a definition change.
pub const CHANGE_REASON_HEADER: &str = "x-change-reason";

/// Maximum request body size for JSON endpoints (1 MiB).
pub const MAX_JSON_BODY_SIZE: usize = 1024 * 1024;

/// Build a store key from the `{package_type}/{store_type}/{name}` path segments.
pub fn store_key(package_type: &str, store_type: &str, name: &str) -> ApiResult<StoreKey> {
    Ok(StoreKey::new(
        package_type,
        StoreType::parse(store_type)?,
        name,
    )?)
}

/// The change summary for a mutating request, from the change headers.
pub fn change_summary(headers: &HeaderMap, default_reason: impl Into<String>) -> ChangeSummary {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    ChangeSummary::new(
        header(CHANGE_USER_HEADER).unwrap_or_else(|| "anonymous".to_string()),
        header(CHANGE_REASON_HEADER).unwrap_or_else(|| default_reason.into()),
    )
}

/// Decode a JSON body, reporting problems as bad requests.
pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}
