//! Content endpoints: resolve, upload and delete artifacts.

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::store_key;
use crate::state::AppState;
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use depot_content::TransferBody;
use depot_core::{NPM_PKG_KEY, StoreKey};
use serde::Serialize;

/// Response header naming the store that supplied the content.
pub const ORIGIN_HEADER: &str = "x-depot-origin";

/// Directory listing body.
#[derive(Debug, Serialize)]
pub struct DirectoryListing {
    pub path: String,
    pub origin: StoreKey,
    pub children: Vec<String>,
}

fn content_type_for(key: &StoreKey, path: &str) -> &'static str {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.').map(|(_, ext)| ext) {
        Some("xml" | "pom") => "application/xml",
        Some("json") => "application/json",
        Some("jar" | "war" | "ear") => "application/java-archive",
        Some("tgz") => "application/gzip",
        Some("sha1" | "sha256" | "sha512" | "md5" | "asc" | "txt") => "text/plain",
        _ if key.package_type() == NPM_PKG_KEY && !path.contains("/-/") => "application/json",
        _ => "application/octet-stream",
    }
}

async fn resolve(state: &AppState, key: StoreKey, path: &str) -> ApiResult<Response> {
    let transfer = state.content.retrieve(&key, path).await?;
    let origin = HeaderValue::from_str(&transfer.origin.to_string())
        .map_err(|e| ApiError::Internal(format!("unrepresentable origin: {e}")))?;

    let mut response = match transfer.body {
        TransferBody::Directory(children) => Json(DirectoryListing {
            path: transfer.path,
            origin: transfer.origin,
            children,
        })
        .into_response(),
        TransferBody::Bytes(data) => {
            ([(CONTENT_TYPE, content_type_for(&key, path))], data).into_response()
        }
        TransferBody::Stream(stream) => (
            [(CONTENT_TYPE, content_type_for(&key, path))],
            Body::from_stream(stream),
        )
            .into_response(),
    };

    response.headers_mut().insert(ORIGIN_HEADER, origin);
    Ok(response)
}

/// GET /v1/content/{package_type}/{store_type}/{name}/{*path}
///
/// Paths ending in `/` return a JSON directory listing.
pub async fn get_content(
    State(state): State<AppState>,
    Path((package_type, store_type, name, path)): Path<(String, String, String, String)>,
) -> ApiResult<Response> {
    let key = store_key(&package_type, &store_type, &name)?;
    resolve(&state, key, &path).await
}

/// GET /v1/content/{package_type}/{store_type}/{name}/
pub async fn get_root(
    State(state): State<AppState>,
    Path((package_type, store_type, name)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    let key = store_key(&package_type, &store_type, &name)?;
    resolve(&state, key, "/").await
}

/// HEAD /v1/content/{package_type}/{store_type}/{name}/{*path}
pub async fn head_content(
    State(state): State<AppState>,
    Path((package_type, store_type, name, path)): Path<(String, String, String, String)>,
) -> ApiResult<StatusCode> {
    let key = store_key(&package_type, &store_type, &name)?;
    if state.content.exists(&key, &path).await? {
        Ok(StatusCode::OK)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

/// PUT /v1/content/{package_type}/{store_type}/{name}/{*path}
pub async fn put_content(
    State(state): State<AppState>,
    Path((package_type, store_type, name, path)): Path<(String, String, String, String)>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let key = store_key(&package_type, &store_type, &name)?;
    state.content.store(&key, &path, body).await?;
    Ok(StatusCode::CREATED)
}

/// DELETE /v1/content/{package_type}/{store_type}/{name}/{*path}
pub async fn delete_content(
    State(state): State<AppState>,
    Path((package_type, store_type, name, path)): Path<(String, String, String, String)>,
) -> ApiResult<StatusCode> {
    let key = store_key(&package_type, &store_type, &name)?;
    if state.content.delete(&key, &path).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("{path} not found in {key}")))
    }
}
