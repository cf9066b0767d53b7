//! Store definition endpoints.

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{MAX_JSON_BODY_SIZE, change_summary, parse_json, store_key};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use depot_core::{ArtifactStore, StoreKey, StoreType};
use depot_metadata::{ExpandOptions, MetadataError, StoreQuery};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filters for listing stores.
#[derive(Debug, Default, Deserialize)]
pub struct ListStoresQuery {
    pub package_type: Option<String>,
    pub store_type: Option<String>,
    #[serde(default)]
    pub enabled_only: bool,
}

/// GET /v1/admin/stores
pub async fn list_stores(
    State(state): State<AppState>,
    Query(params): Query<ListStoresQuery>,
) -> ApiResult<Json<Vec<ArtifactStore>>> {
    let mut query = StoreQuery::default();
    if let Some(package_type) = params.package_type {
        query = query.package_type(package_type);
    }
    if let Some(store_type) = params.store_type.as_deref() {
        query = query.store_type(StoreType::parse(store_type)?);
    }
    if params.enabled_only {
        query = query.enabled_only();
    }

    let stores = state
        .stores()
        .query(&query)
        .into_iter()
        .map(|s| (*s).clone())
        .collect();
    Ok(Json(stores))
}

/// GET /v1/admin/stores/{package_type}/{store_type}/{name}
pub async fn get_store(
    State(state): State<AppState>,
    Path((package_type, store_type, name)): Path<(String, String, String)>,
) -> ApiResult<Json<ArtifactStore>> {
    let key = store_key(&package_type, &store_type, &name)?;
    let store = state.stores().get(&key)?;
    Ok(Json((*store).clone()))
}

/// PUT /v1/admin/stores/{package_type}/{store_type}/{name}
///
/// The body is a store definition. Its `key` may be omitted; if present it
/// must match the path.
pub async fn put_store(
    State(state): State<AppState>,
    Path((package_type, store_type, name)): Path<(String, String, String)>,
    req: Request,
) -> ApiResult<(StatusCode, Json<ArtifactStore>)> {
    let key = store_key(&package_type, &store_type, &name)?;
    let change = change_summary(req.headers(), format!("Updated {key} via API"));

    let bytes = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    let mut definition: Value = parse_json(&bytes)?;
    let Some(object) = definition.as_object_mut() else {
        return Err(ApiError::BadRequest(
            "store definition must be a JSON object".to_string(),
        ));
    };
    match object.get("key") {
        None => {
            object.insert("key".to_string(), Value::String(key.to_string()));
        }
        Some(given) => {
            let given: StoreKey = serde_json::from_value(given.clone())
                .map_err(|e| ApiError::BadRequest(format!("invalid store key: {e}")))?;
            if given != key {
                return Err(ApiError::BadRequest(format!(
                    "definition key {given} does not match path {key}"
                )));
            }
        }
    }
    let store: ArtifactStore = serde_json::from_value(definition)
        .map_err(|e| ApiError::BadRequest(format!("invalid store definition: {e}")))?;

    let previous = state.stores().put(store, change).await?;
    let saved = state.stores().get(&key)?;
    let status = if previous.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json((*saved).clone())))
}

/// DELETE /v1/admin/stores/{package_type}/{store_type}/{name}
pub async fn delete_store(
    State(state): State<AppState>,
    Path((package_type, store_type, name)): Path<(String, String, String)>,
    req: Request,
) -> ApiResult<StatusCode> {
    let key = store_key(&package_type, &store_type, &name)?;
    let change = change_summary(req.headers(), format!("Deleted {key} via API"));
    if state.stores().delete(&key, change).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(MetadataError::NotFound(key.to_string()).into())
    }
}

/// Options for expanding a store's membership.
#[derive(Debug, Default, Deserialize)]
pub struct MembersQuery {
    #[serde(default)]
    pub include_groups: bool,
    #[serde(default)]
    pub enabled_only: bool,
}

/// Expanded membership of a store.
#[derive(Debug, Serialize)]
pub struct MembersResponse {
    pub key: StoreKey,
    /// Stores in resolution order.
    pub members: Vec<StoreKey>,
    /// Referenced members that no longer exist.
    pub dangling: Vec<StoreKey>,
}

/// GET /v1/admin/stores/{package_type}/{store_type}/{name}/members
pub async fn get_members(
    State(state): State<AppState>,
    Path((package_type, store_type, name)): Path<(String, String, String)>,
    Query(params): Query<MembersQuery>,
) -> ApiResult<Json<MembersResponse>> {
    let key = store_key(&package_type, &store_type, &name)?;
    let expansion = state.stores().expand(
        &key,
        ExpandOptions {
            include_groups: params.include_groups,
            enabled_only: params.enabled_only,
        },
    )?;
    Ok(Json(MembersResponse {
        members: expansion.keys(),
        dangling: expansion.dangling,
        key,
    }))
}
