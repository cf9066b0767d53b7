//! Promotion endpoints.

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{MAX_JSON_BODY_SIZE, parse_json};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Request, State};
use depot_core::{
    GroupPromotionRequest, GroupPromotionResult, PromotionRequest, PromotionResult,
};

/// POST /v1/promotion/paths
///
/// Runs the promotion to completion and returns its result. Per-path
/// failures are reported in the result, not as an error status.
pub async fn promote_paths(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<PromotionResult>> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    let request: PromotionRequest = parse_json(&bytes)?;
    let result = state.promotions.promote(request).await?;
    Ok(Json(result))
}

/// POST /v1/promotion/paths/rollback
///
/// The body is a result previously returned by a promotion.
pub async fn rollback_paths(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<PromotionResult>> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY_SIZE * 16)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    let result: PromotionResult = parse_json(&bytes)?;
    let rolled = state.promotions.rollback(&result).await?;
    Ok(Json(rolled))
}

/// POST /v1/promotion/groups
///
/// Adds the source store to the end of the target group's membership.
pub async fn promote_to_group(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<GroupPromotionResult>> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    let request: GroupPromotionRequest = parse_json(&bytes)?;
    let result = state.promotions.promote_to_group(request).await?;
    Ok(Json(result))
}

/// POST /v1/promotion/groups/rollback
pub async fn rollback_group(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<GroupPromotionResult>> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    let result: GroupPromotionResult = parse_json(&bytes)?;
    let rolled = state.promotions.rollback_group(&result).await?;
    Ok(Json(rolled))
}
