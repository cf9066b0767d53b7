//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/v1/admin/stores", get(handlers::list_stores))
        .route(
            "/v1/admin/stores/{package_type}/{store_type}/{name}",
            get(handlers::get_store)
                .put(handlers::put_store)
                .delete(handlers::delete_store),
        )
        .route(
            "/v1/admin/stores/{package_type}/{store_type}/{name}/members",
            get(handlers::get_members),
        );

    let content_routes = Router::new()
        .route(
            "/v1/content/{package_type}/{store_type}/{name}/",
            get(handlers::get_root),
        )
        .route(
            "/v1/content/{package_type}/{store_type}/{name}/{*path}",
            get(handlers::get_content)
                .head(handlers::head_content)
                .put(handlers::put_content)
                .delete(handlers::delete_content),
        )
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_size));

    let promotion_routes = Router::new()
        .route("/v1/promotion/paths", post(handlers::promote_paths))
        .route(
            "/v1/promotion/paths/rollback",
            post(handlers::rollback_paths),
        )
        .route("/v1/promotion/groups", post(handlers::promote_to_group))
        .route(
            "/v1/promotion/groups/rollback",
            post(handlers::rollback_group),
        );

    Router::new()
        // Health check, for load balancers
        .route("/v1/health", get(handlers::health_check))
        .merge(admin_routes)
        .merge(content_routes)
        .merge(promotion_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
