//! Route configuration and setup

use crate::handlers::{artifacts, health};
use crate::state::AppState;
use axum::{
    http::Method,
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn setup_routes(state: Arc<AppState>) -> Router<()> {
    // Browsers may read artifacts cross-origin; writes stay same-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD]);

    let http_concurrency_limit = std::env::var("HTTP_CONCURRENCY_LIMIT")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10_000)
        .max(1);

    let artifact_routes = get(artifacts::get_artifact)
        .put(artifacts::put_artifact)
        .post(artifacts::put_artifact)
        .delete(artifacts::delete_artifact);

    Router::new()
        .route("/-/health", get(health::health_check))
        .route("/{repository}", artifact_routes.clone())
        .route("/{repository}/", artifact_routes.clone())
        .route("/{repository}/{*path}", artifact_routes)
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
