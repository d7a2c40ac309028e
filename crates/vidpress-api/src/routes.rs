//! Router assembly.

use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::content::serve_content;
use crate::handlers::{admin_jobs, admin_webhook, compress, health, status};
use crate::middleware::{
    api_key_auth, cors_layer, rate_limit_middleware, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/compress", post(compress))
        .route("/status", get(status))
        .route("/webhook", post(admin_webhook))
        .route("/admin/jobs", get(admin_jobs))
        .layer(middleware::from_fn_with_state(state.clone(), api_key_auth));

    let rate_limiter = Arc::new(RateLimiterCache::new(
        state.config.rate_limit_requests,
        Duration::from_secs(state.config.rate_limit_window_secs),
    ));

    let api_routes = Router::new()
        .merge(protected)
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    Router::new()
        .nest("/api", api_routes)
        .route("/content/*path", get(serve_content))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
