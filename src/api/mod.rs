//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use std::time::Duration;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use middleware::RateLimiter;
pub use routes::{create_legacy_router, create_router, AppState};

/// Build the application router with its middleware stack
pub fn build_router(state: AppState, rate_limiter: RateLimiter, request_timeout: Duration) -> Router {
    // Axum layers are applied in reverse order (last added = first executed)
    // Order: context -> logging -> rate_limit -> handler
    let api_routes = create_router()
        .merge(create_legacy_router())
        .layer(axum_middleware::from_fn_with_state(
            rate_limiter,
            middleware::rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(middleware::context_middleware));

    Router::new()
        // Health check (no middleware)
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
