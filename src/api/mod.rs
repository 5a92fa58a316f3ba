//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use routes::{create_router, AppState};

/// Build the application router
pub fn build_app(state: AppState) -> Router {
    // Order: context -> logging -> handler
    let api_routes = create_router().layer(
        ServiceBuilder::new()
            .layer(axum_middleware::from_fn(middleware::context_middleware))
            .layer(axum_middleware::from_fn(middleware::logging_middleware)),
    );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe
async fn health_check() -> &'static str {
    "OK"
}
