//! Route definitions for the processor HTTP API.

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the Axum router with all routes and the request logger.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(polling_routes())
        .merge(trigger_routes())
        .merge(health_routes())
        .layer(axum_middleware::from_fn(
            middleware::logging::request_logging,
        ))
        .with_state(state)
}

/// Status and asset polling
fn polling_routes() -> Router<AppState> {
    Router::new()
        .route("/status/{*path}", get(handlers::status::status))
        .route("/files/{*path}", get(handlers::files::file))
}

/// Processing triggers
fn trigger_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/process/{owner}/{repo}",
            post(handlers::process::process_repo),
        )
        .route("/hooks/gitea", post(handlers::hooks::gitea))
}

fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/health/detailed", get(handlers::health::health_detailed))
}
