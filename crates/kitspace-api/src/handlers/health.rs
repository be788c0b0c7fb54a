//! Health check handlers.

use axum::Json;
use axum::extract::State;

use crate::dto::response::{ApiResponse, DetailedHealthResponse, HealthResponse};
use crate::state::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}

/// GET /health/detailed
pub async fn health_detailed(
    State(state): State<AppState>,
) -> Json<ApiResponse<DetailedHealthResponse>> {
    let storage_healthy = match state.store().health_check().await {
        Ok(healthy) => healthy,
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            false
        }
    };
    let scheduler = state.scheduler();
    let accepting = scheduler.is_accepting();
    let status = if storage_healthy && accepting {
        "ok"
    } else {
        "degraded"
    };

    Json(ApiResponse::ok(DetailedHealthResponse {
        status: status.to_string(),
        storage_provider: state.store().provider_type().to_string(),
        storage_healthy,
        accepting,
        tasks: scheduler.task_count(),
        tracked_assets: state.tracker().len(),
        scheduler: scheduler.metrics().snapshot(),
    }))
}
