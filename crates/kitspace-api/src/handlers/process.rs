//! Authenticated processing trigger.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use kitspace_core::error::AppError;

use crate::dto::response::{ApiResponse, ProcessResponse};
use crate::extractors::ApiToken;
use crate::state::AppState;

/// POST /process/{owner}/{repo}
///
/// Syncs the repository and enqueues every project at its head commit.
pub async fn process_repo(
    State(state): State<AppState>,
    _token: ApiToken,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<(StatusCode, Json<ApiResponse<ProcessResponse>>), AppError> {
    if !state.scheduler().is_accepting() {
        return Err(AppError::service_unavailable("Processor is shutting down"));
    }

    let handle = state.pipeline.process_repo(&owner, &repo).await?;
    let identities: Vec<String> = handle.identities().iter().map(|i| i.prefix()).collect();
    tracing::info!(%owner, %repo, tasks = handle.len(), "Processing triggered");

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok(ProcessResponse {
            repository: format!("{owner}/{repo}"),
            identities,
        })),
    ))
}
