//! Asset download handler.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use kitspace_core::error::AppError;
use kitspace_core::types::identity::{AssetId, HEAD_REF};
use kitspace_entity::task::TaskStatus;

use crate::dto::response::AssetStatusResponse;
use crate::error::ApiErrorResponse;
use crate::state::AppState;

/// GET /files/{owner}/{repo}/{ref}/[{project}/]{asset}
///
/// | state                         | response                    |
/// |-------------------------------|-----------------------------|
/// | done                          | 200 with the bytes          |
/// | queued or running             | 202                         |
/// | failed                        | 424, no tool output         |
/// | `HEAD` with a processed head  | 302 to the commit path      |
/// | untracked but stored          | 200 with the bytes          |
/// | anything else                 | 404                         |
pub async fn file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let candidates =
        AssetId::candidates(&path).map_err(|e| AppError::not_found(e.message))?;
    let tracker = state.tracker();

    let requested = &candidates[0];
    let identity = requested.identity();
    if identity.is_head() {
        if let Some(head) = tracker
            .head(identity.owner(), identity.repo())
            .filter(|head| head != HEAD_REF)
        {
            let location = format!(
                "/files/{}/{}/{}/{}",
                identity.owner(),
                identity.repo(),
                head,
                requested.name()
            );
            return Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response());
        }
    }

    if let Some(asset) = tracker.resolve(&candidates) {
        return match tracker.status(&asset) {
            Some(TaskStatus::Done) => serve(&state, &asset).await,
            Some(status @ (TaskStatus::Queued | TaskStatus::Running)) => {
                Ok((StatusCode::ACCEPTED, Json(AssetStatusResponse { status })).into_response())
            }
            Some(TaskStatus::Failed) => Ok((
                StatusCode::FAILED_DEPENDENCY,
                Json(ApiErrorResponse {
                    error: "PROCESSING_FAILED".to_string(),
                    message: "Processing of this asset failed".to_string(),
                }),
            )
                .into_response()),
            None => Err(AppError::not_found(format!("Asset '{path}' not found"))),
        };
    }

    // Produced by an earlier run of the processor.
    for candidate in &candidates {
        if state.store().head(candidate).await? {
            return serve(&state, candidate).await;
        }
    }

    Err(AppError::not_found(format!("Asset '{path}' not found")))
}

async fn serve(state: &AppState, asset: &AssetId) -> Result<Response, AppError> {
    let data = state.store().get(asset).await?;
    let cache_control = if asset.identity().is_head() {
        "no-cache"
    } else {
        "public, max-age=31536000, immutable"
    };
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type(asset.name())),
            (header::CACHE_CONTROL, cache_control),
        ],
        data,
    )
        .into_response())
}

/// MIME type of an asset by extension.
pub fn content_type(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "html" => "text/html; charset=utf-8",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "zip" => "application/zip",
        "tsv" => "text/tab-separated-values; charset=utf-8",
        _ => "application/octet-stream",
    }
}
