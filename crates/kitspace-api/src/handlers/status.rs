//! Status polling handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use kitspace_core::error::AppError;
use kitspace_core::types::identity::{AssetId, parse_identity_path};

use crate::dto::response::AssetStatusResponse;
use crate::state::AppState;

/// GET /status/{owner}/{repo}/{ref}/[{project}/]{asset}
///
/// A path naming a known asset answers with its status. Anything else is
/// read as an identity and answers with the run summary. A trailing slash
/// always selects the summary.
pub async fn status(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let tracker = state.tracker();

    if !path.ends_with('/') {
        if let Ok(candidates) = AssetId::candidates(&path) {
            let status = tracker
                .resolve(&candidates)
                .and_then(|asset| tracker.status(&asset));
            if let Some(status) = status {
                return Ok(Json(AssetStatusResponse { status }).into_response());
            }
        }
    }

    if let Ok(identity) = parse_identity_path(&path) {
        if let Some(summary) = tracker.summary(&identity) {
            return Ok(Json(summary).into_response());
        }
    }

    Err(AppError::not_found(format!("No status for '{path}'")))
}
