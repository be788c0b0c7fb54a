//! Gitea push webhooks.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use kitspace_core::error::AppError;

use crate::dto::request::GiteaPushEvent;
use crate::dto::response::{ApiResponse, HookResponse};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-gitea-signature";
const EVENT_HEADER: &str = "x-gitea-event";

type HmacSha256 = Hmac<Sha256>;

/// Whether `signature` is the hex HMAC-SHA256 of `body` under `secret`.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// POST /hooks/gitea
///
/// Push events schedule the repository in the background; other events are
/// acknowledged and ignored.
pub async fn gitea(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let secret = state
        .config
        .api
        .webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::service_unavailable("Webhooks are not configured"))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::authentication("Missing webhook signature"))?;
    if !verify_signature(secret, &body, signature) {
        tracing::warn!("Rejected webhook with invalid signature");
        return Err(AppError::authentication("Invalid webhook signature"));
    }

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("push");
    if event != "push" {
        tracing::debug!(event, "Ignoring webhook event");
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let push: GiteaPushEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::validation(format!("Invalid push payload: {e}")))?;
    let (owner, repo) = push.repository();
    let (owner, repo) = (owner.to_string(), repo.to_string());
    let repository = format!("{owner}/{repo}");
    tracing::info!(%repository, git_ref = %push.git_ref, "Push webhook received");

    let pipeline = Arc::clone(&state.pipeline);
    tokio::spawn(async move {
        match pipeline.process_repo(&owner, &repo).await {
            Ok(handle) => {
                tracing::info!(%owner, %repo, tasks = handle.len(), "Pushed repository scheduled")
            }
            Err(e) => {
                tracing::warn!(%owner, %repo, error = %e, "Failed to process pushed repository")
            }
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok(HookResponse { repository })),
    )
        .into_response())
}
