//! `ApiToken` extractor: a bearer token from the Authorization header that
//! matches one of the configured API tokens.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use kitspace_core::error::AppError;

use crate::state::AppState;

/// Proof that the request carried an accepted bearer token.
#[derive(Debug, Clone, Copy)]
pub struct ApiToken;

impl FromRequestParts<AppState> for ApiToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::authentication("Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::authentication("Invalid Authorization header format"))?;

        if !state.config.api.accepts_token(token.trim()) {
            tracing::warn!(path = %parts.uri.path(), "Rejected API token");
            return Err(AppError::authentication("Invalid API token"));
        }

        Ok(ApiToken)
    }
}
