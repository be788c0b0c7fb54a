//! Trigger API configuration.

use serde::{Deserialize, Serialize};

/// Credentials accepted by the processing trigger endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bearer tokens accepted by `POST /process/...`.
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Shared secret Gitea sends with push webhooks.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

impl ApiConfig {
    /// Whether `token` is one of the configured bearer tokens.
    pub fn accepts_token(&self, token: &str) -> bool {
        !token.is_empty() && self.tokens.iter().any(|t| t == token)
    }
}
