//! Gitea connection configuration.

use serde::{Deserialize, Serialize};

/// Where repositories come from and where they are checked out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiteaConfig {
    /// Base URL of the Gitea instance, without a trailing slash.
    #[serde(default = "default_url")]
    pub url: String,
    /// Browser-facing Gitea URL used in rendered READMEs, when it differs
    /// from `url`.
    #[serde(default)]
    pub public_url: Option<String>,
    /// Optional API token for private repositories.
    #[serde(default)]
    pub token: Option<String>,
    /// Directory holding Gitea's bare repositories (`<owner>/<repo>.git`).
    #[serde(default = "default_repositories_dir")]
    pub repositories_dir: String,
    /// Directory the processor clones working copies into.
    #[serde(default = "default_checkout_dir")]
    pub checkout_dir: String,
    /// Request timeout for Gitea API calls in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for GiteaConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            public_url: None,
            token: None,
            repositories_dir: default_repositories_dir(),
            checkout_dir: default_checkout_dir(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl GiteaConfig {
    /// The URL rendered READMEs link to.
    pub fn public_url(&self) -> &str {
        self.public_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(&self.url)
            .trim_end_matches('/')
    }
}

fn default_url() -> String {
    "http://gitea:3000".to_string()
}

fn default_repositories_dir() -> String {
    "/gitea-data/git/repositories".to_string()
}

fn default_checkout_dir() -> String {
    "./data/checkout".to_string()
}

fn default_request_timeout() -> u64 {
    10
}
