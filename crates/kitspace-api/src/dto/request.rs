//! Request DTOs.

use serde::Deserialize;

/// The parts of a Gitea push webhook payload the processor reads.
#[derive(Debug, Clone, Deserialize)]
pub struct GiteaPushEvent {
    /// Pushed ref, e.g. `refs/heads/main`.
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    /// Pushed repository.
    pub repository: GiteaRepository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GiteaRepository {
    /// Repository name.
    pub name: String,
    /// `owner/name`.
    #[serde(default)]
    pub full_name: String,
    /// Owning user or organisation.
    pub owner: GiteaOwner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GiteaOwner {
    /// Login name; older Gitea versions send `username` instead.
    #[serde(alias = "username")]
    pub login: String,
}

impl GiteaPushEvent {
    /// `(owner, repo)` of the pushed repository.
    pub fn repository(&self) -> (&str, &str) {
        match self.repository.full_name.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => (owner, repo),
            _ => (&self.repository.owner.login, &self.repository.name),
        }
    }
}
