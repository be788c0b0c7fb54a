//! A unit of processing: one project of one repository at one commit.

use std::path::PathBuf;

use kitspace_core::ContentIdentity;
use serde::{Deserialize, Serialize};

use super::manifest::{KitspaceYaml, Project};

/// Repository metadata fetched from Gitea.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    /// Repository description, the fallback project summary.
    pub description: String,
    /// Default branch name.
    pub default_branch: String,
    /// Upstream URL when the repository is a mirror.
    pub original_url: Option<String>,
}

/// Everything a converter needs to know about the project it processes.
#[derive(Debug, Clone)]
pub struct ProjectJob {
    /// Identity the produced assets belong to.
    pub identity: ContentIdentity,
    /// Working copy of the repository at `identity.git_ref()`.
    pub checkout_dir: PathBuf,
    /// The project being processed.
    pub project: Project,
    /// The whole manifest, for repo-level assets.
    pub kitspace_yaml: KitspaceYaml,
    /// Gitea metadata.
    pub repo: RepoInfo,
}

impl ProjectJob {
    /// Build the job for `project` at the repo-level identity `repo_identity`.
    pub fn new(
        repo_identity: &ContentIdentity,
        checkout_dir: PathBuf,
        project: Project,
        kitspace_yaml: KitspaceYaml,
        repo: RepoInfo,
    ) -> Self {
        let identity = if project.is_single() {
            repo_identity.repo_level()
        } else {
            repo_identity.with_project(project.name.clone())
        };
        Self {
            identity,
            checkout_dir,
            project,
            kitspace_yaml,
            repo,
        }
    }

    /// Human-readable name: the sub-project name or the repository name.
    pub fn display_name(&self) -> &str {
        if self.project.is_single() {
            self.identity.repo()
        } else {
            &self.project.name
        }
    }
}
