//! Repository sync against Gitea.
//!
//! Each repository has one long-lived clone that is fast-forwarded on every
//! sync. Converters read from a detached worktree per commit, so a later
//! pull never changes the files of a run that is still in flight.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use kitspace_core::config::gitea::GiteaConfig;
use kitspace_core::error::AppError;
use kitspace_core::result::AppResult;
use kitspace_core::shell::{ShellCommand, ShellError};
use kitspace_core::traits::CommandRunner;
use kitspace_entity::project::RepoInfo;

use crate::converter::TaskError;
use crate::retry::RetryPolicy;

/// Stderr of `git pull` in a repository without any branch yet.
const EMPTY_REPO_PULL_ERROR: &str = "no such ref was fetched";

/// Timeout for a single git invocation.
const GIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Repository fields read from `GET /api/v1/repos/{owner}/{repo}`.
#[derive(Debug, Deserialize)]
struct GiteaRepo {
    #[serde(default)]
    description: String,
    #[serde(default)]
    default_branch: String,
    #[serde(default)]
    original_url: String,
    #[serde(default)]
    empty: bool,
}

/// Minimal Gitea REST client.
#[derive(Debug, Clone)]
pub struct GiteaClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GiteaClient {
    /// Create a client for the configured instance.
    pub fn new(config: &GiteaConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Base URL of the instance.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// HTTP(S) clone URL of a repository.
    pub fn clone_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/{owner}/{repo}.git", self.base_url)
    }

    /// Repository metadata, `None` when Gitea does not know the repository.
    pub async fn repo_info(&self, owner: &str, repo: &str) -> AppResult<Option<RepoInfo>> {
        let url = format!("{}/api/v1/repos/{owner}/{repo}", self.base_url);
        let mut request = self.http.get(&url);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {token}"));
        }

        let response = request.send().await.map_err(|e| {
            AppError::external_service(format!("Gitea request for {owner}/{repo} failed: {e}"))
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::external_service(format!(
                "Gitea returned {} for {owner}/{repo}",
                response.status()
            )));
        }

        let repo_json: GiteaRepo = response.json().await.map_err(|e| {
            AppError::external_service(format!("Invalid Gitea response for {owner}/{repo}: {e}"))
        })?;
        if repo_json.empty {
            tracing::debug!(owner, repo, "Gitea reports an empty repository");
        }

        Ok(Some(repo_json.into_repo_info()))
    }
}

impl GiteaRepo {
    fn into_repo_info(self) -> RepoInfo {
        RepoInfo {
            description: self.description,
            default_branch: self.default_branch,
            original_url: Some(self.original_url).filter(|url| !url.is_empty()),
        }
    }
}

/// A working copy pinned to one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedRepo {
    /// Full commit SHA.
    pub git_ref: String,
    /// Detached worktree at `git_ref`.
    pub checkout_dir: PathBuf,
}

/// Clones, pulls and pins repositories through the shell executor.
#[derive(Debug, Clone)]
pub struct RepoSync {
    shell: Arc<dyn CommandRunner>,
    checkout_root: PathBuf,
    retry: RetryPolicy,
}

impl RepoSync {
    /// Create a syncer that keeps working copies under `checkout_root`.
    pub fn new(
        shell: Arc<dyn CommandRunner>,
        checkout_root: impl Into<PathBuf>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            shell,
            checkout_root: checkout_root.into(),
            retry,
        }
    }

    /// Directory of the long-lived clone of `owner/repo`.
    pub fn clone_dir(&self, owner: &str, repo: &str) -> PathBuf {
        self.checkout_root
            .join(owner.to_lowercase())
            .join(repo.to_lowercase())
            .join("repo")
    }

    /// Directory of the worktree of `owner/repo` at `git_ref`.
    pub fn worktree_dir(&self, owner: &str, repo: &str, git_ref: &str) -> PathBuf {
        self.checkout_root
            .join(owner.to_lowercase())
            .join(repo.to_lowercase())
            .join(git_ref)
    }

    /// Bring the clone up to date with `source` and pin its head commit.
    ///
    /// Clone and pull failures are retried as transient. A repository
    /// without commits fails permanently.
    pub async fn sync(&self, owner: &str, repo: &str, source: &str) -> Result<SyncedRepo, TaskError> {
        let clone_dir = self.clone_dir(owner, repo);

        self.retry
            .run("git sync", |_| {
                let clone_dir = clone_dir.as_path();
                async move { self.update_clone(source, clone_dir).await }
            })
            .await?;

        let git_ref = self.head_commit(&clone_dir).await.map_err(|e| {
            TaskError::Permanent(format!("{owner}/{repo} has no commits yet: {e}"))
        })?;

        let checkout_dir = self.worktree_dir(owner, repo, &git_ref);
        if !checkout_dir.is_dir() {
            self.shell
                .run(
                    &ShellCommand::new("git")
                        .args(["worktree", "add", "--force", "--detach"])
                        .path_arg(&checkout_dir)
                        .arg(git_ref.as_str())
                        .current_dir(&clone_dir)
                        .timeout(GIT_TIMEOUT),
                )
                .await?;
        }

        tracing::info!(owner, repo, git_ref = %git_ref, "Repository synced");
        Ok(SyncedRepo {
            git_ref,
            checkout_dir,
        })
    }

    /// Remove the worktree at `checkout_dir` once no run reads it.
    ///
    /// Falls back to deleting the directory when git refuses; the next
    /// `worktree add --force` replaces the stale registration.
    pub async fn remove_worktree(&self, owner: &str, repo: &str, checkout_dir: &Path) {
        let remove = ShellCommand::new("git")
            .args(["worktree", "remove", "--force"])
            .path_arg(checkout_dir)
            .current_dir(self.clone_dir(owner, repo))
            .timeout(GIT_TIMEOUT);
        match self.shell.run(&remove).await {
            Ok(_) => tracing::debug!(dir = %checkout_dir.display(), "Removed worktree"),
            Err(e) => {
                tracing::warn!(dir = %checkout_dir.display(), error = %e, "git worktree remove failed");
                match tokio::fs::remove_dir_all(checkout_dir).await {
                    Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                        tracing::warn!(dir = %checkout_dir.display(), error = %e, "Failed to delete worktree");
                    }
                    _ => {}
                }
            }
        }
    }

    async fn update_clone(&self, source: &str, clone_dir: &Path) -> Result<(), TaskError> {
        if clone_dir.join(".git").exists() {
            let pull = ShellCommand::new("git")
                .args(["pull", "--ff-only"])
                .current_dir(clone_dir)
                .timeout(GIT_TIMEOUT);
            match self.shell.run(&pull).await {
                Ok(_) => Ok(()),
                Err(ShellError::NonZeroExit { stderr, .. })
                    if stderr.contains(EMPTY_REPO_PULL_ERROR) =>
                {
                    tracing::warn!(dir = %clone_dir.display(), "Repository without any branches");
                    Ok(())
                }
                Err(e) => Err(TaskError::Transient(e.to_string())),
            }
        } else {
            if let Some(parent) = clone_dir.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let clone = ShellCommand::new("git")
                .arg("clone")
                .arg(source)
                .path_arg(clone_dir)
                .timeout(GIT_TIMEOUT);
            self.shell
                .run(&clone)
                .await
                .map_err(|e| TaskError::Transient(e.to_string()))?;
            tracing::debug!(source, dir = %clone_dir.display(), "Cloned repository");
            Ok(())
        }
    }

    /// Commit SHA that `HEAD` points to in `git_dir` (a clone or bare repo).
    pub async fn head_commit(&self, git_dir: &Path) -> Result<String, ShellError> {
        let output = self
            .shell
            .run(
                &ShellCommand::new("git")
                    .args(["rev-parse", "HEAD"])
                    .current_dir(git_dir)
                    .timeout(GIT_TIMEOUT),
            )
            .await?;
        Ok(output.stdout.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use kitspace_core::shell::ShellOutput;

    const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

    #[derive(Debug, Default)]
    struct ScriptedShell {
        commands: Mutex<Vec<String>>,
        pull_stderr: Option<&'static str>,
    }

    impl ScriptedShell {
        fn commands(&self) -> Vec<String> {
            self.commands.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedShell {
        async fn run(&self, command: &ShellCommand) -> Result<ShellOutput, ShellError> {
            let line = command.render();
            self.commands.lock().expect("lock").push(line.clone());
            if line.contains("rev-parse") {
                return Ok(ShellOutput {
                    stdout: format!("{SHA}\n"),
                    ..ShellOutput::default()
                });
            }
            if line.contains("pull") {
                if let Some(stderr) = self.pull_stderr {
                    return Err(ShellError::NonZeroExit {
                        command: line,
                        code: 1,
                        stderr: stderr.to_string(),
                        stdout: String::new(),
                    });
                }
            }
            Ok(ShellOutput::default())
        }
    }

    #[tokio::test]
    async fn test_first_sync_clones_then_pins_worktree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shell = Arc::new(ScriptedShell::default());
        let sync = RepoSync::new(shell.clone(), dir.path(), RetryPolicy::default());

        let synced = sync
            .sync("Owner", "Board", "http://gitea:3000/owner/board.git")
            .await
            .expect("sync");

        assert_eq!(synced.git_ref, SHA);
        assert_eq!(synced.checkout_dir, dir.path().join("owner/board").join(SHA));
        let commands = shell.commands();
        assert!(commands[0].starts_with("git clone 'http://gitea:3000/owner/board.git' "));
        assert_eq!(commands[1], "git rev-parse HEAD");
        assert!(commands[2].starts_with("git worktree add --force --detach"));
        assert!(commands[2].ends_with(SHA));
    }

    #[tokio::test]
    async fn test_existing_clone_is_pulled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shell = Arc::new(ScriptedShell::default());
        let sync = RepoSync::new(shell.clone(), dir.path(), RetryPolicy::default());
        std::fs::create_dir_all(sync.clone_dir("o", "r").join(".git")).expect("mkdir");
        std::fs::create_dir_all(sync.worktree_dir("o", "r", SHA)).expect("mkdir");

        sync.sync("o", "r", "unused").await.expect("sync");

        assert_eq!(shell.commands(), vec!["git pull --ff-only", "git rev-parse HEAD"]);
    }

    #[tokio::test]
    async fn test_remove_worktree_runs_in_clone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shell = Arc::new(ScriptedShell::default());
        let sync = RepoSync::new(shell.clone(), dir.path(), RetryPolicy::default());
        let worktree = sync.worktree_dir("o", "r", SHA);

        sync.remove_worktree("o", "r", &worktree).await;

        let commands = shell.commands();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].starts_with("git worktree remove --force "));
        assert!(commands[0].ends_with(SHA));
    }

    #[tokio::test]
    async fn test_pull_of_branchless_repo_is_tolerated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shell = Arc::new(ScriptedShell {
            pull_stderr: Some(
                "Your configuration specifies to merge with the ref 'refs/heads/master'\n\
                 from the remote, but no such ref was fetched.\n",
            ),
            ..ScriptedShell::default()
        });
        let sync = RepoSync::new(shell.clone(), dir.path(), RetryPolicy::default());
        std::fs::create_dir_all(sync.clone_dir("o", "r").join(".git")).expect("mkdir");

        let synced = sync.sync("o", "r", "unused").await.expect("sync");
        assert_eq!(synced.git_ref, SHA);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_failure_is_retried_then_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shell = Arc::new(ScriptedShell {
            pull_stderr: Some("fatal: unable to access remote"),
            ..ScriptedShell::default()
        });
        let sync = RepoSync::new(shell.clone(), dir.path(), RetryPolicy::default());
        std::fs::create_dir_all(sync.clone_dir("o", "r").join(".git")).expect("mkdir");

        let err = sync.sync("o", "r", "unused").await.expect_err("fails");
        assert!(err.is_transient());
        assert_eq!(
            shell.commands().iter().filter(|c| c.contains("pull")).count(),
            3
        );
    }

    #[test]
    fn test_repo_info_from_gitea_json() {
        let repo: GiteaRepo = serde_json::from_str(
            r#"{"id": 3, "description": "A keyboard", "default_branch": "main",
                "original_url": "", "empty": false, "mirror": false}"#,
        )
        .expect("parse");
        let info = repo.into_repo_info();
        assert_eq!(info.description, "A keyboard");
        assert_eq!(info.default_branch, "main");
        assert_eq!(info.original_url, None);
    }

    #[test]
    fn test_clone_url() {
        let client = GiteaClient::new(&GiteaConfig {
            url: "http://gitea:3000/".to_string(),
            ..GiteaConfig::default()
        })
        .expect("client");
        assert_eq!(client.clone_url("o", "r"), "http://gitea:3000/o/r.git");
    }
}
