//! Repository processing pipeline.
//!
//! sync → resolve commit → read `kitspace.yaml` → one job per project →
//! enqueue every registered category → remove the worktree once the run is
//! finished.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use kitspace_core::error::AppError;
use kitspace_core::result::AppResult;
use kitspace_core::types::identity::ContentIdentity;
use kitspace_entity::asset::AssetCategory;
use kitspace_entity::project::{KitspaceYaml, ProjectJob, RepoInfo};

use crate::scheduler::{RunHandle, TaskScheduler};
use crate::sync::{GiteaClient, RepoSync};

/// Turns "process this repository" into scheduled tasks.
#[derive(Debug)]
pub struct ProcessingPipeline {
    scheduler: TaskScheduler,
    sync: RepoSync,
    gitea: Option<GiteaClient>,
    repositories_dir: PathBuf,
    repo_locks: DashMap<(String, String), Arc<Mutex<()>>>,
    /// Unfinished runs per worktree. Only touched under the repo lock.
    worktree_users: Arc<DashMap<PathBuf, usize>>,
}

impl ProcessingPipeline {
    /// Create a pipeline.
    ///
    /// Without a Gitea client, repositories are only read from
    /// `repositories_dir` and no metadata is fetched.
    pub fn new(
        scheduler: TaskScheduler,
        sync: RepoSync,
        gitea: Option<GiteaClient>,
        repositories_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            scheduler,
            sync,
            gitea,
            repositories_dir: repositories_dir.into(),
            repo_locks: DashMap::new(),
            worktree_users: Arc::new(DashMap::new()),
        }
    }

    /// The scheduler tasks are enqueued on.
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// The repository syncer.
    pub fn repo_sync(&self) -> &RepoSync {
        &self.sync
    }

    /// Directory of Gitea's bare repositories.
    pub fn repositories_dir(&self) -> &Path {
        &self.repositories_dir
    }

    /// Bare repository of `owner/repo` on the local Gitea volume.
    pub fn bare_repo(&self, owner: &str, repo: &str) -> PathBuf {
        self.repositories_dir
            .join(owner.to_lowercase())
            .join(format!("{}.git", repo.to_lowercase()))
    }

    fn source_for(&self, owner: &str, repo: &str) -> AppResult<String> {
        let bare = self.bare_repo(owner, repo);
        if bare.is_dir() {
            return Ok(bare.to_string_lossy().into_owned());
        }
        match &self.gitea {
            Some(gitea) => Ok(gitea.clone_url(owner, repo)),
            None => Err(AppError::not_found(format!(
                "repository {owner}/{repo} not found"
            ))),
        }
    }

    async fn repo_info(&self, owner: &str, repo: &str) -> AppResult<RepoInfo> {
        let Some(gitea) = &self.gitea else {
            return Ok(RepoInfo::default());
        };
        match gitea.repo_info(owner, repo).await {
            Ok(Some(info)) => Ok(info),
            Ok(None) => Err(AppError::not_found(format!(
                "repository {owner}/{repo} not found in Gitea"
            ))),
            Err(e) => {
                tracing::warn!(owner, repo, error = %e, "Gitea metadata unavailable, using defaults");
                Ok(RepoInfo::default())
            }
        }
    }

    /// Sync `owner/repo` and enqueue every project at its head commit.
    ///
    /// Syncs of one repository are serialised; different repositories
    /// proceed in parallel.
    pub async fn process_repo(&self, owner: &str, repo: &str) -> AppResult<RunHandle> {
        let key = (owner.to_lowercase(), repo.to_lowercase());
        let lock = Arc::clone(self.repo_locks.entry(key).or_default().value());
        let _guard = lock.lock().await;

        let info = self.repo_info(owner, repo).await?;
        let source = self.source_for(owner, repo)?;
        let synced = self.sync.sync(owner, repo, &source).await?;

        let identity = ContentIdentity::new(owner, repo, synced.git_ref.as_str());
        self.scheduler
            .set_head(identity.owner(), identity.repo(), identity.git_ref());

        let checkout_dir = synced.checkout_dir;
        *self.worktree_users.entry(checkout_dir.clone()).or_default() += 1;
        let handle = match self.enqueue_checkout(&identity, &checkout_dir, info).await {
            Ok(handle) => handle,
            Err(e) => {
                if release(&self.worktree_users, &checkout_dir) {
                    self.sync.remove_worktree(owner, repo, &checkout_dir).await;
                }
                return Err(e);
            }
        };

        let finished = handle.clone();
        let repo_lock = Arc::clone(&lock);
        let users = Arc::clone(&self.worktree_users);
        let sync = self.sync.clone();
        let (owner, repo) = (identity.owner().to_string(), identity.repo().to_string());
        tokio::spawn(async move {
            finished.wait().await;
            let _guard = repo_lock.lock().await;
            if release(&users, &checkout_dir) {
                sync.remove_worktree(&owner, &repo, &checkout_dir).await;
            }
        });

        Ok(handle)
    }

    /// Enqueue every project found in a checkout at `identity`.
    pub async fn enqueue_checkout(
        &self,
        identity: &ContentIdentity,
        checkout_dir: &Path,
        info: RepoInfo,
    ) -> AppResult<RunHandle> {
        let yaml = match KitspaceYaml::find_file(checkout_dir) {
            Some(path) => {
                let contents = tokio::fs::read_to_string(&path).await?;
                KitspaceYaml::parse_or_default(&contents)
            }
            None => KitspaceYaml::default(),
        }
        .with_summary_fallback(&info.description);

        let registered = self.scheduler.categories();
        let mut handle = RunHandle::default();
        for (index, project) in yaml.projects().into_iter().enumerate() {
            let mut categories: Vec<AssetCategory> = Vec::new();
            if index == 0 {
                categories.push(AssetCategory::KitspaceYaml);
            }
            categories.extend(AssetCategory::PROJECT);
            categories.retain(|c| registered.contains(c));

            let job = Arc::new(ProjectJob::new(
                identity,
                checkout_dir.to_path_buf(),
                project,
                yaml.clone(),
                info.clone(),
            ));
            tracing::info!(
                identity = %job.identity,
                project = job.display_name(),
                categories = categories.len(),
                "Enqueuing project"
            );
            handle.merge(self.scheduler.enqueue(job, &categories)?);
        }

        Ok(handle)
    }
}

/// Drop one user of `dir`. True when it was the last.
fn release(users: &DashMap<PathBuf, usize>, dir: &Path) -> bool {
    users
        .remove_if_mut(dir, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        })
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use bytes::Bytes;

    use kitspace_core::config::scheduler::SchedulerConfig;
    use kitspace_core::shell::{ShellCommand, ShellError, ShellOutput};
    use kitspace_core::traits::CommandRunner;
    use kitspace_entity::task::TaskStatus;
    use kitspace_storage::AssetStore;

    use crate::converter::{ConversionContext, Converter, ConverterOutput, ConverterRegistry, TaskError};
    use crate::retry::RetryPolicy;
    use crate::status::StatusTracker;

    #[derive(Debug)]
    struct NoShell;

    #[async_trait]
    impl CommandRunner for NoShell {
        async fn run(&self, command: &ShellCommand) -> Result<ShellOutput, ShellError> {
            Err(ShellError::Spawn {
                command: command.render(),
                reason: "no shell in tests".into(),
            })
        }
    }

    #[derive(Debug)]
    struct Named(AssetCategory, &'static str);

    #[async_trait]
    impl Converter for Named {
        fn category(&self) -> AssetCategory {
            self.0
        }

        fn outputs(&self, _job: &ProjectJob) -> Vec<String> {
            vec![self.1.to_string()]
        }

        async fn run(&self, ctx: &ConversionContext) -> Result<ConverterOutput, TaskError> {
            Ok(ConverterOutput::new().with(self.1, Bytes::from(ctx.job.display_name().to_string())))
        }
    }

    /// Git stand-in: fixed head commit, worktrees as plain directories.
    #[derive(Debug, Default)]
    struct GitShell {
        commands: std::sync::Mutex<Vec<String>>,
    }

    impl GitShell {
        fn commands(&self) -> Vec<String> {
            self.commands.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl CommandRunner for GitShell {
        async fn run(&self, command: &ShellCommand) -> Result<ShellOutput, ShellError> {
            self.commands.lock().expect("lock").push(command.render());
            let args = command.arguments();
            match (args[0].as_str(), args.get(1).map(String::as_str)) {
                ("rev-parse", _) => {
                    return Ok(ShellOutput {
                        stdout: "abc1234\n".to_string(),
                        ..ShellOutput::default()
                    });
                }
                ("worktree", Some("add")) => std::fs::create_dir_all(&args[4]).expect("add"),
                ("worktree", Some("remove")) => std::fs::remove_dir_all(&args[3]).expect("remove"),
                _ => {}
            }
            Ok(ShellOutput::default())
        }
    }

    fn scheduler() -> TaskScheduler {
        let mut registry = ConverterRegistry::new();
        registry.register(Arc::new(Named(AssetCategory::KitspaceYaml, "kitspace-yaml.json")));
        registry.register(Arc::new(Named(AssetCategory::Readme, "readme.html")));
        TaskScheduler::new(
            registry,
            AssetStore::in_memory(),
            Arc::new(NoShell),
            Arc::new(StatusTracker::new()),
            &SchedulerConfig::default(),
        )
    }

    fn pipeline() -> ProcessingPipeline {
        let sync = RepoSync::new(Arc::new(NoShell), "/nonexistent", RetryPolicy::default());
        ProcessingPipeline::new(scheduler(), sync, None, "/nonexistent")
    }

    #[tokio::test]
    async fn test_single_project_checkout() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("kitspace.yaml"), "summary: A board\n").expect("write");
        let pipeline = pipeline();
        let identity = ContentIdentity::new("o", "r", "abc");

        let handle = pipeline
            .enqueue_checkout(&identity, dir.path(), RepoInfo::default())
            .await
            .expect("enqueue");
        assert_eq!(handle.identities(), vec![identity.clone()]);
        let outcomes = handle.wait().await;
        assert!(outcomes.iter().all(|o| o.status == TaskStatus::Done));

        let summary = pipeline
            .scheduler()
            .tracker()
            .summary(&identity)
            .expect("summary");
        assert!(summary.complete);
        assert_eq!(
            summary.assets.keys().collect::<Vec<_>>(),
            vec!["kitspace-yaml.json", "readme.html"]
        );
    }

    #[tokio::test]
    async fn test_multi_project_checkout() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("kitspace.yml"),
            "multi:\n  left:\n    summary: Left half\n  right:\n    summary: Right half\n",
        )
        .expect("write");
        let pipeline = pipeline();
        let identity = ContentIdentity::new("o", "split", "abc");

        let handle = pipeline
            .enqueue_checkout(&identity, dir.path(), RepoInfo::default())
            .await
            .expect("enqueue");
        let identities: Vec<String> = handle.identities().iter().map(|i| i.prefix()).collect();
        assert_eq!(identities, vec!["o/split/abc", "o/split/abc/left", "o/split/abc/right"]);
        handle.wait().await;

        let store = pipeline.scheduler().store();
        let left = store
            .get(&identity.with_project("left").asset("readme.html"))
            .await
            .expect("left readme");
        assert_eq!(left, Bytes::from("left"));
        assert!(
            store
                .head(&identity.asset("kitspace-yaml.json"))
                .await
                .expect("head")
        );
    }

    #[tokio::test]
    async fn test_worktree_is_removed_once_run_finishes() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("repositories/o/r.git")).expect("bare repo");
        let shell = Arc::new(GitShell::default());
        let sync = RepoSync::new(shell.clone(), dir.path().join("checkout"), RetryPolicy::default());
        let pipeline = ProcessingPipeline::new(scheduler(), sync, None, dir.path().join("repositories"));

        let handle = pipeline.process_repo("o", "r").await.expect("process");
        let worktree = pipeline.repo_sync().worktree_dir("o", "r", "abc1234");
        let outcomes = handle.wait().await;
        assert!(outcomes.iter().all(|o| o.status == TaskStatus::Done));

        for _ in 0..200 {
            if !worktree.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(!worktree.exists());
        assert!(
            shell
                .commands()
                .iter()
                .any(|c| c.starts_with("git worktree remove --force"))
        );
        assert_eq!(pipeline.scheduler().tracker().head("o", "r").as_deref(), Some("abc1234"));
    }

    #[tokio::test]
    async fn test_unknown_repository_without_gitea() {
        let err = pipeline()
            .process_repo("nobody", "nothing")
            .await
            .expect_err("not found");
        assert_eq!(err.kind, kitspace_core::error::ErrorKind::NotFound);
    }
}
