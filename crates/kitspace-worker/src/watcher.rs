//! Periodic rescan of Gitea's repositories directory.
//!
//! Every bare repository `<owner>/<repo>.git` whose head commit differs from
//! the last processed commit is handed to the pipeline.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use kitspace_core::config::watcher::WatcherConfig;
use kitspace_core::error::AppError;
use kitspace_core::result::AppResult;

use crate::pipeline::ProcessingPipeline;

/// Cron-driven repository watcher.
pub struct RepoWatcher {
    scheduler: JobScheduler,
    pipeline: Arc<ProcessingPipeline>,
    schedule: String,
    scanning: Arc<AtomicBool>,
}

impl std::fmt::Debug for RepoWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoWatcher")
            .field("schedule", &self.schedule)
            .finish()
    }
}

impl RepoWatcher {
    /// Create a watcher. Nothing runs until [`start`](Self::start).
    pub async fn new(pipeline: Arc<ProcessingPipeline>, config: &WatcherConfig) -> AppResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            pipeline,
            schedule: config.schedule.clone(),
            scanning: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Register the rescan job and start the cron scheduler.
    pub async fn start(&self) -> AppResult<()> {
        let pipeline = Arc::clone(&self.pipeline);
        let scanning = Arc::clone(&self.scanning);
        let job = CronJob::new_async(self.schedule.as_str(), move |_uuid, _lock| {
            let pipeline = Arc::clone(&pipeline);
            let scanning = Arc::clone(&scanning);
            Box::pin(async move {
                if scanning.swap(true, Ordering::SeqCst) {
                    tracing::debug!("Previous repository scan still running");
                    return;
                }
                match rescan(&pipeline).await {
                    Ok(count) if count > 0 => {
                        tracing::info!(repositories = count, "Repository scan enqueued work")
                    }
                    Ok(_) => tracing::debug!("Repository scan found no changes"),
                    Err(e) => tracing::error!("Repository scan failed: {}", e),
                }
                scanning.store(false, Ordering::SeqCst);
            })
        })
        .map_err(|e| {
            AppError::configuration(format!(
                "Invalid watcher schedule '{}': {}",
                self.schedule, e
            ))
        })?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add repository scan: {}", e)))?;
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {}", e)))?;

        tracing::info!(schedule = %self.schedule, "Repository watcher started");
        Ok(())
    }

    /// Stop the cron scheduler.
    pub async fn shutdown(&mut self) -> AppResult<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {}", e)))?;

        tracing::info!("Repository watcher shut down");
        Ok(())
    }
}

/// `(owner, repo)` of every bare repository under `dir`, sorted.
pub async fn scan_repositories(dir: &Path) -> AppResult<Vec<(String, String)>> {
    let mut found = Vec::new();
    let mut owners = tokio::fs::read_dir(dir).await?;
    while let Some(owner) = owners.next_entry().await? {
        if !owner.file_type().await?.is_dir() {
            continue;
        }
        let owner_name = owner.file_name().to_string_lossy().into_owned();
        let mut repos = tokio::fs::read_dir(owner.path()).await?;
        while let Some(repo) = repos.next_entry().await? {
            let name = repo.file_name().to_string_lossy().into_owned();
            let Some(repo_name) = name.strip_suffix(".git") else {
                continue;
            };
            if repo.file_type().await?.is_dir() {
                found.push((owner_name.clone(), repo_name.to_string()));
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Process every repository whose head moved. Returns how many were enqueued.
pub async fn rescan(pipeline: &ProcessingPipeline) -> AppResult<usize> {
    let tracker = pipeline.scheduler().tracker();
    let mut enqueued = 0;

    for (owner, repo) in scan_repositories(pipeline.repositories_dir()).await? {
        let bare = pipeline.bare_repo(&owner, &repo);
        let head = match pipeline.repo_sync().head_commit(&bare).await {
            Ok(head) => head,
            Err(e) => {
                tracing::debug!(owner, repo, error = %e, "Skipping repository without commits");
                continue;
            }
        };
        if tracker.head(&owner, &repo).as_deref() == Some(head.as_str()) {
            continue;
        }

        match pipeline.process_repo(&owner, &repo).await {
            Ok(handle) => {
                enqueued += 1;
                tracing::info!(owner, repo, tasks = handle.len(), "Repository enqueued by watcher");
            }
            Err(e) => tracing::error!(owner, repo, error = %e, "Failed to process repository"),
        }
    }

    Ok(enqueued)
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use kitspace_core::config::scheduler::SchedulerConfig;
    use kitspace_core::shell::{ShellCommand, ShellError, ShellOutput};
    use kitspace_core::traits::CommandRunner;
    use kitspace_storage::AssetStore;

    use crate::converter::ConverterRegistry;
    use crate::retry::RetryPolicy;
    use crate::scheduler::TaskScheduler;
    use crate::status::StatusTracker;
    use crate::sync::RepoSync;

    const SHA: &str = "89abcdef89abcdef89abcdef89abcdef89abcdef";

    #[derive(Debug)]
    struct FixedHead;

    #[async_trait]
    impl CommandRunner for FixedHead {
        async fn run(&self, _command: &ShellCommand) -> Result<ShellOutput, ShellError> {
            Ok(ShellOutput {
                stdout: format!("{SHA}\n"),
                ..ShellOutput::default()
            })
        }
    }

    fn layout(root: &Path) {
        std::fs::create_dir_all(root.join("alice/keyboard.git")).expect("mkdir");
        std::fs::create_dir_all(root.join("alice/notes")).expect("mkdir");
        std::fs::create_dir_all(root.join("bob/amp.git")).expect("mkdir");
        std::fs::write(root.join("bob/stray.git"), b"not a dir").expect("write");
        std::fs::write(root.join("README"), b"top-level file").expect("write");
    }

    #[tokio::test]
    async fn test_scan_finds_bare_repositories() {
        let dir = tempfile::tempdir().expect("tempdir");
        layout(dir.path());

        let repos = scan_repositories(dir.path()).await.expect("scan");
        assert_eq!(
            repos,
            vec![
                ("alice".to_string(), "keyboard".to_string()),
                ("bob".to_string(), "amp".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_rescan_skips_repositories_at_processed_head() {
        let dir = tempfile::tempdir().expect("tempdir");
        layout(dir.path());

        let tracker = Arc::new(StatusTracker::new());
        tracker.set_head("alice", "keyboard", SHA);
        tracker.set_head("bob", "amp", SHA);
        let scheduler = TaskScheduler::new(
            ConverterRegistry::new(),
            AssetStore::in_memory(),
            Arc::new(FixedHead),
            tracker,
            &SchedulerConfig::default(),
        );
        let sync = RepoSync::new(Arc::new(FixedHead), dir.path().join("checkout"), RetryPolicy::default());
        let pipeline = ProcessingPipeline::new(scheduler, sync, None, dir.path());

        assert_eq!(rescan(&pipeline).await.expect("rescan"), 0);
    }

    #[tokio::test]
    async fn test_invalid_schedule_is_rejected() {
        let scheduler = TaskScheduler::new(
            ConverterRegistry::new(),
            AssetStore::in_memory(),
            Arc::new(FixedHead),
            Arc::new(StatusTracker::new()),
            &SchedulerConfig::default(),
        );
        let sync = RepoSync::new(Arc::new(FixedHead), "/nonexistent", RetryPolicy::default());
        let pipeline = Arc::new(ProcessingPipeline::new(scheduler, sync, None, "/nonexistent"));
        let watcher = RepoWatcher::new(
            pipeline,
            &WatcherConfig {
                enabled: true,
                schedule: "every now and then".to_string(),
            },
        )
        .await
        .expect("watcher");

        let err = watcher.start().await.expect_err("invalid cron");
        assert_eq!(err.kind, kitspace_core::error::ErrorKind::Configuration);
    }
}
