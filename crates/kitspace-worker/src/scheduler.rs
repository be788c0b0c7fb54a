//! Task scheduler.
//!
//! One task per `(identity, category)`. The task map entry is created under
//! the map's shard lock, so concurrent enqueues of the same pair observe a
//! single task. Each task publishes its status on a `watch` channel:
//! dependents wait on it without holding a worker permit, and run handles
//! wait on it for completion.
//!
//! When a repository's head moves, the finished tasks of the replaced commit
//! are evicted. Tasks still in flight evict their run when the last one
//! finishes.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, Semaphore, watch};

use kitspace_core::config::scheduler::SchedulerConfig;
use kitspace_core::error::AppError;
use kitspace_core::result::AppResult;
use kitspace_core::traits::CommandRunner;
use kitspace_core::types::identity::{AssetId, ContentIdentity};
use kitspace_entity::asset::AssetCategory;
use kitspace_entity::project::ProjectJob;
use kitspace_entity::task::{TaskRecord, TaskStatus};
use kitspace_storage::AssetStore;

use crate::converter::{ConversionContext, Converter, ConverterRegistry, TaskError};
use crate::metrics::SchedulerMetrics;
use crate::retry::RetryPolicy;
use crate::status::StatusTracker;

type TaskKey = (ContentIdentity, AssetCategory);

/// The identity a category's assets are stored under for `identity`.
fn task_identity(identity: &ContentIdentity, category: AssetCategory) -> ContentIdentity {
    if category.is_repo_level() {
        identity.repo_level()
    } else {
        identity.clone()
    }
}

#[derive(Debug)]
struct TaskEntry {
    record: TaskRecord,
    outputs: Vec<String>,
    status_tx: watch::Sender<TaskStatus>,
}

#[derive(Debug)]
struct Completion {
    cached: bool,
    output_bytes: u64,
}

#[derive(Debug)]
struct Inner {
    registry: ConverterRegistry,
    store: AssetStore,
    shell: Arc<dyn CommandRunner>,
    tracker: Arc<StatusTracker>,
    metrics: Arc<SchedulerMetrics>,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
    concurrency: usize,
    shutdown_grace: Duration,
    accepting: AtomicBool,
    tasks: DashMap<TaskKey, TaskEntry>,
    mirror_locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

/// Deduplicating task scheduler with a bounded worker pool.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    inner: Arc<Inner>,
}

impl TaskScheduler {
    /// Create a scheduler over a fixed converter registry.
    pub fn new(
        registry: ConverterRegistry,
        store: AssetStore,
        shell: Arc<dyn CommandRunner>,
        tracker: Arc<StatusTracker>,
        config: &SchedulerConfig,
    ) -> Self {
        let concurrency = config.concurrency.max(1);
        tracing::info!(
            concurrency,
            max_attempts = config.retry.max_attempts,
            categories = ?registry.categories(),
            "Task scheduler created"
        );
        Self {
            inner: Arc::new(Inner {
                registry,
                store,
                shell,
                tracker,
                metrics: Arc::new(SchedulerMetrics::new()),
                retry: RetryPolicy::new(config.retry.clone()),
                permits: Arc::new(Semaphore::new(concurrency)),
                concurrency,
                shutdown_grace: Duration::from_secs(config.shutdown_grace_seconds),
                accepting: AtomicBool::new(true),
                tasks: DashMap::new(),
                mirror_locks: DashMap::new(),
            }),
        }
    }

    /// Schedule `categories` (and their dependencies) for `job`.
    ///
    /// A pair that already has a task, in any state, is not scheduled again;
    /// the returned handle observes the existing task instead.
    pub fn enqueue(
        &self,
        job: Arc<ProjectJob>,
        categories: &[AssetCategory],
    ) -> AppResult<RunHandle> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(AppError::service_unavailable("scheduler is shutting down"));
        }

        let order = self.inner.registry.resolve_order(categories)?;
        let mut handle = RunHandle::default();

        for category in order {
            let converter = self.inner.registry.get(category).cloned().ok_or_else(|| {
                AppError::internal(format!("converter for '{category}' disappeared"))
            })?;
            let identity = task_identity(&job.identity, category);
            let key = (identity.clone(), category);

            // Subscribe before taking the entry lock: dependencies may share its shard.
            let dependencies: Vec<(TaskKey, Option<watch::Receiver<TaskStatus>>)> = converter
                .dependencies()
                .iter()
                .map(|&dep| {
                    let dep_key = (task_identity(&job.identity, dep), dep);
                    let rx = self
                        .inner
                        .tasks
                        .get(&dep_key)
                        .map(|e| e.status_tx.subscribe());
                    (dep_key, rx)
                })
                .collect();

            let rx = match self.inner.tasks.entry(key.clone()) {
                Entry::Occupied(existing) => {
                    self.inner.metrics.record_deduplicated();
                    tracing::debug!(%identity, %category, "Task already exists");
                    existing.get().status_tx.subscribe()
                }
                Entry::Vacant(slot) => {
                    let outputs = converter.outputs(&job);
                    let (status_tx, rx) = watch::channel(TaskStatus::Queued);
                    self.inner.tracker.set(&identity, &outputs, TaskStatus::Queued);
                    slot.insert(TaskEntry {
                        record: TaskRecord::queued(identity.clone(), category),
                        outputs,
                        status_tx,
                    });
                    self.inner.metrics.record_enqueued();
                    tracing::info!(%identity, %category, "Task queued");

                    let inner = Arc::clone(&self.inner);
                    let job = Arc::clone(&job);
                    let task_key = key.clone();
                    tokio::spawn(async move {
                        inner.run_task(task_key, job, converter, dependencies).await;
                    });
                    rx
                }
            };
            handle.push(identity, category, rx);
        }

        Ok(handle)
    }

    /// Status of one asset. Never waits on running tasks.
    pub fn status(&self, asset: &AssetId) -> Option<TaskStatus> {
        self.inner.tracker.status(asset)
    }

    /// Snapshot of the task for `(identity, category)`.
    pub fn task(&self, identity: &ContentIdentity, category: AssetCategory) -> Option<TaskRecord> {
        let key = (task_identity(identity, category), category);
        self.inner.tasks.get(&key).map(|e| e.record.clone())
    }

    /// Snapshots of every task of `identity`.
    pub fn tasks_for(&self, identity: &ContentIdentity) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self
            .inner
            .tasks
            .iter()
            .filter(|e| &e.key().0 == identity)
            .map(|e| e.record.clone())
            .collect();
        records.sort_by_key(|r| r.category);
        records
    }

    /// Number of known tasks.
    pub fn task_count(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Move a repository's head to `git_ref`.
    ///
    /// Finished tasks of the commit it replaces are evicted.
    pub fn set_head(&self, owner: &str, repo: &str, git_ref: &str) {
        let Some(previous) = self.inner.tracker.set_head(owner, repo, git_ref) else {
            return;
        };
        let superseded: BTreeSet<ContentIdentity> = self
            .inner
            .tasks
            .iter()
            .map(|e| e.key().0.clone())
            .filter(|identity| {
                identity.owner() == owner.to_lowercase()
                    && identity.repo() == repo.to_lowercase()
                    && identity.git_ref() == previous
            })
            .collect();
        tracing::info!(
            owner,
            repo,
            git_ref,
            previous = %previous,
            identities = superseded.len(),
            "Repository head moved"
        );
        for identity in &superseded {
            self.inner.evict_if_finished(identity);
        }
    }

    /// The status tracker the scheduler writes to.
    pub fn tracker(&self) -> &Arc<StatusTracker> {
        &self.inner.tracker
    }

    /// Scheduler metrics.
    pub fn metrics(&self) -> &Arc<SchedulerMetrics> {
        &self.inner.metrics
    }

    /// The store outputs are written to.
    pub fn store(&self) -> &AssetStore {
        &self.inner.store
    }

    /// Registered converter categories.
    pub fn categories(&self) -> Vec<AssetCategory> {
        self.inner.registry.categories()
    }

    /// Whether new work is accepted.
    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting work and wait, bounded, for running converters.
    pub async fn shutdown(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        tracing::info!("Task scheduler waiting for in-flight tasks to complete...");

        let all = u32::try_from(self.inner.concurrency).unwrap_or(u32::MAX);
        match tokio::time::timeout(
            self.inner.shutdown_grace,
            self.inner.permits.acquire_many(all),
        )
        .await
        {
            Ok(_) => tracing::info!("Task scheduler shut down complete"),
            Err(_) => tracing::warn!(
                grace_seconds = self.inner.shutdown_grace.as_secs(),
                "Task scheduler shutdown grace period elapsed"
            ),
        }
        self.inner.permits.close();
    }
}

impl Inner {
    async fn run_task(
        &self,
        key: TaskKey,
        job: Arc<ProjectJob>,
        converter: Arc<dyn Converter>,
        dependencies: Vec<(TaskKey, Option<watch::Receiver<TaskStatus>>)>,
    ) {
        let started = Instant::now();
        match self.execute(&key, &job, converter.as_ref(), dependencies).await {
            Ok(completion) => {
                if completion.cached {
                    self.metrics.record_cached();
                } else {
                    self.metrics
                        .record_success(started.elapsed(), completion.output_bytes);
                }
                self.complete(&key, completion.cached);
            }
            Err(e) => {
                if matches!(e, TaskError::Dependency { .. }) {
                    self.metrics.record_dependency_failure();
                } else {
                    self.metrics.record_failure();
                }
                self.fail(&key, &e);
            }
        }
    }

    async fn execute(
        &self,
        key: &TaskKey,
        job: &Arc<ProjectJob>,
        converter: &dyn Converter,
        dependencies: Vec<(TaskKey, Option<watch::Receiver<TaskStatus>>)>,
    ) -> Result<Completion, TaskError> {
        let (identity, category) = (&key.0, key.1);

        for (dep_key, rx) in dependencies {
            let status = match rx {
                Some(rx) => wait_terminal(rx).await,
                None => TaskStatus::Failed,
            };
            if status == TaskStatus::Failed {
                let message = self
                    .tasks
                    .get(&dep_key)
                    .and_then(|e| e.record.error.clone())
                    .unwrap_or_else(|| "unknown error".to_string());
                return Err(TaskError::Dependency {
                    category: dep_key.1,
                    message,
                });
            }
        }

        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| TaskError::permanent("scheduler is shutting down"))?;
        self.mark_running(key);
        self.metrics.record_started();
        let result = self.convert_and_store(identity, category, job, converter).await;
        self.metrics.record_stopped();
        result
    }

    async fn convert_and_store(
        &self,
        identity: &ContentIdentity,
        category: AssetCategory,
        job: &Arc<ProjectJob>,
        converter: &dyn Converter,
    ) -> Result<Completion, TaskError> {
        let outputs = self
            .tasks
            .get(&(identity.clone(), category))
            .map(|e| e.outputs.clone())
            .unwrap_or_default();
        let assets: Vec<AssetId> = outputs
            .iter()
            .map(|name| identity.asset(name.as_str()))
            .collect();

        let store = &self.store;
        let cached = self
            .retry
            .run("head", |_| {
                let assets = assets.as_slice();
                async move { Ok::<_, TaskError>(store.exists_all(assets).await?) }
            })
            .await?;
        if cached {
            tracing::info!(%identity, %category, "Outputs already stored, skipping converter");
            if self.tracker.is_current(identity) {
                for asset in &assets {
                    let data = store.get(asset).await?;
                    self.mirror_if_current(asset, data).await?;
                }
            }
            return Ok(Completion {
                cached: true,
                output_bytes: 0,
            });
        }

        tracing::info!(%identity, %category, "Running converter");
        let output = self
            .retry
            .run(category.as_str(), |attempt| {
                self.note_attempt(identity, category, attempt);
                if attempt > 1 {
                    self.metrics.record_retry();
                }
                let ctx = ConversionContext {
                    job: Arc::clone(job),
                    shell: Arc::clone(&self.shell),
                    store: self.store.clone(),
                    attempt,
                };
                async move { converter.run(&ctx).await }
            })
            .await?;

        if let Some(missing) = outputs.iter().find(|name| !output.contains(name)) {
            return Err(TaskError::Permanent(format!(
                "{category} converter did not produce {missing}"
            )));
        }

        for (name, data) in output.iter() {
            let asset = identity.asset(name.as_str());
            let asset = &asset;
            self.retry
                .run("put", |_| {
                    let data = data.clone();
                    async move {
                        store.put(asset, data.clone()).await?;
                        self.mirror_if_current(asset, data).await?;
                        Ok::<_, TaskError>(())
                    }
                })
                .await?;
        }

        Ok(Completion {
            cached: false,
            output_bytes: output.total_bytes(),
        })
    }

    /// Copy `asset` under `HEAD` if its commit is still the repository head.
    ///
    /// Mirrors of one repository are serialised, so a replaced commit can
    /// never write `HEAD` after the commit that replaced it.
    async fn mirror_if_current(&self, asset: &AssetId, data: Bytes) -> AppResult<()> {
        let identity = asset.identity();
        let key = (identity.owner().to_string(), identity.repo().to_string());
        let lock = Arc::clone(self.mirror_locks.entry(key).or_default().value());
        let _guard = lock.lock().await;

        if self.tracker.is_current(identity) {
            self.store.mirror_to_head(asset, data).await?;
        } else {
            tracing::debug!(asset = %asset, "Commit no longer current, not mirroring");
        }
        Ok(())
    }

    /// Evict `identity` if its commit was replaced and all of its tasks are
    /// terminal.
    fn evict_if_finished(&self, identity: &ContentIdentity) {
        let superseded = self
            .tracker
            .head(identity.owner(), identity.repo())
            .is_some_and(|head| head != identity.git_ref());
        let finished = self
            .tasks
            .iter()
            .filter(|e| &e.key().0 == identity)
            .all(|e| e.record.status.is_terminal());
        if !superseded || !finished {
            return;
        }

        let mut names = Vec::new();
        self.tasks.retain(|key, entry| {
            if &key.0 == identity && entry.record.status.is_terminal() {
                names.extend(entry.outputs.iter().cloned());
                false
            } else {
                true
            }
        });
        self.tracker.forget(identity, &names);
        tracing::debug!(%identity, assets = names.len(), "Evicted superseded run");
    }

    fn note_attempt(&self, identity: &ContentIdentity, category: AssetCategory, attempt: u32) {
        if let Some(mut entry) = self.tasks.get_mut(&(identity.clone(), category)) {
            entry.record.attempts = attempt;
        }
    }

    fn mark_running(&self, key: &TaskKey) {
        if let Some(mut entry) = self.tasks.get_mut(key) {
            entry.record.status = TaskStatus::Running;
            entry.record.started_at = Some(Utc::now());
            self.tracker.set(&key.0, &entry.outputs, TaskStatus::Running);
            entry.status_tx.send_replace(TaskStatus::Running);
        }
    }

    fn complete(&self, key: &TaskKey, cached: bool) {
        if let Some(mut entry) = self.tasks.get_mut(key) {
            entry.record.status = TaskStatus::Done;
            entry.record.cached = cached;
            entry.record.finished_at = Some(Utc::now());
            self.tracker.set(&key.0, &entry.outputs, TaskStatus::Done);
            entry.status_tx.send_replace(TaskStatus::Done);
            tracing::info!(
                identity = %key.0,
                category = %key.1,
                cached,
                attempts = entry.record.attempts,
                duration_ms = entry.record.duration_ms(),
                "Task done"
            );
        }
        self.evict_if_finished(&key.0);
    }

    fn fail(&self, key: &TaskKey, error: &TaskError) {
        if let Some(mut entry) = self.tasks.get_mut(key) {
            entry.record.status = TaskStatus::Failed;
            entry.record.error = Some(error.to_string());
            entry.record.finished_at = Some(Utc::now());
            self.tracker.set(&key.0, &entry.outputs, TaskStatus::Failed);
            entry.status_tx.send_replace(TaskStatus::Failed);
            tracing::error!(
                identity = %key.0,
                category = %key.1,
                attempts = entry.record.attempts,
                error = %error,
                "Task failed"
            );
        }
        self.evict_if_finished(&key.0);
    }
}

/// Wait for a terminal status. A dropped sender counts as failure.
async fn wait_terminal(mut rx: watch::Receiver<TaskStatus>) -> TaskStatus {
    let status = match rx.wait_for(TaskStatus::is_terminal).await {
        Ok(status) => *status,
        Err(_) => TaskStatus::Failed,
    };
    status
}

/// Final or current status of one task in a [`RunHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Identity the task produces assets for.
    pub identity: ContentIdentity,
    /// Converter category.
    pub category: AssetCategory,
    /// Task status.
    pub status: TaskStatus,
}

/// Observer of the tasks spawned (or found) by one or more enqueues.
#[derive(Debug, Clone, Default)]
pub struct RunHandle {
    tasks: Vec<(ContentIdentity, AssetCategory, watch::Receiver<TaskStatus>)>,
}

impl RunHandle {
    fn push(
        &mut self,
        identity: ContentIdentity,
        category: AssetCategory,
        rx: watch::Receiver<TaskStatus>,
    ) {
        self.tasks.push((identity, category, rx));
    }

    /// Absorb the tasks of another handle.
    pub fn merge(&mut self, other: RunHandle) {
        self.tasks.extend(other.tasks);
    }

    /// Distinct identities covered by this handle.
    pub fn identities(&self) -> Vec<ContentIdentity> {
        self.tasks
            .iter()
            .map(|(identity, _, _)| identity.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of tasks observed.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the handle observes nothing.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Current status of every task.
    pub fn statuses(&self) -> Vec<TaskOutcome> {
        self.tasks
            .iter()
            .map(|(identity, category, rx)| TaskOutcome {
                identity: identity.clone(),
                category: *category,
                status: *rx.borrow(),
            })
            .collect()
    }

    /// Wait until every task is done or failed.
    pub async fn wait(self) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        for (identity, category, rx) in self.tasks {
            let status = wait_terminal(rx).await;
            outcomes.push(TaskOutcome {
                identity,
                category,
                status,
            });
        }
        outcomes
    }
}
