//! Task orchestration for the Kitspace processor.
//!
//! This crate provides:
//! - The [`Converter`] plug-in contract and a registry keyed by category
//! - A scheduler that deduplicates, orders and runs conversion tasks
//! - A lock-free status tracker backing the polling endpoints
//! - Repository sync against Gitea and the processing pipeline
//! - A cron watcher that re-processes repositories whose head moved

pub mod converter;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod status;
pub mod sync;
pub mod watcher;

pub use converter::{ConversionContext, Converter, ConverterOutput, ConverterRegistry, TaskError};
pub use metrics::{SchedulerMetrics, SchedulerMetricsSnapshot};
pub use pipeline::ProcessingPipeline;
pub use scheduler::{RunHandle, TaskOutcome, TaskScheduler};
pub use status::{RunSummary, StatusTracker};
pub use sync::{GiteaClient, RepoSync};
pub use watcher::RepoWatcher;
