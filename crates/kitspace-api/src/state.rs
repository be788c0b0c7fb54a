//! Application state shared across all handlers and middleware.

use std::sync::Arc;
use std::time::Instant;

use kitspace_core::config::AppConfig;
use kitspace_storage::AssetStore;
use kitspace_worker::{ProcessingPipeline, StatusTracker, TaskScheduler};

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Repository pipeline, owning the scheduler, store and tracker
    pub pipeline: Arc<ProcessingPipeline>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, pipeline: Arc<ProcessingPipeline>) -> Self {
        Self {
            config,
            pipeline,
            started_at: Instant::now(),
        }
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        self.pipeline.scheduler()
    }

    pub fn store(&self) -> &AssetStore {
        self.scheduler().store()
    }

    pub fn tracker(&self) -> &StatusTracker {
        self.scheduler().tracker()
    }
}
