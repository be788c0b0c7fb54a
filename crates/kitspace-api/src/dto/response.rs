//! Response DTOs.

use serde::{Deserialize, Serialize};

use kitspace_entity::task::TaskStatus;
use kitspace_worker::SchedulerMetricsSnapshot;

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Status of one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetStatusResponse {
    pub status: TaskStatus,
}

/// Repositories and identities a trigger enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    /// `owner/repo`.
    pub repository: String,
    /// Identity prefixes, `owner/repo/ref[/project]`.
    pub identities: Vec<String>,
}

/// Accepted webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookResponse {
    /// `owner/repo` scheduled for processing.
    pub repository: String,
}

/// Basic health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Detailed health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedHealthResponse {
    /// `ok` or `degraded`.
    pub status: String,
    /// Store provider name.
    pub storage_provider: String,
    /// Whether the store answered its health check.
    pub storage_healthy: bool,
    /// Whether the scheduler accepts new work.
    pub accepting: bool,
    /// Tasks known to the scheduler.
    pub tasks: usize,
    /// Assets with a tracked status.
    pub tracked_assets: usize,
    /// Scheduler counters.
    pub scheduler: SchedulerMetricsSnapshot,
}
