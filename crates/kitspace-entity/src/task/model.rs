//! Task snapshot model.

use chrono::{DateTime, Utc};
use kitspace_core::ContentIdentity;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::TaskStatus;
use crate::asset::AssetCategory;

/// Point-in-time view of one `(identity, category)` task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique task identifier.
    pub id: Uuid,
    /// Identity the task produces assets for.
    pub identity: ContentIdentity,
    /// Converter category.
    pub category: AssetCategory,
    /// Current status.
    pub status: TaskStatus,
    /// Converter attempts made so far.
    pub attempts: u32,
    /// Error text on failure. Internal only, never returned to HTTP clients.
    pub error: Option<String>,
    /// Whether the task completed from cached outputs without running.
    pub cached: bool,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the converter started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Create a queued task.
    pub fn queued(identity: ContentIdentity, category: AssetCategory) -> Self {
        Self {
            id: Uuid::now_v7(),
            identity,
            category,
            status: TaskStatus::Queued,
            attempts: 0,
            error: None,
            cached: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Wall time between start and finish in milliseconds.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}
