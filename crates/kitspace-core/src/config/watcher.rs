//! Repository watcher configuration.

use serde::{Deserialize, Serialize};

/// Periodic rescan of the Gitea repositories directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Whether the watcher runs.
    #[serde(default)]
    pub enabled: bool,
    /// Cron expression (with seconds) for the rescan.
    #[serde(default = "default_schedule")]
    pub schedule: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: default_schedule(),
        }
    }
}

fn default_schedule() -> String {
    "0 * * * * *".to_string()
}
