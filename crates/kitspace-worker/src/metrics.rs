//! Scheduler metrics.
//!
//! Counters are atomics; recent converter durations are kept in a bounded
//! sample buffer for P50/P95/P99.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum number of duration samples to keep in memory.
const MAX_DURATION_SAMPLES: usize = 1000;

/// Task counters shared by every scheduler task.
#[derive(Debug)]
pub struct SchedulerMetrics {
    tasks_enqueued: AtomicU64,
    tasks_deduplicated: AtomicU64,
    tasks_succeeded: AtomicU64,
    tasks_cached: AtomicU64,
    tasks_failed: AtomicU64,
    dependency_failures: AtomicU64,
    retries: AtomicU64,
    running: AtomicU64,
    total_output_bytes: AtomicU64,
    duration_samples: Mutex<Vec<Duration>>,
}

impl SchedulerMetrics {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self {
            tasks_enqueued: AtomicU64::new(0),
            tasks_deduplicated: AtomicU64::new(0),
            tasks_succeeded: AtomicU64::new(0),
            tasks_cached: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            dependency_failures: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            running: AtomicU64::new(0),
            total_output_bytes: AtomicU64::new(0),
            duration_samples: Mutex::new(Vec::with_capacity(MAX_DURATION_SAMPLES)),
        }
    }

    /// A new task was created.
    pub fn record_enqueued(&self) {
        self.tasks_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// An enqueue hit an existing task.
    pub fn record_deduplicated(&self) {
        self.tasks_deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    /// A converter started running.
    pub fn record_started(&self) {
        self.running.fetch_add(1, Ordering::Relaxed);
    }

    /// A converter finished, successfully or not.
    pub fn record_stopped(&self) {
        // Saturates at zero.
        let _ = self
            .running
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// A converter ran and its outputs were stored.
    pub fn record_success(&self, duration: Duration, output_bytes: u64) {
        self.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
        self.total_output_bytes
            .fetch_add(output_bytes, Ordering::Relaxed);
        self.add_duration_sample(duration);
    }

    /// All outputs already existed in the store.
    pub fn record_cached(&self) {
        self.tasks_cached.fetch_add(1, Ordering::Relaxed);
    }

    /// A task failed.
    pub fn record_failure(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A task failed because a dependency failed.
    pub fn record_dependency_failure(&self) {
        self.dependency_failures.fetch_add(1, Ordering::Relaxed);
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A transient failure was retried.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    fn add_duration_sample(&self, duration: Duration) {
        if let Ok(mut samples) = self.duration_samples.lock() {
            if samples.len() >= MAX_DURATION_SAMPLES {
                samples.remove(0);
            }
            samples.push(duration);
        }
    }

    /// Current values.
    pub fn snapshot(&self) -> SchedulerMetricsSnapshot {
        let durations = self
            .duration_samples
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        let (p50, p95, p99) = percentiles(&durations);

        SchedulerMetricsSnapshot {
            tasks_enqueued: self.tasks_enqueued.load(Ordering::Relaxed),
            tasks_deduplicated: self.tasks_deduplicated.load(Ordering::Relaxed),
            tasks_succeeded: self.tasks_succeeded.load(Ordering::Relaxed),
            tasks_cached: self.tasks_cached.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            dependency_failures: self.dependency_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Relaxed),
            total_output_bytes: self.total_output_bytes.load(Ordering::Relaxed),
            duration_p50_ms: p50.map(|d| d.as_millis() as u64),
            duration_p95_ms: p95.map(|d| d.as_millis() as u64),
            duration_p99_ms: p99.map(|d| d.as_millis() as u64),
            sample_count: durations.len() as u64,
        }
    }
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn percentiles(durations: &[Duration]) -> (Option<Duration>, Option<Duration>, Option<Duration>) {
    if durations.is_empty() {
        return (None, None, None);
    }

    let mut sorted = durations.to_vec();
    sorted.sort();
    let len = sorted.len();

    let p50 = sorted.get(len * 50 / 100).copied();
    let p95 = sorted.get(len * 95 / 100).copied();
    let p99 = sorted.get(len.saturating_sub(1) * 99 / 100).copied();

    (p50, p95, p99)
}

/// A point-in-time view of [`SchedulerMetrics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerMetricsSnapshot {
    /// Tasks created.
    pub tasks_enqueued: u64,
    /// Enqueues answered by an existing task.
    pub tasks_deduplicated: u64,
    /// Tasks whose converter ran successfully.
    pub tasks_succeeded: u64,
    /// Tasks completed from stored outputs.
    pub tasks_cached: u64,
    /// Failed tasks, dependency failures included.
    pub tasks_failed: u64,
    /// Tasks failed by an upstream failure.
    pub dependency_failures: u64,
    /// Transient retries performed.
    pub retries: u64,
    /// Converters currently running.
    pub running: u64,
    /// Bytes written to the store.
    pub total_output_bytes: u64,
    /// P50 converter duration.
    pub duration_p50_ms: Option<u64>,
    /// P95 converter duration.
    pub duration_p95_ms: Option<u64>,
    /// P99 converter duration.
    pub duration_p99_ms: Option<u64>,
    /// Number of duration samples collected.
    pub sample_count: u64,
}
