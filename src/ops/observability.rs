//! Metrics and health for the cluster state pipeline.
//!
//! Counters are plain atomics so the queue worker can record them without
//! taking a lock. Read them through [`StreamMetrics::snapshot`].

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metric names.
pub mod metrics {
    /// Cluster state tasks that produced a committed state.
    pub const TASKS_EXECUTED_TOTAL: &str = "tributary.tasks_executed_total";
    /// Tasks whose mutation returned an error.
    pub const TASKS_REJECTED_TOTAL: &str = "tributary.tasks_rejected_total";
    /// Tasks whose mutation panicked.
    pub const TASKS_FAILED_TOTAL: &str = "tributary.tasks_failed_total";
    /// Tasks whose publication was not committed.
    pub const TASKS_NOT_COMMITTED_TOTAL: &str = "tributary.tasks_not_committed_total";
    /// Installed cluster state version.
    pub const CLUSTER_STATE_VERSION: &str = "tributary.cluster_state_version";
    /// Data streams committed.
    pub const DATA_STREAMS_CREATED_TOTAL: &str = "tributary.data_streams_created_total";
    /// Creations that committed but timed out waiting for shards.
    pub const READINESS_TIMEOUTS_TOTAL: &str = "tributary.readiness_timeouts_total";
    /// Creations whose commit wait timed out.
    pub const COMMIT_TIMEOUTS_TOTAL: &str = "tributary.commit_timeouts_total";
}

/// Counters for the task queue and data stream creation.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    tasks_executed: AtomicU64,
    tasks_rejected: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_not_committed: AtomicU64,
    cluster_state_version: AtomicU64,
    data_streams_created: AtomicU64,
    readiness_timeouts: AtomicU64,
    commit_timeouts: AtomicU64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed task and the version it installed.
    pub fn record_task_executed(&self, version: u64) {
        self.tasks_executed.fetch_add(1, Ordering::Relaxed);
        self.cluster_state_version.store(version, Ordering::Relaxed);
    }

    pub fn record_task_rejected(&self) {
        self.tasks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_not_committed(&self) {
        self.tasks_not_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_data_stream_created(&self) {
        self.data_streams_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_readiness_timeout(&self) {
        self.readiness_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit_timeout(&self) {
        self.commit_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            tasks_rejected: self.tasks_rejected.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_not_committed: self.tasks_not_committed.load(Ordering::Relaxed),
            cluster_state_version: self.cluster_state_version.load(Ordering::Relaxed),
            data_streams_created: self.data_streams_created.load(Ordering::Relaxed),
            readiness_timeouts: self.readiness_timeouts.load(Ordering::Relaxed),
            commit_timeouts: self.commit_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_executed: u64,
    pub tasks_rejected: u64,
    pub tasks_failed: u64,
    pub tasks_not_committed: u64,
    pub cluster_state_version: u64,
    pub data_streams_created: u64,
    pub readiness_timeouts: u64,
    pub commit_timeouts: u64,
}

impl MetricsSnapshot {
    /// Values keyed by metric name, in a stable order.
    pub fn named(&self) -> Vec<(&'static str, u64)> {
        vec![
            (metrics::TASKS_EXECUTED_TOTAL, self.tasks_executed),
            (metrics::TASKS_REJECTED_TOTAL, self.tasks_rejected),
            (metrics::TASKS_FAILED_TOTAL, self.tasks_failed),
            (metrics::TASKS_NOT_COMMITTED_TOTAL, self.tasks_not_committed),
            (metrics::CLUSTER_STATE_VERSION, self.cluster_state_version),
            (metrics::DATA_STREAMS_CREATED_TOTAL, self.data_streams_created),
            (metrics::READINESS_TIMEOUTS_TOTAL, self.readiness_timeouts),
            (metrics::COMMIT_TIMEOUTS_TOTAL, self.commit_timeouts),
        ]
    }

    /// Export in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();
        for (name, value) in self.named() {
            let prometheus_name = name.replace('.', "_");
            let kind = if name == metrics::CLUSTER_STATE_VERSION {
                "gauge"
            } else {
                "counter"
            };
            output.push_str(&format!(
                "# TYPE {prometheus_name} {kind}\n{prometheus_name} {value}\n"
            ));
        }
        output
    }
}

/// Overall health derived from component states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// All components are running.
    Healthy,
    /// Running, but some shards are not started.
    Degraded,
    /// A required component is down.
    Unhealthy,
}

impl HealthStatus {
    /// Derive health from queue liveness and shard activity.
    pub fn evaluate(queue_running: bool, shards_pending: bool) -> Self {
        match (queue_running, shards_pending) {
            (false, _) => Self::Unhealthy,
            (true, true) => Self::Degraded,
            (true, false) => Self::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}
