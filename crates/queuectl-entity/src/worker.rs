//! Worker supervisor snapshots and the pool registry row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of a worker pool.
///
/// `active` counts workers whose loop is still running; they may be idle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    /// Workers started by the pool.
    pub total: u32,
    /// Workers whose loop has not exited.
    pub active: u32,
    /// Milliseconds since the pool started.
    #[serde(rename = "uptimeMs")]
    pub uptime_ms: u64,
}

impl WorkerStatus {
    /// Sum several pool snapshots. Uptime is the longest of them.
    pub fn aggregate<'a>(statuses: impl IntoIterator<Item = &'a WorkerStatus>) -> Self {
        statuses
            .into_iter()
            .fold(Self::default(), |acc, status| Self {
                total: acc.total + status.total,
                active: acc.active + status.active,
                uptime_ms: acc.uptime_ms.max(status.uptime_ms),
            })
    }
}

/// A worker pool registered in the shared store so other processes can
/// observe and stop it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolRecord {
    /// Pool identifier.
    pub id: String,
    /// OS process id hosting the pool.
    pub pid: u32,
    /// Workers started.
    pub total: u32,
    /// Workers still running at the last heartbeat.
    pub active: u32,
    /// When the pool started.
    pub started_at: DateTime<Utc>,
    /// Last heartbeat.
    pub heartbeat_at: DateTime<Utc>,
    /// Set by `worker stop`; the pool shuts down on its next heartbeat.
    pub stop_requested: bool,
}

impl WorkerPoolRecord {
    /// Status as of `now`.
    pub fn status_at(&self, now: DateTime<Utc>) -> WorkerStatus {
        WorkerStatus {
            total: self.total,
            active: self.active,
            uptime_ms: (now - self.started_at).num_milliseconds().max(0) as u64,
        }
    }
}
