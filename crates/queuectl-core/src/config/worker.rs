//! Background worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::result::AppResult;

/// Upper bound for every duration setting (one year). Keeps deadline and
/// cutoff arithmetic far away from overflow.
pub const MAX_DURATION_SECONDS: u64 = 365 * 24 * 60 * 60;

/// A running job is heartbeated this many times within the staleness window
/// before the reclaim sweep may take it.
pub const MIN_HEARTBEATS_PER_STALE_WINDOW: u64 = 2;

/// Worker loop and supervisor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// How long an idle worker sleeps before polling again, in milliseconds.
    #[serde(default = "default_idle_interval")]
    pub idle_interval_ms: u64,
    /// How long `stop` waits for workers to finish in-flight jobs before
    /// aborting them, in seconds.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    /// A `processing` job not heartbeated for this many seconds is
    /// reclaimed back to `pending`.
    #[serde(default = "default_stale_after")]
    pub stale_after_seconds: u64,
    /// Interval between job and pool heartbeats, in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Optional wall-clock limit for a single command. Unset means no limit.
    #[serde(default)]
    pub job_timeout_seconds: Option<u64>,
    /// Unit multiplied by `backoff-base ^ attempts` to get the retry delay,
    /// in milliseconds.
    #[serde(default = "default_backoff_unit")]
    pub backoff_unit_ms: u64,
}

impl WorkerConfig {
    /// Idle poll interval as a [`Duration`].
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// Staleness threshold for the reclaim sweep as a [`Duration`].
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_seconds)
    }

    /// Heartbeat interval as a [`Duration`]. Never zero.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds.max(1))
    }

    /// Per-job timeout, if configured.
    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_seconds.map(Duration::from_secs)
    }

    /// Backoff unit as a [`Duration`].
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    /// Reject settings that would let the reclaim sweep take a job whose
    /// worker is still heartbeating it, or that are out of range.
    pub fn validate(&self) -> AppResult<()> {
        let max_ms = MAX_DURATION_SECONDS * 1000;
        let checks = [
            ("idle_interval_ms", self.idle_interval_ms, max_ms),
            ("backoff_unit_ms", self.backoff_unit_ms, max_ms),
            ("shutdown_grace_seconds", self.shutdown_grace_seconds, MAX_DURATION_SECONDS),
            ("stale_after_seconds", self.stale_after_seconds, MAX_DURATION_SECONDS),
            (
                "heartbeat_interval_seconds",
                self.heartbeat_interval_seconds,
                MAX_DURATION_SECONDS,
            ),
            (
                "job_timeout_seconds",
                self.job_timeout_seconds.unwrap_or(0),
                MAX_DURATION_SECONDS,
            ),
        ];
        for (name, value, max) in checks {
            if value > max {
                return Err(AppError::configuration(format!(
                    "worker.{name} = {value} exceeds the maximum of {max}"
                )));
            }
        }

        let heartbeat = self.heartbeat_interval().as_secs();
        let min_stale = heartbeat * MIN_HEARTBEATS_PER_STALE_WINDOW;
        if self.stale_after_seconds <= min_stale {
            return Err(AppError::configuration(format!(
                "worker.stale_after_seconds = {} must be greater than {} \
                 ({} x heartbeat_interval_seconds = {})",
                self.stale_after_seconds, min_stale, MIN_HEARTBEATS_PER_STALE_WINDOW, heartbeat
            )));
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_interval_ms: default_idle_interval(),
            shutdown_grace_seconds: default_shutdown_grace(),
            stale_after_seconds: default_stale_after(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            job_timeout_seconds: None,
            backoff_unit_ms: default_backoff_unit(),
        }
    }
}

fn default_idle_interval() -> u64 {
    2_000
}

fn default_shutdown_grace() -> u64 {
    30
}

fn default_stale_after() -> u64 {
    300
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_backoff_unit() -> u64 {
    1_000
}
