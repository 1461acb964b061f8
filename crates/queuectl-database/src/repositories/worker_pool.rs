//! Worker pool registry.
//!
//! Each supervising process registers its pool here and refreshes the row on
//! every heartbeat. Other processes read it for `status` and flag it for
//! `worker stop`.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use queuectl_core::error::{AppError, ErrorKind};
use queuectl_core::result::AppResult;
use queuectl_entity::worker::{WorkerPoolRecord, WorkerStatus};

use crate::time::{from_ms, to_ms};

#[derive(Debug, FromRow)]
struct WorkerPoolRow {
    id: String,
    pid: i64,
    total: i64,
    active: i64,
    started_at: i64,
    heartbeat_at: i64,
    stop_requested: bool,
}

impl From<WorkerPoolRow> for WorkerPoolRecord {
    fn from(row: WorkerPoolRow) -> Self {
        Self {
            id: row.id,
            pid: u32::try_from(row.pid).unwrap_or_default(),
            total: u32::try_from(row.total).unwrap_or_default(),
            active: u32::try_from(row.active).unwrap_or_default(),
            started_at: from_ms(row.started_at),
            heartbeat_at: from_ms(row.heartbeat_at),
            stop_requested: row.stop_requested,
        }
    }
}

fn store_error(context: &str, err: sqlx::Error) -> AppError {
    AppError::with_source(ErrorKind::StoreUnavailable, format!("{context}: {err}"), err)
}

/// Repository for the `worker_pools` table.
#[derive(Debug, Clone)]
pub struct WorkerPoolRepository {
    pool: SqlitePool,
}

impl WorkerPoolRepository {
    /// Create a new worker pool repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a freshly started pool.
    pub async fn register(
        &self,
        id: &str,
        pid: u32,
        status: WorkerStatus,
        started_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let started = to_ms(started_at);
        sqlx::query(
            "INSERT INTO worker_pools (id, pid, total, active, started_at, heartbeat_at, stop_requested) \
             VALUES (?, ?, ?, ?, ?, ?, 0) \
             ON CONFLICT(id) DO UPDATE SET pid = excluded.pid, total = excluded.total, \
             active = excluded.active, started_at = excluded.started_at, \
             heartbeat_at = excluded.heartbeat_at, stop_requested = 0",
        )
        .bind(id)
        .bind(i64::from(pid))
        .bind(i64::from(status.total))
        .bind(i64::from(status.active))
        .bind(started)
        .bind(started)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to register worker pool", e))?;
        Ok(())
    }

    /// Refresh the pool's row. Returns whether a stop has been requested.
    /// A row removed by `prune_stale` is treated as a stop request.
    pub async fn heartbeat(
        &self,
        id: &str,
        status: WorkerStatus,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let stop: Option<bool> = sqlx::query_scalar(
            "UPDATE worker_pools SET total = ?, active = ?, heartbeat_at = ? \
             WHERE id = ? RETURNING stop_requested",
        )
        .bind(i64::from(status.total))
        .bind(i64::from(status.active))
        .bind(to_ms(now))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to heartbeat worker pool", e))?;

        Ok(stop.unwrap_or(true))
    }

    /// Remove the pool's row on shutdown.
    pub async fn deregister(&self, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM worker_pools WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("Failed to deregister worker pool", e))?;
        Ok(())
    }

    /// Pools that heartbeated at or after `alive_since`.
    pub async fn list_live(&self, alive_since: DateTime<Utc>) -> AppResult<Vec<WorkerPoolRecord>> {
        sqlx::query_as::<_, WorkerPoolRow>(
            "SELECT * FROM worker_pools WHERE heartbeat_at >= ? ORDER BY started_at ASC",
        )
        .bind(to_ms(alive_since))
        .fetch_all(&self.pool)
        .await
        .map(|rows| rows.into_iter().map(WorkerPoolRecord::from).collect())
        .map_err(|e| store_error("Failed to list worker pools", e))
    }

    /// Ask every live pool to shut down. Returns how many were flagged.
    pub async fn request_stop_all(&self, alive_since: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE worker_pools SET stop_requested = 1 \
             WHERE heartbeat_at >= ? AND stop_requested = 0",
        )
        .bind(to_ms(alive_since))
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to request worker stop", e))?;
        Ok(result.rows_affected())
    }

    /// Delete rows of pools that stopped heartbeating before `alive_since`
    /// (their process died without deregistering).
    pub async fn prune_stale(&self, alive_since: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM worker_pools WHERE heartbeat_at < ?")
            .bind(to_ms(alive_since))
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("Failed to prune worker pools", e))?;
        Ok(result.rows_affected())
    }
}
