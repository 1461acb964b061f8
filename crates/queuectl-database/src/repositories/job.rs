//! Job repository: durable storage and atomic state-transition primitives.
//!
//! Every mutation is a single conditional `UPDATE`/`INSERT` statement.
//! SQLite serializes writers, so a statement that selects and updates a row
//! cannot interleave with another writer. This is what makes
//! [`JobRepository::claim_next`] hand each pending job to exactly one caller,
//! across tasks and across processes sharing the database file.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, warn};

use queuectl_core::error::{AppError, ErrorKind};
use queuectl_core::result::AppResult;
use queuectl_entity::job::{Job, JobState, NewJob, QueueStats};

use crate::time::{from_ms, to_ms};

/// A requested state change, applied only if the job is currently in one of
/// the `from` states (and, when `owner` is set, still claimed by that
/// worker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    from: Vec<JobState>,
    to: JobState,
    attempts: Option<u32>,
    error: Option<String>,
    retry_at: Option<DateTime<Utc>>,
    owner: Option<String>,
}

impl Transition {
    /// Move from any of `from` to `to`.
    pub fn new(from: &[JobState], to: JobState) -> Self {
        Self {
            from: from.to_vec(),
            to,
            attempts: None,
            error: None,
            retry_at: None,
            owner: None,
        }
    }

    /// Overwrite the attempt counter.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Record a failure message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Earliest time the job may be reclaimed.
    pub fn with_retry_at(mut self, retry_at: DateTime<Utc>) -> Self {
        self.retry_at = Some(retry_at);
        self
    }

    /// Only apply while `worker_id` still holds the claim.
    pub fn owned_by(mut self, worker_id: impl Into<String>) -> Self {
        self.owner = Some(worker_id.into());
        self
    }
}

/// Row shape of the `jobs` table.
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    command: String,
    state: JobState,
    attempts: i64,
    max_retries: i64,
    created_at: i64,
    updated_at: i64,
    queued_at: i64,
    retry_at: Option<i64>,
    worker_id: Option<String>,
    error: Option<String>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.id,
            command: row.command,
            state: row.state,
            attempts: u32::try_from(row.attempts).unwrap_or(u32::MAX),
            max_retries: u32::try_from(row.max_retries).unwrap_or(u32::MAX),
            created_at: from_ms(row.created_at),
            updated_at: from_ms(row.updated_at),
            queued_at: from_ms(row.queued_at),
            retry_at: row.retry_at.map(from_ms),
            worker_id: row.worker_id,
            error: row.error,
        }
    }
}

fn store_error(context: &str, err: sqlx::Error) -> AppError {
    AppError::with_source(ErrorKind::StoreUnavailable, format!("{context}: {err}"), err)
}

/// Repository for job records and queue operations.
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    /// Create a new job repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a new job as `pending` with zero attempts.
    pub async fn insert(&self, job: &NewJob) -> AppResult<Job> {
        let created = to_ms(job.created_at);

        let result = sqlx::query_as::<_, JobRow>(
            "INSERT INTO jobs (id, command, state, attempts, max_retries, created_at, updated_at, queued_at) \
             VALUES (?, ?, 'pending', 0, ?, ?, ?, ?) RETURNING *",
        )
        .bind(&job.id)
        .bind(&job.command)
        .bind(i64::from(job.max_retries))
        .bind(created)
        .bind(created)
        .bind(created)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.into()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                AppError::duplicate_id(format!("A job with id '{}' already exists", job.id)),
            ),
            Err(e) => Err(store_error("Failed to insert job", e)),
        }
    }

    /// Find a job by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<Job>> {
        sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.map(Job::from))
            .map_err(|e| store_error("Failed to find job", e))
    }

    /// Get a job by ID, failing with `NotFound` when absent.
    pub async fn get(&self, id: &str) -> AppResult<Job> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Job '{id}' not found")))
    }

    /// List jobs in creation order, optionally restricted to one state.
    pub async fn list(&self, state: Option<JobState>) -> AppResult<Vec<Job>> {
        let rows = match state {
            Some(state) => {
                sqlx::query_as::<_, JobRow>(
                    "SELECT * FROM jobs WHERE state = ? ORDER BY created_at ASC, rowid ASC",
                )
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, JobRow>("SELECT * FROM jobs ORDER BY created_at ASC, rowid ASC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| store_error("Failed to list jobs", e))?;

        Ok(rows.into_iter().map(Job::from).collect())
    }

    /// List the dead letter queue, most recently dead-lettered last.
    pub async fn list_dlq(&self) -> AppResult<Vec<Job>> {
        sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE state = 'dead' ORDER BY updated_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map(|rows| rows.into_iter().map(Job::from).collect())
        .map_err(|e| store_error("Failed to list dead letter queue", e))
    }

    /// Count jobs per state.
    pub async fn statistics(&self) -> AppResult<QueueStats> {
        let rows: Vec<(JobState, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| store_error("Failed to count jobs", e))?;

        let mut stats = QueueStats::default();
        for (state, count) in rows {
            stats.record(state, count.max(0) as u64);
        }
        Ok(stats)
    }

    /// Claim the oldest runnable job for `worker_id`.
    ///
    /// Before claiming, failed jobs whose backoff has elapsed (`retry_at <=
    /// now`) are promoted back to `pending`, and `processing` jobs not
    /// heartbeated since `stale_before` are reclaimed to `pending`. The claim
    /// itself is one conditional update, so concurrent callers never receive
    /// the same job. Returns `None` when nothing is claimable.
    pub async fn claim_next(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> AppResult<Option<Job>> {
        self.promote_due_retries(now).await?;
        self.reclaim_stale(now, stale_before).await?;

        let row = sqlx::query_as::<_, JobRow>(
            "UPDATE jobs SET state = 'processing', worker_id = ?, updated_at = ?, retry_at = NULL \
             WHERE id = ( \
                SELECT id FROM jobs \
                WHERE state = 'pending' \
                ORDER BY queued_at ASC, created_at ASC, rowid ASC \
                LIMIT 1 \
             ) AND state = 'pending' \
             RETURNING *",
        )
        .bind(worker_id)
        .bind(to_ms(now))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to claim job", e))?;

        let job = row.map(Job::from);
        if let Some(job) = &job {
            debug!(job_id = %job.id, worker_id, "Claimed job");
        }
        Ok(job)
    }

    /// Move failed jobs whose backoff delay has elapsed back to `pending`.
    /// Their FIFO position (`queued_at`) is kept.
    pub async fn promote_due_retries(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let now = to_ms(now);
        let result = sqlx::query(
            "UPDATE jobs SET state = 'pending', retry_at = NULL, updated_at = ? \
             WHERE state = 'failed' AND COALESCE(retry_at, 0) <= ?",
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to promote due retries", e))?;

        Ok(result.rows_affected())
    }

    /// Reclaim sweep: return `processing` jobs whose last heartbeat is older
    /// than `stale_before` to `pending`, releasing the dead worker's claim.
    pub async fn reclaim_stale(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'pending', worker_id = NULL, updated_at = ? \
             WHERE state = 'processing' AND updated_at < ?",
        )
        .bind(to_ms(now))
        .bind(to_ms(stale_before))
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to reclaim stale jobs", e))?;

        let reclaimed = result.rows_affected();
        if reclaimed > 0 {
            warn!(reclaimed, "Reclaimed stale processing jobs");
        }
        Ok(reclaimed)
    }

    /// Apply `transition` to job `id` atomically.
    ///
    /// Fails with `NotFound` if the job does not exist and with
    /// `StaleTransition` if it is no longer in an allowed source state or no
    /// longer owned by the expected worker.
    pub async fn transition(
        &self,
        id: &str,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> AppResult<Job> {
        if transition.from.is_empty() {
            return Err(AppError::internal("Transition requires at least one source state"));
        }

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE jobs SET state = ");
        qb.push_bind(transition.to.as_str());
        qb.push(", updated_at = ");
        qb.push_bind(to_ms(now));
        if let Some(attempts) = transition.attempts {
            qb.push(", attempts = ");
            qb.push_bind(i64::from(attempts));
        }
        if let Some(error) = &transition.error {
            qb.push(", error = ");
            qb.push_bind(error.clone());
        }
        qb.push(", retry_at = ");
        qb.push_bind(transition.retry_at.map(to_ms));
        if transition.to != JobState::Processing {
            qb.push(", worker_id = NULL");
        }

        qb.push(" WHERE id = ");
        qb.push_bind(id.to_string());
        qb.push(" AND state IN (");
        let mut states = qb.separated(", ");
        for state in &transition.from {
            states.push_bind(state.as_str());
        }
        states.push_unseparated(")");
        if let Some(owner) = &transition.owner {
            qb.push(" AND worker_id = ");
            qb.push_bind(owner.clone());
        }
        qb.push(" RETURNING *");

        let row = qb
            .build_query_as::<JobRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("Failed to transition job", e))?;

        match row {
            Some(row) => Ok(row.into()),
            None => Err(self.explain_rejected(id, transition).await),
        }
    }

    /// Refresh `updated_at` of a job `worker_id` is still executing, so the
    /// reclaim sweep leaves it alone. Returns `false` if the claim was lost.
    pub async fn heartbeat(&self, id: &str, worker_id: &str, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET updated_at = ? WHERE id = ? AND state = 'processing' AND worker_id = ?",
        )
        .bind(to_ms(now))
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to heartbeat job", e))?;

        Ok(result.rows_affected() == 1)
    }

    /// Reset a job to `pending` with `attempts = 0` and no error, if it is
    /// currently in one of `from`. The job is re-queued at the back of FIFO
    /// order (`queued_at = now`); `created_at` is untouched.
    pub async fn reset_to_pending(
        &self,
        id: &str,
        from: &[JobState],
        now: DateTime<Utc>,
    ) -> AppResult<Job> {
        let now_ms = to_ms(now);
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "UPDATE jobs SET state = 'pending', attempts = 0, error = NULL, retry_at = NULL, \
             worker_id = NULL, queued_at = ",
        );
        qb.push_bind(now_ms);
        qb.push(", updated_at = ");
        qb.push_bind(now_ms);
        qb.push(" WHERE id = ");
        qb.push_bind(id.to_string());
        qb.push(" AND state IN (");
        let mut states = qb.separated(", ");
        for state in from {
            states.push_bind(state.as_str());
        }
        states.push_unseparated(")");
        qb.push(" RETURNING *");

        let row = qb
            .build_query_as::<JobRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("Failed to reset job", e))?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                let current = self.get(id).await?;
                Err(AppError::stale_transition(format!(
                    "Job '{id}' is {}, expected one of [{}]",
                    current.state,
                    join_states(from)
                )))
            }
        }
    }

    async fn explain_rejected(&self, id: &str, transition: &Transition) -> AppError {
        match self.find_by_id(id).await {
            Ok(None) => AppError::not_found(format!("Job '{id}' not found")),
            Ok(Some(current)) if !transition.from.contains(&current.state) => {
                AppError::stale_transition(format!(
                    "Job '{id}' is {}, cannot move to {} (expected one of [{}])",
                    current.state,
                    transition.to,
                    join_states(&transition.from)
                ))
            }
            Ok(Some(current)) => AppError::stale_transition(format!(
                "Job '{id}' is now held by {}, not {}",
                current.worker_id.as_deref().unwrap_or("no worker"),
                transition.owner.as_deref().unwrap_or("no worker")
            )),
            Err(e) => e,
        }
    }
}

fn join_states(states: &[JobState]) -> String {
    states
        .iter()
        .map(JobState::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
