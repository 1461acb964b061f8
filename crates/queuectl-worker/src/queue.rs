//! Job lifecycle engine: enqueue, claim, and outcome handling layered on the
//! job store.
//!
//! All state changes go through [`JobRepository`] primitives; this type owns
//! the policy (defaults, retry budget, backoff, dead-lettering).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use queuectl_core::config::WorkerConfig;
use queuectl_core::error::AppError;
use queuectl_core::result::AppResult;
use queuectl_core::settings::{DEFAULT_BACKOFF_BASE, SettingsStore};
use queuectl_database::repositories::job::{JobRepository, Transition};
use queuectl_entity::job::{EnqueueRequest, Job, JobState, QueueStats};

use crate::retry::{FailureDecision, RetryPolicy};

/// The job lifecycle engine.
#[derive(Debug, Clone)]
pub struct JobQueue {
    /// Job store.
    repo: Arc<JobRepository>,
    /// Queue settings (`max-retries`, `backoff-base`).
    settings: SettingsStore,
    /// Multiplier for `backoff-base ^ attempts`.
    backoff_unit: Duration,
    /// Processing jobs older than this are reclaimed by the next claim.
    stale_after: Duration,
}

impl JobQueue {
    /// Create a new lifecycle engine. Fails if `config` would let the
    /// reclaim sweep take jobs that are still being heartbeated.
    pub fn new(
        repo: Arc<JobRepository>,
        settings: SettingsStore,
        config: &WorkerConfig,
    ) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            repo,
            settings,
            backoff_unit: config.backoff_unit(),
            stale_after: config.stale_after(),
        })
    }

    /// Validate `request`, apply defaults, and persist it as `pending`.
    pub async fn enqueue(&self, request: EnqueueRequest) -> AppResult<Job> {
        request.validate()?;
        let default_max_retries = self.settings.max_retries()?;
        let new_job = request.into_new_job(default_max_retries, Utc::now());

        let job = self.repo.insert(&new_job).await?;
        info!(
            job_id = %job.id,
            max_retries = job.max_retries,
            "Enqueued job"
        );
        Ok(job)
    }

    /// Claim the oldest runnable job for `worker_id`, or `None` if the
    /// worker should idle.
    pub async fn claim(&self, worker_id: &str) -> AppResult<Option<Job>> {
        self.claim_at(worker_id, Utc::now()).await
    }

    /// [`claim`](Self::claim) evaluated at `now`.
    pub async fn claim_at(&self, worker_id: &str, now: DateTime<Utc>) -> AppResult<Option<Job>> {
        let stale_before = stale_cutoff(now, self.stale_after);
        self.repo.claim_next(worker_id, now, stale_before).await
    }

    /// Tell the store `worker_id` is still executing `job_id`. Returns
    /// `false` if the claim has been lost.
    pub async fn heartbeat(&self, job_id: &str, worker_id: &str) -> AppResult<bool> {
        self.repo.heartbeat(job_id, worker_id, Utc::now()).await
    }

    /// Record a successful execution. `attempts` is left unchanged.
    pub async fn complete(&self, job: &Job, worker_id: &str) -> AppResult<Job> {
        let transition =
            Transition::new(&[JobState::Processing], JobState::Completed).owned_by(worker_id);
        let job = self.repo.transition(&job.id, &transition, Utc::now()).await?;
        debug!(job_id = %job.id, "Job marked completed");
        Ok(job)
    }

    /// Record a failed execution and apply the retry policy.
    pub async fn fail(&self, job: &Job, worker_id: &str, error: &str) -> AppResult<FailureDecision> {
        self.fail_at(job, worker_id, error, Utc::now()).await
    }

    /// [`fail`](Self::fail) evaluated at `now`.
    pub async fn fail_at(
        &self,
        job: &Job,
        worker_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> AppResult<FailureDecision> {
        let attempts = job.attempts.saturating_add(1);
        let decision = self.retry_policy().decide(attempts, job.max_retries);

        let transition = match decision {
            FailureDecision::Retry { delay, .. } => {
                let retry_at = now
                    .checked_add_signed(to_chrono(delay))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                Transition::new(&[JobState::Processing], JobState::Failed).with_retry_at(retry_at)
            }
            FailureDecision::DeadLetter { .. } => {
                Transition::new(&[JobState::Processing], JobState::Dead)
            }
        }
        .with_attempts(attempts)
        .with_error(error)
        .owned_by(worker_id);

        self.repo.transition(&job.id, &transition, now).await?;
        Ok(decision)
    }

    /// Operator retry of a dead-lettered job: back to `pending` with
    /// `attempts = 0`, at the back of the queue.
    pub async fn retry_dead(&self, id: &str) -> AppResult<Job> {
        let job = self
            .repo
            .reset_to_pending(id, &[JobState::Dead], Utc::now())
            .await?;
        info!(job_id = %job.id, "Dead letter job moved back to pending");
        Ok(job)
    }

    /// Get a job by ID.
    pub async fn get(&self, id: &str) -> AppResult<Job> {
        self.repo.get(id).await
    }

    /// List jobs, optionally filtered by state.
    pub async fn list(&self, state: Option<JobState>) -> AppResult<Vec<Job>> {
        self.repo.list(state).await
    }

    /// List the dead letter queue.
    pub async fn list_dlq(&self) -> AppResult<Vec<Job>> {
        self.repo.list_dlq().await
    }

    /// Count jobs per state.
    pub async fn stats(&self) -> AppResult<QueueStats> {
        self.repo.statistics().await
    }

    /// Current retry policy. An unreadable settings file must not strand a
    /// failed job in `processing`, so it falls back to the default base.
    fn retry_policy(&self) -> RetryPolicy {
        let base = self.settings.backoff_base().unwrap_or_else(|e: AppError| {
            warn!(error = %e, "Failed to read backoff-base, using default");
            DEFAULT_BACKOFF_BASE
        });
        RetryPolicy::new(base, self.backoff_unit)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Processing jobs last heartbeated before this instant are reclaimable.
fn stale_cutoff(now: DateTime<Utc>, stale_after: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(to_chrono(stale_after))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
