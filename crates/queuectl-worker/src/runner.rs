//! Worker runner: the claim, execute, report loop of a single worker.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use queuectl_core::config::WorkerConfig;
use queuectl_core::error::{AppError, ErrorKind};
use queuectl_core::result::AppResult;
use queuectl_entity::job::Job;

use crate::executor::{CommandExecutor, CommandOutput, JobExecutionError};
use crate::queue::JobQueue;
use crate::retry::FailureDecision;

/// Ceiling for the delay between polls after store errors.
const MAX_STORE_BACKOFF: Duration = Duration::from_secs(30);

/// First delay after a store error.
const INITIAL_STORE_BACKOFF: Duration = Duration::from_millis(500);

/// How many times an outcome write is retried while the store is unavailable.
const REPORT_RETRIES: u32 = 5;

/// A single worker. Executes at most one job at a time.
#[derive(Debug)]
pub struct WorkerRunner {
    /// Lifecycle engine
    queue: Arc<JobQueue>,
    /// Runs job commands
    executor: Arc<dyn CommandExecutor>,
    /// Worker configuration
    config: WorkerConfig,
    /// Worker identifier, recorded as the owner of claimed jobs
    worker_id: String,
}

impl WorkerRunner {
    /// Create a new worker runner
    pub fn new(
        queue: Arc<JobQueue>,
        executor: Arc<dyn CommandExecutor>,
        config: WorkerConfig,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            executor,
            config,
            worker_id: worker_id.into(),
        }
    }

    /// Worker identifier.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run until the cancel signal is received.
    ///
    /// Cancellation is only observed between jobs. A job in flight runs to
    /// completion and its outcome is recorded before the loop exits.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        info!(
            worker_id = %self.worker_id,
            idle_interval_ms = self.config.idle_interval_ms,
            "Worker started"
        );

        let mut store_failures: u32 = 0;

        loop {
            if *cancel.borrow_and_update() {
                break;
            }

            let wait = match self.queue.claim(&self.worker_id).await {
                Ok(Some(job)) => {
                    store_failures = 0;
                    self.process(job).await;
                    continue;
                }
                Ok(None) => {
                    store_failures = 0;
                    debug!(worker_id = %self.worker_id, "No runnable jobs");
                    self.config.idle_interval()
                }
                Err(e) => {
                    store_failures = store_failures.saturating_add(1);
                    let delay = store_backoff(store_failures);
                    error!(
                        worker_id = %self.worker_id,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Failed to claim job"
                    );
                    delay
                }
            };

            tokio::select! {
                changed = cancel.changed() => {
                    // Sender dropped: the pool is gone.
                    if changed.is_err() {
                        break;
                    }
                }
                _ = time::sleep(wait) => {}
            }
        }

        info!(worker_id = %self.worker_id, "Worker stopped");
    }

    /// Execute a claimed job and record its outcome.
    async fn process(&self, job: Job) {
        info!(
            worker_id = %self.worker_id,
            job_id = %job.id,
            attempt = job.attempts + 1,
            budget = job.execution_budget(),
            "Processing job"
        );

        let outcome = self.execute_with_heartbeat(&job).await;
        self.report(&job, outcome).await;
    }

    /// Run the command while refreshing the job's heartbeat so the reclaim
    /// sweep leaves it alone.
    async fn execute_with_heartbeat(
        &self,
        job: &Job,
    ) -> Result<CommandOutput, JobExecutionError> {
        let execution = self.executor.execute(&job.command);
        tokio::pin!(execution);

        let mut ticker = time::interval(self.config.heartbeat_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the claim itself is fresh.
        ticker.tick().await;

        loop {
            tokio::select! {
                result = &mut execution => return result,
                _ = ticker.tick() => {
                    match self.queue.heartbeat(&job.id, &self.worker_id).await {
                        Ok(true) => {}
                        Ok(false) => warn!(
                            worker_id = %self.worker_id,
                            job_id = %job.id,
                            "Lost claim on running job"
                        ),
                        Err(e) => warn!(
                            worker_id = %self.worker_id,
                            job_id = %job.id,
                            error = %e,
                            "Failed to heartbeat job"
                        ),
                    }
                }
            }
        }
    }

    /// Persist the execution outcome.
    async fn report(&self, job: &Job, outcome: Result<CommandOutput, JobExecutionError>) {
        match outcome {
            Ok(output) => {
                match self
                    .with_store_retry(|| self.queue.complete(job, &self.worker_id))
                    .await
                {
                    Ok(_) => info!(
                        worker_id = %self.worker_id,
                        job_id = %job.id,
                        elapsed_ms = output.elapsed.as_millis() as u64,
                        "Job completed"
                    ),
                    Err(e) => self.log_report_error(job, &e),
                }
            }
            Err(err) => {
                let err = AppError::from(err);
                let message = err.message.as_str();
                match self
                    .with_store_retry(|| self.queue.fail(job, &self.worker_id, message))
                    .await
                {
                    Ok(FailureDecision::Retry { attempts, delay }) => warn!(
                        worker_id = %self.worker_id,
                        job_id = %job.id,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Job failed, retry scheduled"
                    ),
                    Ok(FailureDecision::DeadLetter { attempts }) => error!(
                        worker_id = %self.worker_id,
                        job_id = %job.id,
                        attempts,
                        error = %message,
                        "Job failed permanently, moved to dead letter queue"
                    ),
                    Err(e) => self.log_report_error(job, &e),
                }
            }
        }
    }

    fn log_report_error(&self, job: &Job, err: &AppError) {
        if err.is_recoverable() {
            warn!(
                worker_id = %self.worker_id,
                job_id = %job.id,
                error = %err,
                "Job changed while running, outcome discarded"
            );
        } else {
            error!(
                worker_id = %self.worker_id,
                job_id = %job.id,
                error = %err,
                "Failed to record job outcome"
            );
        }
    }

    /// Retry `op` with backoff while the store is unavailable.
    async fn with_store_retry<T, F, Fut>(&self, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut failures = 0;
        loop {
            match op().await {
                Err(e) if e.kind == ErrorKind::StoreUnavailable && failures < REPORT_RETRIES => {
                    failures += 1;
                    let delay = store_backoff(failures);
                    warn!(
                        worker_id = %self.worker_id,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Store unavailable while recording outcome"
                    );
                    time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

/// Delay after the `failures`-th consecutive store error.
fn store_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    INITIAL_STORE_BACKOFF
        .saturating_mul(1 << exponent)
        .min(MAX_STORE_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backoff_doubles_up_to_cap() {
        assert_eq!(store_backoff(1), Duration::from_millis(500));
        assert_eq!(store_backoff(2), Duration::from_secs(1));
        assert_eq!(store_backoff(3), Duration::from_secs(2));
        assert_eq!(store_backoff(7), Duration::from_secs(30));
        assert_eq!(store_backoff(u32::MAX), MAX_STORE_BACKOFF);
    }
}
