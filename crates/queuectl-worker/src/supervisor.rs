//! Worker pool supervisor: starts N workers, reports their status, and stops
//! them gracefully with a bounded grace period.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use queuectl_core::config::WorkerConfig;
use queuectl_core::config::worker::MAX_DURATION_SECONDS;
use queuectl_core::error::AppError;
use queuectl_core::result::AppResult;
use queuectl_database::WorkerPoolRepository;
use queuectl_entity::worker::WorkerStatus;

use crate::executor::CommandExecutor;
use crate::queue::JobQueue;
use crate::runner::WorkerRunner;

/// A registry row is considered dead after this many missed heartbeats.
pub const LIVENESS_HEARTBEATS: u32 = 3;

/// How a stop request was satisfied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that exited on their own within the grace period.
    pub graceful: usize,
    /// Workers aborted when the grace period ran out. Their in-flight
    /// command was killed and the job is left for the reclaim sweep.
    pub forced: usize,
}

/// Supervises a pool of [`WorkerRunner`]s sharing one [`JobQueue`].
pub struct WorkerPool {
    id: String,
    queue: Arc<JobQueue>,
    executor: Arc<dyn CommandExecutor>,
    config: WorkerConfig,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<(String, JoinHandle<()>)>,
    started: Option<Instant>,
    registry: Option<Arc<WorkerPoolRepository>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("id", &self.id)
            .field("workers", &self.workers.len())
            .field("registered", &self.registry.is_some())
            .finish()
    }
}

impl WorkerPool {
    /// Create a stopped pool.
    pub fn new(
        queue: Arc<JobQueue>,
        executor: Arc<dyn CommandExecutor>,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("pool-{}", &suffix[..8]),
            queue,
            executor,
            config,
            shutdown_tx,
            workers: Vec::new(),
            started: None,
            registry: None,
        }
    }

    /// Publish this pool's status to the shared registry so `status` and
    /// `worker stop` work from other processes.
    pub fn with_registry(mut self, registry: Arc<WorkerPoolRepository>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Pool identifier. Worker ids are `<pool id>-<n>`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the pool has running workers.
    pub fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }

    /// Start `count` workers.
    pub async fn start(&mut self, count: u32) -> AppResult<()> {
        if count == 0 {
            return Err(AppError::validation("Worker count must be at least 1"));
        }
        if self.is_running() {
            return Err(AppError::validation(format!(
                "Worker pool '{}' is already running",
                self.id
            )));
        }
        self.config.validate()?;

        let now = Utc::now();
        if let Some(registry) = &self.registry {
            let pruned = registry.prune_stale(alive_since(now, &self.config)).await?;
            if pruned > 0 {
                info!(count = pruned, "Pruned stale worker pool registrations");
            }
            let status = WorkerStatus {
                total: count,
                active: count,
                uptime_ms: 0,
            };
            registry
                .register(&self.id, std::process::id(), status, now)
                .await?;
        }

        self.shutdown_tx.send_replace(false);
        self.started = Some(Instant::now());

        for n in 1..=count {
            let worker_id = format!("{}-{}", self.id, n);
            let runner = WorkerRunner::new(
                Arc::clone(&self.queue),
                Arc::clone(&self.executor),
                self.config.clone(),
                worker_id.clone(),
            );
            let cancel = self.shutdown_tx.subscribe();
            let handle = tokio::spawn(async move { runner.run(cancel).await });
            self.workers.push((worker_id, handle));
        }

        info!(pool_id = %self.id, count, "Worker pool started");
        Ok(())
    }

    /// Current status. A worker counts as active until its loop exits.
    pub fn status(&self) -> WorkerStatus {
        let active = self
            .workers
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count();
        WorkerStatus {
            total: self.workers.len() as u32,
            active: active as u32,
            uptime_ms: self
                .started
                .as_ref()
                .map(|started| started.elapsed().as_millis() as u64)
                .unwrap_or(0),
        }
    }

    /// Signal every worker to stop after its current job and wait up to the
    /// grace period. Workers still running after that are aborted, which
    /// kills their child process.
    pub async fn stop(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        if !self.is_running() {
            return report;
        }

        info!(
            pool_id = %self.id,
            grace_seconds = self.config.shutdown_grace_seconds,
            "Stopping worker pool"
        );
        self.shutdown_tx.send_replace(true);

        let deadline = grace_deadline(time::Instant::now(), self.config.shutdown_grace());
        for (worker_id, mut handle) in self.workers.drain(..) {
            match time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.graceful += 1,
                Ok(Err(e)) => {
                    error!(worker_id = %worker_id, error = %e, "Worker task failed");
                    report.graceful += 1;
                }
                Err(_) => {
                    warn!(worker_id = %worker_id, "Grace period expired, aborting worker");
                    handle.abort();
                    let _ = handle.await;
                    report.forced += 1;
                }
            }
        }

        if let Some(registry) = &self.registry {
            if let Err(e) = registry.deregister(&self.id).await {
                warn!(pool_id = %self.id, error = %e, "Failed to deregister worker pool");
            }
        }
        self.started = None;

        info!(
            pool_id = %self.id,
            graceful = report.graceful,
            forced = report.forced,
            "Worker pool stopped"
        );
        report
    }

    /// Keep the pool alive until `signal` resolves, a stop is requested
    /// through the registry, or every worker has exited. Then stop it.
    pub async fn run_until<F>(&mut self, signal: F) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(signal);

        let mut ticker = time::interval(self.config.heartbeat_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.is_running() {
            tokio::select! {
                _ = &mut signal => {
                    info!(pool_id = %self.id, "Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    if self.stop_requested().await {
                        info!(pool_id = %self.id, "Stop requested");
                        break;
                    }
                    if self.status().active == 0 {
                        warn!(pool_id = %self.id, "All workers exited");
                        break;
                    }
                }
            }
        }

        self.stop().await
    }

    /// Heartbeat the registry row and report whether a stop was requested.
    async fn stop_requested(&self) -> bool {
        let Some(registry) = &self.registry else {
            return false;
        };
        match registry.heartbeat(&self.id, self.status(), Utc::now()).await {
            Ok(stop) => stop,
            Err(e) => {
                warn!(pool_id = %self.id, error = %e, "Failed to heartbeat worker pool");
                false
            }
        }
    }
}

/// How recently a pool must have heartbeated to count as live.
pub fn liveness_window(config: &WorkerConfig) -> ChronoDuration {
    config
        .heartbeat_interval()
        .checked_mul(LIVENESS_HEARTBEATS)
        .and_then(|window| ChronoDuration::from_std(window).ok())
        .unwrap_or(ChronoDuration::MAX)
}

/// Pools heartbeated at or after this instant count as live.
pub fn alive_since(now: DateTime<Utc>, config: &WorkerConfig) -> DateTime<Utc> {
    now.checked_sub_signed(liveness_window(config))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// When `stop` gives up waiting and aborts. Saturates at a far-future
/// instant rather than overflowing.
fn grace_deadline(now: time::Instant, grace: std::time::Duration) -> time::Instant {
    now.checked_add(grace)
        .or_else(|| now.checked_add(std::time::Duration::from_secs(MAX_DURATION_SECONDS)))
        .unwrap_or(now)
}
