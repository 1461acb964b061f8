//! Job processing for queuectl.
//!
//! This crate provides:
//! - [`JobQueue`], the lifecycle engine (enqueue, claim, complete, fail, DLQ retry)
//! - [`ShellExecutor`], which runs a job's command through the shell
//! - [`WorkerRunner`], the claim-execute-report loop of a single worker
//! - [`WorkerPool`], which starts, observes, and stops a set of workers

pub mod executor;
pub mod queue;
pub mod retry;
pub mod runner;
pub mod signal;
pub mod supervisor;

pub use executor::{CommandExecutor, CommandOutput, JobExecutionError, ShellExecutor};
pub use queue::JobQueue;
pub use retry::{FailureDecision, RetryPolicy};
pub use runner::WorkerRunner;
pub use signal::shutdown_signal;
pub use supervisor::{ShutdownReport, WorkerPool};
