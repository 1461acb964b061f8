//! Worker management CLI commands.

use std::sync::Arc;

use chrono::Utc;
use clap::{Args, Subcommand};

use crate::output;
use queuectl_core::config::AppConfig;
use queuectl_core::error::AppError;
use queuectl_worker::supervisor::alive_since;
use queuectl_worker::{ShellExecutor, WorkerPool, shutdown_signal};

/// Arguments for worker commands
#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Worker subcommand
    #[command(subcommand)]
    pub command: WorkerCommand,
}

/// Worker subcommands
#[derive(Debug, Subcommand)]
pub enum WorkerCommand {
    /// Start a worker pool in the foreground until Ctrl+C, SIGTERM, or `worker stop`
    Start {
        /// Number of workers
        #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        count: u32,
    },
    /// Ask every running worker pool to shut down gracefully
    Stop,
}

/// Execute worker commands
pub async fn execute(args: &WorkerArgs, config: &AppConfig) -> Result<(), AppError> {
    let db = super::open_store(config).await?;
    let registry = super::build_registry(&db);

    match &args.command {
        WorkerCommand::Start { count } => {
            let queue = super::build_queue(config, &db)?;
            let executor = Arc::new(ShellExecutor::new().with_timeout(config.worker.job_timeout()));

            let mut pool =
                WorkerPool::new(queue, executor, config.worker.clone()).with_registry(registry);
            pool.start(*count).await?;
            output::print_success(&format!(
                "Started {} worker(s) in pool '{}' (pid {})",
                count,
                pool.id(),
                std::process::id()
            ));

            let report = pool.run_until(shutdown_signal()).await;
            if report.forced > 0 {
                output::print_warning(&format!(
                    "Stopped {} worker(s) gracefully, aborted {} after the grace period",
                    report.graceful, report.forced
                ));
            } else {
                output::print_success(&format!("Stopped {} worker(s)", report.graceful));
            }
        }
        WorkerCommand::Stop => {
            let flagged = registry
                .request_stop_all(alive_since(Utc::now(), &config.worker))
                .await?;
            if flagged == 0 {
                output::print_warning("No running worker pools found");
            } else {
                output::print_success(&format!(
                    "Requested shutdown of {} worker pool(s); workers finish their current job first",
                    flagged
                ));
            }
        }
    }

    db.close().await;
    Ok(())
}
