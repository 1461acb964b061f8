//! CLI command definitions and dispatch.

pub mod config;
pub mod dlq;
pub mod enqueue;
pub mod list;
pub mod status;
pub mod worker;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use queuectl_core::config::AppConfig;
use queuectl_core::error::AppError;
use queuectl_core::logging::init_logging;
use queuectl_core::settings::SettingsStore;
use queuectl_database::{DatabasePool, JobRepository, WorkerPoolRepository};
use queuectl_worker::JobQueue;

/// queuectl: a persistent shell-command job queue
#[derive(Debug, Parser)]
#[command(name = "queuectl", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (optional; defaults apply when absent)
    #[arg(short, long, global = true, default_value = "queuectl.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Add a job to the queue
    Enqueue(enqueue::EnqueueArgs),
    /// Run or stop workers
    Worker(worker::WorkerArgs),
    /// Show job counts and worker status
    Status,
    /// List jobs
    List(list::ListArgs),
    /// Inspect and retry dead-lettered jobs
    Dlq(dlq::DlqArgs),
    /// Read and change queue settings
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let config = AppConfig::load(&self.config)?;
        init_logging(&config.logging);

        match &self.command {
            Commands::Enqueue(args) => enqueue::execute(args, &config, self.format).await,
            Commands::Worker(args) => worker::execute(args, &config).await,
            Commands::Status => status::execute(&config, self.format).await,
            Commands::List(args) => list::execute(args, &config, self.format).await,
            Commands::Dlq(args) => dlq::execute(args, &config, self.format).await,
            Commands::Config(args) => config::execute(args, &config, self.format),
        }
    }
}

/// Helper: open the queue settings file
pub fn open_settings(config: &AppConfig) -> Result<SettingsStore, AppError> {
    SettingsStore::open(&config.settings.path)
}

/// Helper: connect to the job store
pub async fn open_store(config: &AppConfig) -> Result<DatabasePool, AppError> {
    DatabasePool::connect(&config.database).await
}

/// Helper: build the lifecycle engine on top of an open store
pub fn build_queue(config: &AppConfig, db: &DatabasePool) -> Result<Arc<JobQueue>, AppError> {
    let settings = open_settings(config)?;
    let repo = Arc::new(JobRepository::new(db.pool().clone()));
    Ok(Arc::new(JobQueue::new(repo, settings, &config.worker)?))
}

/// Helper: worker pool registry on top of an open store
pub fn build_registry(db: &DatabasePool) -> Arc<WorkerPoolRepository> {
    Arc::new(WorkerPoolRepository::new(db.pool().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_worker_start_with_global_flags() {
        let cli =
            Cli::try_parse_from(["queuectl", "worker", "start", "--count", "3", "--format", "json"])
                .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.config, "queuectl.toml");
        match cli.command {
            Commands::Worker(worker::WorkerArgs {
                command: worker::WorkerCommand::Start { count },
            }) => assert_eq!(count, 3),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_list_state_filter() {
        let cli = Cli::try_parse_from(["queuectl", "list", "--state", "dead"]).unwrap();
        match cli.command {
            Commands::List(args) => {
                assert_eq!(args.state, Some(queuectl_entity::job::JobState::Dead))
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Cli::try_parse_from(["queuectl", "list", "--state", "sleeping"]).is_err());
    }

    #[test]
    fn test_worker_count_must_be_positive() {
        assert!(Cli::try_parse_from(["queuectl", "worker", "start", "--count", "0"]).is_err());
    }
}
