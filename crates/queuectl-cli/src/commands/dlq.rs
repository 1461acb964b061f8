//! Dead letter queue commands.

use clap::{Args, Subcommand};

use crate::output::{self, JobRow, OutputFormat};
use queuectl_core::config::AppConfig;
use queuectl_core::error::AppError;

/// Arguments for dlq commands
#[derive(Debug, Args)]
pub struct DlqArgs {
    /// DLQ subcommand
    #[command(subcommand)]
    pub command: DlqCommand,
}

/// DLQ subcommands
#[derive(Debug, Subcommand)]
pub enum DlqCommand {
    /// List jobs that exhausted their retries
    List,
    /// Move a dead job back to pending with its attempts reset
    Retry {
        /// Job ID
        id: String,
    },
}

/// Execute dlq commands
pub async fn execute(
    args: &DlqArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let db = super::open_store(config).await?;
    let queue = super::build_queue(config, &db)?;

    match &args.command {
        DlqCommand::List => {
            let jobs = queue.list_dlq().await?;
            output::print_list::<_, JobRow>(&jobs, format);
        }
        DlqCommand::Retry { id } => {
            let job = queue.retry_dead(id).await?;
            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Job '{}' moved back to pending", job.id))
                }
                OutputFormat::Json => output::print_json(&job),
            }
        }
    }

    Ok(())
}
