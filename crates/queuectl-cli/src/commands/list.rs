//! `queuectl list [--state S]`

use clap::Args;

use crate::output::{self, JobRow, OutputFormat};
use queuectl_core::config::AppConfig;
use queuectl_core::error::AppError;
use queuectl_entity::job::JobState;

/// Arguments for the list command
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only show jobs in this state (pending, processing, completed, failed, dead)
    #[arg(short, long)]
    pub state: Option<JobState>,
}

/// Execute the list command
pub async fn execute(
    args: &ListArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let db = super::open_store(config).await?;
    let queue = super::build_queue(config, &db)?;

    let jobs = queue.list(args.state).await?;
    output::print_list::<_, JobRow>(&jobs, format);
    Ok(())
}
