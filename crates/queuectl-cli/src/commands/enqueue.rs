//! `queuectl enqueue <json>`

use clap::Args;

use crate::output::{self, OutputFormat};
use queuectl_core::config::AppConfig;
use queuectl_core::error::AppError;
use queuectl_entity::job::EnqueueRequest;

/// Arguments for the enqueue command
#[derive(Debug, Args)]
pub struct EnqueueArgs {
    /// Job as JSON: {"id"?: string, "command": string, "max_retries"?: int}
    pub json: String,
}

/// Execute the enqueue command
pub async fn execute(
    args: &EnqueueArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let request = EnqueueRequest::from_json(&args.json)?;

    let db = super::open_store(config).await?;
    let queue = super::build_queue(config, &db)?;
    let job = queue.enqueue(request).await?;

    match format {
        OutputFormat::Table => output::print_success(&format!(
            "Job '{}' enqueued (max_retries: {})",
            job.id, job.max_retries
        )),
        OutputFormat::Json => output::print_json(&job),
    }
    Ok(())
}
