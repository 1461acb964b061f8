//! Queue settings commands (`max-retries`, `backoff-base`).

use clap::{Args, Subcommand};
use serde_json::Value;

use crate::output::{self, OutputFormat};
use queuectl_core::config::AppConfig;
use queuectl_core::error::AppError;

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show one setting, or all of them
    Get {
        /// Setting key
        key: Option<String>,
    },
    /// Change a setting
    Set {
        /// Setting key (max-retries or backoff-base)
        key: String,
        /// New value
        value: String,
    },
}

/// Execute config commands
pub fn execute(args: &ConfigArgs, config: &AppConfig, format: OutputFormat) -> Result<(), AppError> {
    let settings = super::open_settings(config)?;

    match &args.command {
        ConfigCommand::Get { key: Some(key) } => {
            let value = settings.get(key)?.unwrap_or(Value::Null);
            match format {
                OutputFormat::Table => println!("{}", value),
                OutputFormat::Json => output::print_json(&value),
            }
        }
        ConfigCommand::Get { key: None } => {
            let all = settings.get_all()?;
            match format {
                OutputFormat::Table => {
                    for (key, value) in &all {
                        output::print_kv(key, &value.to_string());
                    }
                }
                OutputFormat::Json => output::print_json(&all),
            }
        }
        ConfigCommand::Set { key, value } => {
            settings.set(key, value)?;
            output::print_success(&format!("Set '{}' to {}", key, value.trim()));
        }
    }

    Ok(())
}
