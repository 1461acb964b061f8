//! Table and JSON output formatting for CLI commands.

use serde::Serialize;
use tabled::{Table, Tabled};

use queuectl_entity::job::Job;

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
}

/// Job display row for table output
#[derive(Debug, Tabled)]
pub struct JobRow {
    /// Job ID
    id: String,
    /// Command
    command: String,
    /// State
    state: String,
    /// Attempts
    attempts: u32,
    /// Max retries
    max_retries: u32,
    /// Created at
    created_at: String,
    /// Updated at
    updated_at: String,
    /// Last error
    error: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            command: truncate(&job.command, 40),
            state: job.state.to_string(),
            attempts: job.attempts,
            max_retries: job.max_retries,
            created_at: job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            updated_at: job.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            error: job.error.as_deref().map(|e| truncate(e, 60)).unwrap_or_default(),
        }
    }
}

/// Print a list of items in the selected format. Tables render each item
/// through its display row `R`; JSON serializes the items themselves.
pub fn print_list<T, R>(items: &[T], format: OutputFormat)
where
    T: Serialize,
    R: Tabled + for<'a> From<&'a T>,
{
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No results found.");
            } else {
                let rows: Vec<R> = items.iter().map(R::from).collect();
                println!("{}", Table::new(rows));
            }
        }
        OutputFormat::Json => print_json(items),
    }
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    let json = serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string());
    println!("{}", json);
}

/// Print a success message
pub fn print_success(msg: &str) {
    println!("✓ {}", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("⚠ {}", msg);
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: &str) {
    println!("  {:<24} {}", format!("{}:", key), value);
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
