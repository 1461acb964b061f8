//! `queuectl status`

use chrono::Utc;
use serde::Serialize;

use crate::output::{self, OutputFormat};
use queuectl_core::config::AppConfig;
use queuectl_core::error::AppError;
use queuectl_entity::job::{JobState, QueueStats};
use queuectl_entity::worker::WorkerStatus;
use queuectl_worker::supervisor::alive_since;

#[derive(Debug, Serialize)]
struct StatusReport {
    jobs: QueueStats,
    workers: WorkerStatus,
    pools: usize,
}

/// Execute the status command
pub async fn execute(config: &AppConfig, format: OutputFormat) -> Result<(), AppError> {
    let db = super::open_store(config).await?;
    let queue = super::build_queue(config, &db)?;
    let registry = super::build_registry(&db);

    let jobs = queue.stats().await?;
    let now = Utc::now();
    let pools = registry.list_live(alive_since(now, &config.worker)).await?;
    let statuses: Vec<WorkerStatus> = pools.iter().map(|p| p.status_at(now)).collect();
    let report = StatusReport {
        jobs,
        workers: WorkerStatus::aggregate(&statuses),
        pools: pools.len(),
    };

    match format {
        OutputFormat::Table => {
            println!("Jobs:");
            for state in JobState::ALL {
                output::print_kv(state_label(state), &report.jobs.get(state).to_string());
            }
            output::print_kv("Total", &report.jobs.total().to_string());
            println!("Workers:");
            output::print_kv("Pools", &report.pools.to_string());
            output::print_kv("Total", &report.workers.total.to_string());
            output::print_kv("Active", &report.workers.active.to_string());
            output::print_kv("Uptime", &format_uptime(report.workers.uptime_ms));
        }
        OutputFormat::Json => output::print_json(&report),
    }

    db.close().await;
    Ok(())
}

fn state_label(state: JobState) -> &'static str {
    match state {
        JobState::Pending => "Pending",
        JobState::Processing => "Processing",
        JobState::Completed => "Completed",
        JobState::Failed => "Failed (retrying)",
        JobState::Dead => "Dead",
    }
}

fn format_uptime(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}h {}m {}s", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(0), "0h 0m 0s");
        assert_eq!(format_uptime(3_723_999), "1h 2m 3s");
    }

    #[test]
    fn test_state_rows_cover_every_state() {
        let mut stats = QueueStats::default();
        stats.record(JobState::Failed, 2);
        stats.record(JobState::Dead, 1);

        let rows: Vec<(&str, u64)> = JobState::ALL
            .into_iter()
            .map(|state| (state_label(state), stats.get(state)))
            .collect();
        assert_eq!(rows.len(), 5);
        assert!(rows.contains(&("Failed (retrying)", 2)));
        assert!(rows.contains(&("Dead", 1)));
        assert_eq!(rows.iter().map(|(_, n)| n).sum::<u64>(), stats.total());
    }
}
