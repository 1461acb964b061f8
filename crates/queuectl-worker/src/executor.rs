//! Command executor: runs a job's shell command as a child process.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use queuectl_core::error::{AppError, ErrorKind};

/// Longest stderr excerpt carried into a job's error message.
const MAX_STDERR_CHARS: usize = 500;

/// Captured result of a successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock execution time.
    pub elapsed: Duration,
}

/// Error from command execution. Every variant counts as a failed attempt.
#[derive(Debug, thiserror::Error)]
pub enum JobExecutionError {
    /// The command ran and exited unsuccessfully.
    #[error("command failed ({status}){}", stderr_suffix(.stderr))]
    Failed {
        /// Exit status description (code or terminating signal).
        status: String,
        /// Trimmed, truncated standard error.
        stderr: String,
    },

    /// The shell could not be started.
    #[error("failed to spawn command: {0}")]
    Spawn(#[source] std::io::Error),

    /// Waiting on the child or reading its output failed.
    #[error("failed to collect command output: {0}")]
    Io(#[source] std::io::Error),

    /// The command exceeded the configured per-job timeout and was killed.
    #[error("command timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl From<JobExecutionError> for AppError {
    fn from(err: JobExecutionError) -> Self {
        AppError::with_source(ErrorKind::CommandExecution, err.to_string(), err)
    }
}

/// Runs job commands.
#[async_trait]
pub trait CommandExecutor: Send + Sync + std::fmt::Debug {
    /// Execute `command` to completion.
    async fn execute(&self, command: &str) -> Result<CommandOutput, JobExecutionError>;
}

/// Runs commands through the platform shell (`sh -c`, or `cmd /C` on
/// Windows), capturing stdout and stderr.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor {
    timeout: Option<Duration>,
}

impl ShellExecutor {
    /// Executor with no time limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill commands that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str) -> Result<CommandOutput, JobExecutionError> {
        let started = Instant::now();

        // Dropping the child (timeout or an aborted worker) kills it.
        let child = shell_command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(JobExecutionError::Spawn)?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| JobExecutionError::Timeout(limit))?,
            None => child.wait_with_output().await,
        }
        .map_err(JobExecutionError::Io)?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let elapsed = started.elapsed();

        debug!(
            status = %output.status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Command finished"
        );

        if output.status.success() {
            Ok(CommandOutput {
                stdout,
                stderr,
                elapsed,
            })
        } else {
            Err(JobExecutionError::Failed {
                status: output.status.to_string(),
                stderr: stderr.chars().take(MAX_STDERR_CHARS).collect(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_maps_to_command_execution() {
        let err = AppError::from(JobExecutionError::Failed {
            status: "exit status: 3".into(),
            stderr: "boom".into(),
        });
        assert_eq!(err.kind, ErrorKind::CommandExecution);
        assert_eq!(err.message, "command failed (exit status: 3): boom");
        assert!(!err.is_recoverable());

        let err = AppError::from(JobExecutionError::Timeout(Duration::from_secs(2)));
        assert_eq!(err.message, "command timed out after 2s");
    }

    #[tokio::test]
    async fn test_success_captures_stdout() {
        let output = ShellExecutor::new().execute("echo hi").await.unwrap();
        assert_eq!(output.stdout, "hi");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure_with_stderr() {
        let err = ShellExecutor::new()
            .execute("echo oops >&2; exit 3")
            .await
            .unwrap_err();
        match &err {
            JobExecutionError::Failed { status, stderr } => {
                assert!(status.contains('3'), "status: {status}");
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().ends_with(": oops"));
    }

    #[tokio::test]
    async fn test_unknown_command_fails() {
        let err = ShellExecutor::new()
            .execute("definitely-not-a-real-command-queuectl")
            .await
            .unwrap_err();
        assert!(matches!(err, JobExecutionError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let started = Instant::now();
        let err = ShellExecutor::new()
            .with_timeout(Some(Duration::from_millis(200)))
            .execute("sleep 5")
            .await
            .unwrap_err();
        assert!(matches!(err, JobExecutionError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
