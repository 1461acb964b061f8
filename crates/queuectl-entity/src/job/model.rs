//! Job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use queuectl_core::error::AppError;
use queuectl_core::result::AppResult;

use super::state::JobState;

/// A queued shell-command job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: String,
    /// Shell command to execute. Opaque to the queue.
    pub command: String,
    /// Current lifecycle state.
    pub state: JobState,
    /// Number of failed executions so far.
    pub attempts: u32,
    /// Retries permitted after the first failure.
    pub max_retries: u32,
    /// Creation time. Immutable.
    pub created_at: DateTime<Utc>,
    /// Time of the last state change or heartbeat.
    pub updated_at: DateTime<Utc>,
    /// Position in FIFO order. Equals `created_at` until a DLQ retry
    /// re-queues the job at the back.
    pub queued_at: DateTime<Utc>,
    /// Last failure message.
    pub error: Option<String>,
    /// Earliest time a job in backoff may run again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<DateTime<Utc>>,
    /// Worker currently holding the claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
}

impl Job {
    /// Total executions this job may receive (`max_retries + 1`).
    pub fn execution_budget(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Enqueue input as submitted by a client.
///
/// ```json
/// {"id": "optional", "command": "echo hi", "max_retries": 3}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnqueueRequest {
    /// Caller-chosen identifier; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Shell command to execute.
    pub command: String,
    /// Retry budget; the `max-retries` setting applies when absent.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl EnqueueRequest {
    /// Request for `command` with every optional field left to defaults.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: None,
            command: command.into(),
            max_retries: None,
        }
    }

    /// Set an explicit job id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set an explicit retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Parse and validate a JSON enqueue payload.
    pub fn from_json(raw: &str) -> AppResult<Self> {
        let request: Self = serde_json::from_str(raw)
            .map_err(|e| AppError::validation(format!("Invalid job JSON: {e}")))?;
        request.validate()?;
        Ok(request)
    }

    /// Check field-level constraints.
    pub fn validate(&self) -> AppResult<()> {
        if self.command.trim().is_empty() {
            return Err(AppError::validation("Job 'command' must not be empty"));
        }
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(AppError::validation("Job 'id' must not be empty when given"));
            }
        }
        Ok(())
    }

    /// Resolve defaults into a record ready for insertion.
    pub fn into_new_job(self, default_max_retries: u32, now: DateTime<Utc>) -> NewJob {
        NewJob {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            command: self.command,
            max_retries: self.max_retries.unwrap_or(default_max_retries),
            created_at: now,
        }
    }
}

/// Data required to insert a new job. State is always `pending` with zero
/// attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    /// Job identifier.
    pub id: String,
    /// Shell command.
    pub command: String,
    /// Retry budget.
    pub max_retries: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}
