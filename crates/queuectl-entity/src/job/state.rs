//! Job state enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use queuectl_core::error::AppError;

/// Lifecycle state of a job.
///
/// ```text
/// pending --claim--> processing
/// processing --success--> completed
/// processing --failure, budget left--> failed --(backoff elapsed)--> pending
/// processing --failure, budget spent--> dead
/// dead --operator retry--> pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting to be claimed by a worker.
    Pending,
    /// Claimed by exactly one worker and executing.
    Processing,
    /// The command succeeded.
    Completed,
    /// The command failed and the job is waiting out its backoff delay.
    Failed,
    /// The retry budget is exhausted; the job sits in the dead letter queue.
    Dead,
}

impl JobState {
    /// Every state, in display order.
    pub const ALL: [JobState; 5] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::Dead,
    ];

    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                AppError::validation(format!(
                    "Unknown job state '{s}' (expected pending|processing|completed|failed|dead)"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("dead".parse::<JobState>().unwrap(), JobState::Dead);
        assert_eq!(" Pending ".parse::<JobState>().unwrap(), JobState::Pending);
        assert!("running".parse::<JobState>().is_err());
    }

    #[test]
    fn test_serde_uses_lowercase() {
        let json = serde_json::to_string(&JobState::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
