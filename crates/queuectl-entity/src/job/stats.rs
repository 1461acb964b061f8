//! Per-state job counts.

use serde::{Deserialize, Serialize};

use super::state::JobState;

/// Number of jobs in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs waiting to be claimed.
    pub pending: u64,
    /// Jobs currently claimed by a worker.
    pub processing: u64,
    /// Jobs that succeeded.
    pub completed: u64,
    /// Jobs waiting out a retry backoff.
    pub failed: u64,
    /// Jobs in the dead letter queue.
    pub dead: u64,
}

impl QueueStats {
    /// Add `count` to the bucket for `state`.
    pub fn record(&mut self, state: JobState, count: u64) {
        let slot = match state {
            JobState::Pending => &mut self.pending,
            JobState::Processing => &mut self.processing,
            JobState::Completed => &mut self.completed,
            JobState::Failed => &mut self.failed,
            JobState::Dead => &mut self.dead,
        };
        *slot += count;
    }

    /// Count for `state`.
    pub fn get(&self, state: JobState) -> u64 {
        match state {
            JobState::Pending => self.pending,
            JobState::Processing => self.processing,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Dead => self.dead,
        }
    }

    /// Total number of jobs across all states.
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed + self.dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_total() {
        let mut stats = QueueStats::default();
        stats.record(JobState::Pending, 2);
        stats.record(JobState::Dead, 1);
        stats.record(JobState::Pending, 1);

        assert_eq!(stats.get(JobState::Pending), 3);
        assert_eq!(stats.dead, 1);
        assert_eq!(stats.total(), 4);
    }
}
