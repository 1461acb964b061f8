//! Exponential backoff and the retry-versus-dead-letter decision.

use std::time::Duration;

/// What happens to a job after a failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Park the job as `failed` and make it claimable again after `delay`.
    Retry {
        /// Attempt counter after this failure.
        attempts: u32,
        /// Backoff before the next execution.
        delay: Duration,
    },
    /// The retry budget is spent; move the job to the dead letter queue.
    DeadLetter {
        /// Attempt counter after this failure.
        attempts: u32,
    },
}

/// `delay(k) = base^k * unit`, where `k` is the attempt count after the
/// failure (so the first failure waits `base^1` units).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: u32,
    unit: Duration,
}

impl RetryPolicy {
    /// Policy with the given base (clamped to at least 1) and unit.
    pub fn new(base: u32, unit: Duration) -> Self {
        Self {
            base: base.max(1),
            unit,
        }
    }

    /// Exponent base.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Backoff before the retry that follows failure number `attempts`.
    /// Saturates instead of overflowing.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = u64::from(self.base)
            .checked_pow(attempts)
            .unwrap_or(u64::MAX);
        let millis = self.unit.as_millis().saturating_mul(u128::from(factor));
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Decide the fate of a job whose attempt counter has just become
    /// `attempts`. A job gets `max_retries + 1` executions in total.
    pub fn decide(&self, attempts: u32, max_retries: u32) -> FailureDecision {
        if attempts > max_retries {
            FailureDecision::DeadLetter { attempts }
        } else {
            FailureDecision::Retry {
                attempts,
                delay: self.delay_for(attempts),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(1))
    }
}
