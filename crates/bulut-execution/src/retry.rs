//! Retry budget, backoff and gateway call timeouts.

use std::time::Duration;

/// Default number of retry rounds, counting the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How hard the coordinator tries before giving up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Rounds allowed for one execution, counting the first.
    pub max_attempts: u32,
    /// Backoff before the second round; doubles each round after.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Deadline for a single gateway call.
    pub call_timeout: Duration,
    /// Settlement polls per round before leaving an execution in flight.
    pub confirm_polls: u32,
    pub confirm_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            call_timeout: Duration::from_secs(10),
            confirm_polls: 5,
            confirm_interval: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before starting round `completed + 1`, after `completed` rounds
    /// have failed: `base * 2^(completed - 1)`, capped at `max_delay`.
    pub fn backoff(&self, completed: u32) -> Duration {
        let exponent = completed.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Whether another round may start after `completed` rounds.
    pub fn allows_another(&self, completed: u32) -> bool {
        completed < self.max_attempts
    }
}
