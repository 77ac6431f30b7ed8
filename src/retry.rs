//! Finite retry policy for backend calls.
//!
//! Each call-site owns its own policy instance, so retry behavior is part
//! of the call contract rather than hidden in a global interceptor.
//! Only transient failures (connect errors, timeouts, 5xx) are retried;
//! 4xx responses never are.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff schedule with full jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy for interactive calls: 3 attempts, 500ms base, capped at 5s.
    pub fn interactive() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }

    /// No retries at all. Used for the import call itself, which is not
    /// idempotent: a timed-out import must not be silently re-sent.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Upper bound of the backoff window before a given retry.
    ///
    /// `attempt` is zero-based: attempt 0 is the first retry. Doubles per
    /// attempt, capped at `max_delay`. Pure, so the schedule is testable
    /// without sleeping.
    pub fn delay_ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Actual delay before a retry: uniformly sampled from the window.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling = self.delay_ceiling(attempt);
        if ceiling.is_zero() {
            return Duration::ZERO;
        }
        let millis = rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);
        Duration::from_millis(millis)
    }
}
