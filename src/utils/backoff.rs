//! Exponential backoff for the waterfall
//!
//! Provides the delay calculation and the per-placement attempt tracker that
//! spaces out auction cycles after failures.

use crate::error::BackoffError;
use std::time::Duration;

/// Calculate exponential backoff delay for a given attempt number.
///
/// # Arguments
///
/// * `attempt` - Current attempt number (0-indexed)
/// * `base_delay_ms` - Delay in milliseconds for the first retry
/// * `max_delay_ms` - Maximum delay cap in milliseconds
///
/// # Example
///
/// ```
/// use mediation_core::utils::backoff::exponential_backoff;
/// use std::time::Duration;
///
/// assert_eq!(exponential_backoff(0, 100, 5000), Duration::from_millis(100));
/// assert_eq!(exponential_backoff(3, 100, 5000), Duration::from_millis(800));
/// assert_eq!(exponential_backoff(9, 100, 5000), Duration::from_millis(5000));
/// ```
pub fn exponential_backoff(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> Duration {
    let delay_ms = base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(max_delay_ms);
    Duration::from_millis(delay_ms)
}

/// Attempt tracker producing `min(initial * 2^attempt, max)` delays.
///
/// Every [`next_delay`](Self::next_delay) call consumes one attempt; once
/// `max_attempts` have been handed out the strategy reports
/// [`BackoffError::MaxAttemptsReached`] until [`reset`](Self::reset).
///
/// ```rust
/// use mediation_core::utils::backoff::BackoffStrategy;
/// use std::time::Duration;
///
/// let mut backoff = BackoffStrategy::new(Duration::from_secs(1), Duration::from_secs(30));
/// assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(1));
/// assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(2));
/// assert_eq!(backoff.reset(), Duration::ZERO);
/// ```
#[derive(Debug, Clone)]
pub struct BackoffStrategy {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl BackoffStrategy {
    /// Strategy without an attempt limit
    #[must_use]
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self::with_max_attempts(initial_delay, max_delay, u32::MAX)
    }

    #[must_use]
    pub fn with_max_attempts(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay before the next retry; consumes one attempt.
    pub fn next_delay(&mut self) -> Result<Duration, BackoffError> {
        if self.attempt >= self.max_attempts {
            return Err(BackoffError::MaxAttemptsReached {
                max_attempts: self.max_attempts,
            });
        }

        let delay = exponential_backoff(
            self.attempt,
            self.initial_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
        );
        self.attempt = self.attempt.saturating_add(1);
        Ok(delay)
    }

    /// Start over; the next retry may happen immediately.
    pub fn reset(&mut self) -> Duration {
        self.attempt = 0;
        Duration::ZERO
    }

    /// Attempts consumed since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
