//! Backoff schedules.
//!
//! Persisted retries (a job or request waiting in `pending`) use
//! [`RetrySchedule`] to compute when the row becomes claimable again.
//! In-process retries of a single store call use backon.

use backon::ExponentialBuilder;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Exponential delay `base * 2^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct RetrySchedule {
    pub base: Duration,
    pub max: Duration,
}

impl RetrySchedule {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the next attempt, given how many attempts have failed so far.
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base.checked_mul(factor).unwrap_or(self.max).min(self.max)
    }

    pub fn next_available_at(&self, now: DateTime<Utc>, failed_attempts: u32) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.delay_for(failed_attempts))
            .unwrap_or_else(|_| chrono::Duration::seconds(self.max.as_secs() as i64));
        now + delay
    }
}

/// Short in-process backoff for transient store reads.
pub fn store_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(3)
}
