/// Retry policy embedded in a task
///
/// Failed deliveries are retried with exponential backoff: the delay before
/// attempt `n+1` is `clamp(min * factor^n, min, max)` seconds, where `n` is
/// the number of outcomes already recorded. A task stops retrying once it has
/// failed `max_attempts` times in a row.
///
/// # Example
///
/// With the defaults (`max_attempts=10, factor=2, min=10, max=300`), a task
/// that keeps failing is retried after 10s, 20s, 40s, 80s, 160s, and then
/// every 300s until the attempt budget is exhausted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exponential backoff parameters plus the live failure counter
///
/// Declarations may specify any subset of the parameters; missing fields
/// deserialize to their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Retry {
    /// Maximum number of consecutive failed deliveries before giving up
    pub max_attempts: i32,

    /// Backoff multiplier applied per recorded failure
    pub factor: i32,

    /// Minimum delay between attempts, in seconds
    pub min: i32,

    /// Maximum delay between attempts, in seconds
    pub max: i32,

    /// Consecutive failures recorded so far; reset to 0 on success
    pub attempts: i32,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            factor: 2,
            min: 10,
            max: 300,
            attempts: 0,
        }
    }
}

impl Retry {
    /// Fills zero-valued parameters with their defaults.
    ///
    /// Task declarations may omit any subset of the policy; omitted fields
    /// arrive as zero and take the default value.
    pub fn with_defaults(mut self) -> Self {
        let defaults = Retry::default();
        if self.max_attempts == 0 {
            self.max_attempts = defaults.max_attempts;
        }
        if self.factor == 0 {
            self.factor = defaults.factor;
        }
        if self.min == 0 {
            self.min = defaults.min;
        }
        if self.max == 0 {
            self.max = defaults.max;
        }
        self
    }

    /// Delay in seconds before the next attempt, given the current failure
    /// counter. Computed in integer seconds; overflow clamps to `max`.
    pub fn next_delay_secs(&self) -> i64 {
        let min = i64::from(self.min);
        let max = i64::from(self.max);
        let delay = min.saturating_mul(i64::from(self.factor).saturating_pow(self.attempts.max(0) as u32));
        delay.clamp(min, max)
    }

    /// Whether recording one more failure would exhaust the attempt budget.
    pub fn exhausted(&self) -> bool {
        self.attempts + 1 >= self.max_attempts
    }

    /// Next attempt time after a failure at `now`, as UTC nanoseconds.
    ///
    /// Returns `None` when the budget is exhausted and the failure should be
    /// terminal instead of retried.
    pub fn next_attempt_ns(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.exhausted() {
            return None;
        }
        let now_ns = now.timestamp_nanos_opt().unwrap_or(i64::MAX);
        Some(now_ns.saturating_add(self.next_delay_secs().saturating_mul(1_000_000_000)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults() {
        let retry = Retry::default();
        assert_eq!(retry.max_attempts, 10);
        assert_eq!(retry.factor, 2);
        assert_eq!(retry.min, 10);
        assert_eq!(retry.max, 300);
        assert_eq!(retry.attempts, 0);
    }

    #[test]
    fn test_with_defaults_fills_zeroes() {
        let retry = Retry {
            max_attempts: 0,
            factor: 0,
            min: 0,
            max: 0,
            attempts: 0,
        }
        .with_defaults();
        assert_eq!(retry, Retry::default());

        let retry = Retry {
            max_attempts: 3,
            factor: 1,
            min: 5,
            max: 0,
            attempts: 0,
        }
        .with_defaults();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.factor, 1);
        assert_eq!(retry.min, 5);
        assert_eq!(retry.max, 300);
    }

    #[test]
    fn test_delay_doubles_from_min() {
        // 10s, 20s, 40s for the first three failures with the defaults
        let mut retry = Retry::default();
        assert_eq!(retry.next_delay_secs(), 10);
        retry.attempts = 1;
        assert_eq!(retry.next_delay_secs(), 20);
        retry.attempts = 2;
        assert_eq!(retry.next_delay_secs(), 40);
    }

    #[test]
    fn test_delay_clamps_to_max() {
        let mut retry = Retry::default();
        retry.attempts = 5;
        assert_eq!(retry.next_delay_secs(), 300);

        // Large exponents saturate rather than overflow
        retry.attempts = 1000;
        assert_eq!(retry.next_delay_secs(), 300);
    }

    #[test]
    fn test_delay_constant_with_factor_one() {
        let retry = Retry {
            max_attempts: 2,
            factor: 1,
            min: 1,
            max: 1,
            attempts: 1,
        };
        assert_eq!(retry.next_delay_secs(), 1);
    }

    #[test]
    fn test_exhaustion_bound() {
        // max_attempts=2: the first failure schedules a retry, the second is terminal
        let mut retry = Retry {
            max_attempts: 2,
            factor: 1,
            min: 1,
            max: 1,
            attempts: 0,
        };
        assert!(!retry.exhausted());
        retry.attempts = 1;
        assert!(retry.exhausted());
    }

    #[test]
    fn test_next_attempt_ns() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let retry = Retry::default();
        let at = retry.next_attempt_ns(now).unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 10).unwrap();
        assert_eq!(at, expected.timestamp_nanos_opt().unwrap());
    }

    #[test]
    fn test_next_attempt_ns_exhausted() {
        let now = Utc::now();
        let retry = Retry {
            max_attempts: 1,
            ..Retry::default()
        };
        assert!(retry.next_attempt_ns(now).is_none());
    }
}
