//! Cron normalization and next-fire computation.
//!
//! Task schedules use standard 5-field cron expressions
//! (`min hour day-of-month month day-of-week`). The `cron` crate expects six
//! fields with a leading seconds column, so expressions are normalized before
//! parsing.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use thiserror::Error;

/// Cron parsing / evaluation error
#[derive(Debug, Error)]
pub enum CronError {
    /// The expression does not parse as a cron schedule
    #[error("invalid cron expression {expr:?}: {source}")]
    Invalid {
        expr: String,
        #[source]
        source: cron::error::Error,
    },

    /// The schedule has no upcoming fire time
    #[error("cron expression {0:?} has no upcoming fire time")]
    NoUpcomingFire(String),
}

/// Normalize a 5-field cron expression to the 6-field form by prepending a
/// `0` seconds field. Expressions that already carry six or more fields pass
/// through unchanged.
fn normalize(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Validates a cron expression without evaluating it.
///
/// # Errors
///
/// Returns [`CronError::Invalid`] when the expression does not parse.
pub fn validate(expr: &str) -> Result<(), CronError> {
    Schedule::from_str(&normalize(expr))
        .map(|_| ())
        .map_err(|source| CronError::Invalid {
            expr: expr.to_string(),
            source,
        })
}

/// Returns the next fire time strictly after `now`, in UTC.
///
/// # Errors
///
/// Returns [`CronError::Invalid`] for unparseable expressions and
/// [`CronError::NoUpcomingFire`] when the schedule is exhausted.
pub fn next_run(expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, CronError> {
    let schedule = Schedule::from_str(&normalize(expr)).map_err(|source| CronError::Invalid {
        expr: expr.to_string(),
        source,
    })?;
    schedule
        .after(&now)
        .next()
        .ok_or_else(|| CronError::NoUpcomingFire(expr.to_string()))
}

/// Returns the next fire time as UTC nanoseconds, the resolution used for
/// task scheduling.
pub fn next_run_ns(expr: &str, now: DateTime<Utc>) -> Result<i64, CronError> {
    let next = next_run(expr, now)?;
    // Saturates past 2262, far beyond any schedulable horizon.
    Ok(next.timestamp_nanos_opt().unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn normalize_prepends_seconds_field() {
        assert_eq!(normalize("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(normalize("  * * * * *  "), "0 * * * * *");
    }

    #[test]
    fn normalize_passes_six_fields_through() {
        assert_eq!(normalize("30 */5 * * * *"), "30 */5 * * * *");
    }

    #[test]
    fn validate_accepts_standard_expressions() {
        assert!(validate("* * * * *").is_ok());
        assert!(validate("0 12 * * 1-5").is_ok());
        assert!(validate("*/15 3 1 * *").is_ok());
    }

    #[test]
    fn validate_rejects_garbage() {
        assert!(validate("not a cron").is_err());
        assert!(validate("99 * * * *").is_err());
        assert!(validate("").is_err());
    }

    #[test]
    fn next_run_every_five_minutes() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 10, 2, 17).unwrap();
        let next = next_run("*/5 * * * *", now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 1, 10, 5, 0).unwrap());
    }

    #[test]
    fn next_run_is_strictly_after_now() {
        let boundary = Utc.with_ymd_and_hms(2025, 6, 1, 10, 5, 0).unwrap();
        let next = next_run("*/5 * * * *", boundary).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 1, 10, 10, 0).unwrap());
    }

    #[test]
    fn next_run_every_minute() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 23, 59, 30).unwrap();
        let next = next_run("* * * * *", now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn next_run_ns_matches_datetime() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 10, 2, 0).unwrap();
        let ns = next_run_ns("*/5 * * * *", now).unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 10, 5, 0).unwrap();
        assert_eq!(ns, expected.timestamp_nanos_opt().unwrap());
    }
}
