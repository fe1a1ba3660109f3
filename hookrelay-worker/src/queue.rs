/// Attempt reservation queue (dispatcher)
///
/// This module hands due attempts to worker slots under a bounded lease.
/// A reservation atomically claims the earliest eligible attempt on a queue;
/// an attempt is eligible when it is due, not deleted, and either pending or
/// holding an expired lease. Crashed workers therefore lose nothing: once
/// `reserved_until` passes, the attempt becomes reservable again and another
/// worker picks it up. Delivery semantics are at-least-once.
///
/// # Ordering
///
/// Within a queue, attempts are dispatched in order of their due time
/// (ties broken by attempt ID for determinism). Across queues there is no
/// ordering.
///
/// # Example
///
/// ```no_run
/// use hookrelay_worker::queue::AttemptQueue;
/// use hookrelay_shared::models::attempt::AttemptStatus;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let queue = AttemptQueue::new(pool, "default".to_string(), 60);
///
/// if let Some(attempt) = queue.reserve().await? {
///     // deliver...
///     queue.complete(attempt.id, AttemptStatus::Success, 200, "ok").await?;
/// }
/// # Ok(())
/// # }
/// ```

use std::time::Duration;

use chrono::Utc;
use hookrelay_shared::models::attempt::{Attempt, AttemptStatus, ATTEMPT_COLUMNS};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

/// Attempt queue error
#[derive(Debug, Error)]
pub enum QueueError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Reservation service over one queue partition
#[derive(Clone)]
pub struct AttemptQueue {
    /// Database connection pool
    db: PgPool,

    /// Queue partition served by this instance
    queue: String,

    /// Lease duration granted per reservation, seconds
    ///
    /// Must exceed the worker's HTTP timeout plus completion write latency,
    /// otherwise a slow delivery gets stolen mid-flight.
    lease_seconds: i64,
}

impl AttemptQueue {
    /// Creates a reservation service for a queue
    pub fn new(db: PgPool, queue: String, lease_seconds: i64) -> Self {
        AttemptQueue {
            db,
            queue,
            lease_seconds,
        }
    }

    /// Queue partition served by this instance
    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    /// Atomically claims the earliest eligible attempt, if any
    ///
    /// Marks the row `reserved` with a fresh lease and stamps `started_at`.
    /// `FOR UPDATE SKIP LOCKED` keeps concurrent workers from fighting over
    /// the same row: each reservation claims a distinct attempt or none.
    ///
    /// # Errors
    ///
    /// Returns an error if the reservation query fails; the caller should
    /// back off and retry.
    pub async fn reserve(&self) -> Result<Option<Attempt>, QueueError> {
        let now = Utc::now().timestamp();
        let sql = format!(
            r#"
            WITH due AS (
                SELECT id AS due_id
                FROM attempts
                WHERE queue = $1
                  AND deleted = FALSE
                  AND at <= $2
                  AND (status = 'pending' OR (status = 'reserved' AND reserved_until < $2))
                ORDER BY at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE attempts
            SET status = 'reserved',
                reserved_until = $3,
                started_at = $2
            FROM due
            WHERE attempts.id = due.due_id
            RETURNING {ATTEMPT_COLUMNS}
            "#
        );

        let attempt = sqlx::query_as::<_, Attempt>(&sql)
            .bind(&self.queue)
            .bind(now)
            .bind(now + self.lease_seconds)
            .fetch_optional(&self.db)
            .await?;

        if let Some(ref attempt) = attempt {
            tracing::debug!(
                attempt_id = %attempt.id,
                task_id = %attempt.task_id,
                queue = %self.queue,
                reserved_until = attempt.reserved_until,
                "Reserved attempt"
            );
        }
        Ok(attempt)
    }

    /// Finalizes a reserved attempt with a terminal status
    ///
    /// The write is gated on `status = 'reserved'`: when the lease expired
    /// and another worker took the attempt over, no row matches and `None`
    /// comes back, telling the caller to discard its outcome. Terminal rows
    /// are never mutated.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion query fails
    pub async fn complete(
        &self,
        attempt_id: Uuid,
        status: AttemptStatus,
        status_code: i32,
        response: &str,
    ) -> Result<Option<Attempt>, QueueError> {
        debug_assert!(status.is_terminal());

        let sql = format!(
            r#"
            UPDATE attempts
            SET status = $2,
                status_code = $3,
                response = $4,
                finished_at = $5
            WHERE id = $1 AND status = 'reserved'
            RETURNING {ATTEMPT_COLUMNS}
            "#
        );

        let attempt = sqlx::query_as::<_, Attempt>(&sql)
            .bind(attempt_id)
            .bind(status.as_str())
            .bind(status_code)
            .bind(response)
            .bind(Utc::now().timestamp())
            .fetch_optional(&self.db)
            .await?;

        match attempt {
            Some(ref attempt) => {
                tracing::debug!(
                    attempt_id = %attempt.id,
                    status = %attempt.status,
                    status_code = attempt.status_code,
                    "Completed attempt"
                );
            }
            None => {
                tracing::warn!(
                    attempt_id = %attempt_id,
                    "Lease no longer held, discarding completion"
                );
            }
        }
        Ok(attempt)
    }

    /// Back-off to apply when a reservation came back empty
    ///
    /// Sleeps until the next pending attempt on this queue becomes due, but
    /// never longer than `poll_interval`. A 100ms floor avoids a tight spin
    /// when a due row raced past the reservation.
    pub async fn next_due_in(&self, poll_interval: Duration) -> Result<Duration, QueueError> {
        let (next_at,): (Option<i64>,) = sqlx::query_as(
            "SELECT MIN(at) FROM attempts \
             WHERE queue = $1 AND deleted = FALSE AND status = 'pending'",
        )
        .bind(&self.queue)
        .fetch_one(&self.db)
        .await?;

        let backoff = match next_at {
            Some(at) => {
                let until_due = at - Utc::now().timestamp();
                if until_due <= 0 {
                    Duration::from_millis(100)
                } else {
                    poll_interval.min(Duration::from_secs(until_due as u64))
                }
            }
            None => poll_interval,
        };
        Ok(backoff)
    }
}

#[cfg(test)]
mod tests {
    // Reservation and completion are exercised against a live database in
    // the integration suite under tests/.
}
