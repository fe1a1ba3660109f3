/// Attempt model: one concrete delivery opportunity of a task
///
/// Attempts form a persistent, at-least-once, time-triggered work queue
/// partitioned by queue name. A task holds at most one non-terminal attempt
/// at any time; the worker-side reservation and completion queries live in
/// the worker crate, while creation, cancellation, and cascade deletion are
/// owned by the task state machine here.
///
/// # State Machine
///
/// ```text
/// pending → reserved → success
///                    → error
/// pending → canceled
/// reserved → canceled (task deleted or deactivated before delivery)
/// ```
///
/// A `reserved` attempt whose lease expired (`reserved_until < now`) is
/// treated as `pending` again by the dispatcher; there is no explicit
/// release step. Terminal statuses are never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::task::Task;
use super::{ListPage, ListParams};

/// Attempt delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    /// Waiting to become due
    Pending,

    /// Claimed by a worker under a lease
    Reserved,

    /// Delivered, endpoint answered 2xx
    Success,

    /// Delivery failed (non-2xx, network error, or timeout)
    Error,

    /// Withdrawn before delivery
    Canceled,
}

impl AttemptStatus {
    /// Converts status to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Reserved => "reserved",
            AttemptStatus::Success => "success",
            AttemptStatus::Error => "error",
            AttemptStatus::Canceled => "canceled",
        }
    }

    /// Checks if the status is terminal (never mutated again)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptStatus::Success | AttemptStatus::Error | AttemptStatus::Canceled
        )
    }
}

/// Attempt model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attempt {
    /// Unique attempt ID
    pub id: Uuid,

    /// Task this attempt delivers for
    pub task_id: Uuid,

    /// Account owning the task
    pub account_id: Uuid,

    /// Name of the parent application
    pub application: String,

    /// Queue partition the attempt is dispatched on
    pub queue: String,

    /// Due time, Unix seconds
    pub at: i64,

    /// Lease expiry, Unix seconds; 0 when not reserved
    pub reserved_until: i64,

    /// Current delivery status
    pub status: String,

    /// HTTP status code of the response; 0 before completion or on network error
    pub status_code: i32,

    /// Response body, truncated for storage
    pub response: String,

    /// When delivery started, Unix seconds
    pub started_at: i64,

    /// When delivery finished, Unix seconds
    pub finished_at: i64,

    /// Soft-delete flag, cascaded from the task
    pub deleted: bool,

    /// When the attempt was created
    pub created_at: DateTime<Utc>,
}

/// Columns fetched for every attempt query; shared with the worker's
/// reservation and completion queries
pub const ATTEMPT_COLUMNS: &str = "id, task_id, account_id, application, queue, at, \
     reserved_until, status, status_code, response, started_at, finished_at, deleted, created_at";

impl Attempt {
    /// Enqueues a pending attempt for a task at its scheduled time
    ///
    /// The task's nanosecond `at` is floored to whole seconds, the resolution
    /// of the attempt queue.
    pub async fn create(pool: &PgPool, task: &Task) -> Result<Self, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO attempts (id, task_id, account_id, application, queue, at, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING {ATTEMPT_COLUMNS}
            "#
        );
        let attempt = sqlx::query_as::<_, Attempt>(&sql)
            .bind(Uuid::new_v4())
            .bind(task.id)
            .bind(task.account_id)
            .bind(&task.application)
            .bind(&task.queue)
            .bind(task.at / 1_000_000_000)
            .fetch_one(pool)
            .await?;

        tracing::debug!(
            attempt_id = %attempt.id,
            task_id = %attempt.task_id,
            queue = %attempt.queue,
            at = attempt.at,
            "Enqueued attempt"
        );
        Ok(attempt)
    }

    /// Finds an attempt by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1");
        sqlx::query_as::<_, Attempt>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Cancels any live (pending or reserved) attempt of a task
    ///
    /// Invoked when a declaration is replaced, so the fresh attempt never
    /// coexists with the old one. Returns the number of attempts canceled.
    pub async fn cancel_pending(pool: &PgPool, task_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE attempts SET status = 'canceled' \
             WHERE task_id = $1 AND status IN ('pending', 'reserved')",
        )
        .bind(task_id)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::debug!(
                task_id = %task_id,
                count = result.rows_affected(),
                "Canceled outstanding attempts"
            );
        }
        Ok(result.rows_affected())
    }

    /// Lists the attempts of a task, newest first, with pagination
    ///
    /// Deleted attempts are invisible.
    pub async fn list_by_task(
        pool: &PgPool,
        task_id: Uuid,
        params: ListParams,
    ) -> Result<ListPage<Self>, sqlx::Error> {
        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM attempts WHERE task_id = $1 AND deleted = FALSE")
                .bind(task_id)
                .fetch_one(pool)
                .await?;

        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE task_id = $1 AND deleted = FALSE \
             ORDER BY at DESC, created_at DESC LIMIT $2 OFFSET $3"
        );
        let items = sqlx::query_as::<_, Attempt>(&sql)
            .bind(task_id)
            .bind(params.per_page)
            .bind(params.offset())
            .fetch_all(pool)
            .await?;

        Ok(ListPage::new(items, total, params))
    }
}
