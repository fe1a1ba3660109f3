/// Task model and the scheduling state machine
///
/// A task is a user-declared outbound HTTP call (URL, method, headers,
/// payload, optional basic auth) plus a delivery policy: one-shot, recurrent
/// per a cron expression, or retry-on-failure with exponential backoff. The
/// task row carries the live scheduling state; every transition is a pure
/// function of the stored row and the wall clock, applied through a single
/// atomic `UPDATE ... RETURNING` so concurrent workers cannot double-schedule.
///
/// # State Machine
///
/// ```text
/// pending → success → (next cron occurrence, or done)
///         → retrying → ... → error (retry budget exhausted)
///         → canceled (declaration replaced or deactivated)
/// ```
///
/// A task holds at most one non-terminal attempt at any time: replacing a
/// declaration cancels the outstanding attempt before enqueueing a fresh one,
/// and outcome ingress only enqueues a successor after the previous attempt
/// reached a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use super::attempt::Attempt;
use super::retry::Retry;
use super::{ListPage, ListParams, ModelError};
use crate::cron;

/// Queue used when a declaration does not name one
pub const DEFAULT_QUEUE: &str = "default";

/// Task scheduling status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for the first delivery
    Pending,

    /// Last delivery failed, a retry is scheduled
    Retrying,

    /// Declaration was replaced or deactivated
    Canceled,

    /// Last delivery succeeded
    Success,

    /// Last delivery failed and the retry budget is exhausted
    Error,
}

impl TaskStatus {
    /// Converts status to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Retrying => "retrying",
            TaskStatus::Canceled => "canceled",
            TaskStatus::Success => "success",
            TaskStatus::Error => "error",
        }
    }

    /// Parses a status string, as received in a list filter
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownStatus`] for anything outside the five
    /// task statuses.
    pub fn parse(s: &str) -> Result<Self, ModelError> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "retrying" => Ok(TaskStatus::Retrying),
            "canceled" => Ok(TaskStatus::Canceled),
            "success" => Ok(TaskStatus::Success),
            "error" => Ok(TaskStatus::Error),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

/// Outcome of one delivery, reported by a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Endpoint answered with a 2xx status
    Success,

    /// Non-2xx status, network error, or timeout
    Error,
}

impl AttemptOutcome {
    /// Whether this outcome is a success
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }
}

/// HTTP Basic auth credentials attached to a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpAuth {
    /// Basic auth username
    pub username: String,

    /// Basic auth password
    pub password: String,
}

/// Input for creating or replacing a task
///
/// Everything except `url` may be omitted; omitted fields take defaults
/// during normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Queue partition the task's attempts are dispatched on
    #[serde(default)]
    pub queue: String,

    /// URL the worker will request
    pub url: String,

    /// HTTP method (default POST)
    #[serde(default)]
    pub method: String,

    /// HTTP headers sent with every delivery
    #[serde(default)]
    pub headers: JsonValue,

    /// Body POSTed to the URL; cleared for any other method
    #[serde(default)]
    pub payload: String,

    /// Optional HTTP Basic auth
    #[serde(default)]
    pub auth: Option<HttpAuth>,

    /// Cron expression describing the recurrence, empty for one-shot
    #[serde(default)]
    pub schedule: String,

    /// Retry strategy in case of delivery errors
    #[serde(default)]
    pub retry: Retry,

    /// Whether the task produces attempts (default true)
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl TaskSpec {
    /// Applies declaration defaults.
    ///
    /// - empty queue → `"default"`
    /// - empty method → `POST`, otherwise uppercased
    /// - payload is only valid for POST and is cleared for other methods
    /// - non-object headers → `{}`
    /// - zero-valued retry parameters take their defaults; the live failure
    ///   counter always starts at 0
    pub fn normalized(mut self) -> Self {
        if self.queue.is_empty() {
            self.queue = DEFAULT_QUEUE.to_string();
        }
        if self.method.is_empty() {
            self.method = "POST".to_string();
        } else {
            self.method = self.method.to_uppercase();
        }
        if self.method != "POST" {
            self.payload.clear();
        }
        if !self.headers.is_object() {
            self.headers = serde_json::json!({});
        }
        self.retry = Retry {
            attempts: 0,
            ..self.retry
        }
        .with_defaults();
        self
    }
}

/// Columns fetched for every task query
const TASK_COLUMNS: &str = "id, account_id, application, name, queue, url, method, headers, \
     payload, auth_username, auth_password, schedule, at, status, active, deleted, executed, \
     executions, errors, last_error, last_success, retry_max_attempts, retry_factor, retry_min, \
     retry_max, retry_attempts, created_at, updated_at";

/// Task model: the user's declaration plus live scheduling state
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    /// Unique task ID
    pub id: Uuid,

    /// Account owning the task
    pub account_id: Uuid,

    /// Name of the parent application
    pub application: String,

    /// Task name; `(account_id, application, name)` is unique
    pub name: String,

    /// Queue partition for the task's attempts
    pub queue: String,

    /// URL the worker will request
    pub url: String,

    /// HTTP method used to execute the request
    pub method: String,

    /// HTTP headers sent with every delivery (JSON object of strings)
    pub headers: JsonValue,

    /// Body POSTed to the URL
    pub payload: String,

    /// Basic auth username, if any
    pub auth_username: Option<String>,

    /// Basic auth password, if any
    pub auth_password: Option<String>,

    /// Cron expression describing the recurrence, empty for one-shot
    pub schedule: String,

    /// Next scheduled execution, UTC nanoseconds; 0 means "not scheduled"
    pub at: i64,

    /// Current scheduling status
    pub status: String,

    /// Whether the task produces further attempts
    pub active: bool,

    /// Soft-delete flag; deleted tasks are invisible and produce no attempts
    pub deleted: bool,

    /// When the last attempt completed, Unix seconds
    pub executed: i64,

    /// Number of attempts executed
    pub executions: i32,

    /// Number of attempts that failed
    pub errors: i32,

    /// When the last failed attempt completed, Unix seconds
    pub last_error: i64,

    /// When the last successful attempt completed, Unix seconds
    pub last_success: i64,

    /// Retry policy: maximum consecutive failures
    pub retry_max_attempts: i32,

    /// Retry policy: backoff multiplier
    pub retry_factor: i32,

    /// Retry policy: minimum delay, seconds
    pub retry_min: i32,

    /// Retry policy: maximum delay, seconds
    pub retry_max: i32,

    /// Retry policy: consecutive failures recorded so far
    pub retry_attempts: i32,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was last updated
    pub updated_at: DateTime<Utc>,
}

/// Optional filters for task listing
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFilters {
    /// `Some(true)` keeps only cron tasks, `Some(false)` only one-shot tasks
    pub schedule: Option<bool>,

    /// Keep only tasks in this status
    pub status: Option<TaskStatus>,
}

/// Where the task state machine lands after a delivery outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePlan {
    /// New task status
    pub status: TaskStatus,

    /// Next scheduled execution, UTC nanoseconds; 0 means "done"
    pub at: i64,

    /// Derived from `at`: a task without a next execution deactivates
    pub active: bool,
}

/// Computes the scheduling consequence of a delivery outcome.
///
/// Pure function of the current row and the clock:
/// - an error with retry budget remaining schedules a retry after
///   `clamp(min * factor^attempts, min, max)` seconds and overrides the
///   status to `retrying`;
/// - otherwise an active cron task re-enters its next occurrence, keeping
///   the outcome as status;
/// - otherwise the task is done (`at = 0`).
///
/// # Errors
///
/// Returns [`ModelError::Cron`] when the stored schedule fails to evaluate.
pub fn schedule_after_outcome(
    task: &Task,
    outcome: AttemptOutcome,
    now: DateTime<Utc>,
) -> Result<SchedulePlan, ModelError> {
    let cron_at = if task.active && !task.schedule.is_empty() {
        cron::next_run_ns(&task.schedule, now)?
    } else {
        0
    };

    let (status, at) = match outcome {
        AttemptOutcome::Error => match task.retry().next_attempt_ns(now) {
            Some(retry_at) => (TaskStatus::Retrying, retry_at),
            None => (TaskStatus::Error, cron_at),
        },
        AttemptOutcome::Success => (TaskStatus::Success, cron_at),
    };

    Ok(SchedulePlan {
        status,
        at,
        active: at > 0,
    })
}

impl Task {
    /// The retry policy embedded in this row
    pub fn retry(&self) -> Retry {
        Retry {
            max_attempts: self.retry_max_attempts,
            factor: self.retry_factor,
            min: self.retry_min,
            max: self.retry_max,
            attempts: self.retry_attempts,
        }
    }

    /// Error rate of the task from 0 to 100 percent
    pub fn error_rate(&self) -> i32 {
        if self.executions == 0 {
            return 0;
        }
        self.errors * 100 / self.executions
    }

    /// Creates a task, or replaces the declaration of an existing one
    ///
    /// Applies declaration defaults (`name = id` when empty, queue/method/
    /// payload/retry normalization) and computes the first execution time:
    /// the next cron occurrence when a schedule is set, otherwise right now.
    ///
    /// On a `(account_id, application, name)` conflict the existing row is
    /// updated in place (url, method, headers, payload, auth, schedule,
    /// retry, `at`, `active`) and undeleted. The stored `active` flag is
    /// `at > 0 AND spec.active`, so an explicit `active=false` wins over a
    /// schedule.
    ///
    /// In both cases any outstanding pending or reserved attempt is canceled
    /// first and exactly one fresh pending attempt is enqueued at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Cron`] for an invalid schedule, or
    /// [`ModelError::Database`] if a store operation fails.
    pub async fn create_or_replace(
        pool: &PgPool,
        account_id: Uuid,
        application: &str,
        name: &str,
        spec: TaskSpec,
    ) -> Result<Self, ModelError> {
        let id = Uuid::new_v4();
        let name = if name.is_empty() {
            id.simple().to_string()
        } else {
            name.to_string()
        };
        let spec = spec.normalized();

        let now = Utc::now();
        let at = if spec.schedule.is_empty() {
            now.timestamp_nanos_opt().unwrap_or(i64::MAX)
        } else {
            cron::next_run_ns(&spec.schedule, now)?
        };
        let active = at > 0 && spec.active;

        let (auth_username, auth_password) = match &spec.auth {
            Some(auth) => (Some(auth.username.clone()), Some(auth.password.clone())),
            None => (None, None),
        };

        let sql = format!(
            r#"
            INSERT INTO tasks (id, account_id, application, name, queue, url, method, headers,
                               payload, auth_username, auth_password, schedule, at, status, active,
                               retry_max_attempts, retry_factor, retry_min, retry_max)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'pending', $14,
                    $15, $16, $17, $18)
            ON CONFLICT (account_id, application, name) DO UPDATE SET
                url = EXCLUDED.url,
                method = EXCLUDED.method,
                headers = EXCLUDED.headers,
                payload = EXCLUDED.payload,
                auth_username = EXCLUDED.auth_username,
                auth_password = EXCLUDED.auth_password,
                schedule = EXCLUDED.schedule,
                at = EXCLUDED.at,
                active = EXCLUDED.active,
                deleted = FALSE,
                retry_max_attempts = EXCLUDED.retry_max_attempts,
                retry_factor = EXCLUDED.retry_factor,
                retry_min = EXCLUDED.retry_min,
                retry_max = EXCLUDED.retry_max,
                retry_attempts = 0,
                updated_at = NOW()
            RETURNING {TASK_COLUMNS}
            "#
        );

        let task = sqlx::query_as::<_, Task>(&sql)
            .bind(id)
            .bind(account_id)
            .bind(application)
            .bind(&name)
            .bind(&spec.queue)
            .bind(&spec.url)
            .bind(&spec.method)
            .bind(&spec.headers)
            .bind(&spec.payload)
            .bind(&auth_username)
            .bind(&auth_password)
            .bind(&spec.schedule)
            .bind(at)
            .bind(active)
            .bind(spec.retry.max_attempts)
            .bind(spec.retry.factor)
            .bind(spec.retry.min)
            .bind(spec.retry.max)
            .fetch_one(pool)
            .await?;

        // Cancel before create so no moment exhibits two live attempts.
        Attempt::cancel_pending(pool, task.id).await?;
        Attempt::create(pool, &task).await?;

        tracing::info!(
            task_id = %task.id,
            application = %task.application,
            name = %task.name,
            queue = %task.queue,
            "Stored task declaration"
        );
        Ok(task)
    }

    /// Finds a task by its unique key
    ///
    /// Deleted tasks are invisible.
    pub async fn find(
        pool: &PgPool,
        account_id: Uuid,
        application: &str,
        name: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE account_id = $1 AND application = $2 AND name = $3 AND deleted = FALSE"
        );
        sqlx::query_as::<_, Task>(&sql)
            .bind(account_id)
            .bind(application)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// Finds a task by ID
    ///
    /// Deleted tasks are invisible.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND deleted = FALSE");
        sqlx::query_as::<_, Task>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Soft-deletes a task and all its attempts
    ///
    /// Deleted attempts are never handed to workers. Returns whether a task
    /// row matched.
    pub async fn delete(
        pool: &PgPool,
        account_id: Uuid,
        application: &str,
        name: &str,
    ) -> Result<bool, sqlx::Error> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            "UPDATE tasks SET deleted = TRUE, updated_at = NOW() \
             WHERE account_id = $1 AND application = $2 AND name = $3 \
             RETURNING id",
        )
        .bind(account_id)
        .bind(application)
        .bind(name)
        .fetch_all(pool)
        .await?;

        if ids.is_empty() {
            return Ok(false);
        }

        let ids: Vec<Uuid> = ids.into_iter().map(|(id,)| id).collect();
        sqlx::query("UPDATE attempts SET deleted = TRUE WHERE task_id = ANY($1)")
            .bind(&ids)
            .execute(pool)
            .await?;

        tracing::info!(account_id = %account_id, application = %application, name = %name, "Deleted task");
        Ok(true)
    }

    /// Soft-deletes all tasks of an application, cascading onto attempts
    ///
    /// Returns the number of tasks deleted.
    pub async fn delete_all(
        pool: &PgPool,
        account_id: Uuid,
        application: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET deleted = TRUE, updated_at = NOW() \
             WHERE account_id = $1 AND application = $2",
        )
        .bind(account_id)
        .bind(application)
        .execute(pool)
        .await?;

        sqlx::query(
            "UPDATE attempts SET deleted = TRUE WHERE account_id = $1 AND application = $2",
        )
        .bind(account_id)
        .bind(application)
        .execute(pool)
        .await?;

        tracing::info!(
            account_id = %account_id,
            application = %application,
            count = result.rows_affected(),
            "Deleted application tasks"
        );
        Ok(result.rows_affected())
    }

    /// Lists tasks of an application with optional filters and pagination
    pub async fn list(
        pool: &PgPool,
        account_id: Uuid,
        application: &str,
        filters: TaskFilters,
        params: ListParams,
    ) -> Result<ListPage<Self>, ModelError> {
        let mut conditions =
            String::from("account_id = $1 AND application = $2 AND deleted = FALSE");
        match filters.schedule {
            Some(true) => conditions.push_str(" AND schedule <> ''"),
            Some(false) => conditions.push_str(" AND schedule = ''"),
            None => {}
        }
        let status = filters.status.map(|s| s.as_str());
        let mut bind_index = 2;
        if status.is_some() {
            bind_index += 1;
            conditions.push_str(&format!(" AND status = ${bind_index}"));
        }

        let count_sql = format!("SELECT COUNT(*) FROM tasks WHERE {conditions}");
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql)
            .bind(account_id)
            .bind(application);
        if let Some(status) = status {
            count_query = count_query.bind(status);
        }
        let (total,) = count_query.fetch_one(pool).await?;

        let list_sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE {conditions} \
             ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            bind_index + 1,
            bind_index + 2,
        );
        let mut list_query = sqlx::query_as::<_, Task>(&list_sql)
            .bind(account_id)
            .bind(application);
        if let Some(status) = status {
            list_query = list_query.bind(status);
        }
        let items = list_query
            .bind(params.per_page)
            .bind(params.offset())
            .fetch_all(pool)
            .await?;

        Ok(ListPage::new(items, total, params))
    }

    /// Outcome ingress: folds a delivery outcome back into the task row
    ///
    /// In one atomic update this stamps `executed`/`last_*`, bumps the
    /// counters, advances the retry counter (`+1` on error, reset to 0 on
    /// success), and moves `status`/`at`/`active` per
    /// [`schedule_after_outcome`]. When the updated row is still active with
    /// a future execution, the successor pending attempt is enqueued.
    ///
    /// Returns the updated row, or `None` when the task vanished (deleted
    /// mid-flight) and the outcome was dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Cron`] when the stored schedule fails to
    /// evaluate, or [`ModelError::Database`] on store faults.
    pub async fn finalize_attempt(
        pool: &PgPool,
        task_id: Uuid,
        outcome: AttemptOutcome,
    ) -> Result<Option<Self>, ModelError> {
        let Some(task) = Task::find_by_id(pool, task_id).await? else {
            tracing::debug!(task_id = %task_id, "Task gone before outcome ingress, dropping outcome");
            return Ok(None);
        };

        let now = Utc::now();
        let plan = schedule_after_outcome(&task, outcome, now)?;

        let sql = format!(
            r#"
            UPDATE tasks SET
                status = $2,
                at = $3,
                active = $4,
                executed = $5,
                last_success = CASE WHEN $6 THEN $5 ELSE last_success END,
                last_error = CASE WHEN $6 THEN last_error ELSE $5 END,
                executions = executions + 1,
                errors = errors + CASE WHEN $6 THEN 0 ELSE 1 END,
                retry_attempts = CASE WHEN $6 THEN 0 ELSE retry_attempts + 1 END,
                updated_at = NOW()
            WHERE id = $1 AND deleted = FALSE
            RETURNING {TASK_COLUMNS}
            "#
        );

        let updated = sqlx::query_as::<_, Task>(&sql)
            .bind(task_id)
            .bind(plan.status.as_str())
            .bind(plan.at)
            .bind(plan.active)
            .bind(now.timestamp())
            .bind(outcome.is_success())
            .fetch_optional(pool)
            .await?;

        let Some(updated) = updated else {
            return Ok(None);
        };

        tracing::debug!(
            task_id = %updated.id,
            status = %updated.status,
            at = updated.at,
            executions = updated.executions,
            errors = updated.errors,
            "Folded delivery outcome into task"
        );

        if updated.active && updated.at > 0 && !updated.deleted {
            Attempt::create(pool, &updated).await?;
        }

        Ok(Some(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_task() -> Task {
        Task {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            application: "default".to_string(),
            name: "notify".to_string(),
            queue: DEFAULT_QUEUE.to_string(),
            url: "http://example.com/hook".to_string(),
            method: "POST".to_string(),
            headers: serde_json::json!({}),
            payload: String::new(),
            auth_username: None,
            auth_password: None,
            schedule: String::new(),
            at: 0,
            status: "pending".to_string(),
            active: true,
            deleted: false,
            executed: 0,
            executions: 0,
            errors: 0,
            last_error: 0,
            last_success: 0,
            retry_max_attempts: 10,
            retry_factor: 2,
            retry_min: 10,
            retry_max: 300,
            retry_attempts: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_task_status_round_trip() {
        for status in ["pending", "retrying", "canceled", "success", "error"] {
            assert_eq!(TaskStatus::parse(status).unwrap().as_str(), status);
        }
    }

    #[test]
    fn test_task_status_unknown() {
        let err = TaskStatus::parse("running").unwrap_err();
        assert!(matches!(err, ModelError::UnknownStatus(s) if s == "running"));
    }

    #[test]
    fn test_spec_normalization_defaults() {
        let spec = TaskSpec {
            queue: String::new(),
            url: "http://example.com".to_string(),
            method: String::new(),
            headers: JsonValue::Null,
            payload: "data".to_string(),
            auth: None,
            schedule: String::new(),
            retry: Retry {
                max_attempts: 0,
                factor: 0,
                min: 0,
                max: 0,
                attempts: 7,
            },
            active: true,
        }
        .normalized();

        assert_eq!(spec.queue, "default");
        assert_eq!(spec.method, "POST");
        assert_eq!(spec.payload, "data");
        assert!(spec.headers.is_object());
        assert_eq!(spec.retry, Retry::default());
    }

    #[test]
    fn test_spec_normalization_clears_payload_for_non_post() {
        let spec = TaskSpec {
            queue: String::new(),
            url: "http://example.com".to_string(),
            method: "get".to_string(),
            headers: serde_json::json!({}),
            payload: "data".to_string(),
            auth: None,
            schedule: String::new(),
            retry: Retry::default(),
            active: true,
        }
        .normalized();

        assert_eq!(spec.method, "GET");
        assert_eq!(spec.payload, "");
    }

    #[test]
    fn test_error_rate() {
        let mut task = test_task();
        assert_eq!(task.error_rate(), 0);

        task.executions = 4;
        task.errors = 3;
        assert_eq!(task.error_rate(), 75);

        task.errors = 4;
        assert_eq!(task.error_rate(), 100);
    }

    #[test]
    fn test_plan_success_one_shot_deactivates() {
        let task = test_task();
        let plan = schedule_after_outcome(&task, AttemptOutcome::Success, Utc::now()).unwrap();
        assert_eq!(plan.status, TaskStatus::Success);
        assert_eq!(plan.at, 0);
        assert!(!plan.active);
    }

    #[test]
    fn test_plan_success_cron_reschedules() {
        let mut task = test_task();
        task.schedule = "*/5 * * * *".to_string();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 10, 2, 0).unwrap();

        let plan = schedule_after_outcome(&task, AttemptOutcome::Success, now).unwrap();
        assert_eq!(plan.status, TaskStatus::Success);
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 10, 5, 0).unwrap();
        assert_eq!(plan.at, expected.timestamp_nanos_opt().unwrap());
        assert!(plan.active);
    }

    #[test]
    fn test_plan_error_schedules_retry() {
        let task = test_task();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();

        let plan = schedule_after_outcome(&task, AttemptOutcome::Error, now).unwrap();
        assert_eq!(plan.status, TaskStatus::Retrying);
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 10).unwrap();
        assert_eq!(plan.at, expected.timestamp_nanos_opt().unwrap());
        assert!(plan.active);
    }

    #[test]
    fn test_plan_error_backoff_grows_with_counter() {
        let mut task = test_task();
        task.retry_attempts = 2;
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();

        let plan = schedule_after_outcome(&task, AttemptOutcome::Error, now).unwrap();
        // min=10, factor=2, two failures recorded: 40s
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 40).unwrap();
        assert_eq!(plan.at, expected.timestamp_nanos_opt().unwrap());
    }

    #[test]
    fn test_plan_error_exhausted_one_shot_terminates() {
        let mut task = test_task();
        task.retry_max_attempts = 2;
        task.retry_attempts = 1;

        let plan = schedule_after_outcome(&task, AttemptOutcome::Error, Utc::now()).unwrap();
        assert_eq!(plan.status, TaskStatus::Error);
        assert_eq!(plan.at, 0);
        assert!(!plan.active);
    }

    #[test]
    fn test_plan_error_exhausted_cron_reenters_next_window() {
        let mut task = test_task();
        task.schedule = "*/5 * * * *".to_string();
        task.retry_max_attempts = 2;
        task.retry_attempts = 1;
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 10, 2, 0).unwrap();

        let plan = schedule_after_outcome(&task, AttemptOutcome::Error, now).unwrap();
        assert_eq!(plan.status, TaskStatus::Error);
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 10, 5, 0).unwrap();
        assert_eq!(plan.at, expected.timestamp_nanos_opt().unwrap());
        assert!(plan.active);
    }

    #[test]
    fn test_plan_inactive_task_never_reschedules() {
        let mut task = test_task();
        task.schedule = "* * * * *".to_string();
        task.active = false;

        let plan = schedule_after_outcome(&task, AttemptOutcome::Success, Utc::now()).unwrap();
        assert_eq!(plan.at, 0);
        assert!(!plan.active);
    }

    #[test]
    fn test_plan_invalid_schedule_surfaces() {
        let mut task = test_task();
        task.schedule = "not a cron".to_string();

        let result = schedule_after_outcome(&task, AttemptOutcome::Success, Utc::now());
        assert!(matches!(result, Err(ModelError::Cron(_))));
    }
}
