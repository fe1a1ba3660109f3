/// Worker orchestrator
///
/// This module implements the main worker loop. It reserves due attempts
/// from the queue, resolves their tasks, executes the HTTP delivery, writes
/// the terminal attempt status, and feeds the outcome back into the task
/// state machine.
///
/// # Architecture
///
/// ```text
/// Orchestrator
///   ├─> AttemptQueue: reserve the earliest due attempt under a lease
///   ├─> Task: resolve the declaration (canceled if gone or inactive)
///   ├─> HttpDeliverer: execute the request with a timeout
///   ├─> AttemptQueue: complete the attempt (idempotent, lease-gated)
///   └─> Task: finalize_attempt → next cron occurrence / retry / done
/// ```
///
/// # Concurrency
///
/// A semaphore bounds the number of in-flight deliveries. Each reserved
/// attempt runs in its own Tokio task holding a permit; the loop only
/// reserves when a slot is free, so reservations never pile up beyond the
/// configured concurrency.
///
/// # Crash recovery
///
/// If a slot dies between delivery and completion, nothing is rolled back:
/// the attempt's lease expires and another worker reserves it again.
/// Delivery is at-least-once by design.

use std::sync::Arc;
use std::time::Duration;

use hookrelay_shared::models::attempt::{Attempt, AttemptStatus};
use hookrelay_shared::models::task::Task;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::delivery::HttpDeliverer;
use crate::queue::AttemptQueue;

/// Worker orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Queue partition to serve
    pub queue: String,

    /// Maximum concurrent deliveries
    pub concurrency: usize,

    /// Lease duration per reservation, seconds
    ///
    /// Must exceed `http_timeout_seconds` plus completion write latency.
    pub lease_seconds: i64,

    /// Per-delivery HTTP timeout, seconds
    pub http_timeout_seconds: u64,

    /// Idle poll interval when the queue is empty, seconds
    pub poll_interval_seconds: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            queue: "default".to_string(),
            concurrency: 10,
            lease_seconds: 60,
            http_timeout_seconds: 30,
            poll_interval_seconds: 1,
        }
    }
}

/// Worker orchestrator
///
/// Coordinates attempt execution: reservation, delivery, completion, and
/// outcome ingress into the scheduler.
pub struct Orchestrator {
    /// Database connection pool
    db: PgPool,

    /// Reservation service
    queue: AttemptQueue,

    /// HTTP executor shared by all slots
    deliverer: Arc<HttpDeliverer>,

    /// Configuration
    config: OrchestratorConfig,

    /// Shutdown token
    shutdown_token: CancellationToken,
}

impl Orchestrator {
    /// Creates a new orchestrator
    ///
    /// # Arguments
    ///
    /// * `db` - Database connection pool
    /// * `config` - Orchestrator configuration
    pub fn new(db: PgPool, config: OrchestratorConfig) -> Self {
        let queue = AttemptQueue::new(db.clone(), config.queue.clone(), config.lease_seconds);
        let deliverer = Arc::new(HttpDeliverer::new(Duration::from_secs(
            config.http_timeout_seconds,
        )));

        Orchestrator {
            db,
            queue,
            deliverer,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Gets the shutdown token
    ///
    /// Used to signal graceful shutdown from external handlers.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs the worker loop until shutdown
    ///
    /// Continuously reserves and executes attempts. On an empty queue the
    /// loop backs off until the next attempt becomes due (capped at the poll
    /// interval). On shutdown, in-flight deliveries are drained before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns an error only on fatal conditions; transient store errors are
    /// logged and retried after a poll interval.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            queue = %self.config.queue,
            concurrency = self.config.concurrency,
            lease_seconds = self.config.lease_seconds,
            "Worker orchestrator starting"
        );

        let slots = Arc::new(Semaphore::new(self.config.concurrency));
        let poll_interval = Duration::from_secs(self.config.poll_interval_seconds);

        loop {
            // Wait for a free slot, bailing out on shutdown
            let permit = tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                permit = slots.clone().acquire_owned() => permit?,
            };

            match self.queue.reserve().await {
                Ok(Some(attempt)) => {
                    let db = self.db.clone();
                    let queue = self.queue.clone();
                    let deliverer = self.deliverer.clone();
                    tokio::spawn(async move {
                        execute_attempt(db, queue, deliverer, attempt).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    let backoff = match self.queue.next_due_in(poll_interval).await {
                        Ok(backoff) => backoff,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to peek next due attempt");
                            poll_interval
                        }
                    };
                    tokio::select! {
                        _ = self.shutdown_token.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(error = %e, "Failed to reserve attempt");
                    tokio::select! {
                        _ = self.shutdown_token.cancelled() => break,
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
        }

        // Drain: wait for all slots to come back, with a timeout
        tracing::info!("Shutdown requested, waiting for in-flight deliveries");
        let drained = tokio::time::timeout(
            Duration::from_secs(30),
            slots.acquire_many(self.config.concurrency as u32),
        )
        .await;
        match drained {
            Ok(_) => tracing::info!("Worker orchestrator shut down"),
            Err(_) => tracing::warn!("Force shutdown with deliveries still in flight"),
        }

        Ok(())
    }
}

/// Executes a single reserved attempt through its full lifecycle
///
/// 1. Resolve the task; an absent, deleted, or inactive task cancels the
///    attempt without delivery.
/// 2. Execute the HTTP request.
/// 3. Complete the attempt; a lost lease discards the outcome entirely.
/// 4. Feed the outcome into the task state machine, which schedules the
///    successor attempt when one is due.
async fn execute_attempt(
    db: PgPool,
    queue: AttemptQueue,
    deliverer: Arc<HttpDeliverer>,
    attempt: Attempt,
) {
    let task = match Task::find_by_id(&db, attempt.task_id).await {
        Ok(task) => task,
        Err(e) => {
            // Leave the attempt reserved; the lease will expire and another
            // worker will retry it.
            tracing::error!(
                attempt_id = %attempt.id,
                task_id = %attempt.task_id,
                error = %e,
                "Failed to resolve task for attempt"
            );
            return;
        }
    };

    let task = match task {
        Some(task) if task.active => task,
        _ => {
            tracing::info!(
                attempt_id = %attempt.id,
                task_id = %attempt.task_id,
                "Task gone or inactive, canceling attempt"
            );
            if let Err(e) = queue
                .complete(attempt.id, AttemptStatus::Canceled, 0, "")
                .await
            {
                tracing::error!(attempt_id = %attempt.id, error = %e, "Failed to cancel attempt");
            }
            return;
        }
    };

    tracing::info!(
        attempt_id = %attempt.id,
        task_id = %task.id,
        url = %task.url,
        method = %task.method,
        "Executing attempt"
    );

    let delivery = deliverer.deliver(&task).await;
    let status = if delivery.outcome.is_success() {
        AttemptStatus::Success
    } else {
        AttemptStatus::Error
    };

    match queue
        .complete(attempt.id, status, delivery.status_code, &delivery.response)
        .await
    {
        Ok(Some(_)) => {
            if let Err(e) = Task::finalize_attempt(&db, task.id, delivery.outcome).await {
                tracing::error!(
                    task_id = %task.id,
                    error = %e,
                    "Failed to fold delivery outcome into task"
                );
            }
        }
        Ok(None) => {
            // Another worker took the attempt over after our lease expired;
            // its completion wins and ours is dropped.
        }
        Err(e) => {
            tracing::error!(attempt_id = %attempt.id, error = %e, "Failed to complete attempt");
        }
    }
}
