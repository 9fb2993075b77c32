//! The scheduler queue: delayed, at-least-once step task delivery.
//!
//! A [`StepTask`] is the sole message contract between stepper invocations.
//! It carries ids only; everything else is re-read from the stores when the
//! task fires, which is what makes execution crash-recoverable.
//!
//! The engine assumes an at-least-once delayed queue rather than building a
//! durable one: [`StepQueue`] is the seam, and [`in_process::InProcessQueue`]
//! is the supplied implementation: a flume channel fanned out to a bounded
//! pool of tokio workers with queue-level retry, an optional global rate
//! limit, and a bounded delivery history for observability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub mod in_process;

pub use in_process::{InProcessQueue, WorkerPool};

/// Errors surfaced by a handler back to the queue.
///
/// The queue does not interpret these beyond "this delivery failed"; the
/// retry policy decides what happens next.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The queued unit of work: "run node `node_id` of execution `execution_id`".
///
/// Deliberately context-free: the entire program counter of an execution is
/// reconstructible from the persistent record plus this pending task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTask {
    pub execution_id: Uuid,
    pub node_id: String,
}

impl StepTask {
    pub fn new(execution_id: Uuid, node_id: impl Into<String>) -> Self {
        Self {
            execution_id,
            node_id: node_id.into(),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum QueueError {
    #[error("queue is closed; task not enqueued")]
    #[diagnostic(
        code(dripline::queue::closed),
        help("The worker pool has shut down. Tasks cannot be scheduled anymore.")
    )]
    Closed,
}

/// Producer side of the scheduler queue.
#[async_trait]
pub trait StepQueue: Send + Sync {
    /// Schedule `task` to become eligible for dequeue after `delay`
    /// (zero for immediate).
    async fn enqueue(&self, task: StepTask, delay: Duration) -> Result<(), QueueError>;
}

/// Consumer callback registered with the worker pool.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn handle(&self, task: StepTask) -> Result<(), TaskError>;
}

/// Global ceiling on task starts across the pool, protecting downstream
/// collaborators from bursts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimit {
    /// Number of task starts allowed per `per` window.
    pub tasks: u32,
    pub per: Duration,
}

impl RateLimit {
    /// Convenience for "N tasks per second".
    #[must_use]
    pub fn per_second(tasks: u32) -> Self {
        Self {
            tasks,
            per: Duration::from_secs(1),
        }
    }

    /// Minimum spacing between task starts implied by this limit.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.per / self.tasks.max(1)
    }
}

/// Tuning knobs for the in-process queue and its worker pool.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Concurrent workers pulling tasks independently.
    pub workers: usize,
    /// Delivery attempts per task before giving up (cap includes the first).
    pub max_attempts: u32,
    /// Base delay for exponential backoff between redeliveries.
    pub retry_base_delay: Duration,
    /// Optional global ceiling on task starts.
    pub rate_limit: Option<RateLimit>,
    /// How many finished deliveries to retain for observability.
    pub history_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            rate_limit: None,
            history_limit: 64,
        }
    }
}

/// Terminal outcome of one task (after all redeliveries).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed { error: String },
}

/// One entry of the queue's bounded delivery history.
#[derive(Clone, Debug)]
pub struct TaskRecord {
    pub task: StepTask,
    /// Attempts consumed, including the final one.
    pub attempts: u32,
    pub outcome: TaskOutcome,
    pub finished_at: DateTime<Utc>,
}
