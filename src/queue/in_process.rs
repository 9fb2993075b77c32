//! In-process implementation of the scheduler queue contract.
//!
//! Delivery path: `enqueue` pushes into a flume channel (after an optional
//! `tokio::time::sleep` for delayed tasks); a bounded pool of tokio workers
//! pulls deliveries independently and invokes the registered [`StepHandler`].
//! A failed delivery is re-enqueued with exponential backoff until the
//! attempt cap, then recorded in the bounded history as failed.
//!
//! The queue tracks every not-yet-settled delivery in a pending counter, so
//! `drain` can wait for quiescence, the trigger-then-drain protocol the
//! integration tests rely on.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{
    QueueConfig, QueueError, StepHandler, StepQueue, StepTask, TaskOutcome, TaskRecord,
};

/// One attempt at a task in flight through the channel.
#[derive(Clone, Debug)]
struct Delivery {
    task: StepTask,
    /// 1-based attempt number.
    attempt: u32,
}

struct QueueInner {
    tx: flume::Sender<Delivery>,
    rx: flume::Receiver<Delivery>,
    /// Deliveries enqueued (including delayed and retry re-enqueues) and not
    /// yet settled.
    pending: AtomicUsize,
    idle: Notify,
    history: Mutex<VecDeque<TaskRecord>>,
    config: QueueConfig,
}

impl QueueInner {
    /// Count one delivery as finished; wake drainers at quiescence.
    fn settle(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn record(&self, task: StepTask, attempts: u32, outcome: TaskOutcome) {
        let mut history = self.history.lock().expect("history mutex poisoned");
        if history.len() == self.config.history_limit {
            history.pop_front();
        }
        history.push_back(TaskRecord {
            task,
            attempts,
            outcome,
            finished_at: chrono::Utc::now(),
        });
    }
}

/// The supplied at-least-once delayed task queue.
///
/// Cheap to clone; all clones share the same channel, counters, and history.
#[derive(Clone)]
pub struct InProcessQueue {
    inner: Arc<QueueInner>,
}

impl InProcessQueue {
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            inner: Arc::new(QueueInner {
                tx,
                rx,
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
                history: Mutex::new(VecDeque::new()),
                config,
            }),
        }
    }

    /// Wait until no delivery is pending, delayed, or in flight.
    pub async fn drain(&self) {
        loop {
            // Register interest before checking, so a settle racing this
            // check cannot be missed.
            let notified = self.inner.idle.notified();
            if self.inner.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Finished deliveries retained for observability, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<TaskRecord> {
        self.inner
            .history
            .lock()
            .expect("history mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Start the worker pool consuming this queue with `handler`.
    #[must_use]
    pub fn start_workers(&self, handler: Arc<dyn StepHandler>) -> WorkerPool {
        WorkerPool::start(self, handler)
    }

    fn config(&self) -> &QueueConfig {
        &self.inner.config
    }
}

fn enqueue_delivery(
    inner: &Arc<QueueInner>,
    delivery: Delivery,
    delay: Duration,
) -> Result<(), QueueError> {
    inner.pending.fetch_add(1, Ordering::AcqRel);
    if delay.is_zero() {
        if inner.tx.send(delivery).is_err() {
            inner.settle();
            return Err(QueueError::Closed);
        }
    } else {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.tx.send_async(delivery).await.is_err() {
                inner.settle();
            }
        });
    }
    Ok(())
}

#[async_trait]
impl StepQueue for InProcessQueue {
    async fn enqueue(&self, task: StepTask, delay: Duration) -> Result<(), QueueError> {
        debug!(
            execution_id = %task.execution_id,
            node_id = %task.node_id,
            delay_ms = delay.as_millis() as u64,
            "task enqueued"
        );
        enqueue_delivery(&self.inner, Delivery { task, attempt: 1 }, delay)
    }
}

/// Handle to the running workers; dropping it leaves them running, shutting
/// it down stops consumption after in-flight deliveries finish.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `config.workers` consumers over `queue` invoking `handler`.
    #[must_use]
    pub fn start(queue: &InProcessQueue, handler: Arc<dyn StepHandler>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let limiter = queue.config().rate_limit.map(|limit| {
            Arc::new(tokio::sync::Mutex::new(tokio::time::interval(
                limit.interval(),
            )))
        });

        let mut handles = Vec::with_capacity(queue.config().workers);
        for worker in 0..queue.config().workers {
            let inner = Arc::clone(&queue.inner);
            let handler = Arc::clone(&handler);
            let limiter = limiter.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                loop {
                    let delivery = tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        recv = inner.rx.recv_async() => match recv {
                            Ok(delivery) => delivery,
                            Err(_) => break,
                        },
                    };
                    if let Some(limiter) = &limiter {
                        limiter.lock().await.tick().await;
                    }
                    process_delivery(&inner, handler.as_ref(), delivery, worker).await;
                }
                debug!(worker, "queue worker stopped");
            }));
        }
        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Stop consumption and wait for the workers to exit. In-flight
    /// deliveries finish; queued ones stay in the channel.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn process_delivery(
    inner: &Arc<QueueInner>,
    handler: &dyn StepHandler,
    delivery: Delivery,
    worker: usize,
) {
    let Delivery { task, attempt } = delivery;
    match handler.handle(task.clone()).await {
        Ok(()) => {
            inner.record(task, attempt, TaskOutcome::Completed);
        }
        Err(err) => {
            if attempt < inner.config.max_attempts {
                let backoff =
                    inner.config.retry_base_delay * 2u32.saturating_pow(attempt.saturating_sub(1));
                warn!(
                    worker,
                    execution_id = %task.execution_id,
                    node_id = %task.node_id,
                    attempt,
                    max_attempts = inner.config.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "task failed, scheduling redelivery"
                );
                // Re-enqueue before settling so the pending counter never
                // dips to zero while a redelivery is owed.
                let _ = enqueue_delivery(
                    inner,
                    Delivery {
                        task,
                        attempt: attempt + 1,
                    },
                    backoff,
                );
            } else {
                error!(
                    worker,
                    execution_id = %task.execution_id,
                    node_id = %task.node_id,
                    attempt,
                    error = %err,
                    "task failed, retries exhausted"
                );
                inner.record(
                    task,
                    attempt,
                    TaskOutcome::Failed {
                        error: err.to_string(),
                    },
                );
            }
        }
    }
    inner.settle();
}
