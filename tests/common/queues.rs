use async_trait::async_trait;
use dripline::queue::{QueueError, StepQueue, StepTask};
use std::sync::Mutex;
use std::time::Duration;

/// Queue stand-in that records enqueues instead of delivering them, so
/// stepper tests can assert on scheduling decisions directly.
#[derive(Debug, Default)]
#[allow(dead_code)]
pub struct RecordingQueue {
    enqueued: Mutex<Vec<(StepTask, Duration)>>,
}

#[allow(dead_code)]
impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<(StepTask, Duration)> {
        self.enqueued
            .lock()
            .expect("recording mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl StepQueue for RecordingQueue {
    async fn enqueue(&self, task: StepTask, delay: Duration) -> Result<(), QueueError> {
        self.enqueued
            .lock()
            .expect("recording mutex poisoned")
            .push((task, delay));
        Ok(())
    }
}
