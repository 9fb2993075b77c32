//! The `wait` processor: a timed pause before the successor node.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::definition::NodeDef;
use crate::execution::WorkflowExecution;

use super::{NodeOutcome, NodeProcessor, ProcessorError, parse_config};

/// Typed schema of a `wait` node's config map. Absent fields default to 0.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    pub days: u64,
    pub hours: u64,
}

impl WaitConfig {
    /// Total pause requested by this config.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.days * 24 * 60 * 60 + self.hours * 60 * 60)
    }
}

/// Computes the requested pause and nothing else. Processing a wait node is
/// instantaneous; the pause is enacted by the stepper scheduling the *next*
/// task with this delay. Trivially idempotent under redelivery.
pub struct WaitProcessor;

#[async_trait]
impl NodeProcessor for WaitProcessor {
    async fn process(
        &self,
        node: &NodeDef,
        _execution: &WorkflowExecution,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: WaitConfig = parse_config(node)?;
        let delay = config.duration();
        debug!(node_id = %node.id, delay_ms = delay.as_millis() as u64, "wait node evaluated");
        Ok(NodeOutcome::of(json!({
            "status": "waiting",
            "requestedDelay": delay.as_millis() as u64,
        }))
        .with_delay(delay))
    }
}
