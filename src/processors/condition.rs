//! The `condition` processor: evaluate a named predicate, pick a branch.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::definition::NodeDef;
use crate::execution::WorkflowExecution;
use crate::services::EventLog;

use super::{NodeOutcome, NodeProcessor, ProcessorError, parse_config};

/// Event kind recorded by the tracking pixel when a recipient opens an email.
pub const EMAIL_OPENED: &str = "email_opened";

/// Typed schema of a `condition` node's config map.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConditionConfig {
    /// Named predicate to evaluate; unknown or absent names evaluate false.
    pub condition: Option<String>,
    /// Optional lookback window in hours for event-based predicates.
    pub timeframe_hours: Option<i64>,
}

/// Evaluates the configured predicate against the event log and returns a
/// `"true"`/`"false"` branch label. The stepper resolves the label through
/// the node's branch table; the processor never picks a target node.
///
/// Read-only against the log, so redelivery re-evaluates harmlessly (the
/// answer may legitimately change if events arrived in between, which is the
/// re-read-from-storage semantics the engine wants).
pub struct ConditionProcessor {
    events: Arc<dyn EventLog>,
}

impl ConditionProcessor {
    pub fn new(events: Arc<dyn EventLog>) -> Self {
        Self { events }
    }

    async fn evaluate(
        &self,
        config: &ConditionConfig,
        execution: &WorkflowExecution,
    ) -> Result<bool, ProcessorError> {
        match config.condition.as_deref() {
            Some(EMAIL_OPENED) => Ok(self
                .events
                .recorded(
                    execution.organization_id,
                    execution.contact_id,
                    EMAIL_OPENED,
                    config.timeframe_hours,
                )
                .await?),
            other => {
                debug!(condition = ?other, "unknown or absent condition, evaluating false");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl NodeProcessor for ConditionProcessor {
    async fn process(
        &self,
        node: &NodeDef,
        execution: &WorkflowExecution,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: ConditionConfig = parse_config(node)?;
        let branch = if self.evaluate(&config, execution).await? {
            "true"
        } else {
            "false"
        };
        debug!(node_id = %node.id, branch, "condition evaluated");
        Ok(NodeOutcome::of(json!({
            "status": "evaluated",
            "branch": branch,
        }))
        .with_branch(branch))
    }
}
