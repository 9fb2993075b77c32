//! Execution records: one mutable row per running workflow instance.
//!
//! A [`WorkflowExecution`] is the durable half of the engine's program
//! counter. Together with the pending step task it fully reconstructs where
//! an execution stands, which is what makes processing crash-recoverable:
//! the task carries only ids and everything else is re-read from here.
//!
//! The record is created by the trigger operation and mutated exclusively by
//! the stepper. `data` accumulates one result entry per processed node and is
//! merged, never replaced. Once the status turns terminal the record is only
//! ever read again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::types::{ExecutionStatus, NodeType};

/// Sentinel node id stored when a definition has no nodes at trigger time.
/// It resolves to no node, so the first step immediately completes the
/// execution.
pub const END_NODE_SENTINEL: &str = "end";

/// One in-progress or finished run of a definition against one contact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub contact_id: Uuid,
    /// Denormalized from the definition for tenant isolation.
    pub organization_id: Uuid,
    pub status: ExecutionStatus,
    /// Last node attempted (written before the processor runs, so a crash
    /// mid-step leaves an inspectable trace).
    pub current_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node_type: Option<NodeType>,
    /// Per-node results keyed by node id; append-only.
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    /// Create a fresh record pointing at `first_node_id` with the caller's
    /// seed data, as the trigger operation does.
    pub fn new(
        workflow_id: Uuid,
        organization_id: Uuid,
        contact_id: Uuid,
        first_node_id: impl Into<String>,
        initial_data: Map<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            contact_id,
            organization_id,
            status: ExecutionStatus::Running,
            current_node_id: first_node_id.into(),
            current_node_type: None,
            data: initial_data,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Whether the execution has reached `completed` or `failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record that `node` is about to be processed. Also folds a `Waiting`
    /// record back to `Running`: the delayed task firing *is* the implicit
    /// resume transition.
    pub fn begin_node(&mut self, node_id: &str, kind: &NodeType) {
        self.current_node_id = node_id.to_string();
        self.current_node_type = Some(kind.clone());
        if self.status == ExecutionStatus::Waiting {
            self.status = ExecutionStatus::Running;
        }
        self.touch();
    }

    /// Merge one node's result into `data`. Re-inserting the same node id
    /// (at-least-once redelivery) overwrites with the re-computed result
    /// rather than duplicating the entry.
    pub fn record_result(&mut self, node_id: &str, result: Value) {
        self.data.insert(node_id.to_string(), result);
        self.touch();
    }

    /// Terminal success: no next node resolved.
    pub fn mark_completed(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.touch();
    }

    /// Terminal (pending queue retries) failure with a human-readable cause.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error_message = Some(message.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fresh() -> WorkflowExecution {
        WorkflowExecution::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "n1",
            Map::new(),
        )
    }

    #[test]
    fn begin_node_resumes_from_waiting() {
        let mut exec = fresh();
        exec.status = ExecutionStatus::Waiting;
        exec.begin_node("n2", &NodeType::Email);
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert_eq!(exec.current_node_id, "n2");
        assert_eq!(exec.current_node_type, Some(NodeType::Email));
    }

    #[test]
    fn record_result_accumulates_per_node() {
        let mut exec = fresh();
        exec.record_result("n1", json!({"status": "sent"}));
        exec.record_result("n2", json!({"status": "waiting"}));
        assert_eq!(exec.data.len(), 2);
        // Redelivery overwrites in place, no duplicate entry.
        exec.record_result("n1", json!({"status": "sent"}));
        assert_eq!(exec.data.len(), 2);
    }

    #[test]
    fn completion_sets_timestamp() {
        let mut exec = fresh();
        exec.mark_completed();
        assert!(exec.is_terminal());
        assert!(exec.completed_at.is_some());
    }
}
