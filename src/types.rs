//! Core identifier types for the dripline workflow engine.
//!
//! This module defines the fundamental vocabulary shared by definitions,
//! execution records, and the stepper: the kind of a workflow node and the
//! lifecycle status of an execution.
//!
//! Both types carry explicit `encode`/`decode` string forms so persisted rows
//! stay human-readable and forward-compatible: an unknown node kind encoding
//! round-trips as [`NodeType::Other`] instead of failing deserialization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the kind of a node within a workflow definition.
///
/// The engine dispatches node processing polymorphically on this value. The
/// built-in variants cover the kinds the engine ships processors for; any
/// other kind is preserved as [`NodeType::Other`] so that definitions written
/// against a newer processor set degrade gracefully instead of halting
/// automation (the stepper treats an unregistered kind as a logged no-op).
///
/// # Examples
///
/// ```rust
/// use dripline::types::NodeType;
///
/// let kind = NodeType::from("email");
/// assert_eq!(kind, NodeType::Email);
/// assert_eq!(kind.encode(), "email");
///
/// // Unknown kinds round-trip instead of erroring.
/// let custom = NodeType::decode("webhook");
/// assert_eq!(custom, NodeType::Other("webhook".to_string()));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    /// Renders and dispatches an email to the execution's contact.
    Email,
    /// Requests a timed pause before the successor node runs.
    Wait,
    /// Evaluates a predicate and selects a named branch.
    Condition,
    /// A kind this engine build has no processor for.
    Other(String),
}

impl NodeType {
    /// Encode into the persisted string form (`"email"`, `"wait"`,
    /// `"condition"`, or the raw kind string for [`NodeType::Other`]).
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeType::Email => "email".to_string(),
            NodeType::Wait => "wait".to_string(),
            NodeType::Condition => "condition".to_string(),
            NodeType::Other(s) => s.clone(),
        }
    }

    /// Decode a persisted string form back into a `NodeType`.
    ///
    /// Unrecognized strings become [`NodeType::Other`], never an error.
    pub fn decode(s: &str) -> Self {
        match s {
            "email" => NodeType::Email,
            "wait" => NodeType::Wait,
            "condition" => NodeType::Condition,
            other => NodeType::Other(other.to_string()),
        }
    }

    /// Returns `true` if this is a [`Condition`](Self::Condition) node, the
    /// only kind whose successor is chosen by branch label.
    #[must_use]
    pub fn is_condition(&self) -> bool {
        matches!(self, Self::Condition)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        NodeType::decode(s)
    }
}

impl From<String> for NodeType {
    fn from(s: String) -> Self {
        NodeType::decode(&s)
    }
}

impl From<NodeType> for String {
    fn from(kind: NodeType) -> Self {
        kind.encode()
    }
}

/// Lifecycle status of a [`WorkflowExecution`](crate::execution::WorkflowExecution).
///
/// Transitions are monotone except `Waiting → Running`, which happens when a
/// delayed step task fires and processing resumes:
///
/// ```text
/// Running ──▶ Waiting ──▶ Running ──▶ … ──▶ Completed
///    │                                      (terminal)
///    └──────────── failure ──▶ Failed
///                             (terminal)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Actively progressing; the next step task is immediate or in flight.
    Running,
    /// Paused for a timed wait; the next step task carries a delay.
    Waiting,
    /// All nodes processed; no further tasks will be enqueued.
    Completed,
    /// A node processor raised an unrecoverable error.
    Failed,
}

impl ExecutionStatus {
    /// Persisted string form, matching the serde representation.
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Waiting => "waiting",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    /// Decode a persisted string form; unknown strings map to `Failed` so a
    /// corrupted row surfaces as terminal rather than re-entering the queue.
    pub fn decode(s: &str) -> Self {
        match s {
            "running" => ExecutionStatus::Running,
            "waiting" => ExecutionStatus::Waiting,
            "completed" => ExecutionStatus::Completed,
            _ => ExecutionStatus::Failed,
        }
    }

    /// Terminal statuses never re-enter the queue.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}
