//! Node processors: one strategy per node kind.
//!
//! A processor takes `(node, execution)` and produces a [`NodeOutcome`]; it
//! never decides the next node itself. The stepper owns routing: a
//! `condition` processor contributes only a branch label, a `wait` processor
//! only a requested delay for the *next* task.
//!
//! # At-least-once contract
//!
//! The queue delivers tasks at least once, so every processor must tolerate
//! re-invocation for the same node: same inputs produce an equivalent result
//! (and side effects are either re-appliable or carry their own records, as
//! email delivery does). The integration tests pin this contract per
//! processor.
//!
//! New node kinds register under their [`NodeType`] key; a kind with no
//! registered processor is handled by the stepper's graceful-degradation
//! rule, not here.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::definition::NodeDef;
use crate::execution::WorkflowExecution;
use crate::services::{ContactDirectory, EmailDelivery, EventLog, ServiceError};
use crate::types::NodeType;

pub mod condition;
pub mod email;
pub mod wait;

pub use condition::ConditionProcessor;
pub use email::EmailProcessor;
pub use wait::WaitProcessor;

/// Branch label a condition falls back to when its processor returned none.
pub const DEFAULT_BRANCH: &str = "false";

/// Errors raised while running a node's business logic.
///
/// These are the "processor failure" class: the stepper persists them on the
/// execution record and re-raises so the queue's retry policy governs
/// redelivery.
#[derive(Debug, Error, Diagnostic)]
pub enum ProcessorError {
    #[error("invalid {kind} node config: {source}")]
    #[diagnostic(
        code(dripline::processors::config),
        help("The node's config map does not match the schema its kind expects.")
    )]
    Config {
        kind: NodeType,
        #[source]
        source: serde_json::Error,
    },

    #[error("contact {contact_id} not found")]
    #[diagnostic(
        code(dripline::processors::contact_not_found),
        help("Email nodes require a live contact; the referenced contact was deleted.")
    )]
    ContactNotFound { contact_id: Uuid },

    #[error("failed to encode template context: {source}")]
    #[diagnostic(code(dripline::processors::context))]
    Context {
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(dripline::processors::service))]
    Service(#[from] ServiceError),
}

/// What one node invocation produced.
#[derive(Clone, Debug, Default)]
pub struct NodeOutcome {
    /// Result payload merged into `execution.data[node.id]`.
    pub result: Value,
    /// Delay the stepper should apply to the *next* task.
    pub requested_delay: Option<Duration>,
    /// Branch label (condition nodes only).
    pub branch: Option<String>,
}

impl NodeOutcome {
    /// Outcome carrying only a result payload.
    #[must_use]
    pub fn of(result: Value) -> Self {
        Self {
            result,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.requested_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// A pure strategy keyed by node kind.
#[async_trait]
pub trait NodeProcessor: Send + Sync {
    async fn process(
        &self,
        node: &NodeDef,
        execution: &WorkflowExecution,
    ) -> Result<NodeOutcome, ProcessorError>;
}

/// Deserialize a node's opaque config map into the kind's typed schema.
pub(crate) fn parse_config<T: DeserializeOwned>(node: &NodeDef) -> Result<T, ProcessorError> {
    serde_json::from_value(Value::Object(node.config.clone())).map_err(|source| {
        ProcessorError::Config {
            kind: node.kind.clone(),
            source,
        }
    })
}

/// Maps node kinds to their processors.
///
/// Lookup misses are not an error here; the stepper logs and substitutes an
/// empty no-op result so unknown kinds degrade gracefully.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: FxHashMap<NodeType, Arc<dyn NodeProcessor>>,
}

impl ProcessorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in `email`, `wait`, and
    /// `condition` processors wired to the given collaborators.
    #[must_use]
    pub fn with_defaults(
        contacts: Arc<dyn ContactDirectory>,
        delivery: Arc<dyn EmailDelivery>,
        events: Arc<dyn EventLog>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(
            NodeType::Email,
            Arc::new(EmailProcessor::new(contacts, delivery)),
        );
        registry.register(NodeType::Wait, Arc::new(WaitProcessor));
        registry.register(
            NodeType::Condition,
            Arc::new(ConditionProcessor::new(events)),
        );
        registry
    }

    /// Register (or replace) the processor for `kind`.
    pub fn register(&mut self, kind: NodeType, processor: Arc<dyn NodeProcessor>) {
        self.processors.insert(kind, processor);
    }

    #[must_use]
    pub fn get(&self, kind: &NodeType) -> Option<&Arc<dyn NodeProcessor>> {
        self.processors.get(kind)
    }
}

/// Build the template context for an execution: contact profile fields
/// overlaid with the execution's accumulated per-node results.
pub(crate) fn template_context(
    contact_json: Value,
    data: &Map<String, Value>,
) -> Result<Value, ProcessorError> {
    let mut context = match contact_json {
        Value::Object(map) => map,
        _ => {
            // A contact always serializes to an object; anything else is a
            // context-encoding defect.
            return Err(ProcessorError::Context {
                source: serde::de::Error::custom("contact did not serialize to a JSON object"),
            });
        }
    };
    for (key, value) in data {
        context.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(context))
}
