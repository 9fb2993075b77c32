//! Workflow definitions: the reusable, ordered description of a workflow.
//!
//! A [`WorkflowDefinition`] is an ordered sequence of [`NodeDef`]s plus
//! trigger metadata. Definitions are created once and treated as immutable
//! for the lifetime of any execution referencing them; the stepper re-reads
//! the definition by id on every step, so mutating a definition with
//! executions in flight is undefined behavior by design.
//!
//! Node configuration stays an opaque JSON map here. Each processor
//! deserializes its own typed schema at dispatch time, which recovers type
//! safety without narrowing what a definition can carry.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::types::NodeType;

/// How a workflow gets started.
///
/// Manual triggers fire through the engine's trigger operation; event
/// triggers carry the name of the external event that starts them (matching
/// against incoming events is the outer layer's concern, not the engine's).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerType {
    Manual,
    Event(String),
}

impl From<String> for TriggerType {
    fn from(s: String) -> Self {
        if s == "manual" {
            TriggerType::Manual
        } else {
            TriggerType::Event(s)
        }
    }
}

impl From<TriggerType> for String {
    fn from(t: TriggerType) -> Self {
        match t {
            TriggerType::Manual => "manual".to_string(),
            TriggerType::Event(name) => name,
        }
    }
}

/// A single step in a workflow definition.
///
/// `branches` is present only on branching kinds (currently `condition`): it
/// maps a branch label (`"true"` / `"false"`) to the id of the target node.
/// A label that is absent from the map means the flow terminates on that
/// branch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    /// Unique within the owning definition.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeType,
    /// Opaque configuration interpreted by the matching processor.
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<FxHashMap<String, String>>,
}

impl NodeDef {
    pub fn new(id: impl Into<String>, kind: NodeType) -> Self {
        Self {
            id: id.into(),
            kind,
            config: Map::new(),
            branches: None,
        }
    }

    /// Set one configuration entry (builder style).
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Route a branch label to a target node id (builder style).
    #[must_use]
    pub fn with_branch(mut self, label: impl Into<String>, target: impl Into<String>) -> Self {
        self.branches
            .get_or_insert_with(FxHashMap::default)
            .insert(label.into(), target.into());
        self
    }
}

/// Validation failures for a definition at creation time.
///
/// These guard the authoring boundary only; at run time the stepper
/// tolerates stale node references by treating them as end-of-flow.
#[derive(Debug, Error, Diagnostic)]
pub enum DefinitionError {
    #[error("duplicate node id '{node_id}' in definition")]
    #[diagnostic(
        code(dripline::definition::duplicate_node),
        help("Node ids must be unique within a definition.")
    )]
    DuplicateNodeId { node_id: String },

    #[error("branch '{label}' of node '{node_id}' targets unknown node '{target}'")]
    #[diagnostic(
        code(dripline::definition::unknown_branch_target),
        help("Every branch target must name a node id present in the definition.")
    )]
    UnknownBranchTarget {
        node_id: String,
        label: String,
        target: String,
    },
}

/// The reusable description of a workflow: ordered nodes, branch tables, and
/// trigger metadata. Tenant-scoped through `organization_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub trigger_type: TriggerType,
    /// Opaque trigger configuration (e.g. which event, which segment).
    #[serde(default)]
    pub trigger_config: Map<String, Value>,
    /// Execution order for non-branching nodes is definition order.
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
}

impl WorkflowDefinition {
    pub fn new(organization_id: Uuid, name: impl Into<String>, trigger_type: TriggerType) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name: name.into(),
            trigger_type,
            trigger_config: Map::new(),
            nodes: Vec::new(),
        }
    }

    /// Append a node (builder style).
    #[must_use]
    pub fn with_node(mut self, node: NodeDef) -> Self {
        self.nodes.push(node);
        self
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, node_id: &str) -> Option<&NodeDef> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// The node immediately following `node_id` in definition order, or
    /// `None` when `node_id` is last (or absent).
    #[must_use]
    pub fn successor_of(&self, node_id: &str) -> Option<&NodeDef> {
        let idx = self.nodes.iter().position(|n| n.id == node_id)?;
        self.nodes.get(idx + 1)
    }

    /// First node of the definition, if any.
    #[must_use]
    pub fn first_node(&self) -> Option<&NodeDef> {
        self.nodes.first()
    }

    /// Check authoring invariants: node ids unique, branch targets resolvable.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let mut seen: FxHashMap<&str, ()> = FxHashMap::default();
        for node in &self.nodes {
            if seen.insert(node.id.as_str(), ()).is_some() {
                return Err(DefinitionError::DuplicateNodeId {
                    node_id: node.id.clone(),
                });
            }
        }
        for node in &self.nodes {
            if let Some(branches) = &node.branches {
                for (label, target) in branches {
                    if self.node(target).is_none() {
                        return Err(DefinitionError::UnknownBranchTarget {
                            node_id: node.id.clone(),
                            label: label.clone(),
                            target: target.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
