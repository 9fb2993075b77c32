//! # Dripline: Queue-driven Workflow Automation Engine
//!
//! Dripline executes multi-tenant automation workflows one node at a time.
//! A workflow is a stored definition (an ordered list of typed nodes with
//! optional branch tables), and each run of it is an execution record that
//! a queue-driven stepper advances node by node, persisting after every
//! transition.
//!
//! ## Core Concepts
//!
//! - **Definitions**: Immutable workflow blueprints (ordered nodes, branch
//!   tables, trigger metadata) scoped to an organization
//! - **Executions**: Per-contact run state (current node, status, accumulated
//!   per-node results) that survives process restarts
//! - **Stepper**: The state machine that runs exactly one node per queue
//!   delivery and schedules the next
//! - **Processors**: Async units of work behind a per-node-kind registry
//!   (`email`, `wait`, `condition`, or your own)
//! - **Queue**: An in-process delayed task queue with a worker pool, retry
//!   backoff, and optional rate limiting
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dripline::definition::{NodeDef, TriggerType, WorkflowDefinition};
//! use dripline::engine::WorkflowEngine;
//! use dripline::types::NodeType;
//! use serde_json::{Map, json};
//! use uuid::Uuid;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = WorkflowEngine::builder().build();
//!
//! let org_id = Uuid::new_v4();
//! let workflow = WorkflowDefinition::new(org_id, "Welcome drip", TriggerType::Manual)
//!     .with_node(
//!         NodeDef::new("hello", NodeType::Email)
//!             .with_config("subject", json!("Hi {{firstName}}!"))
//!             .with_config("template", json!("Welcome aboard, {{firstName}}.")),
//!     )
//!     .with_node(NodeDef::new("pause", NodeType::Wait).with_config("days", json!(1)))
//!     .with_node(NodeDef::new("followup", NodeType::Email).with_config("subject", json!("Still there?")));
//!
//! let workflow_id = engine.create_workflow(workflow).await?;
//! let contact_id = Uuid::new_v4();
//! let execution_id = engine.trigger(workflow_id, contact_id, Map::new()).await?;
//!
//! engine.drain().await;
//! let record = engine.execution(execution_id).await?;
//! println!("finished as {:?}", record.map(|r| r.status));
//! # Ok(())
//! # }
//! ```
//!
//! ## Delivery Semantics
//!
//! The queue is at-least-once: a failed step is redelivered with exponential
//! backoff up to a configured attempt cap. The stepper keeps this safe by
//! persisting the execution record *before* enqueueing the next task, so at
//! most one task is ever outstanding per execution, and by treating stale
//! references (deleted executions or definitions) as silent no-ops.
//!
//! ## Module Guide
//!
//! - [`types`] - Node kind and execution status enums shared across layers
//! - [`definition`] - Workflow definitions, node schemas, authoring validation
//! - [`execution`] - Per-run state records and their transitions
//! - [`template`] - `{{path}}` placeholder rendering for email content
//! - [`services`] - Contact, email delivery, and event log seams
//! - [`stores`] - Definition/execution persistence (in-memory and sqlite)
//! - [`processors`] - Built-in node processors and the registry
//! - [`queue`] - The delayed in-process task queue and worker pool
//! - [`stepper`] - The one-node-per-delivery state machine
//! - [`engine`] - Wiring, the trigger entry point, lifecycle
//! - [`config`] - Engine tuning knobs and environment resolution
//! - [`telemetry`] - Opt-in tracing subscriber setup

pub mod config;
pub mod definition;
pub mod engine;
pub mod execution;
pub mod processors;
pub mod queue;
pub mod services;
pub mod stepper;
pub mod stores;
pub mod telemetry;
pub mod template;
pub mod types;
