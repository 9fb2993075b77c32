//! The engine facade: wiring, the trigger operation, and lifecycle.
//!
//! [`WorkflowEngine`] owns the queue and its worker pool and exposes the two
//! synchronous entry points the outer layers call: creating definitions and
//! triggering executions. Everything downstream of the trigger happens
//! asynchronously through the queue-driven stepper.
//!
//! All collaborators are injected through [`EngineBuilder`]: no module
//! globals, no ambient connections. The process entry point decides what
//! backs each seam and owns connect/drain/shutdown.

use miette::Diagnostic;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::definition::{DefinitionError, WorkflowDefinition};
use crate::execution::{END_NODE_SENTINEL, WorkflowExecution};
use crate::processors::{NodeProcessor, ProcessorRegistry};
use crate::queue::{
    InProcessQueue, QueueError, StepQueue, StepTask, TaskRecord, WorkerPool,
};
use crate::services::{
    ContactDirectory, EmailDelivery, EventLog, InMemoryContacts, InMemoryEmailDelivery,
    InMemoryEventLog,
};
use crate::stepper::Stepper;
use crate::stores::{
    DefinitionStore, ExecutionStore, InMemoryDefinitionStore, InMemoryExecutionStore, StoreError,
};
use crate::types::NodeType;

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("workflow {workflow_id} not found")]
    #[diagnostic(
        code(dripline::engine::workflow_not_found),
        help("The workflow id does not exist in the definition store for this tenant.")
    )]
    WorkflowNotFound { workflow_id: Uuid },

    #[error(transparent)]
    #[diagnostic(code(dripline::engine::definition))]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    #[diagnostic(code(dripline::engine::store))]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(code(dripline::engine::queue))]
    Queue(#[from] QueueError),
}

/// Builder for a [`WorkflowEngine`].
///
/// Every seam defaults to its in-memory implementation, so
/// `EngineBuilder::default().build()` yields a fully working engine for
/// tests and development.
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<EngineConfig>,
    definitions: Option<Arc<dyn DefinitionStore>>,
    executions: Option<Arc<dyn ExecutionStore>>,
    contacts: Option<Arc<dyn ContactDirectory>>,
    delivery: Option<Arc<dyn EmailDelivery>>,
    events: Option<Arc<dyn EventLog>>,
    extra_processors: Vec<(NodeType, Arc<dyn NodeProcessor>)>,
}

impl EngineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn with_definition_store(mut self, store: Arc<dyn DefinitionStore>) -> Self {
        self.definitions = Some(store);
        self
    }

    #[must_use]
    pub fn with_execution_store(mut self, store: Arc<dyn ExecutionStore>) -> Self {
        self.executions = Some(store);
        self
    }

    #[must_use]
    pub fn with_contacts(mut self, contacts: Arc<dyn ContactDirectory>) -> Self {
        self.contacts = Some(contacts);
        self
    }

    #[must_use]
    pub fn with_email_delivery(mut self, delivery: Arc<dyn EmailDelivery>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    #[must_use]
    pub fn with_event_log(mut self, events: Arc<dyn EventLog>) -> Self {
        self.events = Some(events);
        self
    }

    /// Register a processor for an additional node kind (or override a
    /// built-in one).
    #[must_use]
    pub fn with_processor(mut self, kind: NodeType, processor: Arc<dyn NodeProcessor>) -> Self {
        self.extra_processors.push((kind, processor));
        self
    }

    /// Wire the stepper, start the worker pool, and return the engine.
    #[must_use]
    pub fn build(self) -> WorkflowEngine {
        let config = self.config.unwrap_or_default();
        let definitions = self
            .definitions
            .unwrap_or_else(|| Arc::new(InMemoryDefinitionStore::new()));
        let executions = self
            .executions
            .unwrap_or_else(|| Arc::new(InMemoryExecutionStore::new()));
        let contacts = self
            .contacts
            .unwrap_or_else(|| Arc::new(InMemoryContacts::new()));
        let delivery = self
            .delivery
            .unwrap_or_else(|| Arc::new(InMemoryEmailDelivery::new(config.base_url.clone())));
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(InMemoryEventLog::new()));

        let mut registry = ProcessorRegistry::with_defaults(contacts, delivery, events);
        for (kind, processor) in self.extra_processors {
            registry.register(kind, processor);
        }

        let queue = InProcessQueue::new(config.queue_config());
        let stepper = Arc::new(Stepper::new(
            Arc::clone(&definitions),
            Arc::clone(&executions),
            registry,
            Arc::new(queue.clone()),
        ));
        let pool = queue.start_workers(stepper);

        WorkflowEngine {
            definitions,
            executions,
            queue,
            pool,
        }
    }
}

/// The running engine: definition/trigger entry points plus queue lifecycle.
pub struct WorkflowEngine {
    definitions: Arc<dyn DefinitionStore>,
    executions: Arc<dyn ExecutionStore>,
    queue: InProcessQueue,
    pool: WorkerPool,
}

impl WorkflowEngine {
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Validate and store a definition. Definitions are immutable once any
    /// execution references them; re-creating under the same id is an
    /// authoring-layer concern.
    #[instrument(skip(self, definition), fields(workflow_id = %definition.id), err)]
    pub async fn create_workflow(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<Uuid, EngineError> {
        definition.validate()?;
        let id = definition.id;
        self.definitions.insert_definition(definition).await?;
        Ok(id)
    }

    /// The trigger operation: create an execution record pointing at the
    /// definition's first node (or the end sentinel for empty definitions)
    /// and enqueue its first step with zero delay.
    #[instrument(skip(self, initial_data), fields(%workflow_id, %contact_id), err)]
    pub async fn trigger(
        &self,
        workflow_id: Uuid,
        contact_id: Uuid,
        initial_data: Map<String, Value>,
    ) -> Result<Uuid, EngineError> {
        let definition = self
            .definitions
            .find_definition(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound { workflow_id })?;

        let first_node_id = definition
            .first_node()
            .map(|n| n.id.clone())
            .unwrap_or_else(|| END_NODE_SENTINEL.to_string());

        let execution = WorkflowExecution::new(
            definition.id,
            definition.organization_id,
            contact_id,
            first_node_id.clone(),
            initial_data,
        );
        let execution_id = execution.id;
        self.executions.insert_execution(execution).await?;
        self.queue
            .enqueue(StepTask::new(execution_id, first_node_id), Duration::ZERO)
            .await?;

        info!(%execution_id, "workflow triggered");
        Ok(execution_id)
    }

    /// Audit read of an execution record.
    pub async fn execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<WorkflowExecution>, EngineError> {
        Ok(self.executions.find_execution(execution_id).await?)
    }

    /// Wait until every pending, delayed, and in-flight task has settled.
    pub async fn drain(&self) {
        self.queue.drain().await;
    }

    /// The queue's retained delivery history (observability).
    #[must_use]
    pub fn task_history(&self) -> Vec<TaskRecord> {
        self.queue.history()
    }

    /// Stop the worker pool. In-flight steps finish first.
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }
}
