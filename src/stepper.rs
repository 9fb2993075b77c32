//! The stepper: advance one execution by exactly one node per invocation.
//!
//! Each queue delivery hands the stepper an execution id and a node id. The
//! stepper re-reads everything else from the stores, invokes the matching
//! processor, persists the result, and either marks the execution terminal
//! or enqueues the next step task. Because the next task is enqueued only
//! after this step's persistence writes complete, at most one task is ever
//! outstanding per execution, which serializes all mutation of a record
//! without any lock primitive.
//!
//! # Error taxonomy
//!
//! - *Stale reference* (execution or definition deleted, node id
//!   unresolvable): absorbed as a no-op or a completion, never a failure.
//! - *Unknown node kind*: degraded no-op result, logged, flow continues.
//! - *Processor failure*: persisted as `status = failed` with the message,
//!   then re-raised so the queue's retry policy decides on redelivery.
//! - *Infrastructure failure* (store/queue): propagated untouched; the queue
//!   redelivers.

use miette::Diagnostic;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::definition::{NodeDef, WorkflowDefinition};
use crate::execution::WorkflowExecution;
use crate::processors::{DEFAULT_BRANCH, NodeOutcome, ProcessorError, ProcessorRegistry};
use crate::queue::{QueueError, StepHandler, StepQueue, StepTask, TaskError};
use crate::stores::{DefinitionStore, ExecutionStore, StoreError};
use crate::types::ExecutionStatus;

#[derive(Debug, Error, Diagnostic)]
pub enum StepError {
    #[error(transparent)]
    #[diagnostic(code(dripline::stepper::store))]
    Store(#[from] StoreError),

    #[error("node '{node_id}' failed: {source}")]
    #[diagnostic(code(dripline::stepper::processor))]
    Processor {
        node_id: String,
        #[source]
        source: ProcessorError,
    },

    #[error(transparent)]
    #[diagnostic(code(dripline::stepper::queue))]
    Queue(#[from] QueueError),
}

/// Where the flow goes after the current node.
enum NextNode {
    Terminal,
    Step(String),
}

/// The state-machine core. Stateless across invocations: all per-execution
/// state lives in the execution store.
pub struct Stepper {
    definitions: Arc<dyn DefinitionStore>,
    executions: Arc<dyn ExecutionStore>,
    registry: ProcessorRegistry,
    queue: Arc<dyn StepQueue>,
}

impl Stepper {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        executions: Arc<dyn ExecutionStore>,
        registry: ProcessorRegistry,
        queue: Arc<dyn StepQueue>,
    ) -> Self {
        Self {
            definitions,
            executions,
            registry,
            queue,
        }
    }

    /// Run one step task to completion.
    ///
    /// Absorbs stale references silently; persists processor failures on the
    /// record before propagating them.
    #[instrument(
        skip(self, task),
        fields(execution_id = %task.execution_id, node_id = %task.node_id),
        err
    )]
    pub async fn step(&self, task: &StepTask) -> Result<(), StepError> {
        let Some(mut execution) = self.executions.find_execution(task.execution_id).await? else {
            // At-least-once delivery may redeliver after an external
            // deletion; a stale task is a no-op, not an error.
            debug!("execution not found, dropping stale task");
            return Ok(());
        };
        let Some(definition) = self
            .definitions
            .find_definition(execution.workflow_id)
            .await?
        else {
            debug!(workflow_id = %execution.workflow_id, "definition not found, dropping stale task");
            return Ok(());
        };

        match self.advance(&definition, &mut execution, &task.node_id).await {
            Ok(()) => Ok(()),
            Err(step_error) => {
                execution.mark_failed(step_error.to_string());
                if let Err(persist_error) = self.executions.update_execution(&execution).await {
                    error!(
                        error = %persist_error,
                        "could not persist failure state, record may show a stale status"
                    );
                }
                Err(step_error)
            }
        }
    }

    /// The per-invocation algorithm: resolve, process, route, persist,
    /// re-enqueue or terminate.
    async fn advance(
        &self,
        definition: &WorkflowDefinition,
        execution: &mut WorkflowExecution,
        node_id: &str,
    ) -> Result<(), StepError> {
        let Some(node) = definition.node(node_id) else {
            // End-of-flow: covers the last node's missing successor, the
            // empty-definition sentinel, and stale branch targets alike.
            info!("node not resolvable, completing execution");
            execution.mark_completed();
            self.executions.update_execution(execution).await?;
            return Ok(());
        };

        // Persist the attempt before processing so a crash mid-step leaves
        // an inspectable "last attempted node".
        execution.begin_node(&node.id, &node.kind);
        self.executions.update_execution(execution).await?;

        let outcome = self.run_processor(node, execution).await?;
        let next = self.resolve_next(definition, node, &outcome);
        let delay = outcome.requested_delay.unwrap_or(Duration::ZERO);

        execution.record_result(&node.id, outcome.result);

        match next {
            NextNode::Step(next_node_id) => {
                if delay > Duration::ZERO {
                    // The waiting/running duality exists for external
                    // observers: "paused for a timed wait" vs "progressing".
                    execution.status = ExecutionStatus::Waiting;
                }
                // Persist before enqueueing: the single-outstanding-task
                // invariant holds only if the next task cannot fire against
                // un-persisted state.
                self.executions.update_execution(execution).await?;
                info!(
                    next_node_id = %next_node_id,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling next node"
                );
                self.queue
                    .enqueue(StepTask::new(execution.id, next_node_id), delay)
                    .await?;
            }
            NextNode::Terminal => {
                execution.mark_completed();
                self.executions.update_execution(execution).await?;
                info!("no next node, execution completed");
            }
        }
        Ok(())
    }

    /// Dispatch to the registered processor; unknown kinds degrade to an
    /// empty no-op result instead of failing the execution.
    async fn run_processor(
        &self,
        node: &NodeDef,
        execution: &WorkflowExecution,
    ) -> Result<NodeOutcome, StepError> {
        match self.registry.get(&node.kind) {
            Some(processor) => processor
                .process(node, execution)
                .await
                .map_err(|source| StepError::Processor {
                    node_id: node.id.clone(),
                    source,
                }),
            None => {
                warn!(kind = %node.kind, "no processor registered for node kind, skipping");
                Ok(NodeOutcome::of(serde_json::json!({})))
            }
        }
    }

    /// Branch-table routing for conditions, definition order for the rest.
    ///
    /// A branch label with no table entry means terminal; a branch target
    /// naming a deleted node is tolerated here and resolves to completion
    /// when its task fires.
    fn resolve_next(
        &self,
        definition: &WorkflowDefinition,
        node: &NodeDef,
        outcome: &NodeOutcome,
    ) -> NextNode {
        if node.kind.is_condition() {
            let label = outcome.branch.as_deref().unwrap_or(DEFAULT_BRANCH);
            match node
                .branches
                .as_ref()
                .and_then(|branches| branches.get(label))
            {
                Some(target) => NextNode::Step(target.clone()),
                None => NextNode::Terminal,
            }
        } else {
            match definition.successor_of(&node.id) {
                Some(successor) => NextNode::Step(successor.id.clone()),
                None => NextNode::Terminal,
            }
        }
    }
}

#[async_trait::async_trait]
impl StepHandler for Stepper {
    async fn handle(&self, task: StepTask) -> Result<(), TaskError> {
        self.step(&task).await.map_err(Into::into)
    }
}
