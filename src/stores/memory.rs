//! Process-local stores for tests and development.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::definition::WorkflowDefinition;
use crate::execution::WorkflowExecution;

use super::{DefinitionStore, ExecutionStore, StoreError};

/// Volatile definition store backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryDefinitionStore {
    definitions: Mutex<FxHashMap<Uuid, WorkflowDefinition>>,
}

impl InMemoryDefinitionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a definition, returning whether it existed. Exposed so tests
    /// can exercise the stepper's stale-definition path.
    pub fn remove(&self, id: Uuid) -> bool {
        self.definitions
            .lock()
            .expect("definitions mutex poisoned")
            .remove(&id)
            .is_some()
    }
}

#[async_trait]
impl DefinitionStore for InMemoryDefinitionStore {
    async fn insert_definition(&self, definition: WorkflowDefinition) -> Result<(), StoreError> {
        self.definitions
            .lock()
            .expect("definitions mutex poisoned")
            .insert(definition.id, definition);
        Ok(())
    }

    async fn find_definition(&self, id: Uuid) -> Result<Option<WorkflowDefinition>, StoreError> {
        Ok(self
            .definitions
            .lock()
            .expect("definitions mutex poisoned")
            .get(&id)
            .cloned())
    }
}

/// Volatile execution store backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    executions: Mutex<FxHashMap<Uuid, WorkflowExecution>>,
}

impl InMemoryExecutionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove an execution, returning whether it existed. Exposed so tests
    /// can simulate external deletion between enqueue and dequeue.
    pub fn remove(&self, id: Uuid) -> bool {
        self.executions
            .lock()
            .expect("executions mutex poisoned")
            .remove(&id)
            .is_some()
    }

    /// Number of stored records (observability for tests).
    #[must_use]
    pub fn len(&self) -> usize {
        self.executions
            .lock()
            .expect("executions mutex poisoned")
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn insert_execution(&self, execution: WorkflowExecution) -> Result<(), StoreError> {
        self.executions
            .lock()
            .expect("executions mutex poisoned")
            .insert(execution.id, execution);
        Ok(())
    }

    async fn find_execution(&self, id: Uuid) -> Result<Option<WorkflowExecution>, StoreError> {
        Ok(self
            .executions
            .lock()
            .expect("executions mutex poisoned")
            .get(&id)
            .cloned())
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        let mut executions = self.executions.lock().expect("executions mutex poisoned");
        // Matching an SQL UPDATE on a deleted row: zero rows affected, no error.
        if let Some(slot) = executions.get_mut(&execution.id) {
            *slot = execution.clone();
        }
        Ok(())
    }
}
