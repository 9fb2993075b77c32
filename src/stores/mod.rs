//! Persistence seams for definitions and execution records.
//!
//! The stepper treats storage as a pair of passive collaborators: a
//! read-only [`DefinitionStore`] and an [`ExecutionStore`] with atomic
//! per-record updates. Per-record atomicity is all the engine needs: the
//! step protocol guarantees at most one outstanding task per execution, so
//! no cross-record transaction or distributed lock is ever taken.
//!
//! # Backends
//!
//! - [`memory`]: process-local stores for tests and development.
//! - [`sqlite`] (feature `sqlite`, on by default): durable sqlx-backed
//!   stores so executions survive process restarts.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;
use uuid::Uuid;

use crate::definition::WorkflowDefinition;
use crate::execution::WorkflowExecution;

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{InMemoryDefinitionStore, InMemoryExecutionStore};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStores;

/// Storage failures. Absence of a record is *not* an error; lookups return
/// `Ok(None)` because stale references are an expected outcome under
/// at-least-once delivery.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("storage backend error: {message}")]
    #[diagnostic(
        code(dripline::stores::backend),
        help("Check connectivity to the underlying database.")
    )]
    Backend { message: String },

    #[error("stored record could not be decoded: {source}")]
    #[diagnostic(
        code(dripline::stores::serde),
        help("The persisted JSON no longer matches the current record shape.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },
}

/// Holds immutable-once-triggered workflow definitions.
///
/// Read-only from the stepper's perspective; concurrent reads by many
/// workers are always safe.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn insert_definition(&self, definition: WorkflowDefinition) -> Result<(), StoreError>;

    async fn find_definition(&self, id: Uuid) -> Result<Option<WorkflowDefinition>, StoreError>;
}

/// Holds one mutable record per running execution.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn insert_execution(&self, execution: WorkflowExecution) -> Result<(), StoreError>;

    async fn find_execution(&self, id: Uuid) -> Result<Option<WorkflowExecution>, StoreError>;

    /// Overwrite the stored record with `execution`'s current state.
    ///
    /// Updating a record that no longer exists is a no-op, mirroring an SQL
    /// `UPDATE` that matches zero rows: under at-least-once delivery a task
    /// may race an external deletion, and that race must not fail the step.
    async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError>;
}
