/*!
SQLite-backed stores.

Durable persistence for definitions and execution records so executions
survive process restarts. Records are stored as JSON documents alongside a
few queryable columns (tenant, status, timestamps); the JSON column is the
source of truth and the extra columns exist for operational queries and
cleanup policies.

Connection follows a URL of the form `sqlite://path/to/file.db`. The backing
file and its parent directories are created on connect when missing, and the
schema is ensured idempotently, so a fresh deployment needs no external
migration step.
*/

use async_trait::async_trait;
use miette::Diagnostic;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::definition::WorkflowDefinition;
use crate::execution::WorkflowExecution;

use super::{DefinitionStore, ExecutionStore, StoreError};

#[derive(Debug, Error, Diagnostic)]
pub enum SqliteStoreError {
    #[error("SQLx error: {0}")]
    #[diagnostic(
        code(dripline::sqlite::sqlx),
        help("Ensure the SQLite database URL is valid and accessible.")
    )]
    Sqlx(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    #[diagnostic(
        code(dripline::sqlite::serde),
        help("Check the serialized shapes of definitions and execution records.")
    )]
    Serde(#[from] serde_json::Error),
}

impl From<SqliteStoreError> for StoreError {
    fn from(e: SqliteStoreError) -> Self {
        match e {
            SqliteStoreError::Sqlx(err) => StoreError::Backend {
                message: err.to_string(),
            },
            SqliteStoreError::Serde(source) => StoreError::Serde { source },
        }
    }
}

/// A single pool serving both store traits.
///
/// Per-record atomicity comes from SQLite row-level statements; the step
/// protocol never needs a multi-row transaction.
#[derive(Clone)]
pub struct SqliteStores {
    pool: SqlitePool,
}

impl SqliteStores {
    /// Connect to `database_url`, creating the file and schema when missing.
    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str) -> Result<Self, SqliteStoreError> {
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.trim();
            if !path.is_empty() {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if !p.exists() {
                    // Ignore result; if it already exists we proceed anyway.
                    let _ = std::fs::File::create_new(p);
                }
            }
        }
        let pool = SqlitePool::connect(database_url).await?;
        Self::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an already-connected pool (tests, shared pools).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, SqliteStoreError> {
        Self::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn ensure_schema(pool: &SqlitePool) -> Result<(), SqliteStoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL,
                name TEXT NOT NULL,
                definition_json TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS workflow_executions (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                organization_id TEXT NOT NULL,
                status TEXT NOT NULL,
                record_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_executions_workflow
             ON workflow_executions (workflow_id)",
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn insert_definition_inner(
        &self,
        definition: &WorkflowDefinition,
    ) -> Result<(), SqliteStoreError> {
        let json = serde_json::to_string(definition)?;
        sqlx::query(
            "INSERT OR REPLACE INTO workflows (id, organization_id, name, definition_json)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(definition.id.to_string())
        .bind(definition.organization_id.to_string())
        .bind(&definition.name)
        .bind(json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_definition_inner(
        &self,
        id: Uuid,
    ) -> Result<Option<WorkflowDefinition>, SqliteStoreError> {
        let row = sqlx::query("SELECT definition_json FROM workflows WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let json: String = row.try_get("definition_json")?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_execution_inner(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<(), SqliteStoreError> {
        let json = serde_json::to_string(execution)?;
        sqlx::query(
            "INSERT INTO workflow_executions
                (id, workflow_id, organization_id, status, record_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(execution.organization_id.to_string())
        .bind(execution.status.encode())
        .bind(json)
        .bind(execution.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_execution_inner(
        &self,
        id: Uuid,
    ) -> Result<Option<WorkflowExecution>, SqliteStoreError> {
        let row = sqlx::query("SELECT record_json FROM workflow_executions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let json: String = row.try_get("record_json")?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn update_execution_inner(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<(), SqliteStoreError> {
        let json = serde_json::to_string(execution)?;
        // Zero rows affected (externally deleted record) is not an error.
        sqlx::query(
            "UPDATE workflow_executions
             SET status = ?1, record_json = ?2, updated_at = ?3
             WHERE id = ?4",
        )
        .bind(execution.status.encode())
        .bind(json)
        .bind(execution.updated_at.to_rfc3339())
        .bind(execution.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DefinitionStore for SqliteStores {
    async fn insert_definition(&self, definition: WorkflowDefinition) -> Result<(), StoreError> {
        self.insert_definition_inner(&definition)
            .await
            .map_err(Into::into)
    }

    async fn find_definition(&self, id: Uuid) -> Result<Option<WorkflowDefinition>, StoreError> {
        self.find_definition_inner(id).await.map_err(Into::into)
    }
}

#[async_trait]
impl ExecutionStore for SqliteStores {
    async fn insert_execution(&self, execution: WorkflowExecution) -> Result<(), StoreError> {
        self.insert_execution_inner(&execution)
            .await
            .map_err(Into::into)
    }

    async fn find_execution(&self, id: Uuid) -> Result<Option<WorkflowExecution>, StoreError> {
        self.find_execution_inner(id).await.map_err(Into::into)
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        self.update_execution_inner(execution)
            .await
            .map_err(Into::into)
    }
}
