//! Execution Repository
//!
//! PostgreSQL access to execution records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runlet_core::domain::execution::{Execution, ExecutionStatus};
use sqlx::PgPool;

use super::ExecutionStore;
use crate::error::StoreError;

#[derive(Clone)]
pub struct PgExecutionStore {
    pool: PgPool,
}

impl PgExecutionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn get(&self, id: &str) -> Result<Option<Execution>, StoreError> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT id, command, user_name, status, exit_code, created_at, started_at,
                   completed_at, duration_seconds, modified_by_request
            FROM executions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Execution::try_from).transpose()
    }

    async fn update(&self, execution: &Execution) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = $1, exit_code = $2, started_at = $3, completed_at = $4,
                duration_seconds = $5, modified_by_request = $6
            WHERE id = $7 AND status NOT IN ('SUCCEEDED', 'FAILED', 'STOPPED')
            "#,
        )
        .bind(execution.status.as_str())
        .bind(execution.exit_code)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.duration_seconds)
        .bind(&execution.modified_by_request)
        .bind(&execution.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    command: String,
    user_name: String,
    status: String,
    exit_code: Option<i32>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    duration_seconds: Option<i64>,
    modified_by_request: Option<String>,
}

impl TryFrom<ExecutionRow> for Execution {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let status = ExecutionStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "execution {} has unknown status {:?}",
                row.id, row.status
            ))
        })?;

        Ok(Execution {
            id: row.id,
            command: row.command,
            user: row.user_name,
            status,
            exit_code: row.exit_code,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_seconds: row.duration_seconds,
            modified_by_request: row.modified_by_request,
        })
    }
}
