//! Log Repository
//!
//! PostgreSQL-backed bounded log buffer.

use async_trait::async_trait;
use runlet_core::domain::log::LogEvent;
use sqlx::PgPool;

use super::LogStore;
use crate::error::StoreError;

#[derive(Clone)]
pub struct PgLogStore {
    pool: PgPool,
    capacity: usize,
}

impl PgLogStore {
    /// `capacity` bounds the buffered events per execution; oldest are evicted
    pub fn new(pool: PgPool, capacity: usize) -> Self {
        Self { pool, capacity }
    }
}

#[async_trait]
impl LogStore for PgLogStore {
    async fn save(&self, execution_id: &str, events: &[LogEvent]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO log_events (execution_id, event_id, timestamp_ms, message)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (execution_id, event_id) DO NOTHING
                "#,
            )
            .bind(execution_id)
            .bind(&event.event_id)
            .bind(event.timestamp)
            .bind(&event.message)
            .execute(&mut *tx)
            .await?;
        }

        let evicted = sqlx::query(
            r#"
            DELETE FROM log_events
            WHERE execution_id = $1 AND seq NOT IN (
                SELECT seq FROM log_events
                WHERE execution_id = $1
                ORDER BY seq DESC
                LIMIT $2
            )
            "#,
        )
        .bind(execution_id)
        .bind(self.capacity as i64)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if evicted > 0 {
            tracing::debug!(
                "Evicted {} buffered log events for execution {}",
                evicted,
                execution_id
            );
        }

        Ok(())
    }

    async fn list(&self, execution_id: &str) -> Result<Vec<LogEvent>, StoreError> {
        let rows = sqlx::query_as::<_, LogEventRow>(
            r#"
            SELECT event_id, timestamp_ms, message
            FROM log_events
            WHERE execution_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn delete(&self, execution_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM log_events WHERE execution_id = $1")
            .bind(execution_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn buffered_executions(&self) -> Result<Vec<String>, StoreError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT execution_id FROM log_events ORDER BY execution_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct LogEventRow {
    event_id: String,
    timestamp_ms: i64,
    message: String,
}

impl From<LogEventRow> for LogEvent {
    fn from(row: LogEventRow) -> Self {
        LogEvent {
            event_id: row.event_id,
            timestamp: row.timestamp_ms,
            message: row.message,
        }
    }
}
