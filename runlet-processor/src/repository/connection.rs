//! Connection Repository
//!
//! PostgreSQL access to live subscriber records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runlet_core::domain::connection::{Connection, Requester};
use sqlx::PgPool;

use super::ConnectionStore;
use crate::error::StoreError;

#[derive(Clone)]
pub struct PgConnectionStore {
    pool: PgPool,
}

impl PgConnectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionStore for PgConnectionStore {
    async fn create(&self, connection: &Connection) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO connections
                (connection_id, execution_id, last_event_id, user_name, source_ip, connected_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&connection.connection_id)
        .bind(&connection.execution_id)
        .bind(&connection.last_event_id)
        .bind(&connection.requester.user)
        .bind(&connection.requester.source_ip)
        .bind(connection.connected_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_by_execution(&self, execution_id: &str) -> Result<Vec<Connection>, StoreError> {
        let rows = sqlx::query_as::<_, ConnectionRow>(
            r#"
            SELECT connection_id, execution_id, last_event_id, user_name, source_ip, connected_at
            FROM connections
            WHERE execution_id = $1
            ORDER BY connected_at ASC
            "#,
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn delete_many(&self, connection_ids: &[String]) -> Result<u64, StoreError> {
        if connection_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM connections WHERE connection_id = ANY($1)")
            .bind(connection_ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn advance_cursor(&self, connection_id: &str, event_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE connections c
            SET last_event_id = $2
            FROM log_events target
            WHERE c.connection_id = $1
              AND target.execution_id = c.execution_id
              AND target.event_id = $2
              AND target.seq > COALESCE(
                  (SELECT cur.seq FROM log_events cur
                   WHERE cur.execution_id = c.execution_id
                     AND cur.event_id = c.last_event_id),
                  0)
            "#,
        )
        .bind(connection_id)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ConnectionRow {
    connection_id: String,
    execution_id: String,
    last_event_id: Option<String>,
    user_name: String,
    source_ip: Option<String>,
    connected_at: DateTime<Utc>,
}

impl From<ConnectionRow> for Connection {
    fn from(row: ConnectionRow) -> Self {
        Connection {
            connection_id: row.connection_id,
            execution_id: row.execution_id,
            last_event_id: row.last_event_id,
            requester: Requester {
                user: row.user_name,
                source_ip: row.source_ip,
            },
            connected_at: row.connected_at,
        }
    }
}
