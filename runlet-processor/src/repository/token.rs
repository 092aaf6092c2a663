//! Token Repository
//!
//! PostgreSQL access to single-use connection tokens.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runlet_core::domain::connection::{ConnectionToken, Requester};
use sqlx::PgPool;

use super::TokenStore;
use crate::error::StoreError;

#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn create(&self, token: &ConnectionToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO connection_tokens
                (token, execution_id, user_name, source_ip, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&token.token)
        .bind(&token.execution_id)
        .bind(&token.requester.user)
        .bind(&token.requester.source_ip)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<ConnectionToken>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT token, execution_id, user_name, source_ip, expires_at, created_at
            FROM connection_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM connection_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM connection_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct TokenRow {
    token: String,
    execution_id: String,
    user_name: String,
    source_ip: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<TokenRow> for ConnectionToken {
    fn from(row: TokenRow) -> Self {
        ConnectionToken {
            token: row.token,
            execution_id: row.execution_id,
            requester: Requester {
                user: row.user_name,
                source_ip: row.source_ip,
            },
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}
