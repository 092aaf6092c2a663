use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Executions are inserted by the submission path; the table lives here so
    // both sides agree on its shape
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS executions (
            id VARCHAR(255) PRIMARY KEY,
            command TEXT NOT NULL,
            user_name VARCHAR(255) NOT NULL,
            status VARCHAR(20) NOT NULL,
            exit_code INTEGER,
            created_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            duration_seconds BIGINT,
            modified_by_request VARCHAR(255)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Log buffer; seq preserves arrival order
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS log_events (
            seq BIGSERIAL PRIMARY KEY,
            execution_id VARCHAR(255) NOT NULL,
            event_id VARCHAR(255) NOT NULL,
            timestamp_ms BIGINT NOT NULL,
            message TEXT NOT NULL,
            UNIQUE (execution_id, event_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS connections (
            connection_id VARCHAR(255) PRIMARY KEY,
            execution_id VARCHAR(255) NOT NULL,
            last_event_id VARCHAR(255),
            user_name VARCHAR(255) NOT NULL,
            source_ip VARCHAR(64),
            connected_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS connection_tokens (
            token VARCHAR(255) PRIMARY KEY,
            execution_id VARCHAR(255) NOT NULL,
            user_name VARCHAR(255) NOT NULL,
            source_ip VARCHAR(64),
            expires_at TIMESTAMPTZ NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for per-execution lookups
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_log_events_execution ON log_events(execution_id, seq)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_connections_execution ON connections(execution_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_connection_tokens_expires ON connection_tokens(expires_at)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
