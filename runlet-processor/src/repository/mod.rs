//! Repository Module
//!
//! Persistence seams for the processor. Each store is a capability trait with
//! a PostgreSQL implementation here and an in-memory double in
//! [`crate::memory`]. Every operation is an atomic per-item call; the
//! processor never holds a lock across calls.

pub mod connection;
pub mod execution;
pub mod log;
pub mod token;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runlet_core::domain::connection::{Connection, ConnectionToken};
use runlet_core::domain::execution::Execution;
use runlet_core::domain::log::LogEvent;

use crate::error::StoreError;

pub use connection::PgConnectionStore;
pub use execution::PgExecutionStore;
pub use log::PgLogStore;
pub use token::PgTokenStore;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Execution>, StoreError>;

    /// Writes the execution's mutable fields
    ///
    /// Returns `false` without writing when the stored record is already
    /// terminal, so a concurrent settle is never overwritten.
    async fn update(&self, execution: &Execution) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait LogStore: Send + Sync {
    /// Appends events in order, ignoring IDs already buffered for the execution
    async fn save(&self, execution_id: &str, events: &[LogEvent]) -> Result<(), StoreError>;

    /// Buffered events in arrival order
    async fn list(&self, execution_id: &str) -> Result<Vec<LogEvent>, StoreError>;

    /// Drops the whole buffer, returning how many events were removed
    async fn delete(&self, execution_id: &str) -> Result<u64, StoreError>;

    /// Executions that currently have at least one buffered event
    async fn buffered_executions(&self) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn create(&self, connection: &Connection) -> Result<(), StoreError>;

    async fn list_by_execution(&self, execution_id: &str) -> Result<Vec<Connection>, StoreError>;

    /// Returns the number of records actually removed
    async fn delete_many(&self, connection_ids: &[String]) -> Result<u64, StoreError>;

    /// Moves the replay cursor to `event_id` if that event arrived after the
    /// current cursor
    ///
    /// Returns `false` without writing when the cursor is already at or past
    /// the event, or when the event is no longer buffered. A cursor that was
    /// evicted from the buffer counts as older than every buffered event.
    async fn advance_cursor(&self, connection_id: &str, event_id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn create(&self, token: &ConnectionToken) -> Result<(), StoreError>;

    async fn get(&self, token: &str) -> Result<Option<ConnectionToken>, StoreError>;

    async fn delete(&self, token: &str) -> Result<(), StoreError>;

    /// Removes every token that expired at or before `now`
    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
