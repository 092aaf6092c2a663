//! Processor error types
//!
//! Malformed, out-of-scope, stale and orphaned events are absorbed where they
//! are detected and never become errors. Everything here is a failure the
//! caller must see so the invocation can be retried.

use thiserror::Error;

/// Persistence collaborator failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Push transport failure for a single connection
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection {0} is gone")]
    Gone(String),

    #[error("push to connection {connection_id} failed: {message}")]
    Failed {
        connection_id: String,
        message: String,
    },
}

/// Reconciliation collaborator failure
#[derive(Debug, Error)]
#[error("reconciliation failed: {0}")]
pub struct ReconcileError(pub String);

/// One subscriber that could not be served during a fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub connection_id: String,
    pub reason: String,
}

impl std::fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.connection_id, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("unrecognized event: no known envelope shape matched")]
    Unrecognized,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(
        "delivery failed for {count} subscriber(s) of execution {execution_id}: {details}",
        count = .failures.len(),
        details = join_failures(.failures)
    )]
    DeliveryFailed {
        execution_id: String,
        failures: Vec<DeliveryFailure>,
    },

    #[error("unknown scheduled action: {0}")]
    UnknownScheduledAction(String),

    #[error("execution {0} not found")]
    ExecutionNotFound(String),

    #[error("execution {0} has already finished")]
    ExecutionFinished(String),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("deadline exceeded during {0}")]
    DeadlineExceeded(&'static str),
}

fn join_failures(failures: &[DeliveryFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
