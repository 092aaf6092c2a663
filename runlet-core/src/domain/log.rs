//! Log domain types

use serde::{Deserialize, Serialize};

/// One line of output emitted by an execution
///
/// `event_id` is unique within an execution's buffer. Entries ingested
/// without an upstream ID get one derived from `(timestamp, message)`, so a
/// redelivered line always carries the same ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub event_id: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub message: String,
}
