//! Live connection domain types
//!
//! A connection is a client socket subscribed to one execution's output.
//! Connections are admitted with a single-use [`ConnectionToken`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who asked for the stream, captured when the token is minted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user: String,
    pub source_ip: Option<String>,
}

/// A live subscriber attached to an execution's output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub connection_id: String,
    /// Pinned at connect time and never changed
    pub execution_id: String,
    /// Replay cursor: the last event ID successfully delivered
    pub last_event_id: Option<String>,
    pub requester: Requester,
    pub connected_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(
        connection_id: impl Into<String>,
        execution_id: impl Into<String>,
        requester: Requester,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            execution_id: execution_id.into(),
            last_event_id: None,
            requester,
            connected_at: Utc::now(),
        }
    }
}

/// One-time credential binding a future connection to an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionToken {
    pub token: String,
    pub execution_id: String,
    pub requester: Requester,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ConnectionToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
