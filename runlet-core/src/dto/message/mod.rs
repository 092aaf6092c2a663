//! Outbound frames and response envelopes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::log::LogEvent;

/// Frame pushed to a live connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// New output lines, in arrival order
    Logs {
        execution_id: String,
        events: Vec<LogEvent>,
    },
    /// The server is about to drop the connection
    Disconnect {
        execution_id: String,
        reason: DisconnectReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    ExecutionCompleted,
}

/// Response envelope returned for every handled event
///
/// Socket routes require an acknowledgement frame even when the handshake is
/// rejected, so validation failures travel here as a status code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status_code: u16,
    pub body: String,
}

impl HandlerResponse {
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Everything a client needs to open a log stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub execution_id: String,
    pub url: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}
