//! Inbound event envelopes
//!
//! Four independent sources deliver events to the processor. Each shape
//! below is what a source sends once the boundary has identified it; the
//! untyped probing happens in the processor's classifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `detail-type` of the only infrastructure notification the processor acts on
pub const TASK_STATE_CHANGE: &str = "Task State Change";

/// Task status reported once the runner container has started
pub const TASK_STATUS_RUNNING: &str = "RUNNING";

/// Task status reported once every container in the task has exited
pub const TASK_STATUS_STOPPED: &str = "STOPPED";

/// Stop code reported when a user asked the fleet to stop the task
pub const STOP_CODE_USER_INITIATED: &str = "UserInitiated";

/// Stop code reported when the task never got its containers running
pub const STOP_CODE_FAILED_TO_START: &str = "TaskFailedToStart";

/// Log batch message type carrying actual output lines
pub const LOG_MESSAGE_DATA: &str = "DATA_MESSAGE";

/// Scheduled trigger action that runs health reconciliation
pub const SCHEDULED_ACTION_RECONCILE: &str = "reconcile";

/// Socket routes
pub const ROUTE_CONNECT: &str = "$connect";
pub const ROUTE_DISCONNECT: &str = "$disconnect";
pub const ROUTE_DEFAULT: &str = "$default";

/// A classified inbound event
#[derive(Debug, Clone)]
pub enum Event {
    TaskStateChange(TaskStateChangeEvent),
    LogBatch(LogSubscriptionEvent),
    Scheduled(ScheduledEvent),
    Socket(SocketEvent),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::TaskStateChange(_) => "task_state_change",
            Event::LogBatch(_) => "log_batch",
            Event::Scheduled(_) => "scheduled",
            Event::Socket(_) => "socket",
        }
    }
}

// =============================================================================
// Infrastructure state changes
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStateChangeEvent {
    #[serde(rename = "detail-type")]
    pub detail_type: String,
    pub source: String,
    pub detail: TaskDetail,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetail {
    pub task_arn: String,
    #[serde(default)]
    pub last_status: String,
    #[serde(default)]
    pub stop_code: Option<String>,
    #[serde(default)]
    pub stopped_reason: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub containers: Vec<ContainerDetail>,
}

impl TaskDetail {
    /// Exit code of the named container, if the fleet reported one
    pub fn container_exit_code(&self, name: &str) -> Option<i32> {
        self.containers
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.exit_code)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDetail {
    pub name: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub last_status: Option<String>,
}

// =============================================================================
// Log batches
// =============================================================================

/// Log subscription delivery: base64 of a gzip-compressed [`LogBatch`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSubscriptionEvent {
    pub awslogs: EncodedLogData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedLogData {
    pub data: String,
}

/// Decoded log batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatch {
    pub message_type: String,
    #[serde(default)]
    pub log_group: String,
    #[serde(default)]
    pub log_stream: String,
    #[serde(default)]
    pub log_events: Vec<RawLogEntry>,
}

/// A log line as delivered upstream; `id` may be missing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLogEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub timestamp: i64,
    pub message: String,
}

// =============================================================================
// Scheduled triggers
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEvent {
    #[serde(rename = "detail-type")]
    pub detail_type: String,
    pub source: String,
    #[serde(default)]
    pub detail: ScheduledDetail,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduledDetail {
    #[serde(default)]
    pub action: Option<String>,
}

// =============================================================================
// Socket protocol
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketEvent {
    pub request_context: SocketRequestContext,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
}

impl SocketEvent {
    /// Query parameter value, treating empty strings as missing
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query_string_parameters
            .as_ref()
            .and_then(|params| params.get(name))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketRequestContext {
    pub route_key: String,
    pub connection_id: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub identity: Option<SocketIdentity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketIdentity {
    #[serde(default)]
    pub source_ip: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_detail_deserializes_fleet_shape() {
        let json = serde_json::json!({
            "taskArn": "arn:fleet:task/cluster/abc123",
            "lastStatus": "STOPPED",
            "stopCode": "EssentialContainerExited",
            "startedAt": "2024-05-01T10:00:00Z",
            "stoppedAt": "2024-05-01T10:00:42Z",
            "containers": [
                {"name": "sidecar", "exitCode": 0},
                {"name": "runner", "exitCode": 137}
            ]
        });

        let detail: TaskDetail = serde_json::from_value(json).unwrap();
        assert_eq!(detail.last_status, TASK_STATUS_STOPPED);
        assert_eq!(detail.container_exit_code("runner"), Some(137));
        assert_eq!(detail.container_exit_code("sidecar"), Some(0));
        assert_eq!(detail.container_exit_code("missing"), None);
        assert!(detail.started_at.is_some());
    }

    #[test]
    fn test_raw_log_entry_without_id() {
        let entry: RawLogEntry =
            serde_json::from_str(r#"{"timestamp": 1714557600000, "message": "hello"}"#).unwrap();
        assert!(entry.id.is_none());
        assert_eq!(entry.message, "hello");
    }

    #[test]
    fn test_socket_param_ignores_empty_values() {
        let event: SocketEvent = serde_json::from_value(serde_json::json!({
            "requestContext": {"routeKey": "$connect", "connectionId": "c1"},
            "queryStringParameters": {"executionId": "exec-1", "token": ""}
        }))
        .unwrap();

        assert_eq!(event.param("executionId"), Some("exec-1"));
        assert_eq!(event.param("token"), None);
        assert_eq!(event.param("absent"), None);
    }
}
