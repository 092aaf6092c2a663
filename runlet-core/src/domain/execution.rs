//! Execution domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exit code recorded when a user stops an execution
pub const EXIT_CODE_USER_STOPPED: i32 = 130;

/// Exit code recorded when no container exit code is available
pub const EXIT_CODE_UNKNOWN_FAILURE: i32 = 1;

/// One submitted job and its tracked lifecycle state
///
/// The record is created by the submission path when the task is launched on
/// the fleet. The processor only ever mutates it through the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub command: String,
    pub user: String,
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub modified_by_request: Option<String>,
}

impl Execution {
    /// Creates a freshly submitted execution in the `Starting` state
    pub fn new(id: impl Into<String>, command: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            user: user.into(),
            status: ExecutionStatus::Starting,
            exit_code: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            modified_by_request: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Execution lifecycle status
///
/// `Starting -> Running -> {Succeeded, Failed, Stopped}`. The three right-hand
/// states are terminal and have no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Starting,
    Running,
    Succeeded,
    Failed,
    Stopped,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Stopped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Starting => "STARTING",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Succeeded => "SUCCEEDED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Stopped => "STOPPED",
        }
    }

    /// Parses the stored representation, returning `None` for unknown values
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STARTING" => Some(ExecutionStatus::Starting),
            "RUNNING" => Some(ExecutionStatus::Running),
            "SUCCEEDED" => Some(ExecutionStatus::Succeeded),
            "FAILED" => Some(ExecutionStatus::Failed),
            "STOPPED" => Some(ExecutionStatus::Stopped),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!ExecutionStatus::Starting.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Succeeded.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Stopped.is_terminal());
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            ExecutionStatus::Starting,
            ExecutionStatus::Running,
            ExecutionStatus::Succeeded,
            ExecutionStatus::Failed,
            ExecutionStatus::Stopped,
        ] {
            assert_eq!(ExecutionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ExecutionStatus::parse("Queued"), None);
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&ExecutionStatus::Succeeded).unwrap();
        assert_eq!(json, "\"SUCCEEDED\"");
    }

    #[test]
    fn test_new_execution_is_starting() {
        let execution = Execution::new("abc", "echo hi", "alice");
        assert_eq!(execution.status, ExecutionStatus::Starting);
        assert!(execution.exit_code.is_none());
        assert!(!execution.is_terminal());
    }
}
