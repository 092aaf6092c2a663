//! Event Classifier
//!
//! Resolves an untyped envelope into an [`Event`]. Shapes are tried in a
//! fixed priority order; a shape matches when every one of its
//! discriminating fields is present and non-empty and the envelope
//! deserializes into it. Only when nothing matches is the envelope an error.

use runlet_core::dto::event::Event;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::ProcessorError;

const STATE_CHANGE_FIELDS: &[&str] = &["/detail-type", "/source", "/detail/taskArn"];
const LOG_BATCH_FIELDS: &[&str] = &["/awslogs/data"];
const SCHEDULED_FIELDS: &[&str] = &["/detail-type", "/source"];
const SOCKET_FIELDS: &[&str] = &["/requestContext/connectionId", "/requestContext/routeKey"];

pub fn classify(envelope: &Value) -> Result<Event, ProcessorError> {
    if let Some(event) = try_shape(envelope, STATE_CHANGE_FIELDS, "task state change").matched() {
        return Ok(Event::TaskStateChange(event));
    }
    if let Some(event) = try_shape(envelope, LOG_BATCH_FIELDS, "log batch").matched() {
        return Ok(Event::LogBatch(event));
    }
    if let Some(event) = try_shape(envelope, SCHEDULED_FIELDS, "scheduled trigger").matched() {
        return Ok(Event::Scheduled(event));
    }
    if let Some(event) = try_shape(envelope, SOCKET_FIELDS, "socket message").matched() {
        return Ok(Event::Socket(event));
    }

    Err(ProcessorError::Unrecognized)
}

/// Result of testing an envelope against one shape
#[derive(Debug)]
enum ShapeMatch<T> {
    Matched(T),
    /// A discriminating field is missing or empty
    Absent,
    /// Every discriminator is present but the envelope does not parse
    Malformed(String),
}

impl<T> ShapeMatch<T> {
    fn matched(self) -> Option<T> {
        match self {
            ShapeMatch::Matched(event) => Some(event),
            ShapeMatch::Absent | ShapeMatch::Malformed(_) => None,
        }
    }
}

fn try_shape<T: DeserializeOwned>(envelope: &Value, fields: &[&str], shape: &str) -> ShapeMatch<T> {
    if !fields.iter().all(|pointer| is_present(envelope, pointer)) {
        return ShapeMatch::Absent;
    }

    match serde_json::from_value(envelope.clone()) {
        Ok(event) => ShapeMatch::Matched(event),
        Err(e) => {
            warn!("Envelope has {} fields but does not parse: {}", shape, e);
            ShapeMatch::Malformed(e.to_string())
        }
    }
}

fn is_present(envelope: &Value, pointer: &str) -> bool {
    match envelope.pointer(pointer) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(fields)) => !fields.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classifies_task_state_change() {
        let envelope = json!({
            "detail-type": "Task State Change",
            "source": "fleet.tasks",
            "detail": {"taskArn": "arn:fleet:task/cluster/abc", "lastStatus": "RUNNING"}
        });

        assert!(matches!(
            classify(&envelope).unwrap(),
            Event::TaskStateChange(e) if e.detail.task_arn.ends_with("/abc")
        ));
    }

    #[test]
    fn test_classifies_log_batch() {
        let envelope = json!({"awslogs": {"data": "H4sIAAAA"}});
        assert!(matches!(classify(&envelope).unwrap(), Event::LogBatch(_)));
    }

    #[test]
    fn test_event_without_task_id_falls_through_to_scheduled() {
        let envelope = json!({
            "detail-type": "Scheduled Event",
            "source": "scheduler",
            "detail": {"action": "reconcile"}
        });

        assert!(matches!(
            classify(&envelope).unwrap(),
            Event::Scheduled(e) if e.detail.action.as_deref() == Some("reconcile")
        ));
    }

    #[test]
    fn test_empty_task_id_is_not_a_state_change() {
        let envelope = json!({
            "detail-type": "Task State Change",
            "source": "fleet.tasks",
            "detail": {"taskArn": ""}
        });

        assert!(matches!(classify(&envelope).unwrap(), Event::Scheduled(_)));
    }

    #[test]
    fn test_classifies_socket_message() {
        let envelope = json!({
            "requestContext": {"routeKey": "$connect", "connectionId": "c-1"},
            "queryStringParameters": {"executionId": "exec", "token": "t"}
        });

        assert!(matches!(classify(&envelope).unwrap(), Event::Socket(_)));
    }

    #[test]
    fn test_socket_without_connection_id_is_unrecognized() {
        let envelope = json!({"requestContext": {"routeKey": "$connect", "connectionId": ""}});
        assert!(matches!(
            classify(&envelope),
            Err(ProcessorError::Unrecognized)
        ));
    }

    #[test]
    fn test_unknown_envelope_is_an_error() {
        assert!(matches!(
            classify(&json!({"hello": "world"})),
            Err(ProcessorError::Unrecognized)
        ));
        assert!(matches!(
            classify(&json!(null)),
            Err(ProcessorError::Unrecognized)
        ));
    }

    #[test]
    fn test_log_batch_with_wrong_type_falls_through() {
        // data present but not a string: not a log batch, nothing else matches
        let envelope = json!({"awslogs": {"data": 12}});
        assert!(matches!(
            classify(&envelope),
            Err(ProcessorError::Unrecognized)
        ));
    }

    #[test]
    fn test_malformed_state_change_is_reported_and_falls_through() {
        let envelope = json!({
            "detail-type": "Task State Change",
            "source": "fleet.tasks",
            "detail": {
                "taskArn": "arn:fleet:task/cluster/abc",
                "lastStatus": "STOPPED",
                "containers": [{"exitCode": 0}]
            }
        });

        assert!(matches!(
            try_shape::<runlet_core::dto::event::TaskStateChangeEvent>(
                &envelope,
                STATE_CHANGE_FIELDS,
                "task state change"
            ),
            ShapeMatch::Malformed(reason) if reason.contains("name")
        ));
        assert!(matches!(
            try_shape::<runlet_core::dto::event::TaskStateChangeEvent>(
                &json!({"awslogs": {"data": "x"}}),
                STATE_CHANGE_FIELDS,
                "task state change"
            ),
            ShapeMatch::Absent
        ));
        assert!(matches!(classify(&envelope).unwrap(), Event::Scheduled(_)));
    }
}
