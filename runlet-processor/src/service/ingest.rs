//! Log Ingestion Service
//!
//! Turns compressed log subscription batches into buffered [`LogEvent`]s and
//! pushes them to live connections.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::GzDecoder;
use runlet_core::domain::log::LogEvent;
use runlet_core::dto::event::{LOG_MESSAGE_DATA, LogBatch, LogSubscriptionEvent, RawLogEntry};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::error::ProcessorError;
use crate::repository::LogStore;
use crate::service::delivery::DeliveryService;

/// Components that write to an execution's log streams
const STREAM_COMPONENTS: &[&str] = &["runner", "sidecar"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { execution_id: String, events: usize },
    /// Nothing persisted; the reason is logged
    Skipped(&'static str),
}

pub struct IngestService {
    logs: Arc<dyn LogStore>,
    delivery: Arc<DeliveryService>,
    stream_prefix: String,
}

impl IngestService {
    /// `stream_prefix` is the first segment of `<prefix>/<component>/<execution>`
    pub fn new(
        logs: Arc<dyn LogStore>,
        delivery: Arc<DeliveryService>,
        stream_prefix: impl Into<String>,
    ) -> Self {
        Self {
            logs,
            delivery,
            stream_prefix: stream_prefix.into(),
        }
    }

    pub async fn ingest(
        &self,
        event: &LogSubscriptionEvent,
        ctx: &RequestContext,
    ) -> Result<IngestOutcome, ProcessorError> {
        let batch = match decode_batch(&event.awslogs.data) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Discarding undecodable log batch: {}", e);
                return Ok(IngestOutcome::Skipped("undecodable payload"));
            }
        };

        if batch.message_type != LOG_MESSAGE_DATA {
            debug!("Acknowledging {} log batch", batch.message_type);
            return Ok(IngestOutcome::Skipped("control message"));
        }

        let Some(execution_id) = parse_log_stream(&batch.log_stream, &self.stream_prefix) else {
            warn!(
                "Log stream {:?} in group {:?} does not belong to an execution",
                batch.log_stream, batch.log_group
            );
            return Ok(IngestOutcome::Skipped("foreign log stream"));
        };

        let events: Vec<LogEvent> = batch.log_events.into_iter().map(to_log_event).collect();

        ctx.bound("save log events", self.logs.save(execution_id, &events))
            .await?;

        debug!(
            "Buffered {} log events for execution {}",
            events.len(),
            execution_id
        );

        // Events are durable at this point; a failed push is retried by the next batch
        if let Err(e) = self.delivery.send_new_logs(execution_id, ctx).await {
            warn!(
                "Failed to push new logs for execution {}: {}",
                execution_id, e
            );
        }

        Ok(IngestOutcome::Stored {
            execution_id: execution_id.to_string(),
            events: events.len(),
        })
    }
}

/// base64 → gzip → JSON
pub fn decode_batch(data: &str) -> Result<LogBatch, String> {
    let compressed = STANDARD
        .decode(data.trim())
        .map_err(|e| format!("invalid base64: {}", e))?;

    let mut json = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut json)
        .map_err(|e| format!("invalid gzip: {}", e))?;

    serde_json::from_slice(&json).map_err(|e| format!("invalid log batch: {}", e))
}

/// Execution ID from a `<prefix>/<runner|sidecar>/<execution>` stream name
pub fn parse_log_stream<'a>(log_stream: &'a str, prefix: &str) -> Option<&'a str> {
    let mut parts = log_stream.splitn(3, '/');
    let (Some(head), Some(component), Some(execution_id)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    if head != prefix || !STREAM_COMPONENTS.contains(&component) {
        return None;
    }
    if execution_id.is_empty() || execution_id.contains('/') {
        return None;
    }

    Some(execution_id)
}

/// Stable ID for a line delivered without one
pub fn derive_event_id(timestamp: i64, message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(timestamp.to_be_bytes());
    hasher.update(message.as_bytes());
    hex::encode(hasher.finalize())
}

fn to_log_event(entry: RawLogEntry) -> LogEvent {
    let event_id = match entry.id {
        Some(id) if !id.is_empty() => id,
        _ => derive_event_id(entry.timestamp, &entry.message),
    };

    LogEvent {
        event_id,
        timestamp: entry.timestamp,
        message: entry.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        InMemoryConnectionStore, InMemoryLogStore, InMemoryTokenStore, RecordingTransport,
    };
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use runlet_core::domain::connection::{Connection, Requester};
    use runlet_core::dto::event::EncodedLogData;
    use runlet_core::dto::message::StreamMessage;
    use serde_json::json;
    use std::io::Write;

    use crate::repository::ConnectionStore;

    struct Fixture {
        logs: Arc<InMemoryLogStore>,
        connections: Arc<InMemoryConnectionStore>,
        transport: Arc<RecordingTransport>,
        service: IngestService,
    }

    fn fixture() -> Fixture {
        let logs = Arc::new(InMemoryLogStore::default());
        let connections = Arc::new(InMemoryConnectionStore::new(logs.clone()));
        let transport = Arc::new(RecordingTransport::new());
        let delivery = Arc::new(DeliveryService::new(
            connections.clone(),
            Arc::new(InMemoryTokenStore::new()),
            logs.clone(),
            transport.clone(),
        ));
        let service = IngestService::new(logs.clone(), delivery, "task");
        Fixture {
            logs,
            connections,
            transport,
            service,
        }
    }

    fn encode(batch: serde_json::Value) -> LogSubscriptionEvent {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(serde_json::to_vec(&batch).unwrap().as_slice())
            .unwrap();
        let compressed = encoder.finish().unwrap();

        LogSubscriptionEvent {
            awslogs: EncodedLogData {
                data: STANDARD.encode(compressed),
            },
        }
    }

    fn batch(stream: &str, events: serde_json::Value) -> LogSubscriptionEvent {
        encode(json!({
            "messageType": "DATA_MESSAGE",
            "logGroup": "/runlet/executions",
            "logStream": stream,
            "logEvents": events
        }))
    }

    fn ctx() -> RequestContext {
        RequestContext::new("req-logs")
    }

    #[test]
    fn test_parse_log_stream() {
        assert_eq!(parse_log_stream("task/runner/exec-1", "task"), Some("exec-1"));
        assert_eq!(parse_log_stream("task/sidecar/exec-1", "task"), Some("exec-1"));
        assert_eq!(parse_log_stream("task/runner/", "task"), None);
        assert_eq!(parse_log_stream("task/builder/exec-1", "task"), None);
        assert_eq!(parse_log_stream("other/runner/exec-1", "task"), None);
        assert_eq!(parse_log_stream("task/runner", "task"), None);
        assert_eq!(parse_log_stream("task/runner/a/b", "task"), None);
        assert_eq!(parse_log_stream("", "task"), None);
    }

    #[test]
    fn test_derived_ids_are_stable() {
        let first = derive_event_id(1_714_557_600_000, "hello");
        assert_eq!(first, derive_event_id(1_714_557_600_000, "hello"));
        assert_ne!(first, derive_event_id(1_714_557_600_001, "hello"));
        assert_ne!(first, derive_event_id(1_714_557_600_000, "hello!"));
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_supplied_ids_are_kept() {
        let event = to_log_event(RawLogEntry {
            id: Some("upstream-1".to_string()),
            timestamp: 5,
            message: "m".to_string(),
        });
        assert_eq!(event.event_id, "upstream-1");

        let event = to_log_event(RawLogEntry {
            id: Some(String::new()),
            timestamp: 5,
            message: "m".to_string(),
        });
        assert_eq!(event.event_id, derive_event_id(5, "m"));
    }

    #[test]
    fn test_decode_batch_round_trip() {
        let event = batch("task/runner/exec-1", json!([{"timestamp": 1, "message": "a"}]));
        let decoded = decode_batch(&event.awslogs.data).unwrap();
        assert_eq!(decoded.log_stream, "task/runner/exec-1");
        assert_eq!(decoded.log_events.len(), 1);

        assert!(decode_batch("not base64!").is_err());
        assert!(decode_batch(&STANDARD.encode(b"not gzip")).is_err());
    }

    #[tokio::test]
    async fn test_ingest_buffers_and_pushes() {
        let f = fixture();
        f.connections
            .create(&Connection::new("conn", "exec-1", Requester::default()))
            .await
            .unwrap();

        let outcome = f
            .service
            .ingest(
                &batch(
                    "task/runner/exec-1",
                    json!([
                        {"id": "u-1", "timestamp": 1, "message": "first"},
                        {"timestamp": 2, "message": "second"}
                    ]),
                ),
                &ctx(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            IngestOutcome::Stored {
                execution_id: "exec-1".to_string(),
                events: 2
            }
        );

        let buffered = f.logs.list("exec-1").await.unwrap();
        assert_eq!(buffered[0].event_id, "u-1");
        assert_eq!(buffered[1].event_id, derive_event_id(2, "second"));

        match &f.transport.frames_for("conn").await[..] {
            [StreamMessage::Logs { events, .. }] => assert_eq!(events.len(), 2),
            other => panic!("unexpected frames {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_redelivered_batch_collapses() {
        let f = fixture();
        let event = batch(
            "task/sidecar/exec-1",
            json!([{"timestamp": 7, "message": "same line"}]),
        );

        f.service.ingest(&event, &ctx()).await.unwrap();
        f.service.ingest(&event, &ctx()).await.unwrap();

        assert_eq!(f.logs.list("exec-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_still_saved() {
        let f = fixture();

        let outcome = f
            .service
            .ingest(&batch("task/runner/exec-1", json!([])), &ctx())
            .await
            .unwrap();

        assert!(matches!(outcome, IngestOutcome::Stored { events: 0, .. }));
        assert_eq!(f.logs.save_count(), 1);
    }

    #[tokio::test]
    async fn test_stream_without_execution_id_is_skipped() {
        let f = fixture();

        let outcome = f
            .service
            .ingest(
                &batch("task/runner/", json!([{"timestamp": 1, "message": "x"}])),
                &ctx(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, IngestOutcome::Skipped("foreign log stream"));
        assert_eq!(f.logs.save_count(), 0);
    }

    #[tokio::test]
    async fn test_control_and_garbage_batches_are_acknowledged() {
        let f = fixture();

        let control = encode(json!({
            "messageType": "CONTROL_MESSAGE",
            "logGroup": "",
            "logStream": "",
            "logEvents": [{"id": "", "timestamp": 0, "message": "CWL CONTROL MESSAGE"}]
        }));
        assert_eq!(
            f.service.ingest(&control, &ctx()).await.unwrap(),
            IngestOutcome::Skipped("control message")
        );

        let garbage = LogSubscriptionEvent {
            awslogs: EncodedLogData {
                data: "%%%".to_string(),
            },
        };
        assert_eq!(
            f.service.ingest(&garbage, &ctx()).await.unwrap(),
            IngestOutcome::Skipped("undecodable payload")
        );

        assert_eq!(f.logs.save_count(), 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_propagates() {
        let f = fixture();
        f.logs.set_failing(true);

        let result = f
            .service
            .ingest(
                &batch("task/runner/exec-1", json!([{"timestamp": 1, "message": "x"}])),
                &ctx(),
            )
            .await;

        assert!(matches!(result, Err(ProcessorError::Store(_))));
    }

    #[tokio::test]
    async fn test_push_failure_does_not_fail_ingestion() {
        let f = fixture();
        f.connections
            .create(&Connection::new("dead", "exec-1", Requester::default()))
            .await
            .unwrap();
        f.transport.fail_for("dead").await;

        let outcome = f
            .service
            .ingest(
                &batch("task/runner/exec-1", json!([{"timestamp": 1, "message": "x"}])),
                &ctx(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, IngestOutcome::Stored { events: 1, .. }));
        assert_eq!(f.logs.list("exec-1").await.unwrap().len(), 1);
    }
}
