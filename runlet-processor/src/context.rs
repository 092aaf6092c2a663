//! Per-invocation request context
//!
//! Every inbound event is handled under one [`RequestContext`]. It carries the
//! request identifier stamped on mutated executions and the invocation
//! deadline that bounds every collaborator call made on the event's behalf.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::ProcessorError;

#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Context without a deadline
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            deadline: None,
        }
    }

    /// Context whose deadline is `timeout` from now
    pub fn with_timeout(request_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            request_id: request_id.into(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Same deadline under the identifier the event source assigned
    pub fn with_request_id(&self, request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            deadline: self.deadline,
        }
    }

    /// Runs one collaborator call, failing fast once the deadline has passed
    ///
    /// `operation` names the call in the resulting error.
    pub async fn bound<T, E, F>(&self, operation: &'static str, fut: F) -> Result<T, ProcessorError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ProcessorError>,
    {
        match self.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(ProcessorError::DeadlineExceeded(operation)),
            },
            None => fut.await.map_err(Into::into),
        }
    }
}
