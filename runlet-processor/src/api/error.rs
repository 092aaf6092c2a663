//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::ProcessorError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Timeout(String),
    ProcessingError(ProcessorError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Timeout(msg) => {
                tracing::error!("Deadline exceeded: {}", msg);
                (StatusCode::GATEWAY_TIMEOUT, msg)
            }
            ApiError::ProcessingError(err) => {
                tracing::error!("Processing error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<ProcessorError> for ApiError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::ExecutionNotFound(_) => ApiError::NotFound(err.to_string()),
            ProcessorError::ExecutionFinished(_) => ApiError::Conflict(err.to_string()),
            ProcessorError::InvalidInput(_) => ApiError::BadRequest(err.to_string()),
            ProcessorError::DeadlineExceeded(_) => ApiError::Timeout(err.to_string()),
            other => ApiError::ProcessingError(other),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn status_of(err: ProcessorError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_processor_error_status_mapping() {
        assert_eq!(
            status_of(ProcessorError::ExecutionNotFound("e".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ProcessorError::ExecutionFinished("e".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ProcessorError::DeadlineExceeded("load execution")),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(ProcessorError::Unrecognized),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ProcessorError::Store(StoreError::Unavailable(
                "down".into()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
