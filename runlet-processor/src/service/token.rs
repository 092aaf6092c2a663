//! Connection Token Service
//!
//! Mints the single-use tokens a client presents when it opens a log stream.

use chrono::Utc;
use runlet_core::domain::connection::{ConnectionToken, Requester};
use runlet_core::dto::message::StreamInfo;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::ProcessorError;
use crate::repository::{ExecutionStore, TokenStore};

pub struct TokenService {
    executions: Arc<dyn ExecutionStore>,
    tokens: Arc<dyn TokenStore>,
    ttl: Duration,
    stream_base_url: String,
}

impl TokenService {
    pub fn new(
        executions: Arc<dyn ExecutionStore>,
        tokens: Arc<dyn TokenStore>,
        ttl: Duration,
        stream_base_url: impl Into<String>,
    ) -> Self {
        Self {
            executions,
            tokens,
            ttl,
            stream_base_url: stream_base_url.into(),
        }
    }

    /// Issues a token for streaming an execution that is still producing output
    pub async fn issue(
        &self,
        execution_id: &str,
        requester: Requester,
        ctx: &RequestContext,
    ) -> Result<StreamInfo, ProcessorError> {
        if execution_id.is_empty() {
            return Err(ProcessorError::InvalidInput(
                "execution id is required".to_string(),
            ));
        }

        let execution = ctx
            .bound("load execution", self.executions.get(execution_id))
            .await?
            .ok_or_else(|| ProcessorError::ExecutionNotFound(execution_id.to_string()))?;

        if execution.is_terminal() {
            return Err(ProcessorError::ExecutionFinished(execution_id.to_string()));
        }

        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| ProcessorError::InvalidInput(format!("token ttl out of range: {}", e)))?;
        let now = Utc::now();
        let token = ConnectionToken {
            token: Uuid::new_v4().to_string(),
            execution_id: execution_id.to_string(),
            requester,
            expires_at: now + ttl,
            created_at: now,
        };

        let url = Url::parse_with_params(
            &self.stream_base_url,
            &[("executionId", execution_id), ("token", token.token.as_str())],
        )
        .map_err(|e| ProcessorError::InvalidInput(format!("invalid stream base url: {}", e)))?;

        ctx.bound("create token", self.tokens.create(&token))
            .await?;

        info!(
            "Issued stream token for execution {} to {}",
            execution_id, token.requester.user
        );

        Ok(StreamInfo {
            execution_id: execution_id.to_string(),
            url: url.into(),
            token: token.token,
            expires_at: token.expires_at,
        })
    }
}
