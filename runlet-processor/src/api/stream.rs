//! Stream Token Handler

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use runlet_core::domain::connection::Requester;
use runlet_core::dto::message::StreamInfo;
use serde::Deserialize;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::api::events::request_context;

#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    pub user: String,
}

/// POST /executions/{id}/stream
/// Mint a single-use token for following an execution's logs
pub async fn issue_stream_token(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<StreamRequest>,
) -> ApiResult<Json<StreamInfo>> {
    if req.user.trim().is_empty() {
        return Err(ApiError::BadRequest("user is required".to_string()));
    }

    let ctx = request_context(&headers, &state);
    tracing::info!(
        "[{}] Issuing stream token for execution {} to {}",
        ctx.request_id(),
        execution_id,
        req.user
    );

    let requester = Requester {
        user: req.user,
        source_ip: forwarded_for(&headers),
    };

    let info = state
        .processor
        .issue_token(&execution_id, requester, &ctx)
        .await?;

    Ok(Json(info))
}

/// First hop of `x-forwarded-for`, if any
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
