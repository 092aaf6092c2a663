//! Event Ingress Handler
//!
//! Accepts raw envelopes from the event router and runs them through the
//! processor under the configured invocation deadline.

use axum::{Json, extract::State, http::HeaderMap};
use runlet_core::dto::message::HandlerResponse;
use serde_json::Value;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::context::RequestContext;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Builds the context for one request, reusing the caller's id when present
pub fn request_context(headers: &HeaderMap, state: &AppState) -> RequestContext {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    RequestContext::with_timeout(request_id, state.config.invocation_timeout)
}

/// POST /events
/// Process a single event envelope
pub async fn handle_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(envelope): Json<Value>,
) -> ApiResult<Json<HandlerResponse>> {
    let ctx = request_context(&headers, &state);
    tracing::debug!("[{}] Received event", ctx.request_id());

    let response = state.processor.handle(&envelope, &ctx).await?;

    Ok(Json(response))
}
