//! API Module
//!
//! HTTP ingress for the processor.
//! Each submodule handles endpoints for a specific concern.

pub mod error;
pub mod events;
pub mod health;
pub mod stream;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::processor::Processor;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<Processor>,
    pub config: Arc<Config>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Event ingress
        .route("/events", post(events::handle_event))
        // Stream tokens
        .route("/executions/{id}/stream", post(stream::issue_stream_token))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
