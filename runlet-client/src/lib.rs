//! Runlet HTTP Clients
//!
//! Type-safe HTTP clients for the services the execution processor calls out to:
//!
//! - [`ConnectionsClient`]: the socket gateway's management API, used to push
//!   frames to (and drop) live client connections
//! - [`ReconcilerClient`]: the health reconciliation service invoked by the
//!   scheduled trigger
//!
//! # Example
//!
//! ```no_run
//! use runlet_client::ConnectionsClient;
//!
//! #[tokio::main]
//! async fn main() -> runlet_client::Result<()> {
//!     let client = ConnectionsClient::new("https://gateway.example.com/prod");
//!     client.post_to_connection("conn-123", br#"{"type":"logs"}"#.to_vec()).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
mod connections;
mod reconciler;

pub use connections::ConnectionsClient;
pub use error::{ClientError, Result};
pub use reconciler::ReconcilerClient;

use serde::de::DeserializeOwned;

/// Builds a reqwest client with a per-request timeout
pub fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(ClientError::RequestFailed)
}

fn normalize_base_url(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}

// =============================================================================
// Response Handlers
// =============================================================================

/// Handle an API response and deserialize JSON
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Handle an API response that returns no content
async fn handle_empty_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    Ok(())
}
