//! Socket gateway management API

use crate::error::{ClientError, Result};
use crate::{handle_empty_response, normalize_base_url};
use reqwest::Client;

/// Client for the gateway that owns the live client sockets
///
/// Frames are posted to `{endpoint}/@connections/{connection_id}`; the gateway
/// relays the body verbatim to the socket.
#[derive(Debug, Clone)]
pub struct ConnectionsClient {
    endpoint: String,
    client: Client,
}

impl ConnectionsClient {
    /// Create a new connections client
    ///
    /// # Arguments
    /// * `endpoint` - The gateway management endpoint (e.g., "https://gw.example.com/prod")
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(endpoint, Client::new())
    }

    /// Create a connections client with a custom HTTP client
    pub fn with_client(endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            endpoint: normalize_base_url(endpoint),
            client,
        }
    }

    fn connection_url(&self, connection_id: &str) -> String {
        format!("{}/@connections/{}", self.endpoint, connection_id)
    }

    /// Push one frame to a connection
    pub async fn post_to_connection(&self, connection_id: &str, data: Vec<u8>) -> Result<()> {
        let response = self
            .client
            .post(self.connection_url(connection_id))
            .body(data)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::GONE {
            return Err(ClientError::Gone(connection_id.to_string()));
        }

        handle_empty_response(response).await
    }
}
