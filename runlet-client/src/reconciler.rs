//! Health reconciliation service

use crate::error::Result;
use crate::{handle_response, normalize_base_url};
use reqwest::Client;
use runlet_core::dto::reconcile::ReconcileReport;

/// Client for the service that reconciles execution records against the fleet
#[derive(Debug, Clone)]
pub struct ReconcilerClient {
    base_url: String,
    client: Client,
}

impl ReconcilerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run one reconciliation pass
    ///
    /// # Returns
    /// The service's report of what it inspected and repaired
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let url = format!("{}/reconcile", self.base_url);
        let response = self.client.post(&url).send().await?;

        handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconciler_base_url() {
        let client = ReconcilerClient::new("http://health:9000/");
        assert_eq!(client.base_url(), "http://health:9000");
    }
}
