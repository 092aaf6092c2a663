//! Outbound collaborators
//!
//! The push transport and the reconciliation service, as traits the core
//! depends on, plus their adapters over the HTTP clients in `runlet-client`.

use async_trait::async_trait;
use runlet_client::{ClientError, ConnectionsClient, ReconcilerClient};
use runlet_core::dto::reconcile::ReconcileReport;

use crate::error::{ReconcileError, TransportError};

/// One-way push of a frame to a single live connection
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, connection_id: &str, data: Vec<u8>) -> Result<(), TransportError>;
}

/// External health reconciliation, invoked by the scheduled trigger
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(&self) -> Result<ReconcileReport, ReconcileError>;
}

#[async_trait]
impl Transport for ConnectionsClient {
    async fn send(&self, connection_id: &str, data: Vec<u8>) -> Result<(), TransportError> {
        self.post_to_connection(connection_id, data)
            .await
            .map_err(|e| transport_error(connection_id, e))
    }
}

#[async_trait]
impl Reconciler for ReconcilerClient {
    async fn reconcile(&self) -> Result<ReconcileReport, ReconcileError> {
        ReconcilerClient::reconcile(self)
            .await
            .map_err(|e| ReconcileError(e.to_string()))
    }
}

fn transport_error(connection_id: &str, err: ClientError) -> TransportError {
    if err.is_gone() {
        TransportError::Gone(connection_id.to_string())
    } else {
        TransportError::Failed {
            connection_id: connection_id.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gone_connections_map_to_gone() {
        let err = transport_error("c1", ClientError::api_error(410, "gone"));
        assert!(matches!(err, TransportError::Gone(id) if id == "c1"));

        let err = transport_error("c2", ClientError::api_error(502, "bad gateway"));
        assert!(matches!(err, TransportError::Failed { connection_id, .. } if connection_id == "c2"));
    }
}
