//! Subscriber Delivery Service
//!
//! Admits live connections, replays buffered log events to each connection
//! past its cursor, and tells every connection when its execution is done.

use chrono::Utc;
use futures::future::join_all;
use runlet_core::domain::connection::Connection;
use runlet_core::domain::log::LogEvent;
use runlet_core::dto::message::{DisconnectReason, StreamMessage};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::context::RequestContext;
use crate::error::{DeliveryFailure, ProcessorError};
use crate::outbound::Transport;
use crate::repository::{ConnectionStore, LogStore, TokenStore};

/// Why a connect handshake was refused
///
/// Each variant maps to the status code returned in the handshake's
/// acknowledgement frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectRejection {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Internal(String),
}

impl ConnectRejection {
    pub fn status_code(&self) -> u16 {
        match self {
            ConnectRejection::BadRequest(_) => 400,
            ConnectRejection::Unauthorized(_) => 401,
            ConnectRejection::Forbidden(_) => 403,
            ConnectRejection::Internal(_) => 500,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ConnectRejection::BadRequest(msg)
            | ConnectRejection::Unauthorized(msg)
            | ConnectRejection::Forbidden(msg)
            | ConnectRejection::Internal(msg) => msg,
        }
    }
}

impl std::fmt::Display for ConnectRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status_code(), self.message())
    }
}

/// Outcome of one push across all subscribers of an execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections that received at least one event
    pub delivered: usize,
    /// Connections whose cursor was already at the end of the buffer
    pub up_to_date: usize,
    pub events_sent: usize,
}

pub struct DeliveryService {
    connections: Arc<dyn ConnectionStore>,
    tokens: Arc<dyn TokenStore>,
    logs: Arc<dyn LogStore>,
    transport: Arc<dyn Transport>,
}

impl DeliveryService {
    pub fn new(
        connections: Arc<dyn ConnectionStore>,
        tokens: Arc<dyn TokenStore>,
        logs: Arc<dyn LogStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            connections,
            tokens,
            logs,
            transport,
        }
    }

    // =========================================================================
    // Socket protocol
    // =========================================================================

    /// Admits a connection presenting a single-use token
    ///
    /// The stored requester comes from the token, not from the live request.
    /// The token is discarded once the connection is registered.
    pub async fn connect(
        &self,
        connection_id: &str,
        execution_id: Option<&str>,
        token: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<Connection, ConnectRejection> {
        if connection_id.is_empty() {
            return Err(ConnectRejection::BadRequest(
                "missing connection id".to_string(),
            ));
        }
        let Some(execution_id) = execution_id.filter(|id| !id.is_empty()) else {
            return Err(ConnectRejection::BadRequest(
                "missing execution id".to_string(),
            ));
        };
        let Some(token_value) = token.filter(|t| !t.is_empty()) else {
            return Err(ConnectRejection::Unauthorized("missing token".to_string()));
        };

        let token = match ctx.bound("token lookup", self.tokens.get(token_value)).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                return Err(ConnectRejection::Unauthorized("invalid token".to_string()));
            }
            Err(e) => {
                error!("Token lookup failed for connection {}: {}", connection_id, e);
                return Err(ConnectRejection::Internal(
                    "failed to validate token".to_string(),
                ));
            }
        };

        if token.is_expired(Utc::now()) {
            if let Err(e) = ctx
                .bound("discard token", self.tokens.delete(&token.token))
                .await
            {
                warn!("Failed to discard expired token: {}", e);
            }
            return Err(ConnectRejection::Unauthorized("token expired".to_string()));
        }

        if token.execution_id != execution_id {
            warn!(
                "Connection {} presented a token for execution {} while requesting {}",
                connection_id, token.execution_id, execution_id
            );
            return Err(ConnectRejection::Forbidden(
                "token does not grant access to this execution".to_string(),
            ));
        }

        let connection = Connection::new(connection_id, execution_id, token.requester.clone());

        if let Err(e) = ctx
            .bound("create connection", self.connections.create(&connection))
            .await
        {
            error!("Failed to register connection {}: {}", connection_id, e);
            return Err(ConnectRejection::Internal(
                "failed to register connection".to_string(),
            ));
        }

        if let Err(e) = ctx
            .bound("discard token", self.tokens.delete(&token.token))
            .await
        {
            warn!(
                "Connection {} registered but its token could not be discarded: {}",
                connection_id, e
            );
        }

        info!(
            "Connection {} subscribed to execution {} (user: {})",
            connection_id, execution_id, connection.requester.user
        );

        Ok(connection)
    }

    /// Forgets a connection the client closed
    pub async fn disconnect(
        &self,
        connection_id: &str,
        ctx: &RequestContext,
    ) -> Result<u64, ProcessorError> {
        let removed = ctx
            .bound(
                "delete connection",
                self.connections.delete_many(&[connection_id.to_string()]),
            )
            .await?;

        debug!("Connection {} disconnected ({} removed)", connection_id, removed);
        Ok(removed)
    }

    // =========================================================================
    // Push
    // =========================================================================

    /// Sends every connection of the execution the events it has not seen yet
    ///
    /// Connections are served concurrently and independently. When any of
    /// them fails, the others are still served and the failures are returned
    /// together afterwards.
    pub async fn send_new_logs(
        &self,
        execution_id: &str,
        ctx: &RequestContext,
    ) -> Result<DeliveryReport, ProcessorError> {
        require_execution_id(execution_id)?;

        let connections = ctx
            .bound(
                "list connections",
                self.connections.list_by_execution(execution_id),
            )
            .await?;
        if connections.is_empty() {
            debug!("No connections for execution {}", execution_id);
            return Ok(DeliveryReport::default());
        }

        let events = ctx
            .bound("list log events", self.logs.list(execution_id))
            .await?;
        if events.is_empty() {
            debug!("No buffered events for execution {}", execution_id);
            return Ok(DeliveryReport::default());
        }

        let results = join_all(
            connections
                .iter()
                .map(|connection| self.deliver(connection, &events, ctx)),
        )
        .await;

        let mut report = DeliveryReport::default();
        let mut failures = Vec::new();

        for (connection, result) in connections.iter().zip(results) {
            match result {
                Ok(0) => report.up_to_date += 1,
                Ok(sent) => {
                    report.delivered += 1;
                    report.events_sent += sent;
                }
                Err(e) => failures.push(DeliveryFailure {
                    connection_id: connection.connection_id.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        if !failures.is_empty() {
            warn!(
                "Delivery to {} of {} connections failed for execution {}",
                failures.len(),
                connections.len(),
                execution_id
            );
            return Err(ProcessorError::DeliveryFailed {
                execution_id: execution_id.to_string(),
                failures,
            });
        }

        debug!(
            "Pushed {} events to {} connections of execution {}",
            report.events_sent, report.delivered, execution_id
        );

        Ok(report)
    }

    async fn deliver(
        &self,
        connection: &Connection,
        events: &[LogEvent],
        ctx: &RequestContext,
    ) -> Result<usize, ProcessorError> {
        let pending = select_pending(events, connection.last_event_id.as_deref());
        let Some(last) = pending.last() else {
            return Ok(0);
        };

        let frame = StreamMessage::Logs {
            execution_id: connection.execution_id.clone(),
            events: pending.to_vec(),
        };
        let data = serde_json::to_vec(&frame)?;

        ctx.bound(
            "push logs",
            self.transport.send(&connection.connection_id, data),
        )
        .await?;

        let advanced = ctx
            .bound(
                "advance cursor",
                self.connections
                    .advance_cursor(&connection.connection_id, &last.event_id),
            )
            .await?;
        if !advanced {
            debug!(
                "Cursor of connection {} is already past {}",
                connection.connection_id, last.event_id
            );
        }

        Ok(pending.len())
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Notifies every connection that the execution finished, then drops them
    ///
    /// Returns the number of connection records removed.
    pub async fn broadcast_completion(
        &self,
        execution_id: &str,
        ctx: &RequestContext,
    ) -> Result<u64, ProcessorError> {
        require_execution_id(execution_id)?;

        let connections = ctx
            .bound(
                "list connections",
                self.connections.list_by_execution(execution_id),
            )
            .await?;
        if connections.is_empty() {
            return Ok(0);
        }

        let frame = serde_json::to_vec(&StreamMessage::Disconnect {
            execution_id: execution_id.to_string(),
            reason: DisconnectReason::ExecutionCompleted,
        })?;

        let results = join_all(connections.iter().map(|connection| {
            ctx.bound(
                "push disconnect",
                self.transport.send(&connection.connection_id, frame.clone()),
            )
        }))
        .await;

        for (connection, result) in connections.iter().zip(&results) {
            if let Err(e) = result {
                debug!(
                    "Could not notify connection {} of completion: {}",
                    connection.connection_id, e
                );
            }
        }

        let ids: Vec<String> = connections
            .iter()
            .map(|c| c.connection_id.clone())
            .collect();

        let removed = match ctx
            .bound("delete connections", self.connections.delete_many(&ids))
            .await
        {
            Ok(removed) => removed,
            Err(e) => {
                warn!(
                    "Failed to remove connections of execution {}: {}",
                    execution_id, e
                );
                0
            }
        };

        info!(
            "Execution {} completed: notified {} connections, removed {}",
            execution_id,
            results.iter().filter(|r| r.is_ok()).count(),
            removed
        );

        Ok(removed)
    }
}

/// Events strictly after `cursor` in arrival order
///
/// Without a cursor everything is pending. A cursor that is no longer in the
/// buffer was evicted, so everything left is newer than it.
pub fn select_pending<'a>(events: &'a [LogEvent], cursor: Option<&str>) -> &'a [LogEvent] {
    let Some(cursor) = cursor else {
        return events;
    };

    match events.iter().position(|e| e.event_id == cursor) {
        Some(index) => &events[index + 1..],
        None => events,
    }
}

fn require_execution_id(execution_id: &str) -> Result<(), ProcessorError> {
    if execution_id.is_empty() {
        return Err(ProcessorError::InvalidInput(
            "execution id is required".to_string(),
        ));
    }
    Ok(())
}
