//! Event Processor
//!
//! Single entry point for every inbound envelope. The envelope is classified
//! once at the boundary and dispatched to the owning service.

use runlet_core::domain::connection::Requester;
use runlet_core::dto::event::{Event, ROUTE_CONNECT, ROUTE_DEFAULT, ROUTE_DISCONNECT, SocketEvent};
use runlet_core::dto::message::{HandlerResponse, StreamInfo};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::RequestContext;
use crate::error::ProcessorError;
use crate::outbound::{Reconciler, Transport};
use crate::repository::{ConnectionStore, ExecutionStore, LogStore, TokenStore};
use crate::service::classifier::classify;
use crate::service::ingest::IngestOutcome;
use crate::service::{
    DeliveryService, ExecutionService, IngestService, ReconcileService, TokenService,
};

/// External capabilities the processor depends on
#[derive(Clone)]
pub struct Collaborators {
    pub executions: Arc<dyn ExecutionStore>,
    pub logs: Arc<dyn LogStore>,
    pub connections: Arc<dyn ConnectionStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub transport: Arc<dyn Transport>,
    pub reconciler: Arc<dyn Reconciler>,
}

pub struct Processor {
    executions: ExecutionService,
    ingest: IngestService,
    delivery: Arc<DeliveryService>,
    reconcile: ReconcileService,
    tokens: TokenService,
}

impl Processor {
    pub fn new(collaborators: Collaborators, config: &Config) -> Self {
        let Collaborators {
            executions,
            logs,
            connections,
            tokens,
            transport,
            reconciler,
        } = collaborators;

        let delivery = Arc::new(DeliveryService::new(
            connections,
            tokens.clone(),
            logs.clone(),
            transport,
        ));

        Self {
            executions: ExecutionService::new(
                executions.clone(),
                logs.clone(),
                delivery.clone(),
                config.runner_container_name.clone(),
            ),
            ingest: IngestService::new(
                logs.clone(),
                delivery.clone(),
                config.log_stream_prefix.clone(),
            ),
            delivery,
            reconcile: ReconcileService::new(
                reconciler,
                tokens.clone(),
                executions.clone(),
                logs,
            ),
            tokens: TokenService::new(
                executions,
                tokens,
                config.token_ttl,
                config.stream_base_url.clone(),
            ),
        }
    }

    /// Processes one raw envelope
    ///
    /// Events that are understood but out of scope are acknowledged with a
    /// 200 response. Collaborator failures surface as errors so the caller
    /// can redeliver.
    pub async fn handle(
        &self,
        envelope: &Value,
        ctx: &RequestContext,
    ) -> Result<HandlerResponse, ProcessorError> {
        let event = classify(envelope)?;
        debug!("[{}] Classified {} event", ctx.request_id(), event.kind());

        match event {
            Event::TaskStateChange(change) => {
                let outcome = self.executions.handle_state_change(&change, ctx).await?;
                Ok(HandlerResponse::ok(format!("{:?}", outcome)))
            }
            Event::LogBatch(batch) => match self.ingest.ingest(&batch, ctx).await? {
                IngestOutcome::Stored { execution_id, events } => Ok(HandlerResponse::ok(
                    format!("stored {} events for {}", events, execution_id),
                )),
                IngestOutcome::Skipped(reason) => Ok(HandlerResponse::ok(reason)),
            },
            Event::Scheduled(scheduled) => {
                match self.reconcile.handle_scheduled(&scheduled, ctx).await? {
                    Some(report) => Ok(HandlerResponse::ok(serde_json::to_string(&report)?)),
                    None => Ok(HandlerResponse::ok("no action")),
                }
            }
            Event::Socket(socket) => self.handle_socket(&socket, ctx).await,
        }
    }

    async fn handle_socket(
        &self,
        event: &SocketEvent,
        ctx: &RequestContext,
    ) -> Result<HandlerResponse, ProcessorError> {
        let connection_id = event.request_context.connection_id.as_str();
        let socket_ctx;
        let ctx = match event.request_context.request_id.as_deref() {
            Some(request_id) if !request_id.is_empty() => {
                socket_ctx = ctx.with_request_id(request_id);
                &socket_ctx
            }
            _ => ctx,
        };

        match event.request_context.route_key.as_str() {
            ROUTE_CONNECT => {
                let result = self
                    .delivery
                    .connect(
                        connection_id,
                        event.param("executionId"),
                        event.param("token"),
                        ctx,
                    )
                    .await;

                Ok(match result {
                    Ok(connection) => HandlerResponse::ok(format!(
                        "connected to {}",
                        connection.execution_id
                    )),
                    Err(rejection) => {
                        info!(
                            "[{}] Rejected connect of {} from {}: {}",
                            ctx.request_id(),
                            connection_id,
                            event
                                .request_context
                                .identity
                                .as_ref()
                                .and_then(|identity| identity.source_ip.as_deref())
                                .unwrap_or("unknown address"),
                            rejection
                        );
                        HandlerResponse::new(rejection.status_code(), rejection.message())
                    }
                })
            }
            ROUTE_DISCONNECT => {
                match self.delivery.disconnect(connection_id, ctx).await {
                    Ok(removed) => debug!(
                        "[{}] Removed {} subscriber record(s) for {}",
                        ctx.request_id(),
                        removed,
                        connection_id
                    ),
                    Err(e) => warn!(
                        "[{}] Failed to remove subscriber {}: {}",
                        ctx.request_id(),
                        connection_id,
                        e
                    ),
                }
                Ok(HandlerResponse::ok("disconnected"))
            }
            ROUTE_DEFAULT => {
                debug!(
                    "[{}] Ignoring message on {} from {}",
                    ctx.request_id(),
                    ROUTE_DEFAULT,
                    connection_id
                );
                Ok(HandlerResponse::ok("ok"))
            }
            other => {
                info!(
                    "[{}] Acknowledging unsupported socket route {}",
                    ctx.request_id(),
                    other
                );
                Ok(HandlerResponse::ok("unsupported route"))
            }
        }
    }

    /// Mints a stream token for a running execution
    pub async fn issue_token(
        &self,
        execution_id: &str,
        requester: Requester,
        ctx: &RequestContext,
    ) -> Result<StreamInfo, ProcessorError> {
        self.tokens.issue(execution_id, requester, ctx).await
    }
}
