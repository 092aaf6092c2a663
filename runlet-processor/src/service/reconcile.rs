//! Scheduled Reconciliation
//!
//! Housekeeping run on a schedule: health reconciliation in the external
//! service, then pruning of expired connection tokens and of log buffers
//! left behind by executions that already finished.

use chrono::Utc;
use runlet_core::dto::event::{SCHEDULED_ACTION_RECONCILE, ScheduledEvent};
use runlet_core::dto::reconcile::ReconcileReport;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::RequestContext;
use crate::error::ProcessorError;
use crate::outbound::Reconciler;
use crate::repository::{ExecutionStore, LogStore, TokenStore};

pub struct ReconcileService {
    reconciler: Arc<dyn Reconciler>,
    tokens: Arc<dyn TokenStore>,
    executions: Arc<dyn ExecutionStore>,
    logs: Arc<dyn LogStore>,
}

impl ReconcileService {
    pub fn new(
        reconciler: Arc<dyn Reconciler>,
        tokens: Arc<dyn TokenStore>,
        executions: Arc<dyn ExecutionStore>,
        logs: Arc<dyn LogStore>,
    ) -> Self {
        Self {
            reconciler,
            tokens,
            executions,
            logs,
        }
    }

    /// Runs the action named by the trigger
    ///
    /// Returns `None` when the trigger carries no action.
    pub async fn handle_scheduled(
        &self,
        event: &ScheduledEvent,
        ctx: &RequestContext,
    ) -> Result<Option<ReconcileReport>, ProcessorError> {
        let action = match event.detail.action.as_deref() {
            None => {
                debug!(
                    "Scheduled event {:?} from {} carries no action",
                    event.detail_type, event.source
                );
                return Ok(None);
            }
            Some(action) => action,
        };

        if action != SCHEDULED_ACTION_RECONCILE {
            return Err(ProcessorError::UnknownScheduledAction(action.to_string()));
        }

        let report = ctx
            .bound("reconcile", self.reconciler.reconcile())
            .await?;

        info!(
            "Reconciliation checked {} executions, repaired {}",
            report.checked, report.repaired
        );
        for error in &report.errors {
            warn!("Reconciliation error: {}", error);
        }

        match ctx
            .bound("prune tokens", self.tokens.prune_expired(Utc::now()))
            .await
        {
            Ok(0) => {}
            Ok(pruned) => debug!("Pruned {} expired connection tokens", pruned),
            Err(e) => warn!("Failed to prune expired tokens: {}", e),
        }

        match self.prune_finished_buffers(ctx).await {
            Ok(0) => {}
            Ok(pruned) => info!("Dropped {} stale log events of finished executions", pruned),
            Err(e) => warn!("Failed to prune log buffers: {}", e),
        }

        Ok(Some(report))
    }

    /// Drops buffers refilled by log batches that arrived after their
    /// execution's terminal transition
    ///
    /// Buffers of executions without a record are left alone.
    pub async fn prune_finished_buffers(&self, ctx: &RequestContext) -> Result<u64, ProcessorError> {
        let buffered = ctx
            .bound("list buffered executions", self.logs.buffered_executions())
            .await?;

        let mut pruned = 0;
        for execution_id in buffered {
            let finished = ctx
                .bound("load execution", self.executions.get(&execution_id))
                .await?
                .is_some_and(|execution| execution.is_terminal());
            if !finished {
                continue;
            }

            let removed = ctx
                .bound("delete log buffer", self.logs.delete(&execution_id))
                .await?;
            debug!(
                "Dropped {} buffered log events of finished execution {}",
                removed, execution_id
            );
            pruned += removed;
        }

        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        InMemoryExecutionStore, InMemoryLogStore, InMemoryTokenStore, StaticReconciler,
    };
    use chrono::Duration;
    use runlet_core::domain::connection::{ConnectionToken, Requester};
    use runlet_core::domain::execution::{Execution, ExecutionStatus};
    use runlet_core::domain::log::LogEvent;
    use runlet_core::dto::event::ScheduledDetail;

    fn scheduled(action: Option<&str>) -> ScheduledEvent {
        ScheduledEvent {
            detail_type: "Scheduled Event".to_string(),
            source: "scheduler".to_string(),
            detail: ScheduledDetail {
                action: action.map(str::to_string),
            },
        }
    }

    struct Fixture {
        reconciler: Arc<StaticReconciler>,
        tokens: Arc<InMemoryTokenStore>,
        executions: Arc<InMemoryExecutionStore>,
        logs: Arc<InMemoryLogStore>,
        service: ReconcileService,
    }

    fn fixture() -> Fixture {
        let reconciler = Arc::new(StaticReconciler::new(ReconcileReport {
            checked: 12,
            repaired: 1,
            errors: vec!["exec-9: task missing".to_string()],
        }));
        let tokens = Arc::new(InMemoryTokenStore::new());
        let executions = Arc::new(InMemoryExecutionStore::new());
        let logs = Arc::new(InMemoryLogStore::default());
        let service = ReconcileService::new(
            reconciler.clone(),
            tokens.clone(),
            executions.clone(),
            logs.clone(),
        );
        Fixture {
            reconciler,
            tokens,
            executions,
            logs,
            service,
        }
    }

    fn setup() -> (Arc<StaticReconciler>, Arc<InMemoryTokenStore>, ReconcileService) {
        let f = fixture();
        (f.reconciler, f.tokens, f.service)
    }

    async fn buffer_line(logs: &InMemoryLogStore, execution_id: &str) {
        logs.save(
            execution_id,
            &[LogEvent {
                event_id: format!("{}-late", execution_id),
                timestamp: 1,
                message: "late line".to_string(),
            }],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_action_invokes_reconciler() {
        let (reconciler, _, service) = setup();
        let ctx = RequestContext::new("req");

        let report = service
            .handle_scheduled(&scheduled(Some("reconcile")), &ctx)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.checked, 12);
        assert_eq!(reconciler.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_action_is_ignored() {
        let (reconciler, _, service) = setup();
        let ctx = RequestContext::new("req");

        let report = service
            .handle_scheduled(&scheduled(None), &ctx)
            .await
            .unwrap();

        assert!(report.is_none());
        assert_eq!(reconciler.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_action_is_an_error() {
        let (reconciler, _, service) = setup();
        let ctx = RequestContext::new("req");

        let result = service
            .handle_scheduled(&scheduled(Some("vacuum")), &ctx)
            .await;

        assert!(matches!(
            result,
            Err(ProcessorError::UnknownScheduledAction(action)) if action == "vacuum"
        ));
        assert_eq!(reconciler.calls(), 0);
    }

    #[tokio::test]
    async fn test_reconciler_failure_propagates() {
        let (reconciler, _, service) = setup();
        reconciler.set_failing(true);
        let ctx = RequestContext::new("req");

        assert!(matches!(
            service
                .handle_scheduled(&scheduled(Some("reconcile")), &ctx)
                .await,
            Err(ProcessorError::Reconcile(_))
        ));
    }

    #[tokio::test]
    async fn test_reconcile_prunes_expired_tokens() {
        let (_, tokens, service) = setup();
        let now = Utc::now();
        for (value, ttl) in [("stale", Duration::seconds(-5)), ("live", Duration::minutes(5))] {
            tokens
                .create(&ConnectionToken {
                    token: value.to_string(),
                    execution_id: "exec".to_string(),
                    requester: Requester::default(),
                    expires_at: now + ttl,
                    created_at: now,
                })
                .await
                .unwrap();
        }

        service
            .handle_scheduled(&scheduled(Some("reconcile")), &RequestContext::new("req"))
            .await
            .unwrap();

        assert!(tokens.get("stale").await.unwrap().is_none());
        assert!(tokens.get("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reconcile_drops_buffers_of_finished_executions() {
        let f = fixture();
        for (id, status) in [
            ("done", ExecutionStatus::Succeeded),
            ("live", ExecutionStatus::Running),
        ] {
            let mut execution = Execution::new(id, "make", "alice");
            execution.status = status;
            f.executions.insert(execution).await;
            buffer_line(&f.logs, id).await;
        }
        buffer_line(&f.logs, "unknown").await;

        f.service
            .handle_scheduled(&scheduled(Some("reconcile")), &RequestContext::new("req"))
            .await
            .unwrap();

        assert!(f.logs.list("done").await.unwrap().is_empty());
        assert_eq!(f.logs.list("live").await.unwrap().len(), 1);
        assert_eq!(f.logs.list("unknown").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_buffer_pruning_failure_does_not_fail_reconcile() {
        let f = fixture();
        f.logs.set_failing(true);

        let report = f
            .service
            .handle_scheduled(&scheduled(Some("reconcile")), &RequestContext::new("req"))
            .await
            .unwrap();

        assert!(report.is_some());
        assert!(matches!(
            f.service.prune_finished_buffers(&RequestContext::new("req")).await,
            Err(ProcessorError::Store(_))
        ));
    }
}
