//! Execution State Service
//!
//! Applies fleet task notifications to execution records.
//!
//! `STARTING -> RUNNING -> {SUCCEEDED, FAILED, STOPPED}`. Every transition is
//! decided against the record as freshly read from the store, so duplicate
//! and out-of-order notifications turn into no-ops instead of races.

use chrono::{DateTime, Utc};
use runlet_core::domain::execution::{
    EXIT_CODE_UNKNOWN_FAILURE, EXIT_CODE_USER_STOPPED, Execution, ExecutionStatus,
};
use runlet_core::dto::event::{
    STOP_CODE_FAILED_TO_START, STOP_CODE_USER_INITIATED, TASK_STATE_CHANGE, TASK_STATUS_RUNNING,
    TASK_STATUS_STOPPED, TaskDetail, TaskStateChangeEvent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::RequestContext;
use crate::error::ProcessorError;
use crate::repository::{ExecutionStore, LogStore};
use crate::service::delivery::DeliveryService;

/// What a notification did to its execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The record moved to this status
    Applied(ExecutionStatus),
    /// Already in the requested state
    Unchanged,
    /// Illegal from the current state; left untouched
    Skipped,
    /// No execution record exists for the task
    Orphaned,
    /// Notification type or task status the processor does not act on
    Ignored,
}

pub struct ExecutionService {
    executions: Arc<dyn ExecutionStore>,
    logs: Arc<dyn LogStore>,
    delivery: Arc<DeliveryService>,
    runner_container: String,
}

impl ExecutionService {
    /// `runner_container` names the container whose exit code decides the result
    pub fn new(
        executions: Arc<dyn ExecutionStore>,
        logs: Arc<dyn LogStore>,
        delivery: Arc<DeliveryService>,
        runner_container: impl Into<String>,
    ) -> Self {
        Self {
            executions,
            logs,
            delivery,
            runner_container: runner_container.into(),
        }
    }

    pub async fn handle_state_change(
        &self,
        event: &TaskStateChangeEvent,
        ctx: &RequestContext,
    ) -> Result<TransitionOutcome, ProcessorError> {
        if event.detail_type != TASK_STATE_CHANGE {
            info!(
                "Ignoring unsupported infrastructure event type {:?}",
                event.detail_type
            );
            return Ok(TransitionOutcome::Ignored);
        }

        let detail = &event.detail;
        let execution_id = execution_id_from_task(&detail.task_arn);
        if execution_id.is_empty() {
            warn!("Task id {:?} has no trailing segment", detail.task_arn);
            return Ok(TransitionOutcome::Ignored);
        }

        match detail.last_status.as_str() {
            TASK_STATUS_RUNNING => self.apply_running(execution_id, detail, ctx).await,
            TASK_STATUS_STOPPED => self.apply_stopped(execution_id, detail, ctx).await,
            other => {
                debug!(
                    "Ignoring task status {:?} for execution {}",
                    other, execution_id
                );
                Ok(TransitionOutcome::Ignored)
            }
        }
    }

    async fn apply_running(
        &self,
        execution_id: &str,
        detail: &TaskDetail,
        ctx: &RequestContext,
    ) -> Result<TransitionOutcome, ProcessorError> {
        let Some(mut execution) = self.load(execution_id, ctx).await? else {
            return Ok(TransitionOutcome::Orphaned);
        };

        if execution.status == ExecutionStatus::Running {
            debug!("Execution {} already running", execution_id);
            return Ok(TransitionOutcome::Unchanged);
        }
        if !is_legal_transition(execution.status, ExecutionStatus::Running) {
            warn!(
                "Skipping RUNNING notification for execution {} in state {}",
                execution_id, execution.status
            );
            return Ok(TransitionOutcome::Skipped);
        }

        execution.status = ExecutionStatus::Running;
        execution.completed_at = None;
        if detail.started_at.is_some() {
            execution.started_at = detail.started_at;
        }

        self.persist(execution, ctx).await
    }

    async fn apply_stopped(
        &self,
        execution_id: &str,
        detail: &TaskDetail,
        ctx: &RequestContext,
    ) -> Result<TransitionOutcome, ProcessorError> {
        let Some(mut execution) = self.load(execution_id, ctx).await? else {
            return Ok(TransitionOutcome::Orphaned);
        };

        let (status, exit_code) = derive_result(detail, &self.runner_container);

        if !is_legal_transition(execution.status, status) {
            warn!(
                "Skipping STOPPED notification for execution {} already in state {}",
                execution_id, execution.status
            );
            return Ok(TransitionOutcome::Skipped);
        }

        let completed_at = detail.stopped_at.unwrap_or_else(Utc::now);
        let started_at = detail.started_at.or(execution.started_at);

        execution.status = status;
        execution.exit_code = Some(exit_code);
        execution.started_at = started_at;
        execution.completed_at = Some(completed_at);
        execution.duration_seconds = started_at.map(|started| {
            if completed_at < started {
                warn!(
                    "Execution {} completed before it started ({} < {}); recording zero duration",
                    execution_id, completed_at, started
                );
            }
            duration_seconds(started, completed_at)
        });

        if let Some(reason) = &detail.stopped_reason {
            debug!("Execution {} stopped: {}", execution_id, reason);
        }

        self.persist(execution, ctx).await
    }

    async fn load(
        &self,
        execution_id: &str,
        ctx: &RequestContext,
    ) -> Result<Option<Execution>, ProcessorError> {
        let execution = ctx
            .bound("load execution", self.executions.get(execution_id))
            .await?;

        if execution.is_none() {
            info!(
                "No execution record for task {}; acknowledging orphaned notification",
                execution_id
            );
        }

        Ok(execution)
    }

    async fn persist(
        &self,
        mut execution: Execution,
        ctx: &RequestContext,
    ) -> Result<TransitionOutcome, ProcessorError> {
        execution.modified_by_request = Some(ctx.request_id().to_string());

        let applied = ctx
            .bound("update execution", self.executions.update(&execution))
            .await?;
        if !applied {
            warn!(
                "Execution {} settled concurrently; {} not applied",
                execution.id, execution.status
            );
            return Ok(TransitionOutcome::Skipped);
        }

        info!(
            "Execution {} is now {} (exit code: {:?})",
            execution.id, execution.status, execution.exit_code
        );

        if execution.is_terminal() {
            self.finish(&execution.id, ctx).await?;
        }

        Ok(TransitionOutcome::Applied(execution.status))
    }

    /// Closes out a terminal execution: notify subscribers, then drop the buffer
    async fn finish(&self, execution_id: &str, ctx: &RequestContext) -> Result<(), ProcessorError> {
        let broadcast = self.delivery.broadcast_completion(execution_id, ctx).await;

        let deleted = ctx
            .bound("delete log buffer", self.logs.delete(execution_id))
            .await;

        broadcast?;
        let deleted = deleted?;
        debug!(
            "Dropped {} buffered log events for execution {}",
            deleted, execution_id
        );

        Ok(())
    }
}

/// The execution ID is the trailing path segment of the fleet task ID
pub fn execution_id_from_task(task_arn: &str) -> &str {
    task_arn.rsplit('/').next().unwrap_or_default()
}

/// Final status and exit code for a stopped task
pub fn derive_result(detail: &TaskDetail, runner_container: &str) -> (ExecutionStatus, i32) {
    match detail.stop_code.as_deref() {
        Some(STOP_CODE_USER_INITIATED) => (ExecutionStatus::Stopped, EXIT_CODE_USER_STOPPED),
        Some(STOP_CODE_FAILED_TO_START) => (ExecutionStatus::Failed, EXIT_CODE_UNKNOWN_FAILURE),
        _ => match detail.container_exit_code(runner_container) {
            Some(0) => (ExecutionStatus::Succeeded, 0),
            Some(code) => (ExecutionStatus::Failed, code),
            None => (ExecutionStatus::Failed, EXIT_CODE_UNKNOWN_FAILURE),
        },
    }
}

/// Whole seconds between start and completion, never negative
pub fn duration_seconds(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> i64 {
    (completed_at - started_at).num_seconds().max(0)
}

/// Legal transitions; anything not listed is refused
pub fn is_legal_transition(from: ExecutionStatus, to: ExecutionStatus) -> bool {
    use ExecutionStatus::*;

    match (from, to) {
        (Starting, Running) => true,
        (Starting | Running, Succeeded | Failed | Stopped) => true,
        _ => false,
    }
}
