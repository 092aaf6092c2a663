//! In-memory collaborators
//!
//! Implementations of every store and outbound trait backed by process
//! memory. They honour the same contracts as the production adapters and can
//! be switched into a failing mode to exercise error propagation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runlet_core::domain::connection::{Connection, ConnectionToken};
use runlet_core::domain::execution::Execution;
use runlet_core::domain::log::LogEvent;
use runlet_core::dto::message::StreamMessage;
use runlet_core::dto::reconcile::ReconcileReport;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::error::{ReconcileError, StoreError, TransportError};
use crate::outbound::{Reconciler, Transport};
use crate::repository::{ConnectionStore, ExecutionStore, LogStore, TokenStore};

/// Failure switch shared by the in-memory doubles
#[derive(Debug, Default)]
struct FailSwitch(AtomicBool);

impl FailSwitch {
    fn set(&self, failing: bool) {
        self.0.store(failing, Ordering::SeqCst);
    }

    fn check(&self, what: &str) -> Result<(), StoreError> {
        if self.0.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{} store is failing", what)));
        }
        Ok(())
    }
}

// =============================================================================
// Executions
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    records: Mutex<HashMap<String, Execution>>,
    fail: FailSwitch,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record, as the submission path would
    pub async fn insert(&self, execution: Execution) {
        self.records
            .lock()
            .await
            .insert(execution.id.clone(), execution);
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.set(failing);
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn get(&self, id: &str) -> Result<Option<Execution>, StoreError> {
        self.fail.check("execution")?;
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn update(&self, execution: &Execution) -> Result<bool, StoreError> {
        self.fail.check("execution")?;
        let mut records = self.records.lock().await;
        match records.get(&execution.id) {
            Some(stored) if stored.is_terminal() => Ok(false),
            Some(_) => {
                records.insert(execution.id.clone(), execution.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// =============================================================================
// Log buffer
// =============================================================================

/// Buffered events tagged with their arrival sequence
#[derive(Debug, Default)]
struct Buffers {
    next_seq: u64,
    by_execution: HashMap<String, Vec<(u64, LogEvent)>>,
}

#[derive(Debug)]
pub struct InMemoryLogStore {
    buffers: Mutex<Buffers>,
    capacity: usize,
    saves: AtomicUsize,
    fail: FailSwitch,
}

impl InMemoryLogStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(Buffers::default()),
            capacity,
            saves: AtomicUsize::new(0),
            fail: FailSwitch::default(),
        }
    }

    /// Arrival sequence of a buffered event
    pub async fn position(&self, execution_id: &str, event_id: &str) -> Option<u64> {
        self.buffers
            .lock()
            .await
            .by_execution
            .get(execution_id)?
            .iter()
            .find(|(_, e)| e.event_id == event_id)
            .map(|(seq, _)| *seq)
    }

    /// Number of `save` calls received, including failed ones
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.set(failing);
    }
}

impl Default for InMemoryLogStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn save(&self, execution_id: &str, events: &[LogEvent]) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.fail.check("log")?;

        let mut buffers = self.buffers.lock().await;
        let Buffers {
            next_seq,
            by_execution,
        } = &mut *buffers;
        let buffer = by_execution.entry(execution_id.to_string()).or_default();
        for event in events {
            if !buffer.iter().any(|(_, e)| e.event_id == event.event_id) {
                *next_seq += 1;
                buffer.push((*next_seq, event.clone()));
            }
        }
        if buffer.len() > self.capacity {
            let excess = buffer.len() - self.capacity;
            buffer.drain(..excess);
        }
        Ok(())
    }

    async fn list(&self, execution_id: &str) -> Result<Vec<LogEvent>, StoreError> {
        self.fail.check("log")?;
        Ok(self
            .buffers
            .lock()
            .await
            .by_execution
            .get(execution_id)
            .map(|buffer| buffer.iter().map(|(_, e)| e.clone()).collect())
            .unwrap_or_default())
    }

    async fn delete(&self, execution_id: &str) -> Result<u64, StoreError> {
        self.fail.check("log")?;
        Ok(self
            .buffers
            .lock()
            .await
            .by_execution
            .remove(execution_id)
            .map(|buffer| buffer.len() as u64)
            .unwrap_or(0))
    }

    async fn buffered_executions(&self) -> Result<Vec<String>, StoreError> {
        self.fail.check("log")?;
        let mut ids: Vec<String> = self
            .buffers
            .lock()
            .await
            .by_execution
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }
}

// =============================================================================
// Connections
// =============================================================================

/// Cursor ordering is resolved against the log buffer it shares
#[derive(Debug)]
pub struct InMemoryConnectionStore {
    // Vec keeps registration order stable for fan-out assertions
    connections: Mutex<Vec<Connection>>,
    logs: Arc<InMemoryLogStore>,
    fail: FailSwitch,
}

impl InMemoryConnectionStore {
    pub fn new(logs: Arc<InMemoryLogStore>) -> Self {
        Self {
            connections: Mutex::new(Vec::new()),
            logs,
            fail: FailSwitch::default(),
        }
    }

    pub async fn get(&self, connection_id: &str) -> Option<Connection> {
        self.connections
            .lock()
            .await
            .iter()
            .find(|c| c.connection_id == connection_id)
            .cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.set(failing);
    }
}

#[async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn create(&self, connection: &Connection) -> Result<(), StoreError> {
        self.fail.check("connection")?;
        let mut connections = self.connections.lock().await;
        if connections
            .iter()
            .any(|c| c.connection_id == connection.connection_id)
        {
            return Err(StoreError::Unavailable(format!(
                "connection {} already exists",
                connection.connection_id
            )));
        }
        connections.push(connection.clone());
        Ok(())
    }

    async fn list_by_execution(&self, execution_id: &str) -> Result<Vec<Connection>, StoreError> {
        self.fail.check("connection")?;
        Ok(self
            .connections
            .lock()
            .await
            .iter()
            .filter(|c| c.execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn delete_many(&self, connection_ids: &[String]) -> Result<u64, StoreError> {
        self.fail.check("connection")?;
        let mut connections = self.connections.lock().await;
        let before = connections.len();
        connections.retain(|c| !connection_ids.contains(&c.connection_id));
        Ok((before - connections.len()) as u64)
    }

    async fn advance_cursor(&self, connection_id: &str, event_id: &str) -> Result<bool, StoreError> {
        self.fail.check("connection")?;
        let mut connections = self.connections.lock().await;
        let Some(connection) = connections
            .iter_mut()
            .find(|c| c.connection_id == connection_id)
        else {
            return Ok(false);
        };

        let Some(target) = self.logs.position(&connection.execution_id, event_id).await else {
            return Ok(false);
        };
        let current = match connection.last_event_id.as_deref() {
            Some(cursor) => self.logs.position(&connection.execution_id, cursor).await,
            None => None,
        };

        // An evicted cursor is older than anything still buffered
        if current.is_some_and(|seq| seq >= target) {
            return Ok(false);
        }
        connection.last_event_id = Some(event_id.to_string());
        Ok(true)
    }
}

// =============================================================================
// Tokens
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<HashMap<String, ConnectionToken>>,
    fail: FailSwitch,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.lock().await.is_empty()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.set(failing);
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn create(&self, token: &ConnectionToken) -> Result<(), StoreError> {
        self.fail.check("token")?;
        self.tokens
            .lock()
            .await
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<ConnectionToken>, StoreError> {
        self.fail.check("token")?;
        Ok(self.tokens.lock().await.get(token).cloned())
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        self.fail.check("token")?;
        self.tokens.lock().await.remove(token);
        Ok(())
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.fail.check("token")?;
        let mut tokens = self.tokens.lock().await;
        let before = tokens.len();
        tokens.retain(|_, t| !t.is_expired(now));
        Ok((before - tokens.len()) as u64)
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Records every frame pushed; selected connections can be made to fail
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send to `connection_id` fail as if the socket were gone
    pub async fn fail_for(&self, connection_id: &str) {
        self.failing.lock().await.insert(connection_id.to_string());
    }

    /// Decoded frames delivered to one connection, in send order
    pub async fn frames_for(&self, connection_id: &str) -> Vec<StreamMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(id, _)| id == connection_id)
            .filter_map(|(_, data)| serde_json::from_slice(data).ok())
            .collect()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, connection_id: &str, data: Vec<u8>) -> Result<(), TransportError> {
        if self.failing.lock().await.contains(connection_id) {
            return Err(TransportError::Gone(connection_id.to_string()));
        }
        self.sent
            .lock()
            .await
            .push((connection_id.to_string(), data));
        Ok(())
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Returns a fixed report and counts invocations
#[derive(Debug, Default)]
pub struct StaticReconciler {
    report: ReconcileReport,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl StaticReconciler {
    pub fn new(report: ReconcileReport) -> Self {
        Self {
            report,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Reconciler for StaticReconciler {
    async fn reconcile(&self) -> Result<ReconcileReport, ReconcileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ReconcileError("reconciler unavailable".to_string()));
        }
        Ok(self.report.clone())
    }
}
