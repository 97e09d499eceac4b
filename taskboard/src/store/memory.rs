//! In-process realtime task store.
//!
//! [`InMemoryTaskStore`] behaves like a hosted document store as far as the
//! sync core can tell: live queries push full ordered snapshots, server
//! timestamps are assigned on write, and errors arrive on the listener. It
//! also exposes hooks for tests: failure injection, a write gate to hold
//! writes in flight, and a log of every query opened.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc};

use taskboard_proto::document::{DocumentPatch, StoredDocument, TaskDocument};
use taskboard_proto::query::QuerySpec;
use taskboard_proto::task::TaskId;

use super::{StoreError, StoreEvent, StoreListener, StoreOp, TaskStore};
use crate::clock::Clock;

/// A live query registered with the store.
struct Listener {
    spec: QuerySpec,
    tx: mpsc::UnboundedSender<StoreEvent>,
}

#[derive(Default)]
struct StoreState {
    docs: Vec<StoredDocument>,
    next_id: u64,
    listeners: Vec<Listener>,
    queries: Vec<QuerySpec>,
    failures: VecDeque<(StoreOp, StoreError)>,
    latency_compensation: bool,
}

impl StoreState {
    fn matching(&self, spec: &QuerySpec) -> Vec<StoredDocument> {
        let mut docs: Vec<StoredDocument> = self
            .docs
            .iter()
            .filter(|d| spec.matches(&d.data))
            .cloned()
            .collect();
        docs.sort_by_key(|d| std::cmp::Reverse(d.data.created_at_sort_key()));
        docs
    }

    fn broadcast(&mut self) {
        self.listeners.retain(|l| !l.tx.is_closed());
        for listener in &self.listeners {
            let snapshot = self.matching(&listener.spec);
            let _ = listener.tx.send(StoreEvent::Snapshot(snapshot));
        }
    }

    fn take_failure(&mut self, op: StoreOp) -> Option<StoreError> {
        let pos = self.failures.iter().position(|(o, _)| *o == op)?;
        self.failures.remove(pos).map(|(_, err)| err)
    }

    fn mint_id(&mut self) -> TaskId {
        self.next_id += 1;
        TaskId::new(format!("doc-{:06}", self.next_id))
    }

    fn position(&self, id: &TaskId) -> Option<usize> {
        self.docs.iter().position(|d| d.id == *id)
    }
}

/// Holds every store write until dropped or released.
pub struct WriteGate(OwnedRwLockWriteGuard<()>);

impl WriteGate {
    /// Lets held writes proceed.
    pub fn release(self) {
        drop(self);
    }
}

/// In-memory realtime document store.
pub struct InMemoryTaskStore {
    state: Mutex<StoreState>,
    clock: Arc<dyn Clock>,
    gate: Arc<RwLock<()>>,
}

impl InMemoryTaskStore {
    /// Creates an empty store whose server timestamps come from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            clock,
            gate: Arc::new(RwLock::new(())),
        }
    }

    /// When enabled, each write is first pushed with its server timestamps
    /// still pending, then pushed again once they are resolved.
    #[must_use]
    pub fn with_latency_compensation(self, enabled: bool) -> Self {
        self.state.lock().latency_compensation = enabled;
        self
    }

    /// Inserts a document directly, bypassing failure injection and the write gate.
    pub fn insert_document(&self, mut doc: TaskDocument) -> TaskId {
        doc.resolve_pending(self.clock.now_ms());
        let mut state = self.state.lock();
        let id = state.mint_id();
        state.docs.push(StoredDocument {
            id: id.clone(),
            data: doc,
        });
        state.broadcast();
        id
    }

    /// Makes the next `op` fail with `err`.
    pub fn fail_next(&self, op: StoreOp, err: StoreError) {
        self.state.lock().failures.push_back((op, err));
    }

    /// Fails every open listener with `err` and detaches them.
    pub fn emit_error(&self, err: &StoreError) {
        let mut state = self.state.lock();
        for listener in state.listeners.drain(..) {
            let _ = listener.tx.send(StoreEvent::Error(err.clone()));
        }
    }

    /// Holds all subsequent writes until the returned gate is released.
    pub async fn pause_writes(&self) -> WriteGate {
        WriteGate(Arc::clone(&self.gate).write_owned().await)
    }

    /// Every query opened so far, in order.
    #[must_use]
    pub fn issued_queries(&self) -> Vec<QuerySpec> {
        self.state.lock().queries.clone()
    }

    /// Number of listeners still attached.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let mut state = self.state.lock();
        state.listeners.retain(|l| !l.tx.is_closed());
        state.listeners.len()
    }

    /// Current contents of a document.
    #[must_use]
    pub fn document(&self, id: &TaskId) -> Option<TaskDocument> {
        let state = self.state.lock();
        state.position(id).map(|pos| state.docs[pos].data.clone())
    }

    /// Number of documents held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().docs.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn commit(&self, state: &mut StoreState, pos: usize) {
        if state.latency_compensation {
            state.broadcast();
        }
        state.docs[pos].data.resolve_pending(self.clock.now_ms());
        state.broadcast();
    }
}

impl TaskStore for InMemoryTaskStore {
    async fn listen(&self, query: &QuerySpec) -> Result<StoreListener, StoreError> {
        let mut state = self.state.lock();
        state.queries.push(query.clone());
        if let Some(err) = state.take_failure(StoreOp::Listen) {
            return Err(err);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(StoreEvent::Snapshot(state.matching(query)));
        state.listeners.push(Listener {
            spec: query.clone(),
            tx,
        });
        drop(state);
        tracing::debug!(query = %query, "listener attached");
        Ok(StoreListener::new(rx))
    }

    async fn create(&self, doc: TaskDocument) -> Result<TaskId, StoreError> {
        let _held = self.gate.read().await;
        let mut state = self.state.lock();
        if let Some(err) = state.take_failure(StoreOp::Create) {
            return Err(err);
        }
        let id = state.mint_id();
        state.docs.push(StoredDocument {
            id: id.clone(),
            data: doc,
        });
        let pos = state.docs.len() - 1;
        self.commit(&mut state, pos);
        Ok(id)
    }

    async fn update(&self, id: &TaskId, patch: DocumentPatch) -> Result<(), StoreError> {
        let _held = self.gate.read().await;
        let mut state = self.state.lock();
        if let Some(err) = state.take_failure(StoreOp::Update) {
            return Err(err);
        }
        let pos = state
            .position(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        state.docs[pos].data.apply(&patch);
        self.commit(&mut state, pos);
        Ok(())
    }

    async fn delete(&self, id: &TaskId) -> Result<(), StoreError> {
        let _held = self.gate.read().await;
        let mut state = self.state.lock();
        if let Some(err) = state.take_failure(StoreOp::Delete) {
            return Err(err);
        }
        let pos = state
            .position(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        state.docs.remove(pos);
        state.broadcast();
        Ok(())
    }
}
