//! Subscription handles and the store-to-subscriber forwarder.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use taskboard_proto::query::TaskQuery;
use taskboard_proto::task::Task;

use super::{SnapshotSource, SyncState, TaskListSnapshot};
use crate::clock::Clock;
use crate::store::{StoreEvent, StoreListener};

/// Cancellable stream of task-list snapshots.
///
/// Dropping the handle unsubscribes.
pub struct TaskSubscription {
    rx: mpsc::UnboundedReceiver<TaskListSnapshot>,
    generation: u64,
    shared: Arc<Mutex<SyncState>>,
    closed: bool,
}

impl TaskSubscription {
    pub(super) const fn new(
        rx: mpsc::UnboundedReceiver<TaskListSnapshot>,
        generation: u64,
        shared: Arc<Mutex<SyncState>>,
    ) -> Self {
        Self {
            rx,
            generation,
            shared,
            closed: false,
        }
    }

    /// Waits for the next snapshot.
    ///
    /// Returns `None` once unsubscribed, superseded by a newer subscription,
    /// or after the single snapshot of a no-access session.
    pub async fn recv(&mut self) -> Option<TaskListSnapshot> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    /// Returns an already-delivered snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<TaskListSnapshot> {
        if self.closed {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Whether this is still the instance's live subscription.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.closed && self.shared.lock().current(self.generation).is_some()
    }

    /// Stops delivery and detaches from the store.
    ///
    /// Safe to call more than once. No snapshot is delivered after it returns.
    pub fn unsubscribe(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rx.close();
        self.shared.lock().detach(self.generation);
        tracing::debug!(generation = self.generation, "unsubscribed");
    }
}

impl Stream for TaskSubscription {
    type Item = TaskListSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.closed {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl Drop for TaskSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Applies store events for subscription `generation` until it is replaced.
pub(super) async fn forward(
    mut listener: StoreListener,
    shared: Arc<Mutex<SyncState>>,
    clock: Arc<dyn Clock>,
    generation: u64,
    scope: TaskQuery,
) {
    while let Some(event) = listener.next().await {
        match event {
            StoreEvent::Snapshot(docs) => {
                let now = clock.now_ms();
                let tasks: Vec<Task> = docs.iter().map(|d| d.normalize(now)).collect();
                let mut state = shared.lock();
                if state.current(generation).is_none() {
                    return;
                }
                tracing::debug!(generation, tasks = tasks.len(), "applying store snapshot");
                state.cache.replace(scope.clone(), tasks, now);
                state.publish(SnapshotSource::Store);
            }
            StoreEvent::Error(e) => {
                tracing::warn!(generation, error = %e, code = e.code(), "task subscription failed");
                fall_back(&shared.lock(), generation, &scope);
                return;
            }
        }
    }
    tracing::debug!(generation, "store listener closed");
}

/// Serves the cached list for `scope`, or an empty one, after a store failure.
pub(super) fn fall_back(state: &SyncState, generation: u64, scope: &TaskQuery) {
    let Some(active) = state.current(generation) else {
        return;
    };
    let snapshot = if state.cache.serves(scope) {
        tracing::info!(generation, tasks = state.cache.len(), "falling back to cached tasks");
        state.snapshot(SnapshotSource::Fallback)
    } else {
        TaskListSnapshot::empty(SnapshotSource::Fallback)
    };
    let _ = active.tx.send(snapshot);
}
