//! Remote task store abstraction.
//!
//! Defines the [`TaskStore`] trait that every document-store adapter must
//! satisfy. Concrete implementations include:
//! - [`memory::InMemoryTaskStore`]: in-process realtime store for tests and
//!   the offline binary
//!
//! The store is the system of record. Adapters speak in store-native
//! [`TaskDocument`]s; normalization to [`Task`](taskboard_proto::task::Task)
//! happens in the sync core, never here.

pub mod memory;

use std::fmt;

use tokio::sync::mpsc;

use taskboard_proto::document::{DocumentPatch, StoredDocument, TaskDocument};
use taskboard_proto::query::QuerySpec;
use taskboard_proto::task::TaskId;

/// Errors reported by the remote store, by originating condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The caller lacks rights for the requested query or write.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The target document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient network or service failure.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Rate or quota limit hit.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Any other store failure.
    #[error("{code}: {message}")]
    Other {
        /// Store-specific error code.
        code: String,
        /// Store-provided message.
        message: String,
    },
}

impl StoreError {
    /// Stable error code, in the store's own vocabulary.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::PermissionDenied(_) => "permission-denied",
            Self::NotFound(_) => "not-found",
            Self::Unavailable(_) => "unavailable",
            Self::ResourceExhausted(_) => "resource-exhausted",
            Self::Other { code, .. } => code,
        }
    }
}

/// Something a store listener delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The complete, ordered result set after a change.
    Snapshot(Vec<StoredDocument>),
    /// The listener failed; no further events follow.
    Error(StoreError),
}

/// Receiving side of a live query.
///
/// Dropping the listener detaches it from the store.
#[derive(Debug)]
pub struct StoreListener {
    events: mpsc::UnboundedReceiver<StoreEvent>,
}

impl StoreListener {
    /// Wraps a channel fed by a store adapter.
    #[must_use]
    pub const fn new(events: mpsc::UnboundedReceiver<StoreEvent>) -> Self {
        Self { events }
    }

    /// Waits for the next event. Returns `None` once the store hangs up.
    pub async fn next(&mut self) -> Option<StoreEvent> {
        self.events.recv().await
    }
}

/// Write operation kinds, used for diagnostics and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// Opening a live query.
    Listen,
    /// Creating a document.
    Create,
    /// Patching a document.
    Update,
    /// Deleting a document.
    Delete,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listen => write!(f, "listen"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Async realtime document store holding the task collection.
///
/// # Invariant
///
/// A listener delivers the full matching result set, ordered by creation
/// time descending, immediately on open and again after every change. Events
/// from one listener arrive in the order the store emitted them.
pub trait TaskStore: Send + Sync {
    /// Opens a live query.
    fn listen(
        &self,
        query: &QuerySpec,
    ) -> impl std::future::Future<Output = Result<StoreListener, StoreError>> + Send;

    /// Creates a document and returns its store-assigned identifier.
    fn create(
        &self,
        doc: TaskDocument,
    ) -> impl std::future::Future<Output = Result<TaskId, StoreError>> + Send;

    /// Applies a partial update to an existing document.
    fn update(
        &self,
        id: &TaskId,
        patch: DocumentPatch,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Deletes a document.
    fn delete(&self, id: &TaskId) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
