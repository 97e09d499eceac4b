//! Role-scoped task synchronization.
//!
//! [`TaskSync`] mediates between callers and the remote [`TaskStore`]:
//!
//! - [`TaskSync::subscribe`] opens the single role-scoped live query and
//!   streams normalized [`TaskListSnapshot`]s.
//! - [`TaskSync::create_task`], [`TaskSync::update_task`] and
//!   [`TaskSync::delete_task`] apply their change to the local cache first
//!   and roll it back if the store rejects it.
//!
//! The cache is owned by the `TaskSync` instance. Each store push replaces
//! it wholesale; optimistic entries never survive a snapshot.

pub mod cache;
pub mod mutation;
mod subscription;

pub use subscription::TaskSubscription;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use taskboard_proto::codec::CachedTaskList;
use taskboard_proto::document::{Creator, DocumentPatch, TaskDocument};
use taskboard_proto::query::TaskQuery;
use taskboard_proto::session::{Role, Session};
use taskboard_proto::task::{NewTask, Task, TaskId, TaskPatch, ValidationError};

use crate::clock::Clock;
use crate::reminders::assignment::AssignmentNotifier;
use crate::reminders::{NotificationService, ReminderHandle, ReminderScheduler};
use crate::store::{StoreError, TaskStore};
use cache::TaskCache;
use mutation::Mutation;

/// Mutation kinds, used to tag errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `create_task`
    Create,
    /// `update_task`
    Update,
    /// `delete_task`
    Delete,
}

impl Operation {
    const fn verb(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Errors surfaced by sync-core mutations.
///
/// Every error is returned after the cache has been rolled back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The caller lacks rights for the mutation. Not retryable.
    #[error("{op} rejected: permission denied")]
    PermissionDenied {
        /// Failed operation.
        op: Operation,
    },

    /// The target task no longer exists.
    #[error("{op} failed: task {id} not found")]
    NotFound {
        /// Failed operation.
        op: Operation,
        /// Missing task.
        id: TaskId,
    },

    /// Transient store failure. Retryable.
    #[error("{op} failed: store unavailable")]
    Unavailable {
        /// Failed operation.
        op: Operation,
    },

    /// Rate or quota limit. Retryable after backoff.
    #[error("{op} failed: quota exhausted")]
    ResourceExhausted {
        /// Failed operation.
        op: Operation,
    },

    /// Anything else, with the store's message.
    #[error("{op} failed: {message}")]
    Unknown {
        /// Failed operation.
        op: Operation,
        /// Diagnostic message from the store.
        message: String,
    },

    /// Input rejected before reaching the store.
    #[error("invalid task: {0}")]
    Invalid(#[from] ValidationError),
}

impl SyncError {
    fn from_store(op: Operation, id: &TaskId, err: StoreError) -> Self {
        match err {
            StoreError::PermissionDenied(_) => Self::PermissionDenied { op },
            StoreError::NotFound(_) => Self::NotFound { op, id: id.clone() },
            StoreError::Unavailable(_) => Self::Unavailable { op },
            StoreError::ResourceExhausted(_) => Self::ResourceExhausted { op },
            other @ StoreError::Other { .. } => Self::Unknown {
                op,
                message: other.to_string(),
            },
        }
    }

    /// The operation that failed, if the store was reached.
    #[must_use]
    pub const fn operation(&self) -> Option<Operation> {
        match self {
            Self::PermissionDenied { op }
            | Self::NotFound { op, .. }
            | Self::Unavailable { op }
            | Self::ResourceExhausted { op }
            | Self::Unknown { op, .. } => Some(*op),
            Self::Invalid(_) => None,
        }
    }

    /// Whether repeating the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::ResourceExhausted { .. })
    }

    /// Message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied { op } => {
                format!("You don't have permission to {} tasks.", op.verb())
            }
            Self::NotFound {
                op: Operation::Delete,
                ..
            } => "The task was already removed.".to_string(),
            Self::NotFound { .. } => "The task no longer exists.".to_string(),
            Self::Unavailable { op } => format!(
                "Couldn't {} the task: the service is unavailable. Check your connection and try again.",
                op.verb()
            ),
            Self::ResourceExhausted { op } => format!(
                "Too many requests while trying to {} the task. Wait a moment and try again.",
                op.verb()
            ),
            Self::Unknown { op, message } => {
                format!("Couldn't {} the task: {message}", op.verb())
            }
            Self::Invalid(e) => format!("The task is not valid: {e}."),
        }
    }
}

/// Result of a delete the store did not reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The store removed the task.
    Deleted,
    /// The task was already gone.
    AlreadyRemoved,
}

/// Where a snapshot's contents came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    /// A fresh push from the store.
    Store,
    /// The cache, shown while the store round-trip is in flight.
    Cache,
    /// The cache (or nothing) after the store failed.
    Fallback,
    /// The cache after a local optimistic change.
    Optimistic,
    /// The session has no access to any task.
    NoAccess,
}

/// A complete task list delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskListSnapshot {
    /// Tasks, newest first.
    pub tasks: Vec<Task>,
    /// Tasks carrying unconfirmed local changes.
    pub pending: Vec<TaskId>,
    /// Origin of the list.
    pub source: SnapshotSource,
}

impl TaskListSnapshot {
    fn empty(source: SnapshotSource) -> Self {
        Self {
            tasks: Vec::new(),
            pending: Vec::new(),
            source,
        }
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Sync-core settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Maximum cache age that may be shown before the store answers.
    pub cache_freshness: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_freshness: Duration::from_secs(30),
        }
    }
}

/// The one live subscription a `TaskSync` may hold.
struct ActiveSubscription {
    generation: u64,
    scope: TaskQuery,
    tx: mpsc::UnboundedSender<TaskListSnapshot>,
    forwarder: Option<JoinHandle<()>>,
}

impl ActiveSubscription {
    fn shutdown(self) {
        if let Some(forwarder) = self.forwarder {
            forwarder.abort();
        }
        tracing::debug!(generation = self.generation, "task subscription torn down");
    }
}

/// State shared between the `TaskSync` handle, its forwarder task, and
/// subscription handles.
#[derive(Default)]
struct SyncState {
    cache: TaskCache,
    active: Option<ActiveSubscription>,
    next_generation: u64,
}

impl SyncState {
    fn snapshot(&self, source: SnapshotSource) -> TaskListSnapshot {
        TaskListSnapshot {
            tasks: self.cache.tasks(),
            pending: self.cache.pending(),
            source,
        }
    }

    fn current(&self, generation: u64) -> Option<&ActiveSubscription> {
        self.active.as_ref().filter(|a| a.generation == generation)
    }

    /// Sends the cache to the active subscriber if it shows the same scope.
    fn publish(&self, source: SnapshotSource) {
        if let Some(active) = &self.active {
            if self.cache.serves(&active.scope) {
                let _ = active.tx.send(self.snapshot(source));
            }
        }
    }

    /// Detaches the subscription with `generation`, if it is still active.
    fn detach(&mut self, generation: u64) {
        if self.current(generation).is_some() {
            if let Some(active) = self.active.take() {
                active.shutdown();
            }
        }
    }
}

/// Role-scoped synchronization core.
pub struct TaskSync<S, A, N> {
    store: Arc<S>,
    assignments: Arc<A>,
    reminders: ReminderScheduler<N>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    shared: Arc<Mutex<SyncState>>,
}

impl<S, A, N> TaskSync<S, A, N>
where
    S: TaskStore + 'static,
    A: AssignmentNotifier + 'static,
    N: NotificationService + 'static,
{
    /// Creates a sync core with an empty cache.
    pub fn new(
        store: Arc<S>,
        assignments: Arc<A>,
        reminders: ReminderScheduler<N>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            assignments,
            reminders,
            clock,
            config,
            shared: Arc::new(Mutex::new(SyncState::default())),
        }
    }

    /// The reminder scheduler used for due-date reminders.
    #[must_use]
    pub const fn reminders(&self) -> &ReminderScheduler<N> {
        &self.reminders
    }

    /// Opens the role-scoped live query for `session`.
    ///
    /// Any previous subscription from this instance is torn down first. A
    /// session without access receives one empty snapshot and nothing more.
    /// Store failures never surface here: the subscriber receives the cached
    /// list for the same scope, or an empty one.
    pub async fn subscribe(&self, session: &Session) -> TaskSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = {
            let mut state = self.shared.lock();
            state.next_generation += 1;
            if let Some(previous) = state.active.take() {
                previous.shutdown();
            }
            state.next_generation
        };
        let handle = TaskSubscription::new(rx, generation, Arc::clone(&self.shared));

        let Some(query) = TaskQuery::for_session(session) else {
            tracing::warn!(role = ?session.role, email = %session.email, "session has no task access");
            let _ = tx.send(TaskListSnapshot::empty(SnapshotSource::NoAccess));
            return handle;
        };

        {
            let mut state = self.shared.lock();
            let now = self.clock.now_ms();
            if state
                .cache
                .is_fresh(&query, now, self.config.cache_freshness)
            {
                tracing::debug!(tasks = state.cache.len(), "showing cached tasks while revalidating");
                let _ = tx.send(state.snapshot(SnapshotSource::Cache));
            }
            state.active = Some(ActiveSubscription {
                generation,
                scope: query.clone(),
                tx: tx.clone(),
                forwarder: None,
            });
        }

        let spec = query.spec();
        tracing::info!(query = %spec, generation, "opening task subscription");
        match self.store.listen(&spec).await {
            Ok(listener) => {
                let forwarder = tokio::spawn(subscription::forward(
                    listener,
                    Arc::clone(&self.shared),
                    Arc::clone(&self.clock),
                    generation,
                    query,
                ));
                let mut state = self.shared.lock();
                match state.active.as_mut().filter(|a| a.generation == generation) {
                    Some(active) => active.forwarder = Some(forwarder),
                    None => forwarder.abort(),
                }
            }
            Err(e) => {
                tracing::warn!(query = %spec, error = %e, "task subscription failed");
                subscription::fall_back(&self.shared.lock(), generation, &query);
            }
        }
        handle
    }

    /// Current cache contents.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.shared.lock().cache.tasks()
    }

    /// Looks up a cached task.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.shared.lock().cache.get(id).map(|e| e.task.clone())
    }

    /// Loads a task list persisted by an earlier run.
    pub fn seed_cache(&self, list: CachedTaskList) {
        tracing::debug!(tasks = list.tasks.len(), "seeding task cache");
        self.shared.lock().cache.seed(list);
    }

    /// Confirmed cache contents with their scope, for persistence.
    #[must_use]
    pub fn cached_snapshot(&self) -> Option<CachedTaskList> {
        self.shared.lock().cache.export()
    }

    /// Creates a task and returns the store-assigned id.
    ///
    /// A provisional copy is shown until the store answers. On success the
    /// assignee, if any, is notified in the background.
    ///
    /// # Errors
    ///
    /// [`SyncError::PermissionDenied`] without touching the store or the
    /// cache when the session's role may not create tasks;
    /// [`SyncError::Invalid`] for rejected input; otherwise the store
    /// failure, after the provisional copy has been withdrawn.
    pub async fn create_task(&self, session: &Session, new: NewTask) -> Result<TaskId, SyncError> {
        if !session.role.is_some_and(Role::can_create) {
            tracing::warn!(role = ?session.role, email = %session.email, "session may not create tasks");
            return Err(SyncError::PermissionDenied {
                op: Operation::Create,
            });
        }
        new.validate()?;
        let doc = TaskDocument::for_create(&new, &Creator::from_session(session));
        let provisional_id = TaskId::provisional();
        let mut task = doc.normalize(provisional_id.clone(), self.clock.now_ms());

        let mut mutation = {
            let mut state = self.shared.lock();
            let m = Mutation::begin_create(&mut state.cache, task.clone());
            state.publish(SnapshotSource::Optimistic);
            m
        };

        let result = self.store.create(doc).await;
        let mut state = self.shared.lock();
        match result {
            Ok(id) => {
                if mutation.confirm(&mut state.cache) {
                    state.publish(SnapshotSource::Optimistic);
                }
                drop(state);
                tracing::info!(task_id = %id, "task created");
                task.id = id.clone();
                self.notify_assignment(task);
                Ok(id)
            }
            Err(e) => {
                if mutation.roll_back(&mut state.cache) {
                    state.publish(SnapshotSource::Optimistic);
                }
                tracing::warn!(task_id = %provisional_id, error = %e, "task create rejected");
                Err(SyncError::from_store(Operation::Create, &provisional_id, e))
            }
        }
    }

    fn notify_assignment(&self, task: Task) {
        if task.assigned_to.is_none() {
            return;
        }
        let notifier = Arc::clone(&self.assignments);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify_assignment(&task).await {
                tracing::warn!(task_id = %task.id, error = %e, "assignment notification failed");
            }
        });
    }

    /// Applies a partial update.
    ///
    /// The cached copy changes immediately and is restored exactly if the
    /// store rejects the write.
    ///
    /// # Errors
    ///
    /// [`SyncError::Invalid`] for rejected input; otherwise the store
    /// failure, after rollback.
    pub async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<(), SyncError> {
        patch.validate()?;
        let mut mutation = {
            let mut state = self.shared.lock();
            let m = Mutation::begin_update(&mut state.cache, id, &patch);
            state.publish(SnapshotSource::Optimistic);
            m
        };

        let result = self.store.update(id, DocumentPatch::from(&patch)).await;
        let mut state = self.shared.lock();
        match result {
            Ok(()) => {
                if mutation.confirm(&mut state.cache) {
                    state.publish(SnapshotSource::Optimistic);
                }
                tracing::info!(task_id = %id, "task updated");
                Ok(())
            }
            Err(e) => {
                if mutation.roll_back(&mut state.cache) {
                    state.publish(SnapshotSource::Optimistic);
                }
                tracing::warn!(task_id = %id, error = %e, "task update rejected");
                Err(SyncError::from_store(Operation::Update, id, e))
            }
        }
    }

    /// Deletes a task and cancels its due reminder.
    ///
    /// A task the store no longer has counts as removed.
    ///
    /// # Errors
    ///
    /// The store failure, after the task has been put back.
    pub async fn delete_task(&self, id: &TaskId) -> Result<DeleteOutcome, SyncError> {
        let mut mutation = {
            let mut state = self.shared.lock();
            let m = Mutation::begin_delete(&mut state.cache, id);
            state.publish(SnapshotSource::Optimistic);
            m
        };
        let reminder = mutation
            .original()
            .and_then(|t| t.notification_id.clone())
            .map(ReminderHandle::new);

        let outcome = match self.store.delete(id).await {
            Ok(()) => DeleteOutcome::Deleted,
            Err(StoreError::NotFound(_)) => {
                tracing::info!(task_id = %id, "task was already removed");
                DeleteOutcome::AlreadyRemoved
            }
            Err(e) => {
                let mut state = self.shared.lock();
                if mutation.roll_back(&mut state.cache) {
                    state.publish(SnapshotSource::Optimistic);
                }
                tracing::warn!(task_id = %id, error = %e, "task delete rejected");
                return Err(SyncError::from_store(Operation::Delete, id, e));
            }
        };
        mutation.confirm(&mut self.shared.lock().cache);
        tracing::info!(task_id = %id, "task deleted");
        if let Some(handle) = reminder {
            self.reminders.cancel_reminder(&handle).await;
        }
        Ok(outcome)
    }

    /// Replaces the task's due reminder with one `minutes_before` its due date.
    ///
    /// The new handle (or its absence) is written back to the task, and the
    /// previous handle is cancelled once the store has accepted it.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] if the task is not cached; otherwise the
    /// failure of the write-back, in which case the new reminder is cancelled
    /// and the previous one stays in place.
    pub async fn reschedule_due_reminder(
        &self,
        id: &TaskId,
        minutes_before: u64,
    ) -> Result<Option<ReminderHandle>, SyncError> {
        let task = self.task(id).ok_or_else(|| SyncError::NotFound {
            op: Operation::Update,
            id: id.clone(),
        })?;
        let previous = task.notification_id.clone().map(ReminderHandle::new);
        let handle = self
            .reminders
            .schedule_due_reminder(&task, minutes_before)
            .await;
        let patch = TaskPatch::notification_id(handle.as_ref().map(ToString::to_string));
        if let Err(e) = self.update_task(id, patch).await {
            if let Some(handle) = &handle {
                self.reminders.cancel_reminder(handle).await;
            }
            return Err(e);
        }
        if let Some(previous) = previous.filter(|p| handle.as_ref() != Some(p)) {
            self.reminders.cancel_reminder(&previous).await;
        }
        Ok(handle)
    }

    /// Moves the due date and reschedules the due reminder accordingly.
    ///
    /// # Errors
    ///
    /// Propagates failures of the due-date update or the reschedule.
    pub async fn postpone_task(
        &self,
        id: &TaskId,
        due_at: u64,
        minutes_before: u64,
    ) -> Result<Option<ReminderHandle>, SyncError> {
        self.update_task(id, TaskPatch::due_at(due_at)).await?;
        self.reschedule_due_reminder(id, minutes_before).await
    }
}
