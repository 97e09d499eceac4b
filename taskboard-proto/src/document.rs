//! Store-native task documents and the normalization boundary.
//!
//! Documents carry [`StoreTimestamp`] values exactly as the remote store keeps
//! them, including the "pending server assignment" sentinel that appears in
//! latency-compensated snapshots. [`TaskDocument::normalize`] is the only way
//! out to a [`Task`], and [`TaskDocument::for_create`] / [`DocumentPatch`] are
//! the only ways in, so store timestamps never leak past this module.

use serde::{Deserialize, Serialize};

use crate::session::Session;
use crate::task::{NewTask, Priority, Task, TaskId, TaskPatch, TaskStatus};

const MILLIS_PER_SEC: u64 = 1_000;
const NANOS_PER_MILLI: u32 = 1_000_000;

/// Creator recorded on documents when the session carries no identity.
const ANONYMOUS_USER: &str = "anonymous";

/// A timestamp as stored by the remote document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreTimestamp {
    /// A server-resolved instant.
    Resolved {
        /// Whole seconds since the UNIX epoch.
        seconds: i64,
        /// Sub-second nanoseconds.
        nanos: u32,
    },
    /// A bare epoch-millisecond number written by older clients.
    Millis(u64),
    /// Requested server timestamp that has not been assigned yet.
    ServerPending,
}

impl StoreTimestamp {
    /// Converts epoch milliseconds to a resolved store timestamp.
    #[must_use]
    pub fn from_millis(ms: u64) -> Self {
        let seconds = i64::try_from(ms / MILLIS_PER_SEC).unwrap_or(i64::MAX);
        let nanos = u32::try_from(ms % MILLIS_PER_SEC).unwrap_or(0) * NANOS_PER_MILLI;
        Self::Resolved { seconds, nanos }
    }

    /// Epoch milliseconds, or `None` while still pending.
    ///
    /// Instants before the epoch clamp to zero.
    #[must_use]
    pub fn to_millis(self) -> Option<u64> {
        match self {
            Self::Resolved { seconds, nanos } => {
                let secs = u64::try_from(seconds).unwrap_or(0);
                Some(
                    secs.saturating_mul(MILLIS_PER_SEC)
                        .saturating_add(u64::from(nanos / NANOS_PER_MILLI)),
                )
            }
            Self::Millis(ms) => Some(ms),
            Self::ServerPending => None,
        }
    }

    /// Whether the server has not assigned this timestamp yet.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::ServerPending)
    }

    /// Replaces a pending sentinel with the server's clock; other values pass through.
    #[must_use]
    pub fn resolve(self, server_now_ms: u64) -> Self {
        if self.is_pending() {
            Self::from_millis(server_now_ms)
        } else {
            self
        }
    }
}

/// Converts an optional store timestamp, defaulting to `now_ms` when absent
/// or still pending so downstream date arithmetic always has a number.
fn normalize_timestamp(ts: Option<StoreTimestamp>, now_ms: u64) -> u64 {
    ts.and_then(StoreTimestamp::to_millis).unwrap_or(now_ms)
}

/// Creator identity attached to new documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    /// Recorded as `createdBy`.
    pub user_id: String,
    /// Recorded as `createdByName`.
    pub display_name: String,
}

impl Creator {
    /// Takes the creator from the session, falling back to an anonymous creator.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        let user_id = if session.user_id.is_empty() {
            ANONYMOUS_USER.to_string()
        } else {
            session.user_id.clone()
        };
        let display_name = if session.display_name.is_empty() {
            session.email.clone()
        } else {
            session.display_name.clone()
        };
        Self {
            user_id,
            display_name,
        }
    }
}

/// A task document as held by the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDocument {
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Department.
    pub area: Option<String>,
    /// Assignee.
    pub assigned_to: Option<String>,
    /// Priority.
    pub priority: Priority,
    /// Status.
    pub status: TaskStatus,
    /// Due instant.
    pub due_at: Option<StoreTimestamp>,
    /// Server-assigned creation instant.
    pub created_at: Option<StoreTimestamp>,
    /// Server-assigned modification instant.
    pub updated_at: Option<StoreTimestamp>,
    /// Creator identity.
    pub created_by: String,
    /// Creator display name.
    pub created_by_name: String,
    /// Department; stored as an empty string when unset.
    pub department: String,
    /// Labels.
    pub tags: Vec<String>,
    /// Reminder handle.
    pub notification_id: Option<String>,
}

impl TaskDocument {
    /// Builds the document written on create, with server timestamps requested.
    #[must_use]
    pub fn for_create(new: &NewTask, creator: &Creator) -> Self {
        Self {
            title: new.title.clone(),
            description: new.description.clone(),
            area: new.area.clone(),
            assigned_to: new.assigned_to.clone(),
            priority: new.priority,
            status: new.status,
            due_at: Some(StoreTimestamp::from_millis(new.due_at)),
            created_at: Some(StoreTimestamp::ServerPending),
            updated_at: Some(StoreTimestamp::ServerPending),
            created_by: creator.user_id.clone(),
            created_by_name: creator.display_name.clone(),
            department: new.department.clone().unwrap_or_default(),
            tags: new.tags.clone(),
            notification_id: None,
        }
    }

    /// Converts to the normalized [`Task`].
    ///
    /// Pending or missing timestamps become `now_ms`.
    #[must_use]
    pub fn normalize(&self, id: TaskId, now_ms: u64) -> Task {
        Task {
            id,
            title: self.title.clone(),
            description: self.description.clone(),
            area: self.area.clone(),
            assigned_to: self.assigned_to.clone(),
            priority: self.priority,
            status: self.status,
            due_at: normalize_timestamp(self.due_at, now_ms),
            created_at: normalize_timestamp(self.created_at, now_ms),
            updated_at: normalize_timestamp(self.updated_at, now_ms),
            created_by: self.created_by.clone(),
            created_by_name: self.created_by_name.clone(),
            department: Some(self.department.clone()).filter(|d| !d.is_empty()),
            tags: self.tags.clone(),
            notification_id: self.notification_id.clone(),
        }
    }

    /// Applies a patch as the store would; `updated_at` is taken from the patch.
    pub fn apply(&mut self, patch: &DocumentPatch) {
        if let Some(title) = &patch.title {
            self.title.clone_from(title);
        }
        if let Some(description) = &patch.description {
            self.description.clone_from(description);
        }
        if let Some(area) = &patch.area {
            self.area.clone_from(area);
        }
        if let Some(assigned_to) = &patch.assigned_to {
            self.assigned_to.clone_from(assigned_to);
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(due_at) = patch.due_at {
            self.due_at = Some(due_at);
        }
        if let Some(handle) = &patch.notification_id {
            self.notification_id.clone_from(handle);
        }
        self.updated_at = Some(patch.updated_at);
    }

    /// Replaces every pending server timestamp with `server_now_ms`.
    pub fn resolve_pending(&mut self, server_now_ms: u64) {
        for ts in [&mut self.created_at, &mut self.updated_at, &mut self.due_at]
            .into_iter()
            .flatten()
        {
            *ts = ts.resolve(server_now_ms);
        }
    }

    /// Creation instant used for ordering; pending sorts as newest.
    #[must_use]
    pub fn created_at_sort_key(&self) -> u64 {
        match self.created_at {
            Some(StoreTimestamp::ServerPending) => u64::MAX,
            other => other.and_then(StoreTimestamp::to_millis).unwrap_or(0),
        }
    }
}

/// A partial update in store-native form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New area.
    pub area: Option<Option<String>>,
    /// Reassignment.
    pub assigned_to: Option<Option<String>>,
    /// New priority.
    pub priority: Option<Priority>,
    /// New status.
    pub status: Option<TaskStatus>,
    /// New due instant.
    pub due_at: Option<StoreTimestamp>,
    /// New reminder handle.
    pub notification_id: Option<Option<String>>,
    /// Always a server timestamp request.
    pub updated_at: StoreTimestamp,
}

impl From<&TaskPatch> for DocumentPatch {
    fn from(patch: &TaskPatch) -> Self {
        Self {
            title: patch.title.clone(),
            description: patch.description.clone(),
            area: patch.area.clone(),
            assigned_to: patch.assigned_to.clone(),
            priority: patch.priority,
            status: patch.status,
            due_at: patch.due_at.map(StoreTimestamp::from_millis),
            notification_id: patch.notification_id.clone(),
            updated_at: StoreTimestamp::ServerPending,
        }
    }
}

/// A document together with its store-assigned identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Document identifier.
    pub id: TaskId,
    /// Document fields.
    pub data: TaskDocument,
}

impl StoredDocument {
    /// Normalizes into a [`Task`]; see [`TaskDocument::normalize`].
    #[must_use]
    pub fn normalize(&self, now_ms: u64) -> Task {
        self.data.normalize(self.id.clone(), now_ms)
    }
}
