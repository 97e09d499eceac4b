//! Normalized task model.
//!
//! [`Task`] is the only task representation that leaves the store adapter:
//! every timestamp is epoch milliseconds and every enum is resolved. The
//! store-native form lives in [`crate::document`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Organizational departments a task can belong to, in display order.
pub const AREAS: [&str; 5] = [
    "Jurídica",
    "Obras",
    "Tesorería",
    "Administración",
    "Recursos Humanos",
];

/// Area that tasks without an explicit area are reported under.
pub const DEFAULT_AREA: &str = "Administración";

/// Prefix of identifiers minted locally for not-yet-confirmed creates.
const PROVISIONAL_PREFIX: &str = "local-";

/// Opaque task identifier.
///
/// Real identifiers are assigned by the remote store on creation and never
/// change. Provisional identifiers are minted locally for optimistic creates
/// and never reach the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps a store-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a fresh provisional identifier (time-ordered UUID v7).
    #[must_use]
    pub fn provisional() -> Self {
        Self(format!("{PROVISIONAL_PREFIX}{}", Uuid::now_v7()))
    }

    /// Whether this identifier was minted locally for an unconfirmed create.
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }

    /// Returns the string form of the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when parsing an enumerated value fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    /// Which enumeration was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    /// `alta`
    #[serde(rename = "alta")]
    High,
    /// `media`
    #[default]
    #[serde(rename = "media")]
    Medium,
    /// `baja`
    #[serde(rename = "baja")]
    Low,
}

impl Priority {
    /// All priorities, highest first.
    pub const ALL: [Self; 3] = [Self::High, Self::Medium, Self::Low];

    /// Wire name of the priority.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "alta",
            Self::Medium => "media",
            Self::Low => "baja",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "priority",
                value: s.to_string(),
            })
    }
}

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    /// `pendiente`: not started.
    #[default]
    #[serde(rename = "pendiente")]
    Pending,
    /// `en_proceso`: being worked on.
    #[serde(rename = "en_proceso")]
    InProgress,
    /// `en_revision`: waiting for review.
    #[serde(rename = "en_revision")]
    InReview,
    /// `cerrada`: done.
    #[serde(rename = "cerrada")]
    Closed,
}

impl TaskStatus {
    /// All statuses in workflow order.
    pub const ALL: [Self; 4] = [Self::Pending, Self::InProgress, Self::InReview, Self::Closed];

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pendiente",
            Self::InProgress => "en_proceso",
            Self::InReview => "en_revision",
            Self::Closed => "cerrada",
        }
    }

    /// Whether the task is finished.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "status",
                value: s.to_string(),
            })
    }
}

/// A task as seen by every layer above the store adapter.
///
/// All instants are milliseconds since the UNIX epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned (or provisional) identifier.
    pub id: TaskId,
    /// Non-empty title.
    pub title: String,
    /// Free-form description, may be empty.
    pub description: String,
    /// Department the task belongs to.
    pub area: Option<String>,
    /// User the task is assigned to, usually an email.
    pub assigned_to: Option<String>,
    /// Priority, `media` unless set.
    pub priority: Priority,
    /// Workflow status, `pendiente` unless set.
    pub status: TaskStatus,
    /// When the task is due.
    pub due_at: u64,
    /// When the store created the task.
    pub created_at: u64,
    /// When the store last modified the task.
    pub updated_at: u64,
    /// Identity of the creator.
    pub created_by: String,
    /// Display name of the creator.
    pub created_by_name: String,
    /// Department of the creator, if recorded.
    pub department: Option<String>,
    /// Free-form labels.
    pub tags: Vec<String>,
    /// Handle of the scheduled due-soon reminder, if any.
    pub notification_id: Option<String>,
}

impl Task {
    /// Due date is strictly in the past, regardless of status.
    #[must_use]
    pub const fn is_past_due(&self, now_ms: u64) -> bool {
        self.due_at < now_ms
    }

    /// Not closed and past due.
    #[must_use]
    pub const fn is_overdue(&self, now_ms: u64) -> bool {
        !self.status.is_closed() && self.is_past_due(now_ms)
    }

    /// Area used for reporting; unset areas fall back to [`DEFAULT_AREA`].
    #[must_use]
    pub fn report_area(&self) -> &str {
        self.area.as_deref().unwrap_or(DEFAULT_AREA)
    }
}

/// Reasons a task is rejected before it reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Title is empty or whitespace.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Title exceeds [`MAX_TASK_TITLE_LENGTH`].
    #[error("task title too long (max 256 characters)")]
    TitleTooLong,
    /// Due date is not a usable instant.
    #[error("task due date is not set")]
    MissingDueDate,
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::TitleEmpty);
    }
    if title.chars().count() > MAX_TASK_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong);
    }
    Ok(())
}

/// Input for creating a task.
///
/// Creator identity and server timestamps are attached by the sync core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewTask {
    /// Title, must not be blank.
    pub title: String,
    /// Description.
    pub description: String,
    /// Department.
    pub area: Option<String>,
    /// Assignee, usually an email.
    pub assigned_to: Option<String>,
    /// Priority.
    pub priority: Priority,
    /// Initial status.
    pub status: TaskStatus,
    /// Due instant, epoch milliseconds.
    pub due_at: u64,
    /// Department override; empty when unset.
    pub department: Option<String>,
    /// Labels.
    pub tags: Vec<String>,
}

impl NewTask {
    /// Creates a task input with the required fields; everything else defaulted.
    pub fn new(title: impl Into<String>, due_at: u64) -> Self {
        Self {
            title: title.into(),
            due_at,
            ..Self::default()
        }
    }

    /// Checks the fields the store cannot check for us.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a blank or over-long title or an
    /// unset due date.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)?;
        if self.due_at == 0 {
            return Err(ValidationError::MissingDueDate);
        }
        Ok(())
    }
}

/// A partial update. `None` leaves a field untouched; for clearable fields
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPatch {
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
    /// Status transition.
    pub status: Option<TaskStatus>,
    /// Postponed (or advanced) due instant, epoch milliseconds.
    pub due_at: Option<u64>,
    /// New reminder handle.
    pub notification_id: Option<Option<String>>,
}

impl TaskPatch {
    /// Patch that only changes the status.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch that only changes the due date.
    #[must_use]
    pub fn due_at(due_at: u64) -> Self {
        Self {
            due_at: Some(due_at),
            ..Self::default()
        }
    }

    /// Patch that only changes the reminder handle.
    #[must_use]
    pub fn notification_id(handle: Option<String>) -> Self {
        Self {
            notification_id: Some(handle),
            ..Self::default()
        }
    }

    /// Whether the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Checks the fields being changed.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if a new title is blank or too long, or
    /// the new due date is unset.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if self.due_at == Some(0) {
            return Err(ValidationError::MissingDueDate);
        }
        Ok(())
    }

    /// Applies the patch to a normalized task in place.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(area) = &self.area {
            task.area.clone_from(area);
        }
        if let Some(assigned_to) = &self.assigned_to {
            task.assigned_to.clone_from(assigned_to);
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(due_at) = self.due_at {
            task.due_at = due_at;
        }
        if let Some(handle) = &self.notification_id {
            task.notification_id.clone_from(handle);
        }
    }
}
