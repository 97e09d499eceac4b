//! Local reminder scheduling.
//!
//! [`ReminderScheduler`] decides *when* a reminder should fire relative to a
//! task's due date and delegates the actual delivery to a
//! [`NotificationService`]. Scheduling is best-effort throughout: a reminder
//! that cannot be placed (trigger in the past, permission missing, service
//! failure) is reported as an absent handle, never as an error.

pub mod assignment;
pub mod countdown;
pub mod memory;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use taskboard_proto::task::{Task, TaskId};

use crate::clock::{Clock, DAY_MS};

/// Milliseconds in one minute.
const MINUTE_MS: u64 = 60 * 1000;

/// Default upper bound on daily reminders placed for one task.
pub const DEFAULT_MAX_DAILY_REMINDERS: usize = 60;

/// Errors reported by the notification service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    /// The user has not granted notification permission.
    #[error("notification permission not granted")]
    PermissionDenied,

    /// The handle does not refer to a scheduled notification.
    #[error("unknown notification handle: {0}")]
    UnknownHandle(String),

    /// The service refused the request.
    #[error("notification service error: {0}")]
    Service(String),
}

/// Opaque handle to a scheduled local notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderHandle(String);

impl ReminderHandle {
    /// Wraps a service-issued handle.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Returns the string form of the handle.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReminderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    /// Fires a fixed interval before the due date.
    DueSoon,
    /// One of the once-a-day reminders leading up to the due date.
    Daily,
    /// Tells the assignee a task was handed to them.
    Assignment,
}

impl ReminderKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DueSoon => "due_soon",
            Self::Daily => "daily",
            Self::Assignment => "assignment",
        }
    }
}

/// Data attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPayload {
    /// Notification kind.
    pub kind: ReminderKind,
    /// Task the notification refers to.
    pub task_id: TaskId,
    /// Due date of the task (epoch ms).
    pub due_at: u64,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
}

/// Platform notification service.
///
/// Implementations talk to the operating system's local notification API.
pub trait NotificationService: Send + Sync {
    /// Whether permission has already been granted.
    fn permission_granted(&self) -> impl Future<Output = bool> + Send;

    /// Prompts for permission; returns whether it was granted.
    fn request_permission(&self) -> impl Future<Output = bool> + Send;

    /// Schedules a notification to fire at `at_ms`.
    fn schedule_at(
        &self,
        at_ms: u64,
        payload: ReminderPayload,
    ) -> impl Future<Output = Result<ReminderHandle, NotifyError>> + Send;

    /// Shows a notification immediately.
    fn present_now(
        &self,
        payload: ReminderPayload,
    ) -> impl Future<Output = Result<ReminderHandle, NotifyError>> + Send;

    /// Cancels a scheduled notification.
    fn cancel(&self, handle: &ReminderHandle) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Reminder timing settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderConfig {
    /// How long before the due date the due-soon reminder fires.
    pub minutes_before: u64,
    /// Refresh cadence of live countdowns.
    pub countdown_tick: Duration,
    /// Tasks due within this window are classed as critical.
    pub urgent_window: Duration,
    /// Most daily reminders placed for a single task.
    pub max_daily_reminders: usize,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            minutes_before: 10,
            countdown_tick: Duration::from_secs(1),
            urgent_window: Duration::from_secs(6 * 60 * 60),
            max_daily_reminders: DEFAULT_MAX_DAILY_REMINDERS,
        }
    }
}

/// Computes reminder triggers and hands them to a [`NotificationService`].
pub struct ReminderScheduler<N> {
    service: Arc<N>,
    clock: Arc<dyn Clock>,
    max_daily: usize,
}

impl<N> Clone for ReminderScheduler<N> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            clock: Arc::clone(&self.clock),
            max_daily: self.max_daily,
        }
    }
}

impl<N: NotificationService> ReminderScheduler<N> {
    /// Creates a scheduler over `service`.
    pub fn new(service: Arc<N>, clock: Arc<dyn Clock>) -> Self {
        Self {
            service,
            clock,
            max_daily: DEFAULT_MAX_DAILY_REMINDERS,
        }
    }

    /// Caps the number of daily reminders placed per task.
    #[must_use]
    pub fn with_daily_limit(mut self, limit: usize) -> Self {
        self.max_daily = limit;
        self
    }

    /// The underlying notification service.
    #[must_use]
    pub const fn service(&self) -> &Arc<N> {
        &self.service
    }

    /// Checks for permission and asks for it only when not yet granted.
    pub async fn ensure_permission(&self) -> bool {
        if self.service.permission_granted().await {
            return true;
        }
        let granted = self.service.request_permission().await;
        if !granted {
            tracing::warn!("notification permission refused");
        }
        granted
    }

    /// Schedules the due-soon reminder `minutes_before` ahead of the due date.
    ///
    /// Returns `None` when the trigger would not be in the future, when
    /// permission is missing, or when the service rejects the request. Any
    /// handle already attached to the task must be cancelled by the caller.
    pub async fn schedule_due_reminder(
        &self,
        task: &Task,
        minutes_before: u64,
    ) -> Option<ReminderHandle> {
        let now = self.clock.now_ms();
        let offset = minutes_before.saturating_mul(MINUTE_MS);
        let trigger = task.due_at.saturating_sub(offset);
        if trigger <= now {
            tracing::debug!(task_id = %task.id, trigger, now, "due reminder would be in the past");
            return None;
        }
        if !self.ensure_permission().await {
            return None;
        }

        let payload = ReminderPayload {
            kind: ReminderKind::DueSoon,
            task_id: task.id.clone(),
            due_at: task.due_at,
            title: "Task due soon".to_string(),
            body: format!("\"{}\" is due in {minutes_before} minutes", task.title),
        };
        match self.service.schedule_at(trigger, payload).await {
            Ok(handle) => {
                tracing::info!(task_id = %task.id, handle = %handle, trigger, "due reminder scheduled");
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "failed to schedule due reminder");
                None
            }
        }
    }

    /// Schedules one reminder per day from 24h after now, strictly before the due date.
    ///
    /// Closed tasks get none. Reminders the service rejects are skipped. At
    /// most the configured daily limit is attempted, nearest days first.
    ///
    /// The handles are not attached to the task: deleting or closing it
    /// leaves these reminders in place unless the caller passes the returned
    /// handles to [`Self::cancel_reminders`].
    #[must_use]
    pub async fn schedule_daily_reminders(&self, task: &Task) -> Vec<ReminderHandle> {
        if task.status.is_closed() {
            tracing::debug!(task_id = %task.id, "closed task, no daily reminders");
            return Vec::new();
        }
        let now = self.clock.now_ms();
        let mut at = now.saturating_add(DAY_MS);
        if at >= task.due_at || !self.ensure_permission().await {
            return Vec::new();
        }

        let mut handles = Vec::new();
        let mut attempts = 0;
        while at < task.due_at {
            if attempts == self.max_daily {
                tracing::debug!(task_id = %task.id, limit = self.max_daily, "daily reminder limit reached");
                break;
            }
            attempts += 1;
            let days_left = (task.due_at - at).div_ceil(DAY_MS);
            let payload = ReminderPayload {
                kind: ReminderKind::Daily,
                task_id: task.id.clone(),
                due_at: task.due_at,
                title: "Pending task".to_string(),
                body: format!("\"{}\" is due in {days_left} day(s)", task.title),
            };
            match self.service.schedule_at(at, payload).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    tracing::warn!(task_id = %task.id, at, error = %e, "failed to schedule daily reminder");
                }
            }
            at = at.saturating_add(DAY_MS);
        }
        tracing::info!(task_id = %task.id, count = handles.len(), "daily reminders scheduled");
        handles
    }

    /// Cancels one reminder. Failures are logged and swallowed.
    pub async fn cancel_reminder(&self, handle: &ReminderHandle) {
        match self.service.cancel(handle).await {
            Ok(()) => tracing::debug!(handle = %handle, "reminder cancelled"),
            Err(e) => tracing::warn!(handle = %handle, error = %e, "failed to cancel reminder"),
        }
    }

    /// Cancels several reminders, continuing past failures.
    pub async fn cancel_reminders(&self, handles: &[ReminderHandle]) {
        for handle in handles {
            self.cancel_reminder(handle).await;
        }
    }
}
