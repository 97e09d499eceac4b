//! Assignment notifications.
//!
//! Fired by the sync core after a create is confirmed. Delivery is
//! fire-and-forget: the core logs failures and never fails the create.

use std::future::Future;
use std::sync::Arc;

use taskboard_proto::task::Task;

use super::{NotificationService, NotifyError, ReminderKind, ReminderPayload};

/// Tells an assignee that a task was handed to them.
pub trait AssignmentNotifier: Send + Sync {
    /// Notifies `task.assigned_to`, if set.
    fn notify_assignment(&self, task: &Task) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Posts an immediate local notification through a [`NotificationService`].
pub struct LocalAssignmentNotifier<N> {
    service: Arc<N>,
}

impl<N> LocalAssignmentNotifier<N> {
    /// Creates a notifier over `service`.
    pub const fn new(service: Arc<N>) -> Self {
        Self { service }
    }
}

impl<N: NotificationService> AssignmentNotifier for LocalAssignmentNotifier<N> {
    async fn notify_assignment(&self, task: &Task) -> Result<(), NotifyError> {
        let Some(assignee) = task.assigned_to.as_deref() else {
            return Ok(());
        };
        let payload = ReminderPayload {
            kind: ReminderKind::Assignment,
            task_id: task.id.clone(),
            due_at: task.due_at,
            title: "New task assigned".to_string(),
            body: format!("\"{}\" was assigned to {assignee}", task.title),
        };
        let handle = self.service.present_now(payload).await?;
        tracing::debug!(task_id = %task.id, assignee, handle = %handle, "assignment notification posted");
        Ok(())
    }
}

/// Discards assignment notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAssignmentNotifier;

impl AssignmentNotifier for NoopAssignmentNotifier {
    async fn notify_assignment(&self, _task: &Task) -> Result<(), NotifyError> {
        Ok(())
    }
}
