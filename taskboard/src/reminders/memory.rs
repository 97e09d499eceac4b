//! In-process notification service that records what it is asked to do.

use parking_lot::Mutex;

use super::{NotificationService, NotifyError, ReminderHandle, ReminderPayload};

/// A notification accepted by [`RecordingNotifications`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledReminder {
    /// Handle returned to the caller.
    pub handle: ReminderHandle,
    /// Fire instant (epoch ms).
    pub at_ms: u64,
    /// Attached data.
    pub payload: ReminderPayload,
}

#[derive(Debug, Default)]
struct RecorderState {
    granted: bool,
    grant_on_request: bool,
    permission_requests: usize,
    fail_schedules: bool,
    next_handle: u64,
    scheduled: Vec<ScheduledReminder>,
    presented: Vec<ReminderPayload>,
    cancelled: Vec<ReminderHandle>,
}

impl RecorderState {
    fn mint(&mut self) -> ReminderHandle {
        self.next_handle += 1;
        ReminderHandle::new(format!("notif-{}", self.next_handle))
    }
}

/// Notification service that keeps every request in memory.
///
/// Stands in for the platform service in tests and in the command-line
/// binary, where `remind` prints what would have been scheduled.
#[derive(Debug)]
pub struct RecordingNotifications {
    state: Mutex<RecorderState>,
}

impl Default for RecordingNotifications {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingNotifications {
    /// Permission already granted.
    #[must_use]
    pub fn new() -> Self {
        Self::with_permission(true, true)
    }

    /// Permission not granted yet; granted when requested.
    #[must_use]
    pub fn prompting() -> Self {
        Self::with_permission(false, true)
    }

    /// Permission refused, and refused again when requested.
    #[must_use]
    pub fn denied() -> Self {
        Self::with_permission(false, false)
    }

    fn with_permission(granted: bool, grant_on_request: bool) -> Self {
        Self {
            state: Mutex::new(RecorderState {
                granted,
                grant_on_request,
                ..RecorderState::default()
            }),
        }
    }

    /// Makes every subsequent schedule or present call fail.
    pub fn fail_schedules(&self, fail: bool) {
        self.state.lock().fail_schedules = fail;
    }

    /// Reminders scheduled and not cancelled, in scheduling order.
    #[must_use]
    pub fn scheduled(&self) -> Vec<ScheduledReminder> {
        self.state.lock().scheduled.clone()
    }

    /// Notifications shown immediately.
    #[must_use]
    pub fn presented(&self) -> Vec<ReminderPayload> {
        self.state.lock().presented.clone()
    }

    /// Handles successfully cancelled.
    #[must_use]
    pub fn cancelled(&self) -> Vec<ReminderHandle> {
        self.state.lock().cancelled.clone()
    }

    /// How many times permission was requested.
    #[must_use]
    pub fn permission_requests(&self) -> usize {
        self.state.lock().permission_requests
    }
}

impl NotificationService for RecordingNotifications {
    async fn permission_granted(&self) -> bool {
        self.state.lock().granted
    }

    async fn request_permission(&self) -> bool {
        let mut state = self.state.lock();
        state.permission_requests += 1;
        state.granted = state.grant_on_request;
        state.granted
    }

    async fn schedule_at(
        &self,
        at_ms: u64,
        payload: ReminderPayload,
    ) -> Result<ReminderHandle, NotifyError> {
        let mut state = self.state.lock();
        if state.fail_schedules {
            return Err(NotifyError::Service("scheduling disabled".to_string()));
        }
        if !state.granted {
            return Err(NotifyError::PermissionDenied);
        }
        let handle = state.mint();
        state.scheduled.push(ScheduledReminder {
            handle: handle.clone(),
            at_ms,
            payload,
        });
        Ok(handle)
    }

    async fn present_now(&self, payload: ReminderPayload) -> Result<ReminderHandle, NotifyError> {
        let mut state = self.state.lock();
        if state.fail_schedules {
            return Err(NotifyError::Service("presenting disabled".to_string()));
        }
        let handle = state.mint();
        state.presented.push(payload);
        Ok(handle)
    }

    async fn cancel(&self, handle: &ReminderHandle) -> Result<(), NotifyError> {
        let mut state = self.state.lock();
        let pos = state
            .scheduled
            .iter()
            .position(|r| r.handle == *handle)
            .ok_or_else(|| NotifyError::UnknownHandle(handle.to_string()))?;
        state.scheduled.remove(pos);
        state.cancelled.push(handle.clone());
        Ok(())
    }
}
