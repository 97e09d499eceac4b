//! Live countdowns and urgency classes for due dates.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::{Clock, DAY_MS};

const SECS_PER_DAY: u64 = 86_400;
const SECS_PER_HOUR: u64 = 3_600;

/// Time left until a due date, broken down for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    /// Due date reached or passed.
    Overdue,
    /// At least one full day left.
    Days {
        /// Whole days.
        days: u64,
        /// Remaining whole hours.
        hours: u64,
    },
    /// Less than a day left.
    Clock {
        /// Whole hours.
        hours: u64,
        /// Remaining whole minutes.
        minutes: u64,
        /// Remaining whole seconds.
        seconds: u64,
    },
}

impl Countdown {
    /// Breaks down the time from `now_ms` to `due_ms`.
    ///
    /// Anything at or past the due instant is [`Countdown::Overdue`].
    #[must_use]
    pub const fn until(due_ms: u64, now_ms: u64) -> Self {
        if due_ms <= now_ms {
            return Self::Overdue;
        }
        let total = (due_ms - now_ms) / 1_000;
        let days = total / SECS_PER_DAY;
        let hours = (total % SECS_PER_DAY) / SECS_PER_HOUR;
        if days > 0 {
            Self::Days { days, hours }
        } else {
            Self::Clock {
                hours,
                minutes: (total % SECS_PER_HOUR) / 60,
                seconds: total % 60,
            }
        }
    }

    /// Whether the due date has been reached.
    #[must_use]
    pub const fn is_overdue(self) -> bool {
        matches!(self, Self::Overdue)
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overdue => f.write_str("overdue"),
            Self::Days { days, hours } => write!(f, "{days}d {hours}h"),
            Self::Clock {
                hours,
                minutes,
                seconds,
            } => write!(f, "{hours:02}:{minutes:02}:{seconds:02}"),
        }
    }
}

/// How pressing a due date is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Urgency {
    /// Due date reached.
    Overdue,
    /// Due within the urgent window.
    Critical,
    /// Due within 24 hours.
    DueToday,
    /// Due within 48 hours.
    DueSoon,
    /// Anything later.
    Later,
}

impl Urgency {
    /// Classifies a due date relative to `now_ms`.
    #[must_use]
    pub fn classify(due_ms: u64, now_ms: u64, urgent_window: Duration) -> Self {
        if due_ms <= now_ms {
            return Self::Overdue;
        }
        let left = due_ms - now_ms;
        let window = u64::try_from(urgent_window.as_millis()).unwrap_or(u64::MAX);
        if left < window {
            Self::Critical
        } else if left <= DAY_MS {
            Self::DueToday
        } else if left <= 2 * DAY_MS {
            Self::DueSoon
        } else {
            Self::Later
        }
    }

    /// Short label for display.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Overdue => "overdue",
            Self::Critical => "critical",
            Self::DueToday => "due today",
            Self::DueSoon => "due soon",
            Self::Later => "later",
        }
    }
}

/// A countdown that refreshes itself on a fixed cadence.
///
/// The background task stops once the due date is reached and is aborted
/// when the ticker is dropped.
pub struct CountdownTicker {
    current: watch::Receiver<Countdown>,
    task: JoinHandle<()>,
}

impl CountdownTicker {
    /// Starts ticking towards `due_ms` every `tick`.
    #[must_use]
    pub fn start(due_ms: u64, clock: Arc<dyn Clock>, tick: Duration) -> Self {
        let initial = Countdown::until(due_ms, clock.now_ms());
        let (tx, current) = watch::channel(initial);
        let task = tokio::spawn(async move {
            if initial.is_overdue() {
                return;
            }
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                interval.tick().await;
                let next = Countdown::until(due_ms, clock.now_ms());
                if tx.send(next).is_err() || next.is_overdue() {
                    break;
                }
            }
        });
        Self { current, task }
    }

    /// The latest countdown value.
    #[must_use]
    pub fn current(&self) -> Countdown {
        *self.current.borrow()
    }

    /// A receiver that wakes on every refresh.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Countdown> {
        self.current.clone()
    }

    /// Whether the background task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CountdownTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}
