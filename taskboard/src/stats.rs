//! Filters and reports over a synchronized task list.
//!
//! Everything here is pure: callers pass the task list and the current
//! instant, and get new values back.

use std::time::Duration;

use serde::Serialize;

use taskboard_proto::task::{AREAS, Priority, Task, TaskStatus};

use crate::clock::DAY_MS;

/// Conjunctive list filter. Unset or empty criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    /// Case-insensitive substring of the title.
    pub search_text: Option<String>,
    /// Exact area.
    pub area: Option<String>,
    /// Exact assignee.
    pub responsible: Option<String>,
    /// Exact priority.
    pub priority: Option<Priority>,
    /// Keep only tasks whose due date has passed.
    pub overdue: bool,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

impl FilterCriteria {
    /// Whether `task` satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, task: &Task, now_ms: u64) -> bool {
        if let Some(needle) = non_empty(self.search_text.as_ref()) {
            if !task.title.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(area) = non_empty(self.area.as_ref()) {
            if task.area.as_deref() != Some(area) {
                return false;
            }
        }
        if let Some(responsible) = non_empty(self.responsible.as_ref()) {
            if task.assigned_to.as_deref() != Some(responsible) {
                return false;
            }
        }
        if self.priority.is_some_and(|p| task.priority != p) {
            return false;
        }
        !self.overdue || task.is_past_due(now_ms)
    }
}

/// Tasks satisfying `criteria`, in their original order.
#[must_use]
pub fn apply_filters(tasks: &[Task], criteria: &FilterCriteria, now_ms: u64) -> Vec<Task> {
    tasks
        .iter()
        .filter(|t| criteria.matches(t, now_ms))
        .cloned()
        .collect()
}

/// Task counts per workflow status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// `pendiente`
    pub pending: usize,
    /// `en_proceso`
    pub in_progress: usize,
    /// `en_revision`
    pub in_review: usize,
    /// `cerrada`
    pub closed: usize,
}

impl StatusCounts {
    fn add(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::InReview => self.in_review += 1,
            TaskStatus::Closed => self.closed += 1,
        }
    }

    /// Count for one status.
    #[must_use]
    pub const fn get(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Pending => self.pending,
            TaskStatus::InProgress => self.in_progress,
            TaskStatus::InReview => self.in_review,
            TaskStatus::Closed => self.closed,
        }
    }
}

/// Per-area report row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AreaTally {
    /// Area name.
    pub area: String,
    /// Counts per status.
    pub by_status: StatusCounts,
    /// Open tasks past their due date.
    pub overdue: usize,
    /// All tasks in the area.
    pub total: usize,
}

impl AreaTally {
    fn new(area: &str) -> Self {
        Self {
            area: area.to_string(),
            by_status: StatusCounts::default(),
            overdue: 0,
            total: 0,
        }
    }
}

/// Tallies tasks per area.
///
/// Known areas come first, in their fixed order, even when empty; areas
/// outside that set follow in order of first appearance. Tasks without an
/// area are counted under the default area.
#[must_use]
pub fn group_by_area(tasks: &[Task], now_ms: u64) -> Vec<AreaTally> {
    let mut rows: Vec<AreaTally> = AREAS.iter().map(|a| AreaTally::new(a)).collect();
    for task in tasks {
        let area = task.report_area();
        let index = match rows.iter().position(|r| r.area == area) {
            Some(index) => index,
            None => {
                rows.push(AreaTally::new(area));
                rows.len() - 1
            }
        };
        let row = &mut rows[index];
        row.by_status.add(task.status);
        row.total += 1;
        if task.is_overdue(now_ms) {
            row.overdue += 1;
        }
    }
    rows
}

fn open_sorted_by_due(tasks: &[Task], keep: impl Fn(&Task) -> bool) -> Vec<Task> {
    let mut out: Vec<Task> = tasks
        .iter()
        .filter(|t| !t.status.is_closed() && keep(t))
        .cloned()
        .collect();
    out.sort_by_key(|t| t.due_at);
    out
}

/// Open high-priority tasks, soonest due first.
#[must_use]
pub fn critical_tasks(tasks: &[Task]) -> Vec<Task> {
    open_sorted_by_due(tasks, |t| t.priority == Priority::High)
}

/// Open tasks past their due date, most overdue first.
#[must_use]
pub fn overdue_tasks(tasks: &[Task], now_ms: u64) -> Vec<Task> {
    open_sorted_by_due(tasks, |t| t.is_past_due(now_ms))
}

/// Open tasks due within `window` from now (and not yet due), soonest first.
#[must_use]
pub fn urgent_tasks(tasks: &[Task], now_ms: u64, window: Duration) -> Vec<Task> {
    let window = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
    open_sorted_by_due(tasks, |t| {
        t.due_at > now_ms && t.due_at - now_ms < window
    })
}

/// Whole-list totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    /// All tasks.
    pub total: usize,
    /// Counts per status.
    pub by_status: StatusCounts,
    /// Open tasks past their due date.
    pub overdue: usize,
    /// Open high-priority tasks.
    pub critical: usize,
}

/// Counts tasks by status, overdue and critical.
#[must_use]
pub fn summarize(tasks: &[Task], now_ms: u64) -> TaskSummary {
    let mut summary = TaskSummary::default();
    for task in tasks {
        summary.total += 1;
        summary.by_status.add(task.status);
        if task.is_overdue(now_ms) {
            summary.overdue += 1;
        }
        if task.priority == Priority::High && !task.status.is_closed() {
            summary.critical += 1;
        }
    }
    summary
}

/// Daily digest counts over open tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailyDigest {
    /// Due date passed.
    pub overdue: usize,
    /// Due within the next 24 hours.
    pub due_today: usize,
    /// Due between 24 and 48 hours from now.
    pub due_soon: usize,
    /// All open tasks.
    pub total: usize,
}

/// Builds the daily digest.
#[must_use]
pub fn daily_digest(tasks: &[Task], now_ms: u64) -> DailyDigest {
    let mut digest = DailyDigest::default();
    for task in tasks.iter().filter(|t| !t.status.is_closed()) {
        digest.total += 1;
        if task.due_at < now_ms {
            digest.overdue += 1;
            continue;
        }
        let left = task.due_at - now_ms;
        if left > 0 && left <= DAY_MS {
            digest.due_today += 1;
        } else if left > DAY_MS && left <= 2 * DAY_MS {
            digest.due_soon += 1;
        }
    }
    digest
}
