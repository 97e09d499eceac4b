//! Property-based tests for list filters, reports, and reminder counts.
//!
//! Uses proptest to verify:
//! 1. A priority filter returns exactly the matching tasks, untouched and in order.
//! 2. Per-area tallies account for every task exactly once.
//! 3. Daily reminders number floor((due - now) / day) when the gap is not a
//!    whole number of days.
//! 4. CSV export has one line per task plus the header.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use proptest::prelude::*;
use taskboard::clock::{DAY_MS, ManualClock};
use taskboard::export::tasks_to_csv;
use taskboard::reminders::ReminderScheduler;
use taskboard::reminders::memory::RecordingNotifications;
use taskboard::stats::{FilterCriteria, apply_filters, group_by_area, summarize};
use taskboard_proto::task::{Priority, Task, TaskId, TaskStatus};

const NOW: u64 = 1_700_000_000_000;

// --- Strategies ---

fn arb_area() -> impl Strategy<Value = Option<String>> {
    prop::option::of(
        prop::sample::select(vec!["Jurídica", "Obras", "Tesorería", "Protocolo", "Comunicación"])
            .prop_map(String::from),
    )
}

fn arb_task() -> impl Strategy<Value = Task> {
    (
        "[a-z0-9]{1,12}",
        "[a-zA-Z ,\"]{1,30}",
        arb_area(),
        prop::sample::select(Priority::ALL.to_vec()),
        prop::sample::select(TaskStatus::ALL.to_vec()),
        0..(10 * DAY_MS),
    )
        .prop_map(|(id, title, area, priority, status, due)| Task {
            id: TaskId::new(id),
            title,
            description: String::new(),
            area,
            assigned_to: None,
            priority,
            status,
            due_at: NOW - 5 * DAY_MS + due,
            created_at: NOW,
            updated_at: NOW,
            created_by: "u".to_string(),
            created_by_name: "U".to_string(),
            department: None,
            tags: Vec::new(),
            notification_id: None,
        })
}

fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec(arb_task(), 0..40)
}

// --- Filters and reports ---

proptest! {
    #[test]
    fn priority_filter_selects_exact_subset(
        tasks in arb_tasks(),
        priority in prop::sample::select(Priority::ALL.to_vec()),
    ) {
        let criteria = FilterCriteria {
            priority: Some(priority),
            ..FilterCriteria::default()
        };
        let filtered = apply_filters(&tasks, &criteria, NOW);
        let expected: Vec<Task> = tasks.iter().filter(|t| t.priority == priority).cloned().collect();
        prop_assert_eq!(filtered, expected);
    }

    #[test]
    fn empty_criteria_keep_every_task(tasks in arb_tasks()) {
        prop_assert_eq!(apply_filters(&tasks, &FilterCriteria::default(), NOW), tasks);
    }

    #[test]
    fn area_tallies_cover_every_task_once(tasks in arb_tasks()) {
        let rows = group_by_area(&tasks, NOW);
        let total: usize = rows.iter().map(|r| r.total).sum();
        prop_assert_eq!(total, tasks.len());
        for row in &rows {
            let c = row.by_status;
            prop_assert_eq!(c.pending + c.in_progress + c.in_review + c.closed, row.total);
            prop_assert!(row.overdue <= row.total - c.closed);
        }
        let overdue: usize = rows.iter().map(|r| r.overdue).sum();
        prop_assert_eq!(overdue, summarize(&tasks, NOW).overdue);
    }

    #[test]
    fn csv_has_one_line_per_task(tasks in arb_tasks()) {
        let csv = tasks_to_csv(&tasks);
        prop_assert_eq!(csv.lines().count(), tasks.len() + 1);
    }
}

// --- Daily reminders ---

proptest! {
    #[test]
    fn daily_reminder_count_is_whole_days_left(days in 0u64..30, remainder in 1..DAY_MS) {
        let gap = days * DAY_MS + remainder;
        let clock = Arc::new(ManualClock::new(NOW));
        let notifications = Arc::new(RecordingNotifications::new());
        let scheduler = ReminderScheduler::new(Arc::clone(&notifications), clock);
        let task = Task {
            id: TaskId::new("t"),
            title: "Informe".to_string(),
            description: String::new(),
            area: None,
            assigned_to: None,
            priority: Priority::Medium,
            status: TaskStatus::Pending,
            due_at: NOW + gap,
            created_at: NOW,
            updated_at: NOW,
            created_by: "u".to_string(),
            created_by_name: "U".to_string(),
            department: None,
            tags: Vec::new(),
            notification_id: None,
        };

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let handles = runtime.block_on(scheduler.schedule_daily_reminders(&task));

        prop_assert_eq!(u64::try_from(handles.len()).unwrap(), gap / DAY_MS);
        prop_assert!(notifications.scheduled().iter().all(|r| r.at_ms < task.due_at));
    }
}
