//! Integration tests for role-scoped live task lists.
//!
//! Covers query selection per role, snapshot ordering, subscription
//! teardown, cache pre-population, and fallback when the store fails.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::similar_names)]

use std::sync::Arc;
use std::time::Duration;

use taskboard::clock::{Clock, ManualClock};
use taskboard::reminders::ReminderScheduler;
use taskboard::reminders::assignment::NoopAssignmentNotifier;
use taskboard::reminders::memory::RecordingNotifications;
use taskboard::store::memory::InMemoryTaskStore;
use taskboard::store::{StoreError, StoreOp};
use taskboard::sync::{SnapshotSource, SyncConfig, TaskListSnapshot, TaskSubscription, TaskSync};
use taskboard_proto::codec::CachedTaskList;
use taskboard_proto::document::{StoreTimestamp, TaskDocument};
use taskboard_proto::query::TaskQuery;
use taskboard_proto::session::Session;
use taskboard_proto::task::{NewTask, Priority, Task, TaskId, TaskStatus};

const NOW: u64 = 1_700_000_000_000;

type Board = TaskSync<InMemoryTaskStore, NoopAssignmentNotifier, RecordingNotifications>;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

struct Harness {
    clock: Arc<ManualClock>,
    store: Arc<InMemoryTaskStore>,
    sync: Board,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(NOW));
    let store = Arc::new(InMemoryTaskStore::new(clock.clone()));
    let sync = TaskSync::new(
        Arc::clone(&store),
        Arc::new(NoopAssignmentNotifier),
        ReminderScheduler::new(Arc::new(RecordingNotifications::new()), clock.clone()),
        clock.clone(),
        SyncConfig::default(),
    );
    Harness { clock, store, sync }
}

fn doc(title: &str, area: &str, assignee: &str) -> TaskDocument {
    TaskDocument {
        title: title.to_string(),
        area: Some(area.to_string()),
        assigned_to: Some(assignee.to_string()),
        due_at: Some(StoreTimestamp::from_millis(NOW + 86_400_000)),
        created_at: Some(StoreTimestamp::ServerPending),
        ..TaskDocument::default()
    }
}

/// Inserts documents one millisecond apart so creation order is unambiguous.
fn insert_all(h: &Harness, docs: Vec<TaskDocument>) -> Vec<TaskId> {
    docs.into_iter()
        .map(|d| {
            h.clock.advance(1);
            h.store.insert_document(d)
        })
        .collect()
}

fn cached_task(id: &str, title: &str, assignee: &str) -> Task {
    Task {
        id: TaskId::new(id),
        title: title.to_string(),
        description: String::new(),
        area: Some("Obras".to_string()),
        assigned_to: Some(assignee.to_string()),
        priority: Priority::Medium,
        status: TaskStatus::Pending,
        due_at: NOW + 3_600_000,
        created_at: NOW - 120_000,
        updated_at: NOW - 120_000,
        created_by: "u-0".to_string(),
        created_by_name: "Seed".to_string(),
        department: None,
        tags: Vec::new(),
        notification_id: None,
    }
}

fn admin() -> Session {
    Session::new("u-admin", "admin@x.com", "admin", None)
}

fn worker(email: &str) -> Session {
    Session::new("u-worker", email, "operativo", None)
}

fn lead(department: &str) -> Session {
    Session::new("u-lead", "lead@x.com", "jefe", Some(department.to_string()))
}

async fn next(sub: &mut TaskSubscription) -> TaskListSnapshot {
    tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("timed out waiting for a snapshot")
        .expect("subscription closed")
}

fn titles(snapshot: &TaskListSnapshot) -> Vec<&str> {
    snapshot.tasks.iter().map(|t| t.title.as_str()).collect()
}

async fn wait_for_listeners(store: &InMemoryTaskStore, count: usize) {
    for _ in 0..200 {
        if store.listener_count() == count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!(
        "expected {count} listeners, found {}",
        store.listener_count()
    );
}

// ---------------------------------------------------------------------------
// Query selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn worker_sees_only_assigned_tasks_newest_first() {
    let h = harness();
    insert_all(
        &h,
        vec![
            doc("oldest", "Obras", "a@x.com"),
            doc("other", "Obras", "b@x.com"),
            doc("newest", "Obras", "a@x.com"),
        ],
    );

    let mut sub = h.sync.subscribe(&worker("a@x.com")).await;
    let snapshot = next(&mut sub).await;

    assert_eq!(snapshot.source, SnapshotSource::Store);
    assert_eq!(titles(&snapshot), ["newest", "oldest"]);
    assert_eq!(
        h.store.issued_queries(),
        vec![TaskQuery::AssignedTo("a@x.com".into()).spec()]
    );
}

#[tokio::test]
async fn each_role_issues_exactly_its_query() {
    let h = harness();
    insert_all(
        &h,
        vec![
            doc("obras", "Obras", "a@x.com"),
            doc("tesoreria", "Tesorería", "b@x.com"),
        ],
    );

    let mut sub = h.sync.subscribe(&admin()).await;
    assert_eq!(titles(&next(&mut sub).await), ["tesoreria", "obras"]);

    let mut sub = h.sync.subscribe(&lead("Obras")).await;
    assert_eq!(titles(&next(&mut sub).await), ["obras"]);

    let mut sub = h.sync.subscribe(&worker("b@x.com")).await;
    assert_eq!(titles(&next(&mut sub).await), ["tesoreria"]);

    assert_eq!(
        h.store.issued_queries(),
        vec![
            TaskQuery::All.spec(),
            TaskQuery::Department("Obras".into()).spec(),
            TaskQuery::AssignedTo("b@x.com".into()).spec(),
        ]
    );
}

#[tokio::test]
async fn unknown_role_gets_empty_list_without_query() {
    let h = harness();
    insert_all(&h, vec![doc("hidden", "Obras", "a@x.com")]);

    let mut sub = h
        .sync
        .subscribe(&Session::new("u-x", "a@x.com", "visitante", None))
        .await;
    let snapshot = next(&mut sub).await;

    assert_eq!(snapshot.source, SnapshotSource::NoAccess);
    assert!(snapshot.is_empty());
    assert!(h.store.issued_queries().is_empty());
    assert_eq!(sub.recv().await, None);
}

#[tokio::test]
async fn lead_without_department_has_no_access() {
    let h = harness();
    let mut sub = h
        .sync
        .subscribe(&Session::new("u-lead", "lead@x.com", "jefe", None))
        .await;
    assert_eq!(next(&mut sub).await.source, SnapshotSource::NoAccess);
    assert!(h.store.issued_queries().is_empty());
}

// ---------------------------------------------------------------------------
// Live updates and teardown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_writes_push_new_snapshots() {
    let h = harness();
    let mut sub = h.sync.subscribe(&admin()).await;
    assert!(next(&mut sub).await.is_empty());

    h.clock.advance(1);
    h.store.insert_document(doc("arrived", "Obras", "a@x.com"));

    let snapshot = next(&mut sub).await;
    assert_eq!(snapshot.source, SnapshotSource::Store);
    assert_eq!(titles(&snapshot), ["arrived"]);
    assert_eq!(h.sync.tasks().len(), 1);
}

#[tokio::test]
async fn resubscribe_tears_down_previous_subscription() {
    let h = harness();
    let mut first = h.sync.subscribe(&admin()).await;
    next(&mut first).await;
    assert_eq!(h.store.listener_count(), 1);

    let mut second = h.sync.subscribe(&worker("a@x.com")).await;
    next(&mut second).await;

    wait_for_listeners(&h.store, 1).await;
    assert!(!first.is_active());
    assert!(second.is_active());
}

#[tokio::test]
async fn unsubscribe_is_idempotent_and_final() {
    let h = harness();
    let mut sub = h.sync.subscribe(&admin()).await;
    next(&mut sub).await;

    sub.unsubscribe();
    sub.unsubscribe();
    assert!(!sub.is_active());

    h.store.insert_document(doc("late", "Obras", "a@x.com"));
    wait_for_listeners(&h.store, 0).await;
    assert_eq!(sub.try_recv(), None);
    assert_eq!(sub.recv().await, None);
}

#[tokio::test]
async fn dropping_the_handle_detaches_the_listener() {
    let h = harness();
    let mut sub = h.sync.subscribe(&admin()).await;
    next(&mut sub).await;
    drop(sub);
    wait_for_listeners(&h.store, 0).await;
}

#[tokio::test]
async fn latency_compensated_timestamps_normalize_to_now() {
    let clock = Arc::new(ManualClock::new(NOW));
    let store = Arc::new(InMemoryTaskStore::new(clock.clone()).with_latency_compensation(true));
    let sync: Board = TaskSync::new(
        Arc::clone(&store),
        Arc::new(NoopAssignmentNotifier),
        ReminderScheduler::new(Arc::new(RecordingNotifications::new()), clock.clone()),
        clock.clone(),
        SyncConfig::default(),
    );
    let session = admin();
    let mut sub = sync.subscribe(&session).await;
    next(&mut sub).await;

    let mut new = NewTask::new("Inventario", NOW + 86_400_000);
    new.area = Some("Administración".into());
    let id = sync.create_task(&session, new).await.unwrap();

    loop {
        let snapshot = next(&mut sub).await;
        for task in &snapshot.tasks {
            assert_eq!(task.created_at, NOW);
            assert_eq!(task.updated_at, NOW);
        }
        if snapshot.source == SnapshotSource::Store && snapshot.tasks.iter().any(|t| t.id == id) {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Cache and fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_cache_is_shown_before_the_store_answers() {
    let h = harness();
    insert_all(&h, vec![doc("live", "Obras", "a@x.com")]);
    h.sync.seed_cache(CachedTaskList {
        scope: TaskQuery::AssignedTo("a@x.com".into()),
        refreshed_at: h.clock.now_ms() - 5_000,
        tasks: vec![cached_task("c-1", "cached", "a@x.com")],
    });

    let mut sub = h.sync.subscribe(&worker("a@x.com")).await;

    let first = next(&mut sub).await;
    assert_eq!(first.source, SnapshotSource::Cache);
    assert_eq!(titles(&first), ["cached"]);

    let second = next(&mut sub).await;
    assert_eq!(second.source, SnapshotSource::Store);
    assert_eq!(titles(&second), ["live"]);
}

#[tokio::test]
async fn stale_cache_is_not_shown_first() {
    let h = harness();
    h.sync.seed_cache(CachedTaskList {
        scope: TaskQuery::All,
        refreshed_at: NOW - 31_000,
        tasks: vec![cached_task("c-1", "stale", "a@x.com")],
    });

    let mut sub = h.sync.subscribe(&admin()).await;
    let first = next(&mut sub).await;
    assert_eq!(first.source, SnapshotSource::Store);
    assert!(first.is_empty());
}

#[tokio::test]
async fn listen_failure_without_cache_yields_empty_list() {
    let h = harness();
    h.store
        .fail_next(StoreOp::Listen, StoreError::PermissionDenied("rules".into()));

    let mut sub = h.sync.subscribe(&worker("a@x.com")).await;
    let snapshot = next(&mut sub).await;

    assert_eq!(snapshot.source, SnapshotSource::Fallback);
    assert!(snapshot.is_empty());
}

#[tokio::test]
async fn listen_failure_serves_cache_of_the_same_scope() {
    let h = harness();
    h.sync.seed_cache(CachedTaskList {
        scope: TaskQuery::AssignedTo("a@x.com".into()),
        refreshed_at: NOW - 3_600_000,
        tasks: vec![cached_task("c-1", "offline copy", "a@x.com")],
    });
    h.store
        .fail_next(StoreOp::Listen, StoreError::Unavailable("offline".into()));

    let mut sub = h.sync.subscribe(&worker("a@x.com")).await;
    let snapshot = next(&mut sub).await;

    assert_eq!(snapshot.source, SnapshotSource::Fallback);
    assert_eq!(titles(&snapshot), ["offline copy"]);
}

#[tokio::test]
async fn listen_failure_never_serves_another_scope() {
    let h = harness();
    h.sync.seed_cache(CachedTaskList {
        scope: TaskQuery::All,
        refreshed_at: NOW - 3_600_000,
        tasks: vec![cached_task("c-1", "everyone's", "b@x.com")],
    });
    h.store
        .fail_next(StoreOp::Listen, StoreError::Unavailable("offline".into()));

    let mut sub = h.sync.subscribe(&worker("a@x.com")).await;
    let snapshot = next(&mut sub).await;

    assert_eq!(snapshot.source, SnapshotSource::Fallback);
    assert!(snapshot.is_empty());
}

#[tokio::test]
async fn store_error_after_subscribe_falls_back_to_last_snapshot() {
    let h = harness();
    insert_all(
        &h,
        vec![doc("one", "Obras", "a@x.com"), doc("two", "Obras", "a@x.com")],
    );
    let mut sub = h.sync.subscribe(&worker("a@x.com")).await;
    assert_eq!(titles(&next(&mut sub).await), ["two", "one"]);

    h.store
        .emit_error(&StoreError::ResourceExhausted("quota".into()));

    let snapshot = next(&mut sub).await;
    assert_eq!(snapshot.source, SnapshotSource::Fallback);
    assert_eq!(titles(&snapshot), ["two", "one"]);
}

#[tokio::test]
async fn cached_snapshot_exports_confirmed_scope() {
    let h = harness();
    insert_all(&h, vec![doc("kept", "Obras", "a@x.com")]);
    let mut sub = h.sync.subscribe(&lead("Obras")).await;
    next(&mut sub).await;

    let exported = h.sync.cached_snapshot().unwrap();
    assert_eq!(exported.scope, TaskQuery::Department("Obras".into()));
    assert_eq!(exported.refreshed_at, h.clock.now_ms());
    assert_eq!(exported.tasks.len(), 1);
}
