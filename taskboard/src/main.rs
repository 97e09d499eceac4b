//! `taskboard`: role-scoped task board on the command line.
//!
//! Loads tasks into an in-process realtime store, subscribes with the
//! configured session's role, and prints what that session can see.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/taskboard/config.toml`).
//!
//! ```bash
//! # Everything, as an admin
//! cargo run --bin taskboard -- --role admin list
//!
//! # A worker's own overdue tasks, as JSON
//! cargo run --bin taskboard -- --role operativo --email a@x.com --json list --overdue
//!
//! # Department report as CSV
//! TASKBOARD_ROLE=jefe TASKBOARD_DEPARTMENT=Obras cargo run -- export --stats
//! ```

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing_appender::non_blocking::WorkerGuard;

use taskboard::clock::{Clock, DAY_MS, HOUR_MS, SystemClock};
use taskboard::config::{CliArgs, ClientConfig, Command};
use taskboard::export::{format_date, stats_to_csv, tasks_to_csv};
use taskboard::reminders::ReminderScheduler;
use taskboard::reminders::assignment::LocalAssignmentNotifier;
use taskboard::reminders::countdown::{Countdown, CountdownTicker, Urgency};
use taskboard::reminders::memory::RecordingNotifications;
use taskboard::stats::{
    FilterCriteria, apply_filters, critical_tasks, daily_digest, group_by_area, summarize,
    urgent_tasks,
};
use taskboard::store::memory::InMemoryTaskStore;
use taskboard::sync::{SnapshotSource, TaskSubscription, TaskSync};
use taskboard_proto::codec::{self, CachedTaskList};
use taskboard_proto::document::{Creator, TaskDocument};
use taskboard_proto::task::{NewTask, Priority, Task, TaskStatus};

type Board = TaskSync<
    InMemoryTaskStore,
    LocalAssignmentNotifier<RecordingNotifications>,
    RecordingNotifications,
>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("taskboard starting");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(
        InMemoryTaskStore::new(Arc::clone(&clock)).with_latency_compensation(true),
    );
    seed_store(&store, config.seed_file.as_deref(), clock.now_ms())?;

    let notifications = Arc::new(RecordingNotifications::new());
    let sync: Board = TaskSync::new(
        store,
        Arc::new(LocalAssignmentNotifier::new(Arc::clone(&notifications))),
        ReminderScheduler::new(Arc::clone(&notifications), Arc::clone(&clock))
            .with_daily_limit(config.reminders.max_daily_reminders),
        Arc::clone(&clock),
        config.sync_config(),
    );
    if let Some(path) = &config.cache_file {
        load_cache(&sync, path);
    }

    let session = config.session();
    let mut subscription = sync.subscribe(&session).await;
    let tasks = first_settled(&mut subscription).await;
    let now = clock.now_ms();

    let command = cli.command.clone().unwrap_or(Command::List {
        search: None,
        area: None,
        responsible: None,
        priority: None,
        overdue: false,
    });
    match command {
        Command::List {
            search,
            area,
            responsible,
            priority,
            overdue,
        } => {
            let criteria = FilterCriteria {
                search_text: search,
                area,
                responsible,
                priority,
                overdue,
            };
            print_tasks(&apply_filters(&tasks, &criteria, now), now, cli.json)?;
        }
        Command::Report => print_report(&tasks, now, &config, cli.json)?,
        Command::Export { stats } => {
            if stats {
                print!("{}", stats_to_csv(&summarize(&tasks, now), &group_by_area(&tasks, now)));
            } else {
                print!("{}", tasks_to_csv(&tasks));
            }
        }
        Command::Watch { seconds } => {
            watch_board(
                &mut subscription,
                &tasks,
                &clock,
                config.reminders.countdown_tick,
                Duration::from_secs(seconds),
            )
            .await;
        }
        Command::Remind {
            minutes_before,
            daily,
        } => {
            let minutes = minutes_before.unwrap_or(config.reminders.minutes_before);
            remind(&sync, &tasks, minutes, daily).await;
            let scheduled = notifications.scheduled();
            if cli.json {
                let rows: Vec<_> = scheduled
                    .iter()
                    .map(|r| serde_json::json!({ "handle": r.handle, "at": r.at_ms, "payload": r.payload }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for r in &scheduled {
                    println!(
                        "{:<10} {:<9} {}  {}",
                        r.handle,
                        r.payload.kind.as_str(),
                        format_date(r.at_ms),
                        r.payload.body
                    );
                }
            }
        }
    }

    subscription.unsubscribe();
    if let Some(path) = &config.cache_file {
        save_cache(&sync, path);
    }
    tracing::info!("taskboard exiting");
    Ok(())
}

/// Initialize file-based logging.
///
/// Logs are written to a file so stdout carries only command output.
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskboard.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Loads the seed file, or the built-in demo tasks, into the store.
fn seed_store(store: &InMemoryTaskStore, seed_file: Option<&Path>, now: u64) -> Result<(), Box<dyn Error>> {
    let seed: Vec<NewTask> = match seed_file {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => demo_tasks(now),
    };
    let creator = Creator {
        user_id: "seed".to_string(),
        display_name: "Seed".to_string(),
    };
    for new in &seed {
        if let Err(e) = new.validate() {
            tracing::warn!(title = %new.title, error = %e, "skipping invalid seed task");
            continue;
        }
        store.insert_document(TaskDocument::for_create(new, &creator));
    }
    tracing::info!(tasks = store.len(), "store seeded");
    Ok(())
}

fn demo_tasks(now: u64) -> Vec<NewTask> {
    let task = |title: &str, area: &str, assignee: &str, priority, status, due_in: i64| NewTask {
        title: title.to_string(),
        area: Some(area.to_string()),
        assigned_to: Some(assignee.to_string()),
        priority,
        status,
        due_at: now.saturating_add_signed(due_in),
        ..NewTask::default()
    };
    let hour = i64::try_from(HOUR_MS).unwrap_or(i64::MAX);
    let day = i64::try_from(DAY_MS).unwrap_or(i64::MAX);
    vec![
        task("Revisar contrato de obra", "Jurídica", "a@x.com", Priority::High, TaskStatus::Pending, 3 * hour),
        task("Licitación alumbrado", "Obras", "b@x.com", Priority::Medium, TaskStatus::InProgress, 2 * day),
        task("Conciliación bancaria", "Tesorería", "a@x.com", Priority::High, TaskStatus::InReview, -hour),
        task("Inventario de mobiliario", "Administración", "c@x.com", Priority::Low, TaskStatus::Pending, 5 * day),
        task("Plan de capacitación", "Recursos Humanos", "b@x.com", Priority::Medium, TaskStatus::Closed, -day),
        task("Bacheo calle principal", "Obras", "a@x.com", Priority::High, TaskStatus::Pending, 50 * hour),
    ]
}

fn load_cache(sync: &Board, path: &Path) {
    match std::fs::read(path) {
        Ok(bytes) => match codec::decode(&bytes) {
            Ok(list) => sync.seed_cache(list),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable task cache"),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to read task cache"),
    }
}

fn save_cache(sync: &Board, path: &Path) {
    let Some(list): Option<CachedTaskList> = sync.cached_snapshot() else {
        return;
    };
    let written = codec::encode(&list)
        .map_err(|e| e.to_string())
        .and_then(|bytes| std::fs::write(path, bytes).map_err(|e| e.to_string()));
    if let Err(e) = written {
        tracing::warn!(path = %path.display(), error = %e, "failed to persist task cache");
    }
}

/// Waits past any cache pre-population for the first settled list.
async fn first_settled(subscription: &mut TaskSubscription) -> Vec<Task> {
    while let Some(snapshot) = subscription.recv().await {
        if snapshot.source != SnapshotSource::Cache {
            return snapshot.tasks;
        }
    }
    Vec::new()
}

fn print_tasks(tasks: &[Task], now: u64, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(tasks)?);
        return Ok(());
    }
    if tasks.is_empty() {
        println!("No tasks.");
    }
    for task in tasks {
        let left = if task.status.is_closed() {
            "-".to_string()
        } else {
            Countdown::until(task.due_at, now).to_string()
        };
        println!(
            "{:<11} {:<5} {:>10}  {}  [{}] -> {}",
            task.status,
            task.priority,
            left,
            task.title,
            task.report_area(),
            task.assigned_to.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn print_report(tasks: &[Task], now: u64, config: &ClientConfig, json: bool) -> Result<(), Box<dyn Error>> {
    let summary = summarize(tasks, now);
    let areas = group_by_area(tasks, now);
    let critical = critical_tasks(tasks);
    let urgent = urgent_tasks(tasks, now, config.reminders.urgent_window);
    let digest = daily_digest(tasks, now);

    if json {
        let report = serde_json::json!({
            "summary": summary,
            "areas": areas,
            "critical": critical,
            "urgent": urgent,
            "digest": digest,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} tasks, {} overdue, {} critical",
        summary.total, summary.overdue, summary.critical
    );
    println!();
    println!(
        "{:<18} {:>9} {:>10} {:>11} {:>7} {:>7} {:>5}",
        "area", "pendiente", "en_proceso", "en_revision", "cerrada", "overdue", "total"
    );
    for row in &areas {
        let c = &row.by_status;
        println!(
            "{:<18} {:>9} {:>10} {:>11} {:>7} {:>7} {:>5}",
            row.area, c.pending, c.in_progress, c.in_review, c.closed, row.overdue, row.total
        );
    }
    println!();
    println!("critical:");
    for task in &critical {
        let urgency = Urgency::classify(task.due_at, now, config.reminders.urgent_window);
        println!("  {:<9} {}  {}", urgency.label(), format_date(task.due_at), task.title);
    }
    println!("urgent:");
    for task in &urgent {
        println!("  {:>10}  {}", Countdown::until(task.due_at, now), task.title);
    }
    println!();
    println!(
        "today: {} overdue, {} due today, {} due tomorrow, {} open",
        digest.overdue, digest.due_today, digest.due_soon, digest.total
    );
    Ok(())
}

async fn next_countdown(rx: &mut Option<watch::Receiver<Countdown>>) -> Option<Countdown> {
    match rx {
        Some(rx) => {
            rx.changed().await.ok()?;
            Some(*rx.borrow_and_update())
        }
        None => std::future::pending().await,
    }
}

async fn watch_board(
    subscription: &mut TaskSubscription,
    tasks: &[Task],
    clock: &Arc<dyn Clock>,
    tick: Duration,
    duration: Duration,
) {
    let now = clock.now_ms();
    let nearest = tasks
        .iter()
        .filter(|t| !t.status.is_closed() && !t.is_past_due(now))
        .min_by_key(|t| t.due_at);
    let ticker = nearest.map(|t| {
        println!("counting down: {}", t.title);
        CountdownTicker::start(t.due_at, Arc::clone(clock), tick)
    });
    let mut countdown = ticker.as_ref().map(CountdownTicker::watch);

    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => break,
            snapshot = subscription.recv() => match snapshot {
                Some(s) => println!("{:?}: {} tasks, {} pending", s.source, s.tasks.len(), s.pending.len()),
                None => break,
            },
            value = next_countdown(&mut countdown) => match value {
                Some(c) => println!("  {c}"),
                None => countdown = None,
            },
        }
    }
}

async fn remind(sync: &Board, tasks: &[Task], minutes_before: u64, daily: bool) {
    for task in tasks.iter().filter(|t| !t.status.is_closed()) {
        match sync.reschedule_due_reminder(&task.id, minutes_before).await {
            Ok(Some(_)) => {}
            Ok(None) => tracing::info!(task_id = %task.id, "no due reminder for this task"),
            Err(e) => eprintln!("{}: {}", task.title, e.user_message()),
        }
        if daily {
            let handles = sync.reminders().schedule_daily_reminders(task).await;
            tracing::info!(
                task_id = %task.id,
                handles = ?handles,
                "daily reminders placed"
            );
        }
    }
}
