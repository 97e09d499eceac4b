//! CSV rendering of task lists and reports.
//!
//! Output is UTF-8 with a leading byte-order mark so spreadsheet
//! applications pick the right encoding.

use chrono::{DateTime, Utc};

use taskboard_proto::task::Task;

use crate::stats::{AreaTally, TaskSummary};

const BOM: &str = "\u{FEFF}";

const TASK_HEADERS: [&str; 8] = [
    "Título",
    "Descripción",
    "Asignado a",
    "Área",
    "Prioridad",
    "Estado",
    "Fecha vencimiento",
    "Fecha creación",
];

/// Formats epoch milliseconds as `dd/mm/yyyy HH:MM:SS` (UTC).
#[must_use]
pub fn format_date(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.format("%d/%m/%Y %H:%M:%S").to_string())
        .unwrap_or_default()
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn task_row(task: &Task) -> String {
    let due = format_date(task.due_at);
    let created = format_date(task.created_at);
    [
        task.title.as_str(),
        task.description.as_str(),
        task.assigned_to.as_deref().unwrap_or_default(),
        task.area.as_deref().unwrap_or_default(),
        task.priority.as_str(),
        task.status.as_str(),
        due.as_str(),
        created.as_str(),
    ]
    .iter()
    .map(|f| quote(f))
    .collect::<Vec<_>>()
    .join(",")
}

/// One row per task under a header row.
#[must_use]
pub fn tasks_to_csv(tasks: &[Task]) -> String {
    let mut lines = Vec::with_capacity(tasks.len() + 1);
    lines.push(TASK_HEADERS.iter().map(|h| quote(h)).collect::<Vec<_>>().join(","));
    lines.extend(tasks.iter().map(task_row));
    format!("{BOM}{}", lines.join("\n"))
}

/// Summary section followed by the per-area table.
#[must_use]
pub fn stats_to_csv(summary: &TaskSummary, areas: &[AreaTally]) -> String {
    let counts = &summary.by_status;
    let mut lines = vec![
        "RESUMEN GENERAL".to_string(),
        format!("Total de tareas,{}", summary.total),
        format!("Completadas,{}", counts.closed),
        format!("Pendientes,{}", counts.pending),
        format!("En proceso,{}", counts.in_progress),
        format!("En revisión,{}", counts.in_review),
        format!("Vencidas,{}", summary.overdue),
        String::new(),
        "TAREAS POR ÁREA".to_string(),
        "Área,Pendiente,En proceso,En revisión,Cerrada,Vencidas,Total".to_string(),
    ];
    lines.extend(areas.iter().map(|row| {
        let c = &row.by_status;
        format!(
            "{},{},{},{},{},{},{}",
            quote(&row.area),
            c.pending,
            c.in_progress,
            c.in_review,
            c.closed,
            row.overdue,
            row.total
        )
    }));
    format!("{BOM}{}", lines.join("\n"))
}
