//! JSON and CSV renderings of the task list, plus JSON import.

use crate::error::Result;
use crate::tasks::migrate::migrate_tasks;
use crate::tasks::model::Task;
use chrono::{DateTime, Utc};

/// Column order of the CSV export.
pub const CSV_HEADER: [&str; 8] = [
    "Title",
    "Description",
    "Status",
    "Priority",
    "Category",
    "StartDate",
    "DueDate",
    "CreatedAt",
];

pub const STATUS_DONE: &str = "Terminée";
pub const STATUS_OPEN: &str = "En cours";

/// The full task array, pretty-printed, exactly as stored.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json(tasks: &[Task]) -> Result<String> {
    Ok(serde_json::to_string_pretty(tasks)?)
}

/// One header line plus one line per task, every field quoted.
#[must_use]
pub fn to_csv(tasks: &[Task]) -> String {
    let mut lines = Vec::with_capacity(tasks.len() + 1);
    lines.push(CSV_HEADER.join(","));
    for task in tasks {
        let start = date_cell(task.start_date);
        let due = date_cell(task.due_date);
        let created = task.created_at.format("%d/%m/%Y").to_string();
        let cells = [
            task.title.as_str(),
            task.description.as_deref().unwrap_or_default(),
            if task.completed { STATUS_DONE } else { STATUS_OPEN },
            task.priority.as_str(),
            task.category.as_str(),
            start.as_str(),
            due.as_str(),
            created.as_str(),
        ];
        let row: Vec<String> = cells.iter().map(|c| quote(c)).collect();
        lines.push(row.join(","));
    }
    lines.join("\n")
}

fn date_cell(date: Option<chrono::NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

/// Parse an exported JSON array back into tasks, repairing older shapes.
///
/// # Errors
///
/// Returns an error if `text` is not JSON or not an array.
pub fn import_json(text: &str, now: DateTime<Utc>) -> Result<Vec<Task>> {
    let raw: serde_json::Value = serde_json::from_str(text)?;
    Ok(migrate_tasks(raw, now)?.tasks)
}
