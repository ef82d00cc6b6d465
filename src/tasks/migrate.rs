//! Load-time repair of task files written by older versions.
//!
//! Every entry is normalized to the current shape before it is
//! deserialized, so nothing downstream ever sees a task with a missing
//! ledger, reminder map or date field. Entries that cannot be repaired
//! are dropped with a warning rather than failing the whole load.

use crate::error::{Result, TicklerError};
use crate::reminders::ledger::reset_on_reminder_disable;
use crate::tasks::model::{DEFAULT_CATEGORY, OffsetKind, ReminderSet, Task, lenient_date, new_id};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Outcome of [`migrate_tasks`].
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Tasks ready for the scheduler, in stored order.
    pub tasks: Vec<Task>,
    /// Number of tasks that needed at least one fix.
    pub repaired: usize,
    /// Number of entries discarded as unrecoverable.
    pub dropped: usize,
}

impl MigrationReport {
    /// Whether the stored form differs from what was loaded.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.repaired > 0 || self.dropped > 0
    }
}

/// Repair and deserialize a stored task array.
///
/// `now` backfills a missing `createdAt`.
///
/// # Errors
///
/// Returns [`TicklerError::Store`] when `raw` is not a JSON array.
pub fn migrate_tasks(raw: Value, now: DateTime<Utc>) -> Result<MigrationReport> {
    let Value::Array(entries) = raw else {
        return Err(TicklerError::Store(
            "task file does not contain a JSON array".to_owned(),
        ));
    };

    let mut report = MigrationReport::default();
    let mut seen_ids = HashSet::new();

    for (index, entry) in entries.into_iter().enumerate() {
        let Value::Object(mut fields) = entry else {
            warn!("dropping task entry {index}: not an object");
            report.dropped += 1;
            continue;
        };

        let mut repaired = repair_fields(&mut fields, now);

        let mut task: Task = match serde_json::from_value(Value::Object(fields)) {
            Ok(task) => task,
            Err(e) => {
                warn!("dropping task entry {index}: {e}");
                report.dropped += 1;
                continue;
            }
        };

        if !seen_ids.insert(task.id.clone()) {
            let fresh = new_id();
            debug!("task id {} is duplicated, reassigning {fresh}", task.id);
            task.id = fresh;
            seen_ids.insert(task.id.clone());
            repaired = true;
        }

        let ledger = task.notifications_sent;
        reset_on_reminder_disable(&mut task);
        if ledger != task.notifications_sent {
            repaired = true;
        }

        if repaired {
            report.repaired += 1;
        }
        report.tasks.push(task);
    }

    if report.changed() {
        warn!(
            "task migration repaired {} and dropped {} entries",
            report.repaired, report.dropped
        );
    }
    Ok(report)
}

/// Normalize one task object in place. Returns whether anything changed.
fn repair_fields(fields: &mut Map<String, Value>, now: DateTime<Utc>) -> bool {
    let mut changed = false;

    changed |= repair_id(fields);

    if !matches!(fields.get("title"), Some(Value::String(_))) {
        let title = match fields.get("title") {
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        fields.insert("title".to_owned(), Value::String(title));
        changed = true;
    }

    for key in ["description", "recurrence"] {
        if !fields.contains_key(key) {
            fields.insert(key.to_owned(), Value::Null);
            changed = true;
        }
    }

    for key in ["startDate", "dueDate"] {
        let valid = match fields.get(key) {
            Some(Value::Null) => true,
            Some(Value::String(raw)) => lenient_date::parse(raw).is_some(),
            _ => false,
        };
        if !valid {
            fields.insert(key.to_owned(), Value::Null);
            changed = true;
        }
    }

    if !matches!(fields.get("category"), Some(Value::String(c)) if !c.is_empty()) {
        fields.insert(
            "category".to_owned(),
            Value::String(DEFAULT_CATEGORY.to_owned()),
        );
        changed = true;
    }

    let valid_priority = matches!(
        fields.get("priority"),
        Some(Value::String(p)) if matches!(p.as_str(), "high" | "medium" | "low")
    );
    if !valid_priority {
        fields.insert("priority".to_owned(), Value::String("medium".to_owned()));
        changed = true;
    }

    let valid_recurrence = match fields.get("recurrence") {
        Some(Value::Null) => true,
        Some(Value::String(r)) => matches!(r.as_str(), "daily" | "weekly" | "monthly"),
        _ => false,
    };
    if !valid_recurrence {
        fields.insert("recurrence".to_owned(), Value::Null);
        fields.insert("recurring".to_owned(), Value::Bool(false));
        changed = true;
    }

    let created_ok = matches!(
        fields.get("createdAt"),
        Some(Value::String(raw)) if raw.parse::<DateTime<Utc>>().is_ok()
    );
    if !created_ok {
        fields.insert("createdAt".to_owned(), Value::String(now.to_rfc3339()));
        changed = true;
    }

    changed |= repair_subtasks(fields);
    changed |= repair_flag_map(fields, "reminders", |kind| {
        ReminderSet::default().is_enabled(kind)
    });
    changed |= repair_flag_map(fields, "notificationsSent", |_| false);

    changed
}

fn repair_id(fields: &mut Map<String, Value>) -> bool {
    match fields.get("id") {
        Some(Value::String(id)) if !id.is_empty() => false,
        Some(Value::Number(n)) => {
            let id = n.to_string();
            fields.insert("id".to_owned(), Value::String(id));
            true
        }
        _ => {
            fields.insert("id".to_owned(), Value::String(new_id()));
            true
        }
    }
}

fn repair_subtasks(fields: &mut Map<String, Value>) -> bool {
    let Some(Value::Array(subtasks)) = fields.get_mut("subtasks") else {
        fields.insert("subtasks".to_owned(), Value::Array(Vec::new()));
        return true;
    };

    let before = subtasks.len();
    subtasks.retain(|s| matches!(s.get("title"), Some(Value::String(_))));
    let mut changed = subtasks.len() != before;

    let mut seen = HashSet::new();
    for subtask in subtasks.iter_mut() {
        let Value::Object(sub) = subtask else {
            continue;
        };
        changed |= repair_id(sub);
        let duplicate =
            matches!(sub.get("id"), Some(Value::String(id)) if !seen.insert(id.clone()));
        if duplicate {
            sub.insert("id".to_owned(), Value::String(new_id()));
            changed = true;
        }
    }
    changed
}

/// Make `key` an object carrying a boolean for every offset kind.
fn repair_flag_map(
    fields: &mut Map<String, Value>,
    key: &str,
    default_for: impl Fn(OffsetKind) -> bool,
) -> bool {
    let mut changed = false;
    if !matches!(fields.get(key), Some(Value::Object(_))) {
        fields.insert(key.to_owned(), Value::Object(Map::new()));
        changed = true;
    }
    if let Some(Value::Object(map)) = fields.get_mut(key) {
        for kind in OffsetKind::ALL {
            if !matches!(map.get(kind.as_str()), Some(Value::Bool(_))) {
                map.insert(kind.as_str().to_owned(), Value::Bool(default_for(kind)));
                changed = true;
            }
        }
    }
    changed
}
