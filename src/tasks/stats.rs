//! Summary counters and due-date classification.

use crate::tasks::model::{Priority, Task};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// How close an open task is to its due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DueStatus {
    /// Due before today.
    Overdue,
    /// Due today or within the next two days.
    Soon,
    Normal,
}

/// Days within which a due date counts as [`DueStatus::Soon`].
pub const SOON_DAYS: i64 = 2;

/// Classify `task`'s due date relative to `today`. `None` when undated.
#[must_use]
pub fn due_status(task: &Task, today: NaiveDate) -> Option<DueStatus> {
    let days = (task.due_date? - today).num_days();
    Some(if days < 0 {
        DueStatus::Overdue
    } else if days <= SOON_DAYS {
        DueStatus::Soon
    } else {
        DueStatus::Normal
    })
}

/// Task count for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

/// Snapshot of the list's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
    /// Open tasks with high priority.
    pub high_priority: usize,
    /// Open tasks past their due date.
    pub overdue: usize,
    /// Completed share, rounded to a whole percent (0 for an empty list).
    pub percent_complete: u32,
    /// In order of first appearance.
    pub by_category: Vec<CategoryCount>,
}

impl TaskStats {
    #[must_use]
    pub fn compute(tasks: &[Task], today: NaiveDate) -> Self {
        let total = tasks.len();
        let completed = tasks.iter().filter(|t| t.completed).count();
        let open = || tasks.iter().filter(|t| !t.completed);
        let high_priority = open().filter(|t| t.priority == Priority::High).count();
        let overdue = open()
            .filter(|t| due_status(t, today) == Some(DueStatus::Overdue))
            .count();

        let mut by_category: Vec<CategoryCount> = Vec::new();
        for task in tasks {
            match by_category.iter_mut().find(|c| c.category == task.category) {
                Some(entry) => entry.count += 1,
                None => by_category.push(CategoryCount {
                    category: task.category.clone(),
                    count: 1,
                }),
            }
        }

        Self {
            total,
            completed,
            active: total - completed,
            high_priority,
            overdue,
            percent_complete: percent(completed, total),
            by_category,
        }
    }
}

/// Rounded `part / whole` percentage, half rounding up.
fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    let rounded = (part * 200 + whole) / (whole * 2);
    u32::try_from(rounded).unwrap_or(100)
}
