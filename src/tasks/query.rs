//! Filtering and ordering of the task list for display.

use crate::tasks::model::Task;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Completion filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

/// Secondary sort key. Pinned tasks always come first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    /// Creation time, newest first.
    #[default]
    Newest,
    /// Start date ascending, undated last.
    StartDate,
    /// Due date ascending, undated last.
    DueDate,
    /// High, then medium, then low.
    Priority,
}

/// Filter and sort criteria. All filters are ANDed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskQuery {
    pub status: StatusFilter,
    /// Exact category; `None` matches every category.
    pub category: Option<String>,
    /// Case-insensitive substring over title, description and category.
    pub search: Option<String>,
    pub sort: SortKey,
}

impl TaskQuery {
    fn matches(&self, task: &Task, needle: Option<&str>) -> bool {
        let status_ok = match self.status {
            StatusFilter::All => true,
            StatusFilter::Active => !task.completed,
            StatusFilter::Completed => task.completed,
        };
        if !status_ok {
            return false;
        }
        if self.category.as_ref().is_some_and(|c| task.category != *c) {
            return false;
        }
        let Some(needle) = needle else {
            return true;
        };
        task.title.to_lowercase().contains(needle)
            || task.category.to_lowercase().contains(needle)
            || task
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(needle))
    }
}

/// Matching tasks in display order. Never mutates the input.
#[must_use]
pub fn filter_and_sort(tasks: &[Task], query: &TaskQuery) -> Vec<Task> {
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut selected: Vec<Task> = tasks
        .iter()
        .filter(|t| query.matches(t, needle.as_deref()))
        .cloned()
        .collect();

    // sort_by is stable
    selected.sort_by(|a, b| b.pinned.cmp(&a.pinned).then_with(|| compare(a, b, query.sort)));
    selected
}

fn compare(a: &Task, b: &Task, key: SortKey) -> Ordering {
    match key {
        SortKey::Newest => b.created_at.cmp(&a.created_at),
        SortKey::StartDate => dated_first(a.start_date, b.start_date),
        SortKey::DueDate => dated_first(a.due_date, b.due_date),
        SortKey::Priority => a.priority.rank().cmp(&b.priority.rank()),
    }
}

fn dated_first<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Distinct categories in order of first appearance.
#[must_use]
pub fn categories(tasks: &[Task]) -> Vec<String> {
    let mut seen = Vec::new();
    for task in tasks {
        if !seen.contains(&task.category) {
            seen.push(task.category.clone());
        }
    }
    seen
}
