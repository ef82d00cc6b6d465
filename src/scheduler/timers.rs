//! Explicit set of armed one-shot reminder timers, indexed by task.
//!
//! Re-arming a task replaces its entries wholesale. Entries are never
//! trusted on their own: the runner re-checks the task before delivering,
//! so an entry left behind by an edit or deletion fires as a no-op.

use crate::reminders::policy::target_times;
use crate::tasks::model::{OffsetKind, Task, TaskId};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// One armed reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedTimer {
    pub task_id: TaskId,
    pub kind: OffsetKind,
    pub target: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct TimerSet {
    by_task: BTreeMap<TaskId, Vec<ArmedTimer>>,
}

impl TimerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `task`'s timers with one per unsent reminder whose target is
    /// strictly after `now`. Returns the number armed.
    pub fn arm(&mut self, task: &Task, now: DateTime<Utc>) -> usize {
        self.by_task.remove(&task.id);
        let timers: Vec<ArmedTimer> = target_times(task)
            .filter(|(kind, target)| *target > now && !task.notifications_sent.is_sent(*kind))
            .map(|(kind, target)| ArmedTimer {
                task_id: task.id.clone(),
                kind,
                target,
            })
            .collect();
        let armed = timers.len();
        if armed > 0 {
            self.by_task.insert(task.id.clone(), timers);
        }
        armed
    }

    /// Drop every timer of `task_id`. Returns the number dropped.
    pub fn disarm(&mut self, task_id: &str) -> usize {
        self.by_task.remove(task_id).map_or(0, |t| t.len())
    }

    pub fn clear(&mut self) {
        self.by_task.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_task.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_task.is_empty()
    }

    /// Timers currently armed for `task_id`.
    #[must_use]
    pub fn armed_for(&self, task_id: &str) -> &[ArmedTimer] {
        self.by_task.get(task_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Earliest armed target.
    #[must_use]
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.by_task.values().flatten().map(|t| t.target).min()
    }

    /// Remove and return every timer whose target is at or before `now`,
    /// ordered by target then task id.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<ArmedTimer> {
        let mut due = Vec::new();
        self.by_task.retain(|_, timers| {
            let (fired, pending): (Vec<_>, Vec<_>) =
                timers.drain(..).partition(|t| t.target <= now);
            due.extend(fired);
            *timers = pending;
            !timers.is_empty()
        });
        due.sort_by(|a, b| {
            a.target
                .cmp(&b.target)
                .then_with(|| a.task_id.cmp(&b.task_id))
                .then_with(|| a.kind.cmp(&b.kind))
        });
        due
    }
}
