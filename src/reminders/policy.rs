//! Pure mapping from a task's dates and enabled offsets to fire instants.

use crate::tasks::model::{DateAnchor, OffsetKind, Task};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Instant a calendar date stands for in reminder arithmetic (00:00 UTC).
#[must_use]
pub fn anchor_instant(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// When the `kind` reminder of `task` fires.
///
/// `None` when the task is completed, the reminder is disabled, or the
/// anchoring date is absent.
#[must_use]
pub fn target_time(task: &Task, kind: OffsetKind) -> Option<DateTime<Utc>> {
    if task.completed || !task.reminders.is_enabled(kind) {
        return None;
    }
    let date = match kind.anchor() {
        DateAnchor::Due => task.due_date?,
        DateAnchor::Start => task.start_date?,
    };
    anchor_instant(date).checked_sub_signed(kind.lead())
}

/// Every defined `(kind, target)` pair of `task`, in [`OffsetKind::ALL`] order.
pub fn target_times(task: &Task) -> impl Iterator<Item = (OffsetKind, DateTime<Utc>)> + '_ {
    OffsetKind::ALL
        .into_iter()
        .filter_map(move |kind| target_time(task, kind).map(|at| (kind, at)))
}
