//! Per-task record of delivered reminders.
//!
//! The ledger is what makes delivery at-most-once: every path that can
//! fire a reminder (armed timer, reconciliation pass, permission grant)
//! checks it immediately before delivering.

use crate::reminders::policy::target_time;
use crate::tasks::model::{OffsetKind, Task};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// How long after its target a reminder may still be delivered.
pub const DEFAULT_TOLERANCE: TimeDelta = TimeDelta::minutes(5);

/// Which offsets have fired for the current task dates. All false by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentLedger {
    #[serde(rename = "1week")]
    pub one_week: bool,
    #[serde(rename = "3days")]
    pub three_days: bool,
    #[serde(rename = "24h")]
    pub one_day: bool,
    #[serde(rename = "1h")]
    pub one_hour: bool,
    pub start: bool,
}

impl SentLedger {
    #[must_use]
    pub fn is_sent(&self, kind: OffsetKind) -> bool {
        match kind {
            OffsetKind::OneWeek => self.one_week,
            OffsetKind::ThreeDays => self.three_days,
            OffsetKind::OneDay => self.one_day,
            OffsetKind::OneHour => self.one_hour,
            OffsetKind::Start => self.start,
        }
    }

    fn set(&mut self, kind: OffsetKind, sent: bool) {
        match kind {
            OffsetKind::OneWeek => self.one_week = sent,
            OffsetKind::ThreeDays => self.three_days = sent,
            OffsetKind::OneDay => self.one_day = sent,
            OffsetKind::OneHour => self.one_hour = sent,
            OffsetKind::Start => self.start = sent,
        }
    }

    /// Offsets already delivered.
    pub fn sent_kinds(&self) -> impl Iterator<Item = OffsetKind> + '_ {
        OffsetKind::ALL.into_iter().filter(|k| self.is_sent(*k))
    }
}

/// Whether the `kind` reminder of `task` should be delivered at `now`.
///
/// True iff the target is defined, has passed by no more than `tolerance`
/// (both ends inclusive), has not been delivered, and the task is open.
/// A reminder never fires ahead of its target.
#[must_use]
pub fn should_deliver(
    task: &Task,
    kind: OffsetKind,
    now: DateTime<Utc>,
    tolerance: TimeDelta,
) -> bool {
    if task.completed || task.notifications_sent.is_sent(kind) {
        return false;
    }
    match target_time(task, kind) {
        Some(target) => target <= now && now - target <= tolerance,
        None => false,
    }
}

/// Record delivery of `kind`. Returns `false` when it was already recorded.
///
/// The caller persists the task afterwards.
pub fn mark_delivered(task: &mut Task, kind: OffsetKind) -> bool {
    if task.notifications_sent.is_sent(kind) {
        return false;
    }
    task.notifications_sent.set(kind, true);
    true
}

/// Forget every delivery; used when the start or due date changes.
pub fn reset_on_date_change(task: &mut Task) {
    task.notifications_sent = SentLedger::default();
}

/// Clear the ledger entry of every disabled reminder, leaving others alone.
pub fn reset_on_reminder_disable(task: &mut Task) {
    for kind in OffsetKind::ALL {
        if !task.reminders.is_enabled(kind) {
            task.notifications_sent.set(kind, false);
        }
    }
}
