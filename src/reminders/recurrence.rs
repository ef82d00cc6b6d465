//! Successor generation for recurring tasks.

use crate::tasks::model::{Recurrence, Task, new_id};
use crate::reminders::ledger::SentLedger;
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// How a monthly step treats a day that does not exist in the next month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthOverflow {
    /// Clamp to the last day of the next month (Jan 31 -> Feb 29).
    #[default]
    Clamp,
    /// Let surplus days spill into the month after (Jan 31 -> Mar 2).
    RollOver,
}

/// Advance `date` by one recurrence unit.
///
/// Returns `date` unchanged if the step leaves chrono's supported range.
#[must_use]
pub fn advance_date(date: NaiveDate, unit: Recurrence, overflow: MonthOverflow) -> NaiveDate {
    let next = match unit {
        Recurrence::Daily => date.checked_add_days(Days::new(1)),
        Recurrence::Weekly => date.checked_add_days(Days::new(7)),
        Recurrence::Monthly => match overflow {
            MonthOverflow::Clamp => date.checked_add_months(Months::new(1)),
            MonthOverflow::RollOver => date
                .with_day(1)
                .and_then(|first| first.checked_add_months(Months::new(1)))
                .and_then(|first| first.checked_add_days(Days::new(u64::from(date.day() - 1)))),
        },
    };
    next.unwrap_or_else(|| {
        tracing::warn!("recurrence step from {date} is out of range, keeping date");
        date
    })
}

/// Derive the next instance of a recurring task that was just completed.
///
/// Everything is copied except the id, completion, creation time and
/// ledger; a present due date moves forward by the recurrence unit. The
/// start date is carried over as is. Returns `None` for a task that is
/// not recurring.
#[must_use]
pub fn advance(task: &Task, now: DateTime<Utc>, overflow: MonthOverflow) -> Option<Task> {
    let unit = task.active_recurrence()?;
    let mut next = task.clone();
    next.id = new_id();
    next.completed = false;
    next.created_at = now;
    next.notifications_sent = SentLedger::default();
    next.due_date = task.due_date.map(|due| advance_date(due, unit, overflow));
    Some(next)
}
