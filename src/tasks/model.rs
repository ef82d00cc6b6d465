//! Task data model.
//!
//! Field names serialize in camelCase so exported JSON matches the
//! on-disk task files verbatim.

use crate::reminders::ledger::SentLedger;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Stable task/subtask identifier.
pub type TaskId = String;

/// Category assigned when none is given.
pub const DEFAULT_CATEGORY: &str = "General";

/// Generate a fresh identifier.
#[must_use]
pub fn new_id() -> TaskId {
    uuid::Uuid::new_v4().to_string()
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Sort rank: high=0 < medium=1 < low=2.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Recurrence unit of a recurring task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Daily,
    Weekly,
    Monthly,
}

/// Which task date a reminder offset counts back from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateAnchor {
    Due,
    Start,
}

/// One of the five reminder lead times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OffsetKind {
    #[serde(rename = "1week")]
    OneWeek,
    #[serde(rename = "3days")]
    ThreeDays,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "start")]
    Start,
}

impl OffsetKind {
    /// Every offset kind, in delivery order for a single task.
    pub const ALL: [Self; 5] = [
        Self::OneWeek,
        Self::ThreeDays,
        Self::OneDay,
        Self::OneHour,
        Self::Start,
    ];

    /// Render to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneWeek => "1week",
            Self::ThreeDays => "3days",
            Self::OneDay => "24h",
            Self::OneHour => "1h",
            Self::Start => "start",
        }
    }

    /// Parse from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw.trim())
    }

    /// How long before the anchor date the reminder fires.
    #[must_use]
    pub fn lead(self) -> TimeDelta {
        match self {
            Self::OneWeek => TimeDelta::days(7),
            Self::ThreeDays => TimeDelta::days(3),
            Self::OneDay => TimeDelta::hours(24),
            Self::OneHour | Self::Start => TimeDelta::hours(1),
        }
    }

    #[must_use]
    pub fn anchor(self) -> DateAnchor {
        match self {
            Self::Start => DateAnchor::Start,
            _ => DateAnchor::Due,
        }
    }
}

impl std::fmt::Display for OffsetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enabled reminder offsets. Defaults to `24h` and `1h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderSet {
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

impl Default for ReminderSet {
    fn default() -> Self {
        Self {
            one_week: false,
            three_days: false,
            one_day: true,
            one_hour: true,
            start: false,
        }
    }
}

impl ReminderSet {
    /// No reminder enabled.
    #[must_use]
    pub fn none() -> Self {
        Self {
            one_week: false,
            three_days: false,
            one_day: false,
            one_hour: false,
            start: false,
        }
    }

    #[must_use]
    pub fn is_enabled(&self, kind: OffsetKind) -> bool {
        match kind {
            OffsetKind::OneWeek => self.one_week,
            OffsetKind::ThreeDays => self.three_days,
            OffsetKind::OneDay => self.one_day,
            OffsetKind::OneHour => self.one_hour,
            OffsetKind::Start => self.start,
        }
    }

    pub fn set(&mut self, kind: OffsetKind, enabled: bool) {
        match kind {
            OffsetKind::OneWeek => self.one_week = enabled,
            OffsetKind::ThreeDays => self.three_days = enabled,
            OffsetKind::OneDay => self.one_day = enabled,
            OffsetKind::OneHour => self.one_hour = enabled,
            OffsetKind::Start => self.start = enabled,
        }
    }

    /// Builder-style variant of [`Self::set`].
    #[must_use]
    pub fn with(mut self, kind: OffsetKind, enabled: bool) -> Self {
        self.set(kind, enabled);
        self
    }
}

/// A checklist item inside a task. Its completion never affects the parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    #[serde(deserialize_with = "lenient_id")]
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

impl Subtask {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            completed: false,
        }
    }
}

/// The unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(deserialize_with = "lenient_id")]
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default, with = "lenient_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, with = "lenient_date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub reminders: ReminderSet,
    #[serde(default)]
    pub notifications_sent: SentLedger,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_owned()
}

impl Task {
    /// A new, uncompleted task with default reminders and an empty ledger.
    #[must_use]
    pub fn new(title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            description: None,
            completed: false,
            priority: Priority::default(),
            category: default_category(),
            start_date: None,
            due_date: None,
            created_at,
            subtasks: Vec::new(),
            pinned: false,
            recurring: false,
            recurrence: None,
            reminders: ReminderSet::default(),
            notifications_sent: SentLedger::default(),
        }
    }

    /// Recurrence unit when the task is marked recurring.
    #[must_use]
    pub fn active_recurrence(&self) -> Option<Recurrence> {
        if self.recurring { self.recurrence } else { None }
    }

    #[must_use]
    pub fn subtask(&self, subtask_id: &str) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == subtask_id)
    }
}

/// Fields for [`crate::TaskTracker::create_task`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub category: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    /// Titles of subtasks created alongside the task.
    pub subtasks: Vec<String>,
    pub pinned: bool,
    pub recurrence: Option<Recurrence>,
    /// None = default reminders.
    pub reminders: Option<ReminderSet>,
}

impl NewTask {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Patch for [`crate::TaskTracker::edit_task`]. Absent fields are left untouched.
///
/// Clearable fields use a nested option: `Some(None)` (JSON `null`) clears,
/// `None` (field omitted) keeps the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskEdit {
    pub title: Option<String>,
    #[serde(deserialize_with = "present")]
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    #[serde(deserialize_with = "present")]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(deserialize_with = "present")]
    pub due_date: Option<Option<NaiveDate>>,
    pub pinned: Option<bool>,
    pub recurring: Option<bool>,
    #[serde(deserialize_with = "present")]
    pub recurrence: Option<Option<Recurrence>>,
    pub reminders: Option<ReminderSet>,
}

/// Options for [`crate::TaskTracker::duplicate_task`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DuplicateOptions {
    pub with_subtasks: bool,
    pub reset_dates: bool,
}

/// Marks a field as present so `null` maps to `Some(None)`.
fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Accept string or numeric identifiers; older task files used millisecond timestamps.
fn lenient_id<'de, D>(deserializer: D) -> Result<TaskId, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or numeric id, got {other}"
        ))),
    }
}

/// `YYYY-MM-DD` dates where a malformed stored value reads as absent.
pub mod lenient_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => serializer.serialize_str(&date.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(serde_json::Value::String(raw)) => parse(&raw),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => {
                tracing::debug!("ignoring non-string task date {other}");
                None
            }
        })
    }

    /// Parse `YYYY-MM-DD`, also accepting an RFC 3339 timestamp's date part.
    #[must_use]
    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let date_part = trimmed.get(..10).unwrap_or(trimmed);
        match NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(e) => {
                tracing::debug!("ignoring malformed task date '{trimmed}': {e}");
                None
            }
        }
    }
}
