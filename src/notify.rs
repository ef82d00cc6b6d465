//! Notification delivery collaborators.

use crate::error::Result;
use crate::tasks::model::{OffsetKind, Task};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Mutex;

/// Answer of a notification sink to a delivery attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Shown to the user.
    Granted,
    /// The user refused notifications; nothing was shown.
    Denied,
    /// The sink is still asking the user. Not yet a delivery.
    #[default]
    Pending,
}

/// Presents a notification to the user.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, title: &str, body: &str) -> Permission;
}

/// Best-effort audible cue played alongside a shown notification.
pub trait AudioCue: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the environment cannot produce sound. Callers
    /// log and ignore it.
    fn play(&self) -> Result<()>;
}

/// Rings the terminal bell on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl AudioCue for TerminalBell {
    fn play(&self) -> Result<()> {
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

/// No sound.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentCue;

impl AudioCue for SilentCue {
    fn play(&self) -> Result<()> {
        Ok(())
    }
}

/// Writes notifications to the log and answers with a fixed permission.
#[derive(Debug)]
pub struct LogSink {
    permission: Mutex<Permission>,
}

impl LogSink {
    #[must_use]
    pub fn new(permission: Permission) -> Self {
        Self {
            permission: Mutex::new(permission),
        }
    }

    /// Change the answer given to later deliveries.
    pub fn set_permission(&self, permission: Permission) {
        if let Ok(mut current) = self.permission.lock() {
            *current = permission;
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(Permission::Granted)
    }
}

impl NotificationSink for LogSink {
    fn deliver(&self, title: &str, body: &str) -> Permission {
        let permission = self
            .permission
            .lock()
            .map(|p| *p)
            .unwrap_or(Permission::Denied);
        if permission == Permission::Granted {
            tracing::info!(target: "tickler::notification", "{title}: {body}");
        }
        permission
    }
}

/// Title and body shown for one reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderMessage {
    pub title: String,
    pub body: String,
}

/// Notification title used for every reminder.
pub const REMINDER_TITLE: &str = "Task reminder";

#[must_use]
pub fn reminder_message(task: &Task, kind: OffsetKind) -> ReminderMessage {
    let lead = match kind {
        OffsetKind::OneWeek => "1 week",
        OffsetKind::ThreeDays => "3 days",
        OffsetKind::OneDay => "24 hours",
        OffsetKind::OneHour | OffsetKind::Start => "1 hour",
    };
    let verb = match kind {
        OffsetKind::Start => "starts",
        _ => "is due",
    };
    ReminderMessage {
        title: REMINDER_TITLE.to_owned(),
        body: format!("Reminder: the task \"{}\" {verb} in {lead}!", task.title),
    }
}
