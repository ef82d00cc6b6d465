//! Production host command handler backed by the shared task tracker.

use crate::error::{Result, TicklerError};
use crate::host::channel::TaskCommandHandler;
use crate::host::contract::{EVENT_PERMISSION_REQUESTED, EVENT_REMINDER_FIRED, EventEnvelope};
use crate::notify::{NotificationSink, Permission};
use crate::tasks::backup::BackupInfo;
use crate::tasks::model::{DuplicateOptions, NewTask, Subtask, Task, TaskEdit};
use crate::tasks::query::TaskQuery;
use crate::tasks::stats::TaskStats;
use crate::tracker::{SharedTracker, TaskTracker, ToggleOutcome};
use chrono::NaiveDate;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Notification sink that forwards reminders to the host as events.
///
/// The host shows the notification itself, so the answer given to the
/// scheduler is whatever permission the host UI last reported. Until it
/// reports one, deliveries are held as pending.
pub struct HostNotificationSink {
    event_tx: broadcast::Sender<EventEnvelope>,
    permission: Mutex<Permission>,
}

impl HostNotificationSink {
    #[must_use]
    pub fn new(event_tx: broadcast::Sender<EventEnvelope>) -> Self {
        Self {
            event_tx,
            permission: Mutex::new(Permission::Pending),
        }
    }

    #[must_use]
    pub fn permission(&self) -> Permission {
        self.permission
            .lock()
            .map(|p| *p)
            .unwrap_or(Permission::Denied)
    }

    pub fn set_permission(&self, permission: Permission) {
        if let Ok(mut current) = self.permission.lock() {
            *current = permission;
        }
    }

    fn emit(&self, event: &str, title: &str, body: &str) {
        let envelope = EventEnvelope::new(
            event,
            serde_json::json!({"title": title, "body": body}),
        );
        let _ = self.event_tx.send(envelope);
    }
}

impl NotificationSink for HostNotificationSink {
    fn deliver(&self, title: &str, body: &str) -> Permission {
        let permission = self.permission();
        match permission {
            Permission::Granted => self.emit(EVENT_REMINDER_FIRED, title, body),
            Permission::Pending => self.emit(EVENT_PERMISSION_REQUESTED, title, body),
            Permission::Denied => {}
        }
        permission
    }
}

/// Routes host commands to the shared [`TaskTracker`].
pub struct TrackerCommandHandler {
    tracker: SharedTracker,
    sink: Arc<HostNotificationSink>,
    stop: CancellationToken,
}

impl TrackerCommandHandler {
    /// `sink` must be the sink the tracker's scheduler delivers through;
    /// `stop` is cancelled on `runtime.stop`.
    #[must_use]
    pub fn new(
        tracker: SharedTracker,
        sink: Arc<HostNotificationSink>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            tracker,
            sink,
            stop,
        }
    }

    /// Acquire the tracker, mapping a poisoned mutex to a scheduler error.
    fn lock_tracker(&self) -> Result<MutexGuard<'_, TaskTracker>> {
        self.tracker
            .lock()
            .map_err(|e| TicklerError::Scheduler(format!("tracker lock poisoned: {e}")))
    }
}

impl TaskCommandHandler for TrackerCommandHandler {
    fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        Ok(self.lock_tracker()?.filter_and_sort(query))
    }

    fn create_task(&self, fields: NewTask) -> Result<Task> {
        self.lock_tracker()?.create_task(fields)
    }

    fn edit_task(&self, id: &str, edit: TaskEdit) -> Result<Task> {
        self.lock_tracker()?.edit_task(id, edit)
    }

    fn toggle_task(&self, id: &str) -> Result<ToggleOutcome> {
        self.lock_tracker()?.toggle_task(id)
    }

    fn duplicate_task(&self, id: &str, options: DuplicateOptions) -> Result<Task> {
        self.lock_tracker()?.duplicate_task(id, options)
    }

    fn delete_task(&self, id: &str) -> Result<Task> {
        self.lock_tracker()?.delete_task(id)
    }

    fn toggle_pin(&self, id: &str) -> Result<bool> {
        self.lock_tracker()?.toggle_pin(id)
    }

    fn add_subtask(&self, task_id: &str, title: &str) -> Result<Subtask> {
        self.lock_tracker()?.add_subtask(task_id, title)
    }

    fn toggle_subtask(&self, task_id: &str, subtask_id: &str) -> Result<bool> {
        self.lock_tracker()?.toggle_subtask(task_id, subtask_id)
    }

    fn delete_subtask(&self, task_id: &str, subtask_id: &str) -> Result<()> {
        self.lock_tracker()?.delete_subtask(task_id, subtask_id)
    }

    fn stats(&self) -> Result<TaskStats> {
        Ok(self.lock_tracker()?.stats())
    }

    fn categories(&self) -> Result<Vec<String>> {
        Ok(self.lock_tracker()?.categories())
    }

    fn import_json(&self, text: &str) -> Result<usize> {
        self.lock_tracker()?.import_json(text)
    }

    fn export_json(&self) -> Result<String> {
        self.lock_tracker()?.export_json()
    }

    fn export_csv(&self) -> Result<String> {
        Ok(self.lock_tracker()?.export_csv())
    }

    fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        self.lock_tracker()?.list_backups()
    }

    fn restore_backup(&self, date: NaiveDate) -> Result<usize> {
        self.lock_tracker()?.restore_backup(date)
    }

    fn set_notification_permission(&self, permission: Permission) -> Result<usize> {
        // The sink answers with the new permission before held reminders are retried.
        self.sink.set_permission(permission);
        let delivered = self.lock_tracker()?.permission_changed(permission)?;
        info!(
            "notification permission is now {permission:?}, delivered {} held reminders",
            delivered.len()
        );
        Ok(delivered.len())
    }

    fn request_runtime_stop(&self) -> Result<()> {
        info!("runtime stop requested by host");
        self.stop.cancel();
        Ok(())
    }
}
