//! The task tracker: the active user's list, its persistence, and the
//! reminder scheduler wired together.
//!
//! Every mutating operation updates the in-memory list, re-arms the
//! affected timers, then persists. A failed save is returned to the caller
//! while the in-memory list stays authoritative; the next successful save
//! writes it out.

use crate::clock::{Clock, SystemClock};
use crate::config::TicklerConfig;
use crate::error::{Result, TicklerError};
use crate::notify::{AudioCue, NotificationSink, Permission};
use crate::reminders::ledger::{SentLedger, reset_on_date_change, reset_on_reminder_disable};
use crate::reminders::recurrence::{self, MonthOverflow};
use crate::scheduler::runner::{Delivered, ReminderScheduler, SchedulerSettings};
use crate::tasks::backup::{BackupInfo, BackupStore, DEFAULT_KEEP};
use crate::tasks::export;
use crate::tasks::model::{
    DEFAULT_CATEGORY, DuplicateOptions, NewTask, ReminderSet, Subtask, Task, TaskEdit, new_id,
};
use crate::tasks::query::{self, TaskQuery};
use crate::tasks::stats::TaskStats;
use crate::tasks::store::{JsonTaskStore, TaskStore, validate_user};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{error, info};

/// Tracker shared between the reminder service and command handlers.
pub type SharedTracker = Arc<Mutex<TaskTracker>>;

/// Result of [`TaskTracker::toggle_task`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleOutcome {
    /// The toggled task after the change.
    pub task: Task,
    /// Next instance created by completing a recurring task.
    pub successor: Option<Task>,
}

pub struct TaskTracker {
    user: String,
    tasks: Vec<Task>,
    store: Box<dyn TaskStore>,
    scheduler: ReminderScheduler,
    clock: Arc<dyn Clock>,
    month_overflow: MonthOverflow,
    backups: Option<BackupStore>,
    backup_keep: usize,
    last_backup: Option<NaiveDate>,
    rearm: Option<Arc<Notify>>,
}

impl std::fmt::Debug for TaskTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTracker")
            .field("user", &self.user)
            .field("tasks", &self.tasks.len())
            .field("scheduler", &self.scheduler)
            .field("month_overflow", &self.month_overflow)
            .finish_non_exhaustive()
    }
}

impl TaskTracker {
    /// Load `user`'s tasks from `store` and arm their reminders.
    ///
    /// # Errors
    ///
    /// Returns an error if the user name is invalid or the list cannot be loaded.
    pub fn open(
        user: &str,
        store: Box<dyn TaskStore>,
        scheduler: ReminderScheduler,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        validate_user(user)?;
        let tasks = store.load(user)?;
        let mut tracker = Self {
            user: user.to_owned(),
            tasks,
            store,
            scheduler,
            clock,
            month_overflow: MonthOverflow::default(),
            backups: None,
            backup_keep: DEFAULT_KEEP,
            last_backup: None,
            rearm: None,
        };
        let now = tracker.now();
        tracker.scheduler.arm_all(&tracker.tasks, now);
        info!("opened {} tasks for '{user}'", tracker.tasks.len());
        Ok(tracker)
    }

    /// Build a tracker with the JSON store, backups and scheduler settings
    /// described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured user's list cannot be loaded.
    pub fn from_config(
        config: &TicklerConfig,
        sink: Arc<dyn NotificationSink>,
        cue: Arc<dyn AudioCue>,
    ) -> Result<Self> {
        let root = config.storage.root();
        let settings = SchedulerSettings::from_config(&config.scheduler, &config.reminders);
        let scheduler = ReminderScheduler::new(settings, sink, cue);
        let tracker = Self::open(
            &config.storage.user,
            Box::new(JsonTaskStore::new(&root)),
            scheduler,
            Arc::new(SystemClock),
        )?
        .with_month_overflow(config.recurrence.month_overflow);
        Ok(if config.backup.enabled {
            tracker.with_backups(BackupStore::new(&root), config.backup.keep)
        } else {
            tracker
        })
    }

    #[must_use]
    pub fn with_month_overflow(mut self, overflow: MonthOverflow) -> Self {
        self.month_overflow = overflow;
        self
    }

    #[must_use]
    pub fn with_backups(mut self, backups: BackupStore, keep: usize) -> Self {
        self.backups = Some(backups);
        self.backup_keep = keep;
        self
    }

    /// Signal notified whenever timers are re-armed, so a sleeping service
    /// loop can recompute its next deadline.
    pub fn set_rearm_signal(&mut self, signal: Arc<Notify>) {
        self.rearm = Some(signal);
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Tasks in stored order (newest insertions first).
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[must_use]
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ---- task operations ----------------------------------------------

    /// Create a task at the top of the list.
    ///
    /// # Errors
    ///
    /// Returns [`TicklerError::InvalidTask`] for a blank title, or a store
    /// error if the list cannot be saved.
    pub fn create_task(&mut self, fields: NewTask) -> Result<Task> {
        let title = required_title(&fields.title)?;
        let mut task = Task::new(title, self.now());
        task.description = non_blank(fields.description);
        task.priority = fields.priority;
        task.category = category_or_default(fields.category);
        task.start_date = fields.start_date;
        task.due_date = fields.due_date;
        task.subtasks = fields
            .subtasks
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(Subtask::new)
            .collect();
        task.pinned = fields.pinned;
        task.recurring = fields.recurrence.is_some();
        task.recurrence = fields.recurrence;
        task.reminders = fields.reminders.unwrap_or_default();

        self.tasks.insert(0, task.clone());
        self.arm(&task);
        info!("created task {}", task.id);
        self.persist()?;
        Ok(task)
    }

    /// Apply a patch to a task.
    ///
    /// A changed start or due date clears the whole ledger; turning a
    /// reminder off clears its own entry. Either change also forgets
    /// deliveries queued for permission under the old settings.
    ///
    /// # Errors
    ///
    /// Returns [`TicklerError::TaskNotFound`], [`TicklerError::InvalidTask`]
    /// for a blank title or a recurring task without a unit, or a store error.
    pub fn edit_task(&mut self, id: &str, edit: TaskEdit) -> Result<Task> {
        let title = edit.title.as_deref().map(required_title).transpose()?;
        let index = self.index_of(id)?;
        let task = &mut self.tasks[index];

        let recurring = match (edit.recurring, edit.recurrence) {
            (Some(false), _) | (_, Some(None)) => (false, None),
            (_, Some(Some(unit))) => (true, Some(unit)),
            (Some(true), None) => match task.recurrence {
                Some(unit) => (true, Some(unit)),
                None => {
                    return Err(TicklerError::InvalidTask(
                        "a recurring task needs a recurrence".to_owned(),
                    ));
                }
            },
            (None, None) => (task.recurring, task.recurrence),
        };

        if let Some(title) = title {
            task.title = title;
        }
        if let Some(description) = edit.description {
            task.description = non_blank(description);
        }
        if let Some(priority) = edit.priority {
            task.priority = priority;
        }
        if let Some(category) = edit.category {
            task.category = category_or_default(Some(category));
        }
        if let Some(pinned) = edit.pinned {
            task.pinned = pinned;
        }
        (task.recurring, task.recurrence) = recurring;

        let start = edit.start_date.unwrap_or(task.start_date);
        let due = edit.due_date.unwrap_or(task.due_date);
        let mut rescheduled = false;
        if start != task.start_date || due != task.due_date {
            task.start_date = start;
            task.due_date = due;
            reset_on_date_change(task);
            rescheduled = true;
        }
        if let Some(reminders) = edit.reminders {
            task.reminders = reminders;
            reset_on_reminder_disable(task);
            rescheduled = true;
        }

        let task = task.clone();
        if rescheduled {
            self.scheduler.drop_awaiting(&task.id);
        }
        self.arm(&task);
        self.persist()?;
        Ok(task)
    }

    /// Flip completion. Completing a recurring task adds its next instance
    /// at the top of the list.
    ///
    /// # Errors
    ///
    /// Returns [`TicklerError::TaskNotFound`] or a store error.
    pub fn toggle_task(&mut self, id: &str) -> Result<ToggleOutcome> {
        let index = self.index_of(id)?;
        let now = self.now();
        let task = &mut self.tasks[index];
        task.completed = !task.completed;
        let task = task.clone();

        let successor = if task.completed {
            self.scheduler.disarm(&task.id);
            self.scheduler.drop_awaiting(&task.id);
            recurrence::advance(&task, now, self.month_overflow)
        } else {
            self.arm(&task);
            None
        };

        if let Some(next) = &successor {
            info!("task {} recurs as {}", task.id, next.id);
            self.tasks.insert(0, next.clone());
            self.arm(next);
        }
        self.persist()?;
        Ok(ToggleOutcome { task, successor })
    }

    /// Copy a task under a new id.
    ///
    /// The copy is open, unpinned, uses the default reminders and an empty
    /// ledger. Subtasks are copied reset to open when requested; dates are
    /// dropped when `reset_dates` is set.
    ///
    /// # Errors
    ///
    /// Returns [`TicklerError::TaskNotFound`] or a store error.
    pub fn duplicate_task(&mut self, id: &str, options: DuplicateOptions) -> Result<Task> {
        let original = &self.tasks[self.index_of(id)?];
        let mut copy = Task::new(format!("{} (copy)", original.title), self.now());
        copy.description = original.description.clone();
        copy.priority = original.priority;
        copy.category = original.category.clone();
        if !options.reset_dates {
            copy.start_date = original.start_date;
            copy.due_date = original.due_date;
        }
        if options.with_subtasks {
            copy.subtasks = original
                .subtasks
                .iter()
                .map(|s| Subtask::new(s.title.clone()))
                .collect();
        }
        copy.recurring = original.recurring;
        copy.recurrence = original.recurrence;
        copy.reminders = ReminderSet::default();

        self.tasks.insert(0, copy.clone());
        self.arm(&copy);
        self.persist()?;
        Ok(copy)
    }

    /// Remove a task. Its armed timers are dropped; any that slip through
    /// find no task and do nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TicklerError::TaskNotFound`] or a store error.
    pub fn delete_task(&mut self, id: &str) -> Result<Task> {
        let index = self.index_of(id)?;
        let removed = self.tasks.remove(index);
        self.scheduler.disarm(&removed.id);
        self.scheduler.drop_awaiting(&removed.id);
        info!("deleted task {}", removed.id);
        self.persist()?;
        Ok(removed)
    }

    /// Flip the pin flag. Returns the new state.
    ///
    /// # Errors
    ///
    /// Returns [`TicklerError::TaskNotFound`] or a store error.
    pub fn toggle_pin(&mut self, id: &str) -> Result<bool> {
        let index = self.index_of(id)?;
        let task = &mut self.tasks[index];
        task.pinned = !task.pinned;
        let pinned = task.pinned;
        self.persist()?;
        Ok(pinned)
    }

    /// # Errors
    ///
    /// Returns [`TicklerError::TaskNotFound`], [`TicklerError::InvalidTask`]
    /// for a blank title, or a store error.
    pub fn add_subtask(&mut self, task_id: &str, title: &str) -> Result<Subtask> {
        let title = required_title(title)?;
        let index = self.index_of(task_id)?;
        let subtask = Subtask::new(title);
        self.tasks[index].subtasks.push(subtask.clone());
        self.persist()?;
        Ok(subtask)
    }

    /// Flip a subtask's completion. The parent task is not affected.
    ///
    /// # Errors
    ///
    /// Returns [`TicklerError::TaskNotFound`] if either id is unknown, or a
    /// store error.
    pub fn toggle_subtask(&mut self, task_id: &str, subtask_id: &str) -> Result<bool> {
        let index = self.index_of(task_id)?;
        let subtask = self.tasks[index]
            .subtasks
            .iter_mut()
            .find(|s| s.id == subtask_id)
            .ok_or_else(|| TicklerError::TaskNotFound(format!("subtask {subtask_id}")))?;
        subtask.completed = !subtask.completed;
        let completed = subtask.completed;
        self.persist()?;
        Ok(completed)
    }

    /// # Errors
    ///
    /// Returns [`TicklerError::TaskNotFound`] if either id is unknown, or a
    /// store error.
    pub fn delete_subtask(&mut self, task_id: &str, subtask_id: &str) -> Result<()> {
        let index = self.index_of(task_id)?;
        let subtasks = &mut self.tasks[index].subtasks;
        let before = subtasks.len();
        subtasks.retain(|s| s.id != subtask_id);
        if subtasks.len() == before {
            return Err(TicklerError::TaskNotFound(format!("subtask {subtask_id}")));
        }
        self.persist()
    }

    // ---- views ----------------------------------------------------------

    #[must_use]
    pub fn filter_and_sort(&self, query: &TaskQuery) -> Vec<Task> {
        query::filter_and_sort(&self.tasks, query)
    }

    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        query::categories(&self.tasks)
    }

    #[must_use]
    pub fn stats(&self) -> TaskStats {
        TaskStats::compute(&self.tasks, self.now().date_naive())
    }

    // ---- import / export -------------------------------------------------

    /// Prepend imported tasks, keeping their order.
    ///
    /// Ids that collide with existing tasks (or each other) are replaced
    /// and every ledger starts empty. Returns the number imported.
    ///
    /// # Errors
    ///
    /// Returns a store error if the list cannot be saved.
    pub fn import_tasks(&mut self, mut imported: Vec<Task>) -> Result<usize> {
        let mut taken: HashSet<String> = self.tasks.iter().map(|t| t.id.clone()).collect();
        for task in &mut imported {
            if !taken.insert(task.id.clone()) {
                task.id = new_id();
                taken.insert(task.id.clone());
            }
            task.notifications_sent = SentLedger::default();
        }
        let count = imported.len();
        let now = self.now();
        for task in &imported {
            self.scheduler.arm(task, now);
        }
        self.tasks.splice(0..0, imported);
        self.signal_rearm();
        info!("imported {count} tasks");
        self.persist()?;
        Ok(count)
    }

    /// Import a JSON export.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is not a JSON task array or the list
    /// cannot be saved.
    pub fn import_json(&mut self, text: &str) -> Result<usize> {
        let tasks = export::import_json(text, self.now())?;
        self.import_tasks(tasks)
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export_json(&self) -> Result<String> {
        export::to_json(&self.tasks)
    }

    #[must_use]
    pub fn export_csv(&self) -> String {
        export::to_csv(&self.tasks)
    }

    // ---- backups ----------------------------------------------------------

    fn backup_store(&self) -> Result<&BackupStore> {
        self.backups
            .as_ref()
            .ok_or_else(|| TicklerError::Backup("backups are disabled".to_owned()))
    }

    /// # Errors
    ///
    /// Returns an error if backups are disabled or cannot be listed.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        self.backup_store()?.list(&self.user)
    }

    /// Snapshot the list now and rotate old snapshots.
    ///
    /// # Errors
    ///
    /// Returns an error if backups are disabled or the snapshot cannot be written.
    pub fn create_backup(&mut self) -> Result<BackupInfo> {
        let now = self.now();
        let backups = self.backup_store()?;
        let info = backups.create(&self.user, &self.tasks, now)?;
        backups.prune(&self.user, self.backup_keep)?;
        self.last_backup = Some(info.date);
        Ok(info)
    }

    /// Take today's snapshot unless one already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot directory cannot be read or written.
    pub fn backup_if_due(&mut self) -> Result<Option<BackupInfo>> {
        let Some(backups) = &self.backups else {
            return Ok(None);
        };
        if self.last_backup.is_none() {
            self.last_backup = backups.latest_date(&self.user)?;
        }
        let today = self.now().date_naive();
        if self.last_backup == Some(today) {
            return Ok(None);
        }
        self.create_backup().map(Some)
    }

    /// Replace the list with the snapshot taken on `date` and re-arm everything.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no such snapshot or the list cannot be saved.
    pub fn restore_backup(&mut self, date: NaiveDate) -> Result<usize> {
        let tasks = self.backup_store()?.load(&self.user, date)?;
        let count = tasks.len();
        self.tasks = tasks;
        let now = self.now();
        self.scheduler.clear_awaiting();
        self.scheduler.arm_all(&self.tasks, now);
        self.signal_rearm();
        info!("restored {count} tasks from backup {date}");
        self.persist()?;
        Ok(count)
    }

    // ---- scheduler entry points -----------------------------------------

    /// Deliver armed timers that have come due.
    ///
    /// # Errors
    ///
    /// Returns a store error if a delivery could not be persisted.
    pub fn fire_due_timers(&mut self) -> Result<Vec<Delivered>> {
        let now = self.now();
        let delivered = self.scheduler.fire_due(&mut self.tasks, now);
        self.persist_deliveries(&delivered)?;
        Ok(delivered)
    }

    /// Run one reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns a store error if a delivery could not be persisted.
    pub fn reconcile(&mut self) -> Result<Vec<Delivered>> {
        let now = self.now();
        let delivered = self.scheduler.reconcile(&mut self.tasks, now);
        self.persist_deliveries(&delivered)?;
        Ok(delivered)
    }

    /// Earliest armed timer.
    #[must_use]
    pub fn next_timer_deadline(&self) -> Option<DateTime<Utc>> {
        self.scheduler.next_deadline()
    }

    /// The user answered the notification permission prompt.
    ///
    /// # Errors
    ///
    /// Returns a store error if a delivery could not be persisted.
    pub fn permission_changed(&mut self, permission: Permission) -> Result<Vec<Delivered>> {
        let now = self.now();
        let delivered = self.scheduler.permission_changed(permission, &mut self.tasks, now);
        self.persist_deliveries(&delivered)?;
        Ok(delivered)
    }

    // ---- internals --------------------------------------------------------

    fn index_of(&self, id: &str) -> Result<usize> {
        self.tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TicklerError::TaskNotFound(id.to_owned()))
    }

    fn arm(&mut self, task: &Task) {
        let now = self.now();
        self.scheduler.arm(task, now);
        self.signal_rearm();
    }

    fn signal_rearm(&self) {
        if let Some(signal) = &self.rearm {
            signal.notify_one();
        }
    }

    fn persist_deliveries(&self, delivered: &[Delivered]) -> Result<()> {
        if delivered.is_empty() {
            Ok(())
        } else {
            self.persist()
        }
    }

    fn persist(&self) -> Result<()> {
        self.store.save(&self.user, &self.tasks).map_err(|e| {
            error!("failed to save tasks for '{}': {e}", self.user);
            e
        })
    }
}

fn required_title(raw: &str) -> Result<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(TicklerError::InvalidTask("title cannot be empty".to_owned()));
    }
    Ok(title.to_owned())
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty())
}

fn category_or_default(category: Option<String>) -> String {
    non_blank(category).unwrap_or_else(|| DEFAULT_CATEGORY.to_owned())
}
