//! Reminder delivery decisions.
//!
//! [`ReminderScheduler`] owns the armed timer set, the queue of deliveries
//! awaiting notification permission and the time of the last
//! reconciliation pass. It never owns tasks: every entry point borrows the
//! live task list, so a delivery always sees the current task state and a
//! timer for a deleted or edited task falls through as a no-op.

use crate::config::{ReminderConfig, SchedulerConfig};
use crate::notify::{AudioCue, NotificationSink, Permission, reminder_message};
use crate::reminders::ledger::{DEFAULT_TOLERANCE, mark_delivered, should_deliver};
use crate::reminders::policy::target_time;
use crate::scheduler::timers::TimerSet;
use crate::tasks::model::{OffsetKind, Task, TaskId};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Timing and delivery knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Cadence of reconciliation passes.
    pub interval: TimeDelta,
    /// How late a reminder may still be delivered.
    pub tolerance: TimeDelta,
    /// Deliver reminders missed while the process was suspended.
    pub catch_up_on_resume: bool,
    /// Play the audio cue on delivery.
    pub sound_enabled: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval: TimeDelta::seconds(60),
            tolerance: DEFAULT_TOLERANCE,
            catch_up_on_resume: true,
            sound_enabled: true,
        }
    }
}

impl SchedulerSettings {
    #[must_use]
    pub fn from_config(scheduler: &SchedulerConfig, reminders: &ReminderConfig) -> Self {
        Self {
            interval: secs(scheduler.reconcile_interval_secs),
            tolerance: secs(scheduler.tolerance_secs),
            catch_up_on_resume: scheduler.catch_up_on_resume,
            sound_enabled: reminders.sound_enabled,
        }
    }
}

fn secs(value: u64) -> TimeDelta {
    TimeDelta::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1_000))
}

/// A reminder that was shown and recorded in its task's ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub task_id: TaskId,
    pub kind: OffsetKind,
}

/// A delivery held back until the user answers the permission prompt.
pub type AwaitingDelivery = (TaskId, OffsetKind, DateTime<Utc>);

pub struct ReminderScheduler {
    settings: SchedulerSettings,
    timers: TimerSet,
    /// Deliveries answered `Pending`, retried on a permission grant. The
    /// target is part of the key so a date edit orphans the entry.
    awaiting_permission: BTreeSet<AwaitingDelivery>,
    last_pass: Option<DateTime<Utc>>,
    sink: Arc<dyn NotificationSink>,
    cue: Arc<dyn AudioCue>,
}

impl std::fmt::Debug for ReminderScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderScheduler")
            .field("settings", &self.settings)
            .field("armed", &self.timers.len())
            .field("awaiting_permission", &self.awaiting_permission.len())
            .field("last_pass", &self.last_pass)
            .finish_non_exhaustive()
    }
}

impl ReminderScheduler {
    #[must_use]
    pub fn new(
        settings: SchedulerSettings,
        sink: Arc<dyn NotificationSink>,
        cue: Arc<dyn AudioCue>,
    ) -> Self {
        Self {
            settings,
            timers: TimerSet::new(),
            awaiting_permission: BTreeSet::new(),
            last_pass: None,
            sink,
            cue,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    #[must_use]
    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    /// Deliveries waiting for the user to answer the permission prompt.
    pub fn awaiting_permission(&self) -> impl Iterator<Item = &AwaitingDelivery> {
        self.awaiting_permission.iter()
    }

    /// Forget queued deliveries for one task.
    pub fn drop_awaiting(&mut self, task_id: &str) {
        let before = self.awaiting_permission.len();
        self.awaiting_permission.retain(|(id, _, _)| id != task_id);
        let dropped = before - self.awaiting_permission.len();
        if dropped > 0 {
            debug!("dropped {dropped} queued reminders for task {task_id}");
        }
    }

    /// Forget every queued delivery.
    pub fn clear_awaiting(&mut self) {
        self.awaiting_permission.clear();
    }

    /// Re-derive `task`'s timers from scratch.
    pub fn arm(&mut self, task: &Task, now: DateTime<Utc>) {
        let armed = self.timers.arm(task, now);
        debug!("armed {armed} reminder timers for task {}", task.id);
    }

    /// Re-derive timers for a whole freshly loaded list.
    pub fn arm_all(&mut self, tasks: &[Task], now: DateTime<Utc>) {
        self.timers.clear();
        for task in tasks {
            self.timers.arm(task, now);
        }
        info!("armed {} reminder timers for {} tasks", self.timers.len(), tasks.len());
    }

    pub fn disarm(&mut self, task_id: &str) {
        self.timers.disarm(task_id);
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.next_deadline()
    }

    /// Deliver every armed timer that has come due.
    ///
    /// A timer whose task is gone, or whose task no longer yields the same
    /// target, is dropped without effect.
    pub fn fire_due(&mut self, tasks: &mut [Task], now: DateTime<Utc>) -> Vec<Delivered> {
        let mut delivered = Vec::new();
        for timer in self.timers.take_due(now) {
            let Some(task) = tasks.iter_mut().find(|t| t.id == timer.task_id) else {
                debug!("timer {} for deleted task {} ignored", timer.kind, timer.task_id);
                continue;
            };
            if target_time(task, timer.kind) != Some(timer.target) {
                debug!("stale {} timer for task {} ignored", timer.kind, task.id);
                continue;
            }
            if !should_deliver(task, timer.kind, now, self.settings.tolerance) {
                debug!(
                    "{} timer for task {} fired outside the delivery window",
                    timer.kind, task.id
                );
                continue;
            }
            if let Some(done) = self.deliver(task, timer.kind, timer.target) {
                delivered.push(done);
            }
        }
        delivered
    }

    /// Scan every task for reminders that are due now.
    ///
    /// Tasks are visited in list order and kinds in [`OffsetKind::ALL`]
    /// order. When the previous pass is further back than one interval
    /// plus the tolerance, the window is widened back to that pass so
    /// reminders that fell due during a suspension still fire once.
    pub fn reconcile(&mut self, tasks: &mut [Task], now: DateTime<Utc>) -> Vec<Delivered> {
        let tolerance = self.settings.tolerance;
        let catch_up_from = self.catch_up_start(now);
        if let Some(from) = catch_up_from {
            info!("resumed after a gap, catching up on reminders since {from}");
        }

        let mut delivered = Vec::new();
        for task in tasks.iter_mut() {
            if task.completed {
                continue;
            }
            for kind in OffsetKind::ALL {
                let Some(target) = target_time(task, kind) else {
                    continue;
                };
                if self.awaiting_permission.contains(&(task.id.clone(), kind, target)) {
                    continue;
                }
                let due_now = should_deliver(task, kind, now, tolerance);
                let missed = catch_up_from.is_some_and(|from| {
                    !task.notifications_sent.is_sent(kind) && from <= target && target <= now
                });
                if !(due_now || missed) {
                    continue;
                }
                if let Some(done) = self.deliver(task, kind, target) {
                    delivered.push(done);
                }
            }
        }
        self.last_pass = Some(now);
        delivered
    }

    fn catch_up_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.settings.catch_up_on_resume {
            return None;
        }
        let last = self.last_pass?;
        let gap = now - last;
        if gap > self.settings.interval + self.settings.tolerance {
            Some(last - self.settings.tolerance)
        } else {
            None
        }
    }

    /// React to the user answering the notification permission prompt.
    ///
    /// On a grant, a queued delivery is retried only while its task still
    /// yields the queued target and `now` is inside that target's window.
    /// A denial drops the queue.
    pub fn permission_changed(
        &mut self,
        permission: Permission,
        tasks: &mut [Task],
        now: DateTime<Utc>,
    ) -> Vec<Delivered> {
        match permission {
            Permission::Pending => Vec::new(),
            Permission::Denied => {
                let dropped = self.awaiting_permission.len();
                self.awaiting_permission.clear();
                warn!("notification permission denied, dropped {dropped} queued reminders");
                Vec::new()
            }
            Permission::Granted => {
                let queued = std::mem::take(&mut self.awaiting_permission);
                let mut delivered = Vec::new();
                for (task_id, kind, target) in queued {
                    let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) else {
                        continue;
                    };
                    if target_time(task, kind) != Some(target) {
                        debug!("queued {kind} reminder for task {task_id} no longer matches");
                        continue;
                    }
                    if !should_deliver(task, kind, now, self.settings.tolerance) {
                        debug!("queued {kind} reminder for task {task_id} is outside its window");
                        continue;
                    }
                    if let Some(done) = self.deliver(task, kind, target) {
                        delivered.push(done);
                    }
                }
                delivered
            }
        }
    }

    /// Show one reminder and record it on success.
    fn deliver(
        &mut self,
        task: &mut Task,
        kind: OffsetKind,
        target: DateTime<Utc>,
    ) -> Option<Delivered> {
        let message = reminder_message(task, kind);
        let key = (task.id.clone(), kind, target);
        match self.sink.deliver(&message.title, &message.body) {
            Permission::Granted => {
                self.awaiting_permission.remove(&key);
                if self.settings.sound_enabled {
                    if let Err(e) = self.cue.play() {
                        debug!("audio cue failed: {e}");
                    }
                }
                if !mark_delivered(task, kind) {
                    return None;
                }
                info!("delivered {kind} reminder for task {}", task.id);
                Some(Delivered {
                    task_id: task.id.clone(),
                    kind,
                })
            }
            Permission::Pending => {
                info!("{kind} reminder for task {} awaits notification permission", task.id);
                self.awaiting_permission.insert(key);
                None
            }
            Permission::Denied => {
                warn!(
                    "notification permission denied, skipped {kind} reminder for task {}",
                    task.id
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::error::{Result, TicklerError};
    use crate::reminders::policy::anchor_instant;
    use chrono::{NaiveDate, TimeZone};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingSink {
        answer: Mutex<Option<Permission>>,
        shown: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn answering(permission: Permission) -> Arc<Self> {
            let sink = Self::default();
            *sink.answer.lock().unwrap() = Some(permission);
            Arc::new(sink)
        }

        fn set(&self, permission: Permission) {
            *self.answer.lock().unwrap() = Some(permission);
        }

        fn shown(&self) -> usize {
            self.shown.lock().unwrap().len()
        }
    }

    impl NotificationSink for RecordingSink {
        fn deliver(&self, _title: &str, body: &str) -> Permission {
            let answer = self.answer.lock().unwrap().unwrap_or(Permission::Granted);
            if answer == Permission::Granted {
                self.shown.lock().unwrap().push(body.to_owned());
            }
            answer
        }
    }

    #[derive(Default)]
    struct BrokenCue {
        attempts: AtomicUsize,
    }

    impl AudioCue for BrokenCue {
        fn play(&self) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TicklerError::Io(std::io::Error::other("no audio device")))
        }
    }

    fn scheduler(sink: Arc<RecordingSink>) -> ReminderScheduler {
        ReminderScheduler::new(
            SchedulerSettings::default(),
            sink,
            Arc::new(crate::notify::SilentCue),
        )
    }

    fn due_on(y: i32, m: u32, d: u32) -> Task {
        let mut task = Task::new("Renew lease", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        task.due_date = NaiveDate::from_ymd_opt(y, m, d);
        task
    }

    fn one_hour_target(task: &Task) -> DateTime<Utc> {
        target_time(task, OffsetKind::OneHour).unwrap()
    }

    #[test]
    fn timer_delivers_once_and_marks_ledger() {
        let sink = RecordingSink::answering(Permission::Granted);
        let mut sched = scheduler(Arc::clone(&sink));
        let mut tasks = vec![due_on(2024, 6, 10)];
        let target = one_hour_target(&tasks[0]);

        sched.arm(&tasks[0], target - TimeDelta::minutes(30));
        assert_eq!(sched.timers().len(), 1);
        let delivered = sched.fire_due(&mut tasks, target);
        assert_eq!(delivered.len(), 1);
        assert!(tasks[0].notifications_sent.is_sent(OffsetKind::OneHour));

        assert!(sched.reconcile(&mut tasks, target).is_empty());
        assert_eq!(sink.shown(), 1);
    }

    #[test]
    fn stale_timer_after_date_edit_is_noop() {
        let sink = RecordingSink::answering(Permission::Granted);
        let mut sched = scheduler(Arc::clone(&sink));
        let mut tasks = vec![due_on(2024, 6, 10)];
        let old_target = one_hour_target(&tasks[0]);
        sched.arm(&tasks[0], old_target - TimeDelta::days(2));

        // Edited without re-arming: the old entries must not fire.
        tasks[0].due_date = NaiveDate::from_ymd_opt(2024, 7, 10);
        assert!(sched.fire_due(&mut tasks, old_target).is_empty());
        assert_eq!(sink.shown(), 0);
    }

    #[test]
    fn timer_for_deleted_task_is_noop() {
        let sink = RecordingSink::answering(Permission::Granted);
        let mut sched = scheduler(Arc::clone(&sink));
        let task = due_on(2024, 6, 10);
        let target = one_hour_target(&task);
        sched.arm(&task, target - TimeDelta::days(2));

        let mut remaining: Vec<Task> = Vec::new();
        assert!(sched.fire_due(&mut remaining, target).is_empty());
        assert_eq!(sched.timers().len(), 0);
    }

    #[test]
    fn reconcile_catches_unarmed_reminder_within_tolerance() {
        let sink = RecordingSink::answering(Permission::Granted);
        let mut sched = scheduler(Arc::clone(&sink));
        let mut tasks = vec![due_on(2024, 6, 10)];
        let target = one_hour_target(&tasks[0]);

        let delivered = sched.reconcile(&mut tasks, target + TimeDelta::minutes(3));
        assert_eq!(
            delivered,
            [Delivered {
                task_id: tasks[0].id.clone(),
                kind: OffsetKind::OneHour
            }]
        );
    }

    #[test]
    fn denied_permission_leaves_ledger_unset() {
        let sink = RecordingSink::answering(Permission::Denied);
        let mut sched = scheduler(Arc::clone(&sink));
        let mut tasks = vec![due_on(2024, 6, 10)];
        let target = one_hour_target(&tasks[0]);

        assert!(sched.reconcile(&mut tasks, target).is_empty());
        assert!(!tasks[0].notifications_sent.is_sent(OffsetKind::OneHour));
        assert_eq!(sched.awaiting_permission().count(), 0);

        sink.set(Permission::Granted);
        let retry = sched.reconcile(&mut tasks, target + TimeDelta::minutes(1));
        assert_eq!(retry.len(), 1);
    }

    #[test]
    fn pending_permission_is_retried_on_grant() {
        let sink = RecordingSink::answering(Permission::Pending);
        let mut sched = scheduler(Arc::clone(&sink));
        let mut tasks = vec![due_on(2024, 6, 10)];
        let target = one_hour_target(&tasks[0]);

        assert!(sched.reconcile(&mut tasks, target).is_empty());
        assert_eq!(sched.awaiting_permission().count(), 1);
        // Still queued: a second pass does not prompt again.
        assert!(sched.reconcile(&mut tasks, target + TimeDelta::minutes(1)).is_empty());

        sink.set(Permission::Granted);
        let now = target + TimeDelta::minutes(2);
        let delivered = sched.permission_changed(Permission::Granted, &mut tasks, now);
        assert_eq!(delivered.len(), 1);
        assert!(tasks[0].notifications_sent.is_sent(OffsetKind::OneHour));
        assert_eq!(sched.awaiting_permission().count(), 0);
    }

    #[test]
    fn grant_skips_entries_completed_meanwhile() {
        let sink = RecordingSink::answering(Permission::Pending);
        let mut sched = scheduler(Arc::clone(&sink));
        let mut tasks = vec![due_on(2024, 6, 10)];
        let target = one_hour_target(&tasks[0]);
        sched.reconcile(&mut tasks, target);

        tasks[0].completed = true;
        sink.set(Permission::Granted);
        assert!(sched.permission_changed(Permission::Granted, &mut tasks, target).is_empty());
        assert_eq!(sink.shown(), 0);
    }

    #[test]
    fn grant_after_date_edit_delivers_nothing_early() {
        let sink = RecordingSink::answering(Permission::Pending);
        let mut sched = scheduler(Arc::clone(&sink));
        let mut tasks = vec![due_on(2024, 6, 10)];
        let old_target = one_hour_target(&tasks[0]);
        sched.reconcile(&mut tasks, old_target + TimeDelta::minutes(1));
        assert_eq!(sched.awaiting_permission().count(), 1);

        tasks[0].due_date = NaiveDate::from_ymd_opt(2024, 7, 10);
        sink.set(Permission::Granted);
        let now = old_target + TimeDelta::minutes(2);
        assert!(sched.permission_changed(Permission::Granted, &mut tasks, now).is_empty());
        assert!(!tasks[0].notifications_sent.is_sent(OffsetKind::OneHour));
        assert_eq!(sink.shown(), 0);

        // The reminder for the new date still fires on time.
        let new_target = one_hour_target(&tasks[0]);
        let delivered = sched.reconcile(&mut tasks, new_target);
        assert!(delivered.iter().any(|d| d.kind == OffsetKind::OneHour));
        assert!(tasks[0].notifications_sent.is_sent(OffsetKind::OneHour));
    }

    #[test]
    fn grant_after_the_window_closed_delivers_nothing() {
        let sink = RecordingSink::answering(Permission::Pending);
        let mut sched = scheduler(Arc::clone(&sink));
        let mut tasks = vec![due_on(2024, 6, 10)];
        let target = one_hour_target(&tasks[0]);
        sched.reconcile(&mut tasks, target);

        sink.set(Permission::Granted);
        let late = target + DEFAULT_TOLERANCE + TimeDelta::seconds(1);
        assert!(sched.permission_changed(Permission::Granted, &mut tasks, late).is_empty());
        assert_eq!(sched.awaiting_permission().count(), 0);
        assert_eq!(sink.shown(), 0);
    }

    #[test]
    fn dropping_a_task_from_the_queue_unblocks_reconcile() {
        let sink = RecordingSink::answering(Permission::Pending);
        let mut sched = scheduler(Arc::clone(&sink));
        let mut tasks = vec![due_on(2024, 6, 10)];
        let target = one_hour_target(&tasks[0]);
        sched.reconcile(&mut tasks, target);

        sched.drop_awaiting(&tasks[0].id);
        assert_eq!(sched.awaiting_permission().count(), 0);
        sink.set(Permission::Granted);
        assert_eq!(sched.reconcile(&mut tasks, target + TimeDelta::minutes(1)).len(), 1);
    }

    #[test]
    fn denial_drops_the_queue() {
        let sink = RecordingSink::answering(Permission::Pending);
        let mut sched = scheduler(Arc::clone(&sink));
        let mut tasks = vec![due_on(2024, 6, 10)];
        let at = one_hour_target(&tasks[0]);
        sched.reconcile(&mut tasks, at);

        sched.permission_changed(Permission::Denied, &mut tasks, at);
        assert_eq!(sched.awaiting_permission().count(), 0);
    }

    #[test]
    fn catch_up_after_suspension() {
        let sink = RecordingSink::answering(Permission::Granted);
        let mut sched = scheduler(Arc::clone(&sink));
        let mut tasks = vec![due_on(2024, 6, 10)];
        let one_day_target = anchor_instant(NaiveDate::from_ymd_opt(2024, 6, 9).unwrap());

        // Last pass one minute before the 24h target, then asleep for 3 hours.
        sched.reconcile(&mut tasks, one_day_target - TimeDelta::minutes(1));
        let woke = one_day_target + TimeDelta::hours(3);
        let delivered = sched.reconcile(&mut tasks, woke);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].kind, OffsetKind::OneDay);
    }

    #[test]
    fn no_catch_up_without_previous_pass_or_when_disabled() {
        let sink = RecordingSink::answering(Permission::Granted);
        let settings = SchedulerSettings {
            catch_up_on_resume: false,
            ..SchedulerSettings::default()
        };
        let mut sched = ReminderScheduler::new(settings, sink, Arc::new(crate::notify::SilentCue));
        let mut tasks = vec![due_on(2024, 6, 10)];
        let one_day_target = anchor_instant(NaiveDate::from_ymd_opt(2024, 6, 9).unwrap());

        sched.reconcile(&mut tasks, one_day_target - TimeDelta::minutes(1));
        assert!(sched.reconcile(&mut tasks, one_day_target + TimeDelta::hours(3)).is_empty());
    }

    #[test]
    fn cue_failure_does_not_block_delivery() {
        let sink = RecordingSink::answering(Permission::Granted);
        let cue = Arc::new(BrokenCue::default());
        let mut sched = ReminderScheduler::new(SchedulerSettings::default(), sink, cue.clone());
        let mut tasks = vec![due_on(2024, 6, 10)];
        let at = one_hour_target(&tasks[0]);
        let delivered = sched.reconcile(&mut tasks, at);
        assert_eq!(delivered.len(), 1);
        assert_eq!(cue.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn settings_follow_config() {
        let mut scheduler_cfg = SchedulerConfig::default();
        scheduler_cfg.tolerance_secs = 600;
        let reminders_cfg = ReminderConfig {
            sound_enabled: false,
        };
        let settings = SchedulerSettings::from_config(&scheduler_cfg, &reminders_cfg);
        assert_eq!(settings.tolerance, TimeDelta::minutes(10));
        assert_eq!(settings.interval, TimeDelta::minutes(1));
        assert!(!settings.sound_enabled);
    }
}
