//! End-to-end reminder delivery through the tracker, the scheduler and a
//! persisted store, driven by a manual clock.

use crate::helpers::{RecordingSink, date, open_tracker, utc};
use chrono::TimeDelta;
use std::sync::Arc;
use tickler::clock::ManualClock;
use tickler::notify::Permission;
use tickler::tasks::{MemoryTaskStore, NewTask, OffsetKind, Recurrence, TaskEdit};

fn due(title: &str, y: i32, m: u32, d: u32) -> NewTask {
    NewTask {
        due_date: Some(date(y, m, d)),
        ..NewTask::titled(title)
    }
}

#[test]
fn reminder_fires_once_across_restart() {
    let store = Arc::new(MemoryTaskStore::new());
    let sink = RecordingSink::new(Permission::Granted);
    // Due 2024-06-10 00:00 UTC is 24h01m away.
    let clock = Arc::new(ManualClock::new(utc(2024, 6, 8, 23, 59)));

    let mut tracker = open_tracker(Box::new(Arc::clone(&store)), sink.clone(), clock.clone());
    let task = tracker.create_task(due("File taxes", 2024, 6, 10)).unwrap();
    assert!(tracker.reconcile().unwrap().is_empty());

    clock.advance(TimeDelta::minutes(1));
    let delivered = tracker.fire_due_timers().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].kind, OffsetKind::OneDay);
    assert!(tracker.reconcile().unwrap().is_empty());

    // A new session over the same store sees the persisted ledger.
    drop(tracker);
    let mut reopened = open_tracker(Box::new(Arc::clone(&store)), sink.clone(), clock.clone());
    assert!(reopened.reconcile().unwrap().is_empty());
    assert!(reopened.task(&task.id).unwrap().notifications_sent.one_day);

    assert_eq!(sink.bodies().len(), 1);
    assert!(sink.bodies()[0].contains("File taxes"));
}

#[test]
fn moving_the_due_date_rearms_reminders() {
    let store = Arc::new(MemoryTaskStore::new());
    let sink = RecordingSink::new(Permission::Granted);
    let clock = Arc::new(ManualClock::new(utc(2024, 6, 9, 0, 0)));

    let mut tracker = open_tracker(Box::new(Arc::clone(&store)), sink.clone(), clock.clone());
    let task = tracker.create_task(due("Renew passport", 2024, 6, 10)).unwrap();
    assert_eq!(tracker.reconcile().unwrap().len(), 1);

    let edit = TaskEdit {
        due_date: Some(Some(date(2024, 6, 11))),
        ..TaskEdit::default()
    };
    tracker.edit_task(&task.id, edit).unwrap();

    clock.set(utc(2024, 6, 10, 0, 0));
    let delivered = tracker.fire_due_timers().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(sink.bodies().len(), 2);
}

#[test]
fn reminders_missed_during_suspension_are_caught_up() {
    let sink = RecordingSink::new(Permission::Granted);
    let clock = Arc::new(ManualClock::new(utc(2024, 6, 8, 12, 0)));
    let mut tracker = open_tracker(Box::new(MemoryTaskStore::new()), sink.clone(), clock.clone());
    tracker.create_task(due("Book venue", 2024, 6, 10)).unwrap();
    assert!(tracker.reconcile().unwrap().is_empty());

    // Asleep until two hours after the 24h target.
    clock.set(utc(2024, 6, 9, 2, 0));
    assert!(tracker.fire_due_timers().unwrap().is_empty());
    let delivered = tracker.reconcile().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].kind, OffsetKind::OneDay);

    clock.advance(TimeDelta::minutes(1));
    assert!(tracker.reconcile().unwrap().is_empty());
}

#[test]
fn pending_delivery_completes_on_grant() {
    let sink = RecordingSink::new(Permission::Pending);
    let clock = Arc::new(ManualClock::new(utc(2024, 6, 9, 23, 0)));
    let mut tracker = open_tracker(Box::new(MemoryTaskStore::new()), sink.clone(), clock.clone());
    let task = tracker.create_task(due("Send invoice", 2024, 6, 10)).unwrap();

    assert!(tracker.reconcile().unwrap().is_empty());
    assert!(!tracker.task(&task.id).unwrap().notifications_sent.one_hour);
    assert_eq!(tracker.scheduler().awaiting_permission().count(), 1);

    sink.set_permission(Permission::Granted);
    let delivered = tracker.permission_changed(Permission::Granted).unwrap();
    assert_eq!(delivered.len(), 1);
    assert!(tracker.task(&task.id).unwrap().notifications_sent.one_hour);
    assert!(sink.bodies()[0].contains("1 hour"));
}

#[test]
fn grant_after_rescheduling_does_not_fire_the_new_date_early() {
    let sink = RecordingSink::new(Permission::Pending);
    let clock = Arc::new(ManualClock::new(utc(2024, 6, 9, 23, 1)));
    let mut tracker = open_tracker(Box::new(MemoryTaskStore::new()), sink.clone(), clock.clone());
    let task = tracker.create_task(due("Pay rent", 2024, 6, 10)).unwrap();
    assert!(tracker.reconcile().unwrap().is_empty());
    assert_eq!(tracker.scheduler().awaiting_permission().count(), 1);

    let edit = TaskEdit {
        due_date: Some(Some(date(2024, 7, 10))),
        ..TaskEdit::default()
    };
    tracker.edit_task(&task.id, edit).unwrap();
    assert_eq!(tracker.scheduler().awaiting_permission().count(), 0);

    sink.set_permission(Permission::Granted);
    assert!(tracker.permission_changed(Permission::Granted).unwrap().is_empty());
    assert!(!tracker.task(&task.id).unwrap().notifications_sent.one_hour);
    assert!(sink.bodies().is_empty());

    clock.set(utc(2024, 7, 9, 23, 0));
    let delivered = tracker.fire_due_timers().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].kind, OffsetKind::OneHour);
}

#[test]
fn deleting_a_task_forgets_its_queued_reminders() {
    let sink = RecordingSink::new(Permission::Pending);
    let clock = Arc::new(ManualClock::new(utc(2024, 6, 9, 23, 0)));
    let mut tracker = open_tracker(Box::new(MemoryTaskStore::new()), sink.clone(), clock.clone());
    let task = tracker.create_task(due("Cancel gym", 2024, 6, 10)).unwrap();
    assert!(tracker.reconcile().unwrap().is_empty());

    tracker.delete_task(&task.id).unwrap();
    assert_eq!(tracker.scheduler().awaiting_permission().count(), 0);
    sink.set_permission(Permission::Granted);
    assert!(tracker.permission_changed(Permission::Granted).unwrap().is_empty());
}

#[test]
fn denied_delivery_is_retried_within_the_window_after_a_grant() {
    let sink = RecordingSink::new(Permission::Denied);
    let clock = Arc::new(ManualClock::new(utc(2024, 6, 9, 23, 0)));
    let mut tracker = open_tracker(Box::new(MemoryTaskStore::new()), sink.clone(), clock.clone());
    let task = tracker.create_task(due("Water plants", 2024, 6, 10)).unwrap();

    assert!(tracker.reconcile().unwrap().is_empty());
    assert!(!tracker.task(&task.id).unwrap().notifications_sent.one_hour);

    sink.set_permission(Permission::Granted);
    clock.advance(TimeDelta::minutes(1));
    assert_eq!(tracker.reconcile().unwrap().len(), 1);
}

#[test]
fn completing_a_monthly_task_schedules_its_successor() {
    let sink = RecordingSink::new(Permission::Granted);
    let clock = Arc::new(ManualClock::new(utc(2024, 1, 30, 10, 0)));
    let mut tracker = open_tracker(Box::new(MemoryTaskStore::new()), sink.clone(), clock.clone());
    let fields = NewTask {
        recurrence: Some(Recurrence::Monthly),
        ..due("Pay rent", 2024, 1, 31)
    };
    let task = tracker.create_task(fields).unwrap();

    let outcome = tracker.toggle_task(&task.id).unwrap();
    let next = outcome.successor.unwrap();
    assert_eq!(next.due_date, Some(date(2024, 2, 29)));
    assert_eq!(tracker.next_timer_deadline(), Some(utc(2024, 2, 28, 0, 0)));

    // The completed original never fires, even at its own 1h target.
    clock.set(utc(2024, 1, 30, 23, 0));
    assert!(tracker.reconcile().unwrap().is_empty());

    clock.set(utc(2024, 2, 28, 0, 0));
    let delivered = tracker.fire_due_timers().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].task_id, next.id);
}
