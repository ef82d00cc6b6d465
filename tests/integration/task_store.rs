//! Task persistence: legacy file migration, config-driven trackers,
//! export/import between users and daily backups on disk.

use crate::helpers::{RecordingSink, date, open_tracker, utc};
use std::sync::Arc;
use tickler::clock::ManualClock;
use tickler::notify::{Permission, SilentCue};
use tickler::tasks::{JsonTaskStore, NewTask, OffsetKind, TaskStore};
use tickler::{TaskTracker, TicklerConfig, TicklerError};

fn temp_config(dir: &tempfile::TempDir, user: &str) -> TicklerConfig {
    let mut config = TicklerConfig::default();
    config.storage.data_dir = Some(dir.path().to_path_buf());
    config.storage.user = user.to_owned();
    config
}

#[test]
fn legacy_task_file_is_migrated_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonTaskStore::new(dir.path());
    let path = store.path_for("alice").unwrap();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        r#"[
            {"id": 1705312345678, "title": "Legacy", "dueDate": "2030-06-10",
             "reminders": {"1week": true}},
            {"title": "No id", "dueDate": "not a date"},
            "garbage"
        ]"#,
    )
    .unwrap();

    let sink = RecordingSink::new(Permission::Granted);
    let clock = Arc::new(ManualClock::new(utc(2030, 6, 1, 9, 0)));
    let tracker = open_tracker(Box::new(store.clone()), sink, clock);

    let tasks = tracker.tasks();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].id, "1705312345678");
    assert!(tasks[0].reminders.is_enabled(OffsetKind::OneWeek));
    assert!(tasks[0].reminders.is_enabled(OffsetKind::OneDay));
    assert_eq!(tasks[1].due_date, None);
    assert!(!tasks[1].id.is_empty());

    // 1week, 24h and 1h targets of the legacy task are still ahead.
    assert_eq!(tracker.scheduler().timers().armed_for("1705312345678").len(), 3);

    let rewritten = std::fs::read_to_string(&path).unwrap();
    assert!(rewritten.contains("notificationsSent"));
    assert!(!rewritten.contains("garbage"));
}

#[test]
fn unparseable_task_file_is_a_store_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonTaskStore::new(dir.path());
    let path = store.path_for("alice").unwrap();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{not json").unwrap();

    assert!(matches!(store.load("alice"), Err(TicklerError::Store(_))));
}

#[test]
fn config_driven_tracker_persists_between_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let config = temp_config(&dir, "bob");
    let sink = RecordingSink::new(Permission::Granted);

    let mut tracker = TaskTracker::from_config(&config, sink.clone(), Arc::new(SilentCue)).unwrap();
    let created = tracker
        .create_task(NewTask {
            category: Some("Work".to_owned()),
            ..NewTask::titled("Quarterly review")
        })
        .unwrap();
    let backup = tracker.backup_if_due().unwrap().unwrap();
    assert_eq!(backup.task_count, 1);
    drop(tracker);

    let reopened = TaskTracker::from_config(&config, sink, Arc::new(SilentCue)).unwrap();
    assert_eq!(reopened.tasks().len(), 1);
    assert_eq!(reopened.tasks()[0].id, created.id);
    assert_eq!(reopened.categories(), ["Work"]);
    assert!(dir.path().join("tasks").join("bob.json").exists());
    assert_eq!(reopened.list_backups().unwrap().len(), 1);
}

#[test]
fn invalid_user_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = temp_config(&dir, "../evil");
    let sink = RecordingSink::new(Permission::Granted);
    let result = TaskTracker::from_config(&config, sink, Arc::new(SilentCue));
    assert!(matches!(result, Err(TicklerError::InvalidUser(_))));
}

#[test]
fn export_from_one_user_imports_into_another() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(utc(2024, 6, 9, 0, 0)));
    let sink = RecordingSink::new(Permission::Granted);

    let alice_store = Box::new(JsonTaskStore::new(dir.path()));
    let mut alice = open_tracker(alice_store, sink.clone(), clock.clone());
    let task = alice
        .create_task(NewTask {
            due_date: Some(date(2024, 6, 10)),
            ..NewTask::titled("Shared errand")
        })
        .unwrap();
    assert_eq!(alice.reconcile().unwrap().len(), 1);
    let exported = alice.export_json().unwrap();
    let csv = alice.export_csv();
    assert!(csv.contains("\"Shared errand\""));

    let store = JsonTaskStore::new(dir.path());
    let scheduler = tickler::scheduler::ReminderScheduler::new(
        tickler::scheduler::SchedulerSettings::default(),
        sink,
        Arc::new(SilentCue),
    );
    let mut carol = TaskTracker::open("carol", Box::new(store), scheduler, clock).unwrap();
    assert_eq!(carol.import_json(&exported).unwrap(), 1);

    let imported = &carol.tasks()[0];
    assert_eq!(imported.id, task.id);
    assert!(!imported.notifications_sent.one_day);
    assert_eq!(carol.reconcile().unwrap().len(), 1);
}
