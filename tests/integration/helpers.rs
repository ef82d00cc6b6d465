//! Shared helpers for integration tests.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use tickler::TaskTracker;
use tickler::clock::ManualClock;
use tickler::notify::{NotificationSink, Permission, SilentCue};
use tickler::scheduler::{ReminderScheduler, SchedulerSettings};
use tickler::tasks::TaskStore;

/// Sink that records every shown notification and answers with a
/// switchable permission.
pub(crate) struct RecordingSink {
    permission: Mutex<Permission>,
    shown: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub(crate) fn new(permission: Permission) -> Arc<Self> {
        Arc::new(Self {
            permission: Mutex::new(permission),
            shown: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set_permission(&self, permission: Permission) {
        *self.permission.lock().unwrap() = permission;
    }

    /// Bodies of every notification shown so far.
    pub(crate) fn bodies(&self) -> Vec<String> {
        self.shown
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, title: &str, body: &str) -> Permission {
        let permission = *self.permission.lock().unwrap();
        if permission == Permission::Granted {
            self.shown
                .lock()
                .unwrap()
                .push((title.to_owned(), body.to_owned()));
        }
        permission
    }
}

/// Open `user`'s list from `store` with default scheduler settings.
pub(crate) fn open_tracker(
    store: Box<dyn TaskStore>,
    sink: Arc<RecordingSink>,
    clock: Arc<ManualClock>,
) -> TaskTracker {
    let scheduler = ReminderScheduler::new(SchedulerSettings::default(), sink, Arc::new(SilentCue));
    TaskTracker::open("alice", store, scheduler, clock).expect("open tracker")
}

pub(crate) fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
