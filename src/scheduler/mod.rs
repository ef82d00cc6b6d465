//! Reminder scheduling.
//!
//! [`runner`] decides what to deliver, [`timers`] holds the armed
//! per-reminder deadlines and [`service`] drives both from a tokio task.

pub mod runner;
pub mod service;
pub mod timers;

pub use runner::{Delivered, ReminderScheduler, SchedulerSettings};
pub use service::ReminderService;
pub use timers::{ArmedTimer, TimerSet};
