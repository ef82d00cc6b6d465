//! Tickler: a personal task tracker with time-based reminder notifications.
//!
//! Tasks carry optional start and due dates; each task enables up to five
//! reminder offsets (one week, three days, 24 hours and one hour before the
//! due date, one hour before the start date). The scheduler delivers each
//! enabled reminder at most once per date setting.
//!
//! # Architecture
//!
//! - **tasks**: data model, JSON persistence, legacy migration, list views,
//!   export and daily backups
//! - **reminders**: fire instants, the delivery ledger, recurrence
//! - **scheduler**: armed timers, reconciliation and the tokio service loop
//! - **tracker**: the façade tying a user's list to the scheduler
//! - **host**: newline-delimited JSON bridge for native shells

pub mod clock;
pub mod config;
pub mod error;
pub mod host;
pub mod notify;
pub mod reminders;
pub mod scheduler;
pub mod tasks;
pub mod tickler_dirs;
pub mod tracker;

pub use config::TicklerConfig;
pub use error::{Result, TicklerError};
pub use tracker::{SharedTracker, TaskTracker, ToggleOutcome};
