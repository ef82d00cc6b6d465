//! Reminder computation: fire instants, the delivery ledger, and
//! successor generation for recurring tasks.

pub mod ledger;
pub mod policy;
pub mod recurrence;

pub use ledger::{DEFAULT_TOLERANCE, SentLedger, mark_delivered, should_deliver};
pub use policy::{anchor_instant, target_time, target_times};
pub use recurrence::MonthOverflow;
