//! Task data model, persistence and list views.

pub mod backup;
pub mod export;
pub mod migrate;
pub mod model;
pub mod query;
pub mod stats;
pub mod store;

pub use backup::{BackupInfo, BackupStore};
pub use model::{
    DEFAULT_CATEGORY, DuplicateOptions, NewTask, OffsetKind, Priority, Recurrence, ReminderSet,
    Subtask, Task, TaskEdit, TaskId,
};
pub use query::{SortKey, StatusFilter, TaskQuery};
pub use stats::{DueStatus, TaskStats, due_status};
pub use store::{JsonTaskStore, MemoryTaskStore, TaskStore};
