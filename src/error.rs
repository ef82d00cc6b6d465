//! Error types for the task tracker.

/// Top-level error type for the tracker, its scheduler, and the host bridge.
#[derive(Debug, thiserror::Error)]
pub enum TicklerError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Task store load/save error.
    #[error("store error: {0}")]
    Store(String),

    /// Reminder scheduler error (service loop, lock poisoning).
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// Backup snapshot error.
    #[error("backup error: {0}")]
    Backup(String),

    /// Task fields rejected by a tracker operation.
    #[error("invalid task: {0}")]
    InvalidTask(String),

    /// No task with the given ID exists for the active user.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// User name cannot be mapped to a storage location.
    #[error("invalid user: {0}")]
    InvalidUser(String),

    /// Host command rejected before reaching the tracker (bad envelope or payload).
    #[error("command error: {0}")]
    Command(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TicklerError>;
