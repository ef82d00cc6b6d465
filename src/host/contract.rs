//! Versioned host command/event envelopes for the task tracker bridge.

use serde::{Deserialize, Serialize};

/// Contract version for host command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Event emitted when a reminder notification was shown.
pub const EVENT_REMINDER_FIRED: &str = "reminder.fired";
/// Event emitted when a reminder is held until the host answers the
/// notification permission prompt.
pub const EVENT_PERMISSION_REQUESTED: &str = "notification.permission_requested";
/// Event emitted after any command that changed the task list.
pub const EVENT_TASK_CHANGED: &str = "task.changed";

/// Command set understood by the host bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "host.version")]
    HostVersion,
    #[serde(rename = "task.list")]
    TaskList,
    #[serde(rename = "task.create")]
    TaskCreate,
    #[serde(rename = "task.edit")]
    TaskEdit,
    #[serde(rename = "task.toggle")]
    TaskToggle,
    #[serde(rename = "task.duplicate")]
    TaskDuplicate,
    #[serde(rename = "task.delete")]
    TaskDelete,
    #[serde(rename = "task.pin")]
    TaskPin,
    #[serde(rename = "subtask.add")]
    SubtaskAdd,
    #[serde(rename = "subtask.toggle")]
    SubtaskToggle,
    #[serde(rename = "subtask.delete")]
    SubtaskDelete,
    #[serde(rename = "task.stats")]
    TaskStats,
    #[serde(rename = "task.categories")]
    TaskCategories,
    #[serde(rename = "tasks.import")]
    TasksImport,
    #[serde(rename = "export.json")]
    ExportJson,
    #[serde(rename = "export.csv")]
    ExportCsv,
    #[serde(rename = "backup.list")]
    BackupList,
    #[serde(rename = "backup.restore")]
    BackupRestore,
    #[serde(rename = "notification.permission")]
    NotificationPermission,
    #[serde(rename = "runtime.stop")]
    RuntimeStop,
}

impl CommandName {
    /// Every command, in wire-table order.
    pub const ALL: [Self; 21] = [
        Self::HostPing,
        Self::HostVersion,
        Self::TaskList,
        Self::TaskCreate,
        Self::TaskEdit,
        Self::TaskToggle,
        Self::TaskDuplicate,
        Self::TaskDelete,
        Self::TaskPin,
        Self::SubtaskAdd,
        Self::SubtaskToggle,
        Self::SubtaskDelete,
        Self::TaskStats,
        Self::TaskCategories,
        Self::TasksImport,
        Self::ExportJson,
        Self::ExportCsv,
        Self::BackupList,
        Self::BackupRestore,
        Self::NotificationPermission,
        Self::RuntimeStop,
    ];

    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::HostVersion => "host.version",
            Self::TaskList => "task.list",
            Self::TaskCreate => "task.create",
            Self::TaskEdit => "task.edit",
            Self::TaskToggle => "task.toggle",
            Self::TaskDuplicate => "task.duplicate",
            Self::TaskDelete => "task.delete",
            Self::TaskPin => "task.pin",
            Self::SubtaskAdd => "subtask.add",
            Self::SubtaskToggle => "subtask.toggle",
            Self::SubtaskDelete => "subtask.delete",
            Self::TaskStats => "task.stats",
            Self::TaskCategories => "task.categories",
            Self::TasksImport => "tasks.import",
            Self::ExportJson => "export.json",
            Self::ExportCsv => "export.csv",
            Self::BackupList => "backup.list",
            Self::BackupRestore => "backup.restore",
            Self::NotificationPermission => "notification.permission",
            Self::RuntimeStop => "runtime.stop",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == raw)
    }

    /// Whether a successful run of this command may change the task list.
    #[must_use]
    pub fn mutates_tasks(self) -> bool {
        matches!(
            self,
            Self::TaskCreate
                | Self::TaskEdit
                | Self::TaskToggle
                | Self::TaskDuplicate
                | Self::TaskDelete
                | Self::TaskPin
                | Self::SubtaskAdd
                | Self::SubtaskToggle
                | Self::SubtaskDelete
                | Self::TasksImport
                | Self::BackupRestore
        )
    }
}

/// A versioned response envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build an error response envelope.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A versioned command envelope from frontend -> backend host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A versioned event envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope with a fresh id.
    #[must_use]
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: uuid::Uuid::new_v4().to_string(),
            event: event.into(),
            payload,
        }
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}
