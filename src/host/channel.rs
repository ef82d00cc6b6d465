//! Host command channel and router for the task tracker bridge.

use crate::error::{Result, TicklerError};
use crate::host::contract::{
    CommandEnvelope, CommandName, EVENT_TASK_CHANGED, EventEnvelope, ResponseEnvelope,
};
use crate::notify::Permission;
use crate::tasks::backup::BackupInfo;
use crate::tasks::model::{DuplicateOptions, NewTask, Subtask, Task, TaskEdit};
use crate::tasks::query::TaskQuery;
use crate::tasks::stats::TaskStats;
use crate::tracker::ToggleOutcome;
use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Backend operations reachable from host commands.
pub trait TaskCommandHandler: Send + Sync + 'static {
    fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>>;
    fn create_task(&self, fields: NewTask) -> Result<Task>;
    fn edit_task(&self, id: &str, edit: TaskEdit) -> Result<Task>;
    fn toggle_task(&self, id: &str) -> Result<ToggleOutcome>;
    fn duplicate_task(&self, id: &str, options: DuplicateOptions) -> Result<Task>;
    fn delete_task(&self, id: &str) -> Result<Task>;
    fn toggle_pin(&self, id: &str) -> Result<bool>;
    fn add_subtask(&self, task_id: &str, title: &str) -> Result<Subtask>;
    fn toggle_subtask(&self, task_id: &str, subtask_id: &str) -> Result<bool>;
    fn delete_subtask(&self, task_id: &str, subtask_id: &str) -> Result<()>;
    fn stats(&self) -> Result<TaskStats>;
    fn categories(&self) -> Result<Vec<String>>;
    /// Import a JSON task array. Returns the number of tasks added.
    fn import_json(&self, text: &str) -> Result<usize>;
    fn export_json(&self) -> Result<String>;
    fn export_csv(&self) -> Result<String>;
    fn list_backups(&self) -> Result<Vec<BackupInfo>>;
    fn restore_backup(&self, date: NaiveDate) -> Result<usize>;
    /// Record the host's notification permission. Returns the number of
    /// held reminders delivered as a result.
    fn set_notification_permission(&self, permission: Permission) -> Result<usize>;
    fn request_runtime_stop(&self) -> Result<()> {
        Ok(())
    }
}

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<ResponseEnvelope>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    /// Send a command and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns [`TicklerError::Command`] for an invalid envelope and
    /// [`TicklerError::Channel`] when the server is gone.
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            TicklerError::Command(format!(
                "invalid host command envelope {}: {e}",
                envelope.request_id
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| {
                TicklerError::Channel(format!("failed to send host command request: {e}"))
            })?;

        response_rx
            .await
            .map_err(|e| TicklerError::Channel(format!("host command response dropped: {e}")))
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }
}

pub struct HostCommandServer<H: TaskCommandHandler> {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
    handler: H,
}

#[must_use]
pub fn command_channel<H: TaskCommandHandler>(
    request_capacity: usize,
    event_capacity: usize,
    handler: H,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));
    command_channel_with_events(request_capacity, event_tx, handler)
}

/// Create a command channel using an existing event broadcast sender.
///
/// The handler's notification sink and the router then publish on the
/// same channel, so reminder events reach the host through the same path
/// as command side effects.
#[must_use]
pub fn command_channel_with_events<H: TaskCommandHandler>(
    request_capacity: usize,
    event_tx: broadcast::Sender<EventEnvelope>,
    handler: H,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));

    (
        HostCommandClient {
            request_tx,
            event_tx: event_tx.clone(),
        },
        HostCommandServer {
            request_rx,
            event_tx,
            handler,
        },
    )
}

impl<H: TaskCommandHandler> HostCommandServer<H> {
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let response = self.dispatch(&request.envelope);
            let _ = request.response_tx.send(response);
        }
    }

    /// Route `envelope` and fold a failure into an error response.
    #[must_use]
    pub fn dispatch(&self, envelope: &CommandEnvelope) -> ResponseEnvelope {
        match self.route(envelope) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    command = envelope.command.as_str(),
                    request_id = %envelope.request_id,
                    error = %e,
                    "host command failed"
                );
                ResponseEnvelope::error(envelope.request_id.clone(), e.to_string())
            }
        }
    }

    /// Route a command envelope to the appropriate handler.
    pub fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let payload = self.execute(envelope.command, &envelope.payload)?;
        if envelope.command.mutates_tasks() {
            self.emit_event(
                EVENT_TASK_CHANGED,
                serde_json::json!({
                    "request_id": envelope.request_id,
                    "command": envelope.command.as_str(),
                }),
            );
        }
        Ok(ResponseEnvelope::ok(envelope.request_id.clone(), payload))
    }

    fn execute(
        &self,
        command: CommandName,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let h = &self.handler;
        let name = command.as_str();
        Ok(match command {
            CommandName::HostPing => serde_json::json!({"pong": true}),
            CommandName::HostVersion => serde_json::json!({
                "contract_version": crate::host::contract::EVENT_VERSION,
                "channel": "tickler_host_v1",
                "version": env!("CARGO_PKG_VERSION"),
            }),
            CommandName::TaskList => {
                let query: TaskQuery = parse_body(payload, name)?;
                serde_json::json!({"tasks": h.list_tasks(&query)?})
            }
            CommandName::TaskCreate => {
                let task = h.create_task(parse_body(payload, name)?)?;
                serde_json::json!({"task": task})
            }
            CommandName::TaskEdit => {
                let id = parse_task_id(payload, name)?;
                let task = h.edit_task(&id, parse_body(payload, name)?)?;
                serde_json::json!({"task": task})
            }
            CommandName::TaskToggle => to_value(h.toggle_task(&parse_task_id(payload, name)?)?)?,
            CommandName::TaskDuplicate => {
                let id = parse_task_id(payload, name)?;
                let task = h.duplicate_task(&id, parse_body(payload, name)?)?;
                serde_json::json!({"task": task})
            }
            CommandName::TaskDelete => {
                let removed = h.delete_task(&parse_task_id(payload, name)?)?;
                serde_json::json!({"deleted": removed.id})
            }
            CommandName::TaskPin => {
                let id = parse_task_id(payload, name)?;
                let pinned = h.toggle_pin(&id)?;
                serde_json::json!({"id": id, "pinned": pinned})
            }
            CommandName::SubtaskAdd => {
                let task_id = parse_task_id(payload, name)?;
                let title = parse_non_empty_field(payload, "title", name)?;
                serde_json::json!({"subtask": h.add_subtask(&task_id, &title)?})
            }
            CommandName::SubtaskToggle => {
                let (task_id, subtask_id) = parse_subtask_ids(payload, name)?;
                let completed = h.toggle_subtask(&task_id, &subtask_id)?;
                serde_json::json!({"id": subtask_id, "completed": completed})
            }
            CommandName::SubtaskDelete => {
                let (task_id, subtask_id) = parse_subtask_ids(payload, name)?;
                h.delete_subtask(&task_id, &subtask_id)?;
                serde_json::json!({"deleted": subtask_id})
            }
            CommandName::TaskStats => to_value(h.stats()?)?,
            CommandName::TaskCategories => serde_json::json!({"categories": h.categories()?}),
            CommandName::TasksImport => {
                let text = parse_import_text(payload, name)?;
                serde_json::json!({"imported": h.import_json(&text)?})
            }
            CommandName::ExportJson => serde_json::json!({"json": h.export_json()?}),
            CommandName::ExportCsv => serde_json::json!({"csv": h.export_csv()?}),
            CommandName::BackupList => serde_json::json!({"backups": h.list_backups()?}),
            CommandName::BackupRestore => {
                let date = parse_date(payload, name)?;
                serde_json::json!({"restored": h.restore_backup(date)?})
            }
            CommandName::NotificationPermission => {
                let permission = parse_permission(payload, name)?;
                let delivered = h.set_notification_permission(permission)?;
                serde_json::json!({"permission": permission, "delivered": delivered})
            }
            CommandName::RuntimeStop => {
                h.request_runtime_stop()?;
                serde_json::json!({"accepted": true})
            }
        })
    }

    fn emit_event(&self, event: &str, payload: serde_json::Value) {
        let _ = self.event_tx.send(EventEnvelope::new(event, payload));
    }
}

fn to_value<T: Serialize>(value: T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

/// Deserialize the whole payload, treating `null` as an empty object.
fn parse_body<T: DeserializeOwned>(payload: &serde_json::Value, command: &str) -> Result<T> {
    let body = if payload.is_null() {
        serde_json::json!({})
    } else {
        payload.clone()
    };
    serde_json::from_value(body)
        .map_err(|e| TicklerError::Command(format!("{command} has an invalid payload: {e}")))
}

fn parse_non_empty_field(
    payload: &serde_json::Value,
    field: &str,
    command: &str,
) -> Result<String> {
    let Some(raw) = payload.get(field).and_then(serde_json::Value::as_str) else {
        return Err(TicklerError::Command(format!(
            "{command} requires payload.{field}"
        )));
    };
    let value = raw.trim();
    if value.is_empty() {
        return Err(TicklerError::Command(format!(
            "{command} requires a non-empty payload.{field}"
        )));
    }
    Ok(value.to_owned())
}

/// Task id from `taskId`, falling back to `id`.
fn parse_task_id(payload: &serde_json::Value, command: &str) -> Result<String> {
    if payload.get("taskId").is_some() {
        parse_non_empty_field(payload, "taskId", command)
    } else {
        parse_non_empty_field(payload, "id", command)
    }
}

fn parse_subtask_ids(payload: &serde_json::Value, command: &str) -> Result<(String, String)> {
    Ok((
        parse_task_id(payload, command)?,
        parse_non_empty_field(payload, "subtaskId", command)?,
    ))
}

/// `payload.json` as exported text, or `payload.tasks` as an inline array.
fn parse_import_text(payload: &serde_json::Value, command: &str) -> Result<String> {
    if let Some(text) = payload.get("json").and_then(serde_json::Value::as_str) {
        return Ok(text.to_owned());
    }
    match payload.get("tasks") {
        Some(tasks @ serde_json::Value::Array(_)) => Ok(tasks.to_string()),
        _ => Err(TicklerError::Command(format!(
            "{command} requires payload.json or payload.tasks"
        ))),
    }
}

fn parse_date(payload: &serde_json::Value, command: &str) -> Result<NaiveDate> {
    let raw = parse_non_empty_field(payload, "date", command)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
        TicklerError::Command(format!("{command} payload.date '{raw}' is not YYYY-MM-DD: {e}"))
    })
}

fn parse_permission(payload: &serde_json::Value, command: &str) -> Result<Permission> {
    let raw = parse_non_empty_field(payload, "permission", command)?;
    match raw.to_ascii_lowercase().as_str() {
        "granted" => Ok(Permission::Granted),
        "denied" => Ok(Permission::Denied),
        "pending" | "default" => Ok(Permission::Pending),
        other => Err(TicklerError::Command(format!(
            "{command} payload.permission must be granted, denied or pending, got '{other}'"
        ))),
    }
}
