//! Per-user task persistence.

use crate::error::{Result, TicklerError};
use crate::tasks::migrate::migrate_tasks;
use crate::tasks::model::Task;
use chrono::Utc;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Authoritative task list storage, keyed by user.
pub trait TaskStore: Send {
    /// Load the user's tasks. A user with no stored list yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if stored data exists but cannot be read.
    fn load(&self, user: &str) -> Result<Vec<Task>>;

    /// Replace the user's stored list.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be written.
    fn save(&self, user: &str, tasks: &[Task]) -> Result<()>;
}

/// Reject user names that cannot be used as a file stem.
///
/// # Errors
///
/// Returns [`TicklerError::InvalidUser`] for empty names, names starting
/// with a dot, or names containing anything other than ASCII
/// alphanumerics, `-`, `_` and `.`.
pub fn validate_user(user: &str) -> Result<()> {
    let ok = !user.is_empty()
        && !user.starts_with('.')
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(TicklerError::InvalidUser(user.to_owned()))
    }
}

/// JSON file per user under `<root>/tasks/<user>.json`.
#[derive(Debug, Clone)]
pub struct JsonTaskStore {
    dir: PathBuf,
}

impl JsonTaskStore {
    /// Store rooted at the application data directory `root`.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            dir: crate::tickler_dirs::tasks_dir(root),
        }
    }

    /// File holding `user`'s tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TicklerError::InvalidUser`] if the name is unusable.
    pub fn path_for(&self, user: &str) -> Result<PathBuf> {
        validate_user(user)?;
        Ok(self.dir.join(format!("{user}.json")))
    }
}

impl TaskStore for JsonTaskStore {
    fn load(&self, user: &str) -> Result<Vec<Task>> {
        let path = self.path_for(user)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no task file for '{user}' at {}", path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(TicklerError::Store(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        let raw: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| TicklerError::Store(format!("cannot parse {}: {e}", path.display())))?;
        let report = migrate_tasks(raw, Utc::now())?;
        if report.changed() {
            info!(
                "rewriting migrated task file for '{user}' ({} tasks)",
                report.tasks.len()
            );
            self.save(user, &report.tasks)?;
        }
        Ok(report.tasks)
    }

    fn save(&self, user: &str, tasks: &[Task]) -> Result<()> {
        let path = self.path_for(user)?;
        write_json_atomic(&path, tasks)
    }
}

/// Serialize `value` to `path` through a temp file and rename.
pub(crate) fn write_json_atomic<T>(path: &Path, value: &T) -> Result<()>
where
    T: serde::Serialize + ?Sized,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            TicklerError::Store(format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");

    let mut file = std::fs::File::create(&tmp_path).map_err(|e| {
        TicklerError::Store(format!("cannot create {}: {e}", tmp_path.display()))
    })?;
    file.write_all(json.as_bytes())
        .map_err(|e| TicklerError::Store(format!("cannot write {}: {e}", tmp_path.display())))?;
    file.sync_all()
        .map_err(|e| TicklerError::Store(format!("cannot sync {}: {e}", tmp_path.display())))?;

    std::fs::rename(&tmp_path, path).map_err(|e| {
        TicklerError::Store(format!(
            "cannot rename {} to {}: {e}",
            tmp_path.display(),
            path.display()
        ))
    })
}

/// In-process store, used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    lists: Mutex<HashMap<String, Vec<Task>>>,
    fail_saves: AtomicBool,
}

impl MemoryTaskStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate `user`'s list.
    #[must_use]
    pub fn with_tasks(self, user: &str, tasks: Vec<Task>) -> Self {
        if let Ok(mut lists) = self.lists.lock() {
            lists.insert(user.to_owned(), tasks);
        }
        self
    }

    /// Make every subsequent save fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Last saved list for `user`.
    #[must_use]
    pub fn saved(&self, user: &str) -> Vec<Task> {
        self.lists
            .lock()
            .ok()
            .and_then(|lists| lists.get(user).cloned())
            .unwrap_or_default()
    }
}

impl TaskStore for MemoryTaskStore {
    fn load(&self, user: &str) -> Result<Vec<Task>> {
        Ok(self.saved(user))
    }

    fn save(&self, user: &str, tasks: &[Task]) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(TicklerError::Store("save rejected".to_owned()));
        }
        let mut lists = self
            .lists
            .lock()
            .map_err(|_| TicklerError::Store("memory store lock poisoned".to_owned()))?;
        lists.insert(user.to_owned(), tasks.to_vec());
        Ok(())
    }
}

/// Shared handle forwarding to the inner store, so a test can keep
/// inspecting a store it handed to a tracker.
impl<S: TaskStore + Sync> TaskStore for std::sync::Arc<S> {
    fn load(&self, user: &str) -> Result<Vec<Task>> {
        (**self).load(user)
    }

    fn save(&self, user: &str, tasks: &[Task]) -> Result<()> {
        (**self).save(user, tasks)
    }
}
