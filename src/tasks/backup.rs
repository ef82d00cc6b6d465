//! Daily task list snapshots and rotation.
//!
//! One snapshot per user per calendar day, named `YYYY-MM-DD.json` inside
//! `<root>/backups/<user>/`. A second snapshot on the same day replaces
//! the first.

use crate::error::{Result, TicklerError};
use crate::tasks::migrate::migrate_tasks;
use crate::tasks::model::Task;
use crate::tasks::store::{validate_user, write_json_atomic};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Snapshot format version written into every file.
pub const BACKUP_VERSION: &str = "1.0";

/// Snapshots kept per user unless configured otherwise.
pub const DEFAULT_KEEP: usize = 7;

const BACKUP_EXT: &str = ".json";

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot<T> {
    date: DateTime<Utc>,
    tasks: T,
    #[serde(default)]
    version: String,
}

/// Listing entry for one stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    /// Calendar day the snapshot belongs to; also its restore key.
    pub date: NaiveDate,
    /// Instant the snapshot was taken.
    pub created_at: DateTime<Utc>,
    pub task_count: usize,
}

/// Snapshot directory for all users.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            dir: crate::tickler_dirs::backups_dir(root),
        }
    }

    fn user_dir(&self, user: &str) -> Result<PathBuf> {
        validate_user(user)?;
        Ok(self.dir.join(user))
    }

    fn path_for(&self, user: &str, date: NaiveDate) -> Result<PathBuf> {
        Ok(self
            .user_dir(user)?
            .join(format!("{}{BACKUP_EXT}", date.format("%Y-%m-%d"))))
    }

    /// Write today's snapshot of `tasks`.
    ///
    /// # Errors
    ///
    /// Returns an error if the user name is invalid or the file cannot be written.
    pub fn create(&self, user: &str, tasks: &[Task], now: DateTime<Utc>) -> Result<BackupInfo> {
        let path = self.path_for(user, now.date_naive())?;
        let snapshot = Snapshot {
            date: now,
            tasks,
            version: BACKUP_VERSION.to_owned(),
        };
        write_json_atomic(&path, &snapshot)
            .map_err(|e| TicklerError::Backup(format!("cannot write {}: {e}", path.display())))?;
        tracing::info!("backed up {} tasks for '{user}' to {}", tasks.len(), path.display());
        Ok(BackupInfo {
            date: now.date_naive(),
            created_at: now,
            task_count: tasks.len(),
        })
    }

    /// Stored snapshots, newest first. Unreadable files are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the user name is invalid or the directory cannot be read.
    pub fn list(&self, user: &str) -> Result<Vec<BackupInfo>> {
        let mut infos = Vec::new();
        for (date, path) in self.dated_files(user)? {
            match read_snapshot(&path) {
                Ok(snapshot) => infos.push(BackupInfo {
                    date,
                    created_at: snapshot.date,
                    task_count: snapshot.tasks.as_array().map_or(0, Vec::len),
                }),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable backup"
                    );
                }
            }
        }
        Ok(infos)
    }

    /// Day of the newest snapshot, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn latest_date(&self, user: &str) -> Result<Option<NaiveDate>> {
        Ok(self.dated_files(user)?.first().map(|(date, _)| *date))
    }

    /// Tasks stored in the snapshot for `date`, migrated to the current shape.
    ///
    /// # Errors
    ///
    /// Returns [`TicklerError::Backup`] if no snapshot exists for `date` or
    /// it cannot be parsed.
    pub fn load(&self, user: &str, date: NaiveDate) -> Result<Vec<Task>> {
        let path = self.path_for(user, date)?;
        if !path.exists() {
            return Err(TicklerError::Backup(format!("no backup for {date}")));
        }
        let snapshot = read_snapshot(&path)?;
        let report = migrate_tasks(snapshot.tasks, Utc::now())
            .map_err(|e| TicklerError::Backup(format!("backup {date}: {e}")))?;
        Ok(report.tasks)
    }

    /// Delete all but the `keep` newest snapshots. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read. Individual deletion
    /// failures are logged and skipped.
    pub fn prune(&self, user: &str, keep: usize) -> Result<usize> {
        let mut deleted = 0;
        for (_, old) in self.dated_files(user)?.into_iter().skip(keep) {
            match std::fs::remove_file(&old) {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!(
                        path = %old.display(),
                        error = %e,
                        "failed to delete old backup"
                    );
                }
            }
        }
        Ok(deleted)
    }

    /// Snapshot files with a parseable date stem, newest first.
    fn dated_files(&self, user: &str) -> Result<Vec<(NaiveDate, PathBuf)>> {
        let dir = self.user_dir(user)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| TicklerError::Backup(format!("cannot read {}: {e}", dir.display())))?;

        let mut files: Vec<(NaiveDate, PathBuf)> = entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                let stem = name.strip_suffix(BACKUP_EXT)?;
                let date = NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()?;
                Some((date, entry.path()))
            })
            .collect();
        files.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(files)
    }
}

fn read_snapshot(path: &Path) -> Result<Snapshot<serde_json::Value>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| TicklerError::Backup(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| TicklerError::Backup(format!("cannot parse {}: {e}", path.display())))
}
