//! Configuration types for the tracker and its reminder scheduler.

use crate::error::{Result, TicklerError};
use crate::reminders::recurrence::MonthOverflow;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TicklerConfig {
    /// Reminder scheduler timing.
    pub scheduler: SchedulerConfig,
    /// Reminder delivery settings.
    pub reminders: ReminderConfig,
    /// Recurring task policy.
    pub recurrence: RecurrenceConfig,
    /// Task store location and active user.
    pub storage: StorageConfig,
    /// Daily backup snapshots.
    pub backup: BackupConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// Reminder scheduler timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between reconciliation passes.
    pub reconcile_interval_secs: u64,
    /// How late after its target a reminder is still delivered, in seconds.
    ///
    /// Must be at least the reconciliation interval, otherwise a target
    /// can fall between two passes without ever being inside the window.
    pub tolerance_secs: u64,
    /// Deliver reminders missed while the process was suspended.
    pub catch_up_on_resume: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 60,
            tolerance_secs: 300,
            catch_up_on_resume: true,
        }
    }
}

/// Reminder delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Play an audible cue alongside each notification.
    pub sound_enabled: bool,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            sound_enabled: true,
        }
    }
}

/// Recurring task policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecurrenceConfig {
    /// How a monthly recurrence handles days missing from the next month.
    pub month_overflow: MonthOverflow,
}

/// Task store location and active user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Active user whose task list is loaded.
    pub user: String,
    /// Data root (None = platform data directory).
    pub data_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            user: "default".to_owned(),
            data_dir: None,
        }
    }
}

impl StorageConfig {
    /// Resolved data root.
    #[must_use]
    pub fn root(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(crate::tickler_dirs::data_dir)
    }
}

/// Daily backup snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Take one snapshot per calendar day.
    pub enabled: bool,
    /// Number of daily snapshots kept per user.
    pub keep: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keep: 7,
        }
    }
}

/// Log output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write daily-rolling log files under `<data_dir>/logs/`.
    pub file_logs: bool,
}

impl TicklerConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails [`Self::validate`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| TicklerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TicklerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config_dir>/config.toml`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        crate::tickler_dirs::config_dir().join("config.toml")
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`TicklerError::Config`] when the reconciliation interval is
    /// zero, the tolerance window cannot cover it, or the user is empty.
    pub fn validate(&self) -> Result<()> {
        let scheduler = &self.scheduler;
        if scheduler.reconcile_interval_secs == 0 {
            return Err(TicklerError::Config(
                "scheduler.reconcile_interval_secs must be greater than zero".to_owned(),
            ));
        }
        if scheduler.tolerance_secs < scheduler.reconcile_interval_secs {
            return Err(TicklerError::Config(format!(
                "scheduler.tolerance_secs ({}) must be at least reconcile_interval_secs ({})",
                scheduler.tolerance_secs, scheduler.reconcile_interval_secs
            )));
        }
        if self.storage.user.trim().is_empty() {
            return Err(TicklerError::Config("storage.user cannot be empty".to_owned()));
        }
        Ok(())
    }
}
