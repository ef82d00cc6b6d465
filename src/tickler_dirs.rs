//! Centralized application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory
//! resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data | `~/Library/Application Support/tickler/` | `~/.local/share/tickler/` |
//! | Config | `~/Library/Application Support/tickler/` | `~/.config/tickler/` |
//!
//! # Environment Overrides
//!
//! - `TICKLER_DATA_DIR` overrides [`data_dir`]
//! - `TICKLER_CONFIG_DIR` overrides [`config_dir`]

use std::path::{Path, PathBuf};

/// Application data root directory.
///
/// Holds per-user task files, backups and logs.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TICKLER_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("tickler"))
        .unwrap_or_else(|| PathBuf::from("/tmp/tickler-data"))
}

/// Application config directory (`config.toml`).
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TICKLER_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("tickler"))
        .unwrap_or_else(|| PathBuf::from("/tmp/tickler-config"))
}

/// Per-user task files (`<root>/tasks/`).
#[must_use]
pub fn tasks_dir(root: &Path) -> PathBuf {
    root.join("tasks")
}

/// Daily backup snapshots (`<root>/backups/`).
#[must_use]
pub fn backups_dir(root: &Path) -> PathBuf {
    root.join("backups")
}

/// Rolling log files (`<root>/logs/`).
#[must_use]
pub fn logs_dir(root: &Path) -> PathBuf {
    root.join("logs")
}
