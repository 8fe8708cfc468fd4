//! Configuration management.
//!
//! This module provides functions for locating the tasksync directory,
//! resolving the database path, and loading sync settings.
//!
//! # Layout
//!
//! Everything lives under a single global directory:
//! - **Database**: `~/.tasksync/data/tasksync.db`
//! - **Settings**: `~/.tasksync/config.json`

mod settings;

pub use settings::{
    config_path, SyncConfig, DEFAULT_API_BASE_URL, DEFAULT_BATCH_SIZE, DEFAULT_MAX_RETRIES,
};

use std::path::{Path, PathBuf};

/// Get the global tasksync directory location (`~/.tasksync/`).
#[must_use]
pub fn global_tasksync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".tasksync"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `TASKSYNC_DB` environment variable
/// 3. Global location: `~/.tasksync/data/tasksync.db`
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no location found.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("TASKSYNC_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_tasksync_dir().map(|dir| dir.join("data").join("tasksync.db"))
}

/// Get the default actor name recorded on audit events.
///
/// Priority:
/// 1. `TASKSYNC_ACTOR` environment variable
/// 2. System username
/// 3. "unknown"
#[must_use]
pub fn default_actor() -> String {
    ["TASKSYNC_ACTOR", "USER", "USERNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_actor() {
        let actor = default_actor();
        assert!(!actor.is_empty());
    }

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/db.sqlite");
        let result = resolve_db_path(Some(&explicit));
        assert_eq!(result, Some(explicit));
    }

    #[test]
    fn test_config_path_is_under_global_dir() {
        let global = global_tasksync_dir().unwrap();
        assert_eq!(config_path().unwrap(), global.join("config.json"));
    }
}
