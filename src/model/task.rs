//! Task model for tasksync.
//!
//! Tasks are the records a disconnected client mutates locally. Every
//! mutation leaves the task `pending` until the sync engine reconciles it
//! with the remote authority.

use serde::{Deserialize, Serialize};

/// Per-record sync marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Error,
}

impl SyncStatus {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }

    /// Parse from the stored string. Unknown values read as `Pending`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "synced" => Self::Synced,
            "error" => Self::Error,
            _ => Self::Pending,
        }
    }
}

/// A task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Client-local identifier (UUID v4)
    pub id: String,

    /// Task title
    pub title: String,

    /// Optional free-form description
    pub description: Option<String>,

    /// Completion flag
    pub completed: bool,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last modification timestamp (Unix milliseconds).
    ///
    /// Never decreases for a given task; conflict arbitration reads only this.
    pub updated_at: i64,

    /// Soft-delete flag. Deleted tasks are invisible to readers.
    pub is_deleted: bool,

    /// Reconciliation state
    pub sync_status: SyncStatus,

    /// Identity assigned by the remote authority, once known
    pub server_id: Option<String>,

    /// When this task was last confirmed by the remote (Unix milliseconds)
    pub last_synced_at: Option<i64>,
}

impl Task {
    /// Create a new, never-synced task.
    #[must_use]
    pub fn new(input: &TaskInput) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: input.title.clone(),
            description: input.description.clone(),
            completed: input.completed.unwrap_or(false),
            created_at: now,
            updated_at: now,
            is_deleted: false,
            sync_status: SyncStatus::Pending,
            server_id: None,
            last_synced_at: None,
        }
    }

    /// Overlay the fields the remote supplied onto this task.
    ///
    /// Fields absent from `remote` keep their local value. Identity is never
    /// taken from the remote, and `updated_at` never moves backwards.
    #[must_use]
    pub fn merged_with(&self, remote: &RemoteTask) -> Self {
        let mut merged = self.clone();
        if let Some(title) = &remote.title {
            merged.title.clone_from(title);
        }
        if let Some(description) = &remote.description {
            merged.description = Some(description.clone());
        }
        if let Some(completed) = remote.completed {
            merged.completed = completed;
        }
        if let Some(is_deleted) = remote.is_deleted {
            merged.is_deleted = is_deleted;
        }
        if let Some(updated_at) = remote.updated_at {
            merged.updated_at = self.updated_at.max(updated_at);
        }
        if let Some(server_id) = remote.server_id.as_deref().filter(|s| !s.is_empty()) {
            merged.server_id = Some(server_id.to_string());
        }
        merged
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInput {
    pub title: String,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

/// Partial update of a task's user-editable fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

impl TaskUpdate {
    /// Returns true if the update would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.completed.is_none()
    }
}

/// Task state as reported by the remote authority in a conflict.
///
/// Every field is optional: the remote may send only what it knows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteTask {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub is_deleted: Option<bool>,
    pub updated_at: Option<i64>,
    pub server_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Task {
        Task::new(&TaskInput {
            title: "Buy milk".to_string(),
            description: Some("2 litres".to_string()),
            completed: None,
        })
    }

    #[test]
    fn test_new_task_defaults() {
        let task = sample();
        assert!(!task.completed);
        assert!(!task.is_deleted);
        assert_eq!(task.sync_status, SyncStatus::Pending);
        assert_eq!(task.created_at, task.updated_at);
        assert!(task.server_id.is_none());
        assert!(uuid::Uuid::parse_str(&task.id).is_ok());
    }

    #[test]
    fn test_merge_overwrites_only_supplied_fields() {
        let local = sample();
        let remote = RemoteTask {
            title: Some("Buy oat milk".to_string()),
            completed: Some(true),
            updated_at: Some(local.updated_at + 10),
            ..RemoteTask::default()
        };

        let merged = local.merged_with(&remote);
        assert_eq!(merged.id, local.id);
        assert_eq!(merged.title, "Buy oat milk");
        assert!(merged.completed);
        assert_eq!(merged.description.as_deref(), Some("2 litres"));
        assert_eq!(merged.updated_at, local.updated_at + 10);
    }

    #[test]
    fn test_merge_never_rewinds_updated_at() {
        let local = sample();
        let remote = RemoteTask {
            title: Some("Older server copy".to_string()),
            updated_at: Some(1),
            ..RemoteTask::default()
        };

        let merged = local.merged_with(&remote);
        assert_eq!(merged.title, "Older server copy");
        assert_eq!(merged.updated_at, local.updated_at);
    }

    #[test]
    fn test_merge_ignores_empty_server_id() {
        let mut local = sample();
        local.server_id = Some("srv-1".to_string());
        let remote = RemoteTask {
            server_id: Some(String::new()),
            ..RemoteTask::default()
        };
        assert_eq!(local.merged_with(&remote).server_id.as_deref(), Some("srv-1"));
    }

    #[test]
    fn test_remote_task_decodes_partial_payload() {
        let remote: RemoteTask =
            serde_json::from_str(r#"{"title":"x","updated_at":42}"#).unwrap();
        assert_eq!(remote.title.as_deref(), Some("x"));
        assert_eq!(remote.updated_at, Some(42));
        assert!(remote.completed.is_none());
    }

    #[test]
    fn test_sync_status_round_trip() {
        for status in [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Error] {
            assert_eq!(SyncStatus::parse(status.as_str()), status);
        }
    }
}
