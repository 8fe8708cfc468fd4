//! Sync queue item model.
//!
//! A queue item is one pending mutation awaiting remote reconciliation.
//! Items reference their task by `task_id` only; the queue never owns the
//! task's lifecycle.

use serde::{Deserialize, Serialize};

/// Kind of mutation a queue item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Parse from string.
    ///
    /// # Errors
    ///
    /// Returns an error message for anything but create/update/delete.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("Unknown queue operation: {other}")),
        }
    }

    /// Fold a newer intent into an older, still-unsent one for the same task.
    ///
    /// A task the remote has never seen stays a `create` through later
    /// updates; a delete always wins.
    #[must_use]
    pub const fn coalesce(self, newer: Self) -> Self {
        match (self, newer) {
            (_, Self::Delete) => Self::Delete,
            (Self::Create, _) => Self::Create,
            (_, newer) => newer,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a queue item.
///
/// `Completed` items are deleted rather than stored, so the value is only
/// ever seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    InProgress,
    Failed,
    Completed,
}

impl QueueStatus {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    /// Parse from the stored string. Unknown values read as `Pending`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" => Self::InProgress,
            "failed" => Self::Failed,
            "completed" => Self::Completed,
            _ => Self::Pending,
        }
    }
}

/// One pending mutation in the sync queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Queue item identifier; doubles as the client id on the wire
    pub id: String,

    /// Task this mutation belongs to
    pub task_id: String,

    pub operation: Operation,

    /// Serialized task snapshot (JSON)
    pub data: String,

    pub status: QueueStatus,

    /// Failed attempts so far
    pub retry_count: u32,

    pub last_error: Option<String>,

    /// Enqueue timestamp (Unix milliseconds); defines FIFO order
    pub created_at: i64,

    /// Earliest time the item may be selected again (Unix milliseconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesce_rules() {
        use Operation::{Create, Delete, Update};
        assert_eq!(Create.coalesce(Update), Create);
        assert_eq!(Create.coalesce(Delete), Delete);
        assert_eq!(Update.coalesce(Update), Update);
        assert_eq!(Update.coalesce(Delete), Delete);
        assert_eq!(Delete.coalesce(Update), Update);
    }

    #[test]
    fn test_operation_parse_rejects_unknown() {
        assert_eq!(Operation::parse("update"), Ok(Operation::Update));
        assert!(Operation::parse("error").is_err());
    }

    #[test]
    fn test_queue_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&QueueStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(QueueStatus::parse("failed"), QueueStatus::Failed);
    }
}
