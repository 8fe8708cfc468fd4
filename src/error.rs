//! Error types for tasksync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Retryability flags
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use thiserror::Error;

/// Result type alias for tasksync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    DatabaseError,

    // Not Found (exit 3)
    TaskNotFound,
    QueueItemNotFound,

    // Validation (exit 4)
    InvalidArgument,

    // Sync (exit 6)
    TransportError,
    RemoteError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::TaskNotFound => "TASK_NOT_FOUND",
            Self::QueueItemNotFound => "QUEUE_ITEM_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::RemoteError => "REMOTE_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::DatabaseError => 2,
            Self::TaskNotFound | Self::QueueItemNotFound => 3,
            Self::InvalidArgument => 4,
            Self::TransportError | Self::RemoteError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether the same call may succeed if simply tried again later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportError | Self::RemoteError | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in tasksync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: no database at the resolved path")]
    NotInitialized,

    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    #[error("Queue item not found: {id}")]
    QueueItemNotFound { id: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote call itself failed: network fault, timeout, undecodable body.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote answered, but not with something we can use.
    #[error("Remote error: {0}")]
    Remote(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::TaskNotFound { .. } => ErrorCode::TaskNotFound,
            Self::QueueItemNotFound { .. } => ErrorCode::QueueItemNotFound,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Transport(_) => ErrorCode::TransportError,
            Self::Remote(_) => ErrorCode::RemoteError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => Some(
                "Create a task with `tasksync task add <title>` or pass --db <path>".to_string(),
            ),
            Self::TaskNotFound { id } => Some(format!(
                "No task with ID '{id}'. Use `tasksync task list` to see available tasks."
            )),
            Self::QueueItemNotFound { id } => Some(format!(
                "No queue item with ID '{id}'. Use `tasksync sync queue` to inspect the queue."
            )),
            Self::Transport(_) => Some(
                "Check API_BASE_URL and that the remote is reachable (`tasksync sync status`)."
                    .to_string(),
            ),
            Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Remote(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(Error::NotInitialized.exit_code(), 2);
        assert_eq!(Error::TaskNotFound { id: "t".into() }.exit_code(), 3);
        assert_eq!(Error::InvalidArgument("x".into()).exit_code(), 4);
        assert_eq!(Error::Transport("down".into()).exit_code(), 6);
        assert_eq!(Error::Other("boom".into()).exit_code(), 1);
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::QueueItemNotFound { id: "q1".into() };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "QUEUE_ITEM_NOT_FOUND");
        assert_eq!(json["error"]["retryable"], false);
        assert!(json["error"]["hint"].as_str().unwrap().contains("q1"));
    }

    #[test]
    fn test_transport_is_retryable() {
        assert!(ErrorCode::TransportError.is_retryable());
        assert!(!ErrorCode::InvalidArgument.is_retryable());
    }
}
