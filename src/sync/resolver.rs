//! Conflict resolution.
//!
//! When the remote reports a conflict it sends its own view of the record.
//! The resolver picks the winning version under a configured strategy; the
//! result is always committed locally as `synced`.

use crate::model::{RemoteTask, Task};
use serde::{Deserialize, Serialize};

/// Policy for choosing between diverged local and remote versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Newer `updated_at` wins; ties go to the remote.
    #[default]
    LastWriteWins,
    /// Local version always wins.
    ClientWins,
    /// Remote fields always overwrite local ones.
    ServerWins,
}

impl ConflictStrategy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LastWriteWins => "last-write-wins",
            Self::ClientWins => "client-wins",
            Self::ServerWins => "server-wins",
        }
    }

    /// Parse a strategy name as given in `SYNC_CONFLICT_STRATEGY`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "last-write-wins" | "lww" => Some(Self::LastWriteWins),
            "client-wins" => Some(Self::ClientWins),
            "server-wins" => Some(Self::ServerWins),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side a resolution kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Local,
    Remote,
}

impl Winner {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// The outcome of resolving one conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The record to persist
    pub task: Task,
    pub winner: Winner,
    pub strategy: ConflictStrategy,
}

impl Resolution {
    /// One-line description for audit events.
    #[must_use]
    pub fn note(&self) -> String {
        format!("winner={} strategy={}", self.winner.as_str(), self.strategy)
    }
}

/// Resolve a conflict between the local record and the remote's view of it.
///
/// A local win returns `local` unchanged. A remote win overlays every field
/// the remote supplied onto `local`; fields it omitted keep their local value.
#[must_use]
pub fn resolve(local: &Task, remote: &RemoteTask, strategy: ConflictStrategy) -> Resolution {
    let winner = match strategy {
        ConflictStrategy::ClientWins => Winner::Local,
        ConflictStrategy::ServerWins => Winner::Remote,
        ConflictStrategy::LastWriteWins => match remote.updated_at {
            Some(remote_at) if local.updated_at <= remote_at => Winner::Remote,
            // A remote version with no timestamp cannot be shown to be newer.
            Some(_) | None => Winner::Local,
        },
    };

    let task = match winner {
        Winner::Local => local.clone(),
        Winner::Remote => local.merged_with(remote),
    };

    tracing::info!(
        task_id = %local.id,
        winner = winner.as_str(),
        strategy = strategy.as_str(),
        local_updated_at = local.updated_at,
        remote_updated_at = ?remote.updated_at,
        "Conflict resolved"
    );

    Resolution {
        task,
        winner,
        strategy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskInput;

    fn local_at(updated_at: i64) -> Task {
        let mut task = Task::new(&TaskInput {
            title: "Local title".into(),
            description: Some("local notes".into()),
            completed: None,
        });
        task.updated_at = updated_at;
        task
    }

    fn remote_at(updated_at: Option<i64>) -> RemoteTask {
        RemoteTask {
            title: Some("Remote title".into()),
            completed: Some(true),
            updated_at,
            ..RemoteTask::default()
        }
    }

    #[test]
    fn test_newer_local_wins_unchanged() {
        let local = local_at(2_000);
        let resolution = resolve(&local, &remote_at(Some(1_000)), ConflictStrategy::LastWriteWins);

        assert_eq!(resolution.winner, Winner::Local);
        assert_eq!(resolution.task, local);
    }

    #[test]
    fn test_newer_remote_merges_over_local() {
        let local = local_at(1_000);
        let resolution = resolve(&local, &remote_at(Some(2_000)), ConflictStrategy::LastWriteWins);

        assert_eq!(resolution.winner, Winner::Remote);
        assert_eq!(resolution.task.title, "Remote title");
        assert!(resolution.task.completed);
        assert_eq!(resolution.task.updated_at, 2_000);
        // Not supplied by the remote, so kept from local.
        assert_eq!(resolution.task.description.as_deref(), Some("local notes"));
        assert_eq!(resolution.task.id, local.id);
    }

    #[test]
    fn test_equal_timestamps_go_to_remote() {
        let local = local_at(1_000);
        let resolution = resolve(&local, &remote_at(Some(1_000)), ConflictStrategy::LastWriteWins);
        assert_eq!(resolution.winner, Winner::Remote);
    }

    #[test]
    fn test_remote_without_timestamp_loses() {
        let local = local_at(1_000);
        let resolution = resolve(&local, &remote_at(None), ConflictStrategy::LastWriteWins);
        assert_eq!(resolution.winner, Winner::Local);
        assert_eq!(resolution.task, local);
    }

    #[test]
    fn test_fixed_strategies_ignore_timestamps() {
        let local = local_at(5_000);
        let client = resolve(&local, &remote_at(Some(9_000)), ConflictStrategy::ClientWins);
        assert_eq!(client.winner, Winner::Local);

        let server = resolve(&local, &remote_at(Some(1)), ConflictStrategy::ServerWins);
        assert_eq!(server.winner, Winner::Remote);
        assert_eq!(server.task.title, "Remote title");
        assert_eq!(server.note(), "winner=remote strategy=server-wins");
    }

    #[test]
    fn test_server_wins_keeps_updated_at_monotonic() {
        let local = local_at(5_000);
        let resolution = resolve(&local, &remote_at(Some(1)), ConflictStrategy::ServerWins);

        assert_eq!(resolution.winner, Winner::Remote);
        assert_eq!(resolution.task.title, "Remote title");
        assert!(resolution.task.updated_at >= local.updated_at);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(ConflictStrategy::parse("LWW"), Some(ConflictStrategy::LastWriteWins));
        assert_eq!(ConflictStrategy::parse("server_wins"), Some(ConflictStrategy::ServerWins));
        assert_eq!(ConflictStrategy::parse("coin-flip"), None);
    }
}
