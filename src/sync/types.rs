//! Types for the sync engine: wire payloads, cycle results, status snapshots.

use crate::model::{Operation, QueueItem, RemoteTask};
use serde::{Deserialize, Serialize};

// ==================
// Wire format
// ==================

/// Body of `POST {api}/sync/batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<QueueItem>,
    /// Client clock at submission (Unix milliseconds)
    pub client_timestamp: i64,
}

/// Response to a batch submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub processed_items: Vec<ProcessedItem>,
}

/// Remote verdict for one submitted item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedItem {
    /// The queue item id the client submitted
    pub client_id: String,
    #[serde(default)]
    pub server_id: Option<String>,
    pub status: ItemStatus,
    /// Remote state of the record; accompanies a conflict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_data: Option<RemoteTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessedItem {
    /// The remote identity, with an empty string treated as absent.
    #[must_use]
    pub fn server_id(&self) -> Option<&str> {
        self.server_id.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Conflict,
    Error,
}

// ==================
// Cycle result
// ==================

/// How a sync cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Every eligible batch was attempted.
    Completed,
    /// The remote was unreachable; the queue was not touched.
    Offline,
    /// Another cycle was already running; nothing was done.
    Busy,
    /// Stopped between batches on request.
    Cancelled,
    /// The local store failed; remaining batches were skipped.
    Aborted { error: String },
}

/// A structured per-item failure reported by a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncItemError {
    pub task_id: String,
    pub operation: Operation,
    pub error: String,
    /// When the failure was observed (Unix milliseconds)
    pub timestamp: i64,
}

/// Summary of one sync cycle. Built fresh per cycle and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleResult {
    /// True when the cycle completed with no failed items.
    pub success: bool,
    /// Items eligible for this cycle
    pub total: usize,
    pub synced_items: usize,
    /// Items that did not sync cleanly, conflicts included
    pub failed_items: usize,
    /// Conflicts the resolver settled (also counted in `failed_items`)
    pub conflicts: usize,
    /// Items that exhausted their retry budget this cycle
    pub permanently_failed: usize,
    pub errors: Vec<SyncItemError>,
    pub outcome: CycleOutcome,
}

impl CycleResult {
    /// An empty result for a cycle that ended with `outcome`.
    #[must_use]
    pub fn new(outcome: CycleOutcome) -> Self {
        let mut result = Self {
            success: false,
            total: 0,
            synced_items: 0,
            failed_items: 0,
            conflicts: 0,
            permanently_failed: 0,
            errors: Vec::new(),
            outcome,
        };
        result.finish();
        result
    }

    pub(crate) fn record_synced(&mut self) {
        self.synced_items += 1;
    }

    pub(crate) fn record_conflict(&mut self, task_id: &str, operation: Operation, message: String) {
        self.conflicts += 1;
        self.record_error(task_id, operation, message);
    }

    pub(crate) fn record_error(&mut self, task_id: &str, operation: Operation, message: String) {
        self.failed_items += 1;
        self.errors.push(SyncItemError {
            task_id: task_id.to_string(),
            operation,
            error: message,
            timestamp: super::now_ms(),
        });
    }

    /// Recompute `success` from the counters and outcome.
    pub(crate) fn finish(&mut self) {
        self.success = self.outcome == CycleOutcome::Completed && self.failed_items == 0;
    }
}

// ==================
// Status
// ==================

/// Read-only view of the engine's backlog and reachability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Every item in the queue, failed ones included
    pub pending_count: usize,
    /// Items that exhausted their retry budget
    pub failed_count: usize,
    /// Latest `last_synced_at` across tasks (Unix milliseconds)
    pub last_sync_time: Option<i64>,
    pub online: bool,
    /// Set when the local store could not be read; counts are then zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_item_decodes_minimal_payload() {
        let item: ProcessedItem =
            serde_json::from_str(r#"{"client_id":"q1","status":"error"}"#).unwrap();
        assert_eq!(item.status, ItemStatus::Error);
        assert!(item.server_id().is_none());
        assert!(item.resolved_data.is_none());
    }

    #[test]
    fn test_empty_server_id_is_absent() {
        let item: ProcessedItem =
            serde_json::from_str(r#"{"client_id":"q1","server_id":"","status":"success"}"#)
                .unwrap();
        assert_eq!(item.server_id(), None);
    }

    #[test]
    fn test_cycle_success_flag() {
        let mut result = CycleResult::new(CycleOutcome::Completed);
        assert!(result.success);

        result.record_error("t1", Operation::Update, "HTTP 500".into());
        result.finish();
        assert!(!result.success);
        assert_eq!(result.failed_items, 1);
        assert_eq!(result.errors[0].task_id, "t1");

        assert!(!CycleResult::new(CycleOutcome::Busy).success);
        assert!(!CycleResult::new(CycleOutcome::Offline).success);
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let json = serde_json::to_value(CycleOutcome::Aborted {
            error: "disk I/O error".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "aborted");
        assert_eq!(json["error"], "disk I/O error");
    }
}
