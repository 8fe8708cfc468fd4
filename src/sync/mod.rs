//! Sync engine.
//!
//! Reconciles locally queued task mutations with the remote authority:
//!
//! - **Remote**: connectivity probe and batch transport seams, plus the HTTP client
//! - **Batch**: submits one batch and routes each item's outcome
//! - **Resolver**: picks the winning version of a conflicting record
//! - **Retry**: per-item failure bookkeeping with a bounded budget and backoff
//! - **Engine**: the orchestrator driving a full cycle
//!
//! # Architecture
//!
//! The queue lives in SQLite and is only touched through the storage layer.
//! A cycle claims each batch (`pending → in_progress`) before submitting it,
//! and every commit is conditional on the item still being claimed, so a
//! task edited mid-flight keeps its newer intent queued.
//!
//! # Example
//!
//! ```ignore
//! use tasksync::sync::SyncEngine;
//!
//! let engine = SyncEngine::http(storage, config)?;
//! let result = engine.sync_if_online().await;
//! println!("{} synced, {} failed", result.synced_items, result.failed_items);
//! ```

mod batch;
mod engine;
mod remote;
mod resolver;
mod retry;
#[cfg(test)]
mod testing;
mod types;

pub use engine::{CancelHandle, SyncEngine};
pub use remote::{BatchTransport, ConnectivityProbe, HttpRemote};
pub use resolver::{resolve, ConflictStrategy, Resolution, Winner};
pub use retry::{handle_failure, BackoffPolicy, FailureOutcome, RetryPolicy};
pub use types::{
    BatchRequest, BatchResponse, CycleOutcome, CycleResult, ItemStatus, ProcessedItem,
    StatusSnapshot, SyncItemError,
};

/// Actor recorded on audit events written by the engine.
pub const ACTOR: &str = "sync-engine";

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
