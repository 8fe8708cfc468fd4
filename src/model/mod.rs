//! Data models for tasksync.
//!
//! This module contains the domain models:
//! - Task (plus create/update inputs and the remote conflict payload)
//! - QueueItem

pub mod queue;
pub mod task;

pub use queue::{Operation, QueueItem, QueueStatus};
pub use task::{RemoteTask, SyncStatus, Task, TaskInput, TaskUpdate};
