//! SQLite storage layer for tasksync.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - The durable sync queue
//! - Audit events for history
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`queue`] - Sync queue data access
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod events;
pub mod queue;
pub mod schema;
pub mod sqlite;

pub use queue::{FailureRecord, QueueCounts};
pub use sqlite::{MutationContext, SqliteStorage};
