//! tasksync - offline-first tasks with a batched sync engine
//!
//! Tasks are mutated locally and every mutation is queued durably; the sync
//! engine later reconciles the queue with a remote authority in batches,
//! retrying failures and resolving conflicts.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Task, QueueItem)
//! - [`storage`] - SQLite database layer and sync queue
//! - [`sync`] - The sync engine
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
