//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// tasksync - offline-first tasks with a batched sync engine
#[derive(Parser, Debug)]
#[command(name = "tasksync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.tasksync/data/tasksync.db)
    #[arg(long, global = true, env = "TASKSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Actor name for audit trail
    #[arg(long, global = true, env = "TASKSYNC_ACTOR")]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Task management
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Sync with the remote API
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

// ============================================================================
// Task Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task
    Add(TaskAddArgs),

    /// List tasks
    List {
        /// Only tasks not yet confirmed by the remote (includes deleted ones)
        #[arg(long)]
        unsynced: bool,
    },

    /// Show a task
    Show {
        /// Task ID
        id: String,
    },

    /// Update a task
    Update(TaskUpdateArgs),

    /// Delete a task
    Delete {
        /// Task ID
        id: String,
    },

    /// Show a task's audit history
    History {
        /// Task ID
        id: String,

        /// Maximum number of events
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Args, Debug)]
pub struct TaskAddArgs {
    /// Task title
    pub title: String,

    /// Task description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Create the task already completed
    #[arg(long)]
    pub completed: bool,
}

#[derive(Args, Debug)]
pub struct TaskUpdateArgs {
    /// Task ID
    pub id: String,

    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Mark completed (true/false)
    #[arg(long)]
    pub completed: Option<bool>,
}

// ============================================================================
// Sync Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Run one sync cycle
    Run {
        /// Skip the connectivity probe
        #[arg(long)]
        force: bool,
    },

    /// Show queue size, last sync time and connectivity
    Status,

    /// List every queue item
    Queue,

    /// Give a permanently failed queue item a fresh retry budget
    Requeue {
        /// Queue item ID
        id: String,
    },
}
