//! Sync command implementations.
//!
//! The engine is async; commands drive it on a short-lived tokio runtime.

use crate::cli::SyncCommands;
use crate::config::{default_actor, SyncConfig};
use crate::error::{Error, Result};
use crate::model::QueueItem;
use crate::storage::SqliteStorage;
use crate::sync::{CycleOutcome, CycleResult, HttpRemote, StatusSnapshot, SyncEngine};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use super::{format_ms, open_storage};

/// Output for sync queue.
#[derive(Serialize)]
struct QueueOutput<'a> {
    items: &'a [QueueItem],
    count: usize,
}

/// Execute sync commands.
pub fn execute(
    command: &SyncCommands,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    match command {
        SyncCommands::Run { force } => run(*force, db_path, json),
        SyncCommands::Status => status(db_path, json),
        SyncCommands::Queue => queue(db_path, json),
        SyncCommands::Requeue { id } => {
            let actor = actor.map_or_else(default_actor, ToString::to_string);
            requeue(id, db_path, &actor, json)
        }
    }
}

fn engine(storage: SqliteStorage) -> Result<SyncEngine<HttpRemote, HttpRemote>> {
    let config = SyncConfig::load()?;
    SyncEngine::http(Arc::new(tokio::sync::Mutex::new(storage)), config)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

fn run(force: bool, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let engine = engine(open_storage(db_path, false)?)?;
    let rt = runtime()?;

    let result = rt.block_on(async {
        if force {
            engine.sync().await
        } else {
            engine.sync_if_online().await
        }
    });

    if json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        print_cycle(&result, &engine.config().api_base_url);
    }

    if let CycleOutcome::Aborted { error } = &result.outcome {
        return Err(Error::Other(format!("sync aborted: {error}")));
    }
    Ok(())
}

fn print_cycle(result: &CycleResult, api: &str) {
    match &result.outcome {
        CycleOutcome::Offline => {
            println!("{} remote unreachable at {api}; nothing sent.", "Offline:".yellow());
            return;
        }
        CycleOutcome::Busy => {
            println!("Another sync is already running.");
            return;
        }
        CycleOutcome::Completed | CycleOutcome::Cancelled | CycleOutcome::Aborted { .. } => {}
    }

    if result.total == 0 {
        println!("Nothing to sync.");
        return;
    }

    let headline = if result.success {
        "Sync complete".green().bold()
    } else {
        "Sync finished with failures".yellow().bold()
    };
    println!("{headline}");
    println!("  Total:     {}", result.total);
    println!("  Synced:    {}", result.synced_items);
    println!("  Failed:    {}", result.failed_items);
    if result.conflicts > 0 {
        println!("  Conflicts: {} (resolved)", result.conflicts);
    }
    if result.permanently_failed > 0 {
        println!(
            "  {}",
            format!(
                "{} item(s) gave up after the retry limit; see `tasksync sync queue`",
                result.permanently_failed
            )
            .red()
        );
    }
    if result.outcome == CycleOutcome::Cancelled {
        println!("  {}", "Cancelled before all batches were sent".yellow());
    }

    for error in &result.errors {
        println!(
            "  {} {} {}: {}",
            "✗".red(),
            error.operation,
            error.task_id.dimmed(),
            error.error
        );
    }
}

fn status(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let engine = engine(open_storage(db_path, false)?)?;
    let rt = runtime()?;
    let snapshot: StatusSnapshot = rt.block_on(engine.status());

    if json {
        println!("{}", serde_json::to_string(&snapshot)?);
        return Ok(());
    }

    let online = if snapshot.online {
        "online".green()
    } else {
        "offline".red()
    };
    println!("Sync Status");
    println!("===========");
    println!("  Remote:    {} ({online})", engine.config().api_base_url);
    if let Some(error) = &snapshot.store_error {
        println!("  {} {error}", "Store unreadable:".red());
    }
    println!("  Queued:    {}", snapshot.pending_count);
    println!("  Failed:    {}", snapshot.failed_count);
    match snapshot.last_sync_time {
        Some(ms) => println!("  Last sync: {}", format_ms(ms)),
        None => println!("  Last sync: never"),
    }
    if snapshot.failed_count > 0 {
        println!();
        println!(
            "  {}",
            "Use `tasksync sync queue` and `tasksync sync requeue <id>` to retry failed items."
                .dimmed()
        );
    }
    Ok(())
}

fn queue(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path, false)?;
    let items = storage.list_queue()?;

    if json {
        let output = QueueOutput {
            items: &items,
            count: items.len(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("Sync queue is empty.");
        return Ok(());
    }

    for item in &items {
        println!(
            "{} {:<6} {:<11} retries={}",
            item.id.dimmed(),
            item.operation.as_str(),
            item.status.as_str(),
            item.retry_count
        );
        println!("    task {}", item.task_id);
        if let Some(error) = &item.last_error {
            println!("    last error: {}", error.red());
        }
    }
    Ok(())
}

fn requeue(id: &str, db_path: Option<&PathBuf>, actor: &str, json: bool) -> Result<()> {
    let mut storage = open_storage(db_path, false)?;
    let item = storage.requeue(id, actor)?;

    if json {
        println!("{}", serde_json::to_string(&item)?);
    } else {
        println!("Requeued {} for task {}", item.id, item.task_id);
    }
    Ok(())
}
