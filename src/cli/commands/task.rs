//! Task command implementations.
//!
//! Every mutation goes through the store, which queues it for sync in the
//! same transaction.

use crate::cli::{TaskAddArgs, TaskCommands, TaskUpdateArgs};
use crate::config::default_actor;
use crate::error::{Error, Result};
use crate::model::{SyncStatus, Task, TaskInput, TaskUpdate};
use crate::storage::events::get_events;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use super::{format_ms, open_storage};

/// Output for task list.
#[derive(Serialize)]
struct TaskListOutput<'a> {
    tasks: &'a [Task],
    count: usize,
}

/// Output for task delete.
#[derive(Serialize)]
struct DeleteOutput<'a> {
    id: &'a str,
    deleted: bool,
}

#[derive(Serialize)]
struct HistoryEntry {
    event_type: &'static str,
    actor: String,
    old_value: Option<String>,
    new_value: Option<String>,
    comment: Option<String>,
    created_at: i64,
}

/// Execute task commands.
pub fn execute(
    command: &TaskCommands,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let actor = actor.map_or_else(default_actor, ToString::to_string);
    match command {
        TaskCommands::Add(args) => add(args, db_path, &actor, json),
        TaskCommands::List { unsynced } => list(*unsynced, db_path, json),
        TaskCommands::Show { id } => show(id, db_path, json),
        TaskCommands::Update(args) => update(args, db_path, &actor, json),
        TaskCommands::Delete { id } => delete(id, db_path, &actor, json),
        TaskCommands::History { id, limit } => history(id, *limit, db_path, json),
    }
}

fn add(args: &TaskAddArgs, db_path: Option<&PathBuf>, actor: &str, json: bool) -> Result<()> {
    let mut storage = open_storage(db_path, true)?;
    let task = storage.create_task(
        &TaskInput {
            title: args.title.clone(),
            description: args.description.clone(),
            completed: Some(args.completed),
        },
        actor,
    )?;

    if json {
        println!("{}", serde_json::to_string(&task)?);
    } else {
        println!("Created task: {}", task.title);
        println!("  ID: {}", task.id);
    }
    Ok(())
}

fn list(unsynced: bool, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path, false)?;
    let tasks = if unsynced {
        storage.tasks_needing_sync()?
    } else {
        storage.list_tasks()?
    };

    if json {
        let output = TaskListOutput {
            tasks: &tasks,
            count: tasks.len(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }

    for task in &tasks {
        let check = if task.completed { "[x]" } else { "[ ]" };
        let mut line = format!("{check} {} {}", task.title, sync_badge(task.sync_status));
        if task.is_deleted {
            line.push_str(&format!(" {}", "(deleted)".dimmed()));
        }
        println!("{line}");
        println!("    {}", task.id.dimmed());
    }
    println!();
    println!("{} task(s)", tasks.len());
    Ok(())
}

fn show(id: &str, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path, false)?;
    let task = storage
        .get_task(id)?
        .ok_or_else(|| Error::TaskNotFound { id: id.to_string() })?;

    if json {
        println!("{}", serde_json::to_string(&task)?);
        return Ok(());
    }

    println!("{}", task.title.bold());
    println!("  ID:          {}", task.id);
    if let Some(description) = &task.description {
        println!("  Description: {description}");
    }
    println!("  Completed:   {}", task.completed);
    println!("  Sync:        {}", sync_badge(task.sync_status));
    if let Some(server_id) = &task.server_id {
        println!("  Server ID:   {server_id}");
    }
    println!("  Created:     {}", format_ms(task.created_at));
    println!("  Updated:     {}", format_ms(task.updated_at));
    if let Some(synced) = task.last_synced_at {
        println!("  Last synced: {}", format_ms(synced));
    }
    Ok(())
}

fn update(args: &TaskUpdateArgs, db_path: Option<&PathBuf>, actor: &str, json: bool) -> Result<()> {
    let update = TaskUpdate {
        title: args.title.clone(),
        description: args.description.clone(),
        completed: args.completed,
    };
    if update.is_empty() {
        return Err(Error::InvalidArgument(
            "nothing to update: pass --title, --description or --completed".to_string(),
        ));
    }

    let mut storage = open_storage(db_path, false)?;
    let task = storage
        .update_task(&args.id, &update, actor)?
        .ok_or_else(|| Error::TaskNotFound {
            id: args.id.clone(),
        })?;

    if json {
        println!("{}", serde_json::to_string(&task)?);
    } else {
        println!("Updated task: {}", task.title);
    }
    Ok(())
}

fn delete(id: &str, db_path: Option<&PathBuf>, actor: &str, json: bool) -> Result<()> {
    let mut storage = open_storage(db_path, false)?;
    if !storage.delete_task(id, actor)? {
        return Err(Error::TaskNotFound { id: id.to_string() });
    }

    if json {
        let output = DeleteOutput { id, deleted: true };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Deleted task: {id}");
    }
    Ok(())
}

fn history(id: &str, limit: u32, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path, false)?;
    if storage.find_task(id)?.is_none() {
        return Err(Error::TaskNotFound { id: id.to_string() });
    }

    let entries: Vec<HistoryEntry> = get_events(storage.conn(), "task", id, Some(limit))?
        .into_iter()
        .map(|e| HistoryEntry {
            event_type: e.event_type.as_str(),
            actor: e.actor,
            old_value: e.old_value,
            new_value: e.new_value,
            comment: e.comment,
            created_at: e.created_at,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        let comment = entry
            .comment
            .as_deref()
            .map(|c| format!(" ({c})"))
            .unwrap_or_default();
        println!(
            "{} {} by {}{}",
            format_ms(entry.created_at).dimmed(),
            entry.event_type,
            entry.actor,
            comment
        );
    }
    Ok(())
}

fn sync_badge(status: SyncStatus) -> String {
    match status {
        SyncStatus::Synced => "synced".green().to_string(),
        SyncStatus::Pending => "pending".yellow().to_string(),
        SyncStatus::Error => "error".red().to_string(),
    }
}
