//! SQLite storage implementation.
//!
//! This module provides the local store for tasksync using SQLite.
//! It follows the MutationContext pattern for transaction discipline and audit
//! logging: every task mutation writes the record, its sync queue entry and
//! its audit events in one IMMEDIATE transaction.

use crate::error::{Error, Result};
use crate::model::{Operation, SyncStatus, Task, TaskInput, TaskUpdate};
use crate::storage::events::{insert_event, Event, EventType};
use crate::storage::queue::enqueue_in;
use crate::storage::schema::apply_schema;
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::time::Duration;

/// Column list shared by every task query; keep in sync with `map_task_row`.
pub(crate) const TASK_COLUMNS: &str = "id, title, description, completed, created_at, updated_at, \
     is_deleted, sync_status, server_id, last_synced_at";

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures so they can record audit events that are
/// written inside the same transaction.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation (user, sync engine, ...).
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events
            .push(Event::new(entity_type, entity_id, event_type, &self.actor));
    }

    /// Record an event with old/new values and an optional comment.
    pub fn record_change(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
        comment: Option<&str>,
    ) {
        let mut event = Event::new(entity_type, entity_id, event_type, &self.actor)
            .with_values(old_value, new_value);
        if let Some(comment) = comment {
            event = event.with_comment(comment);
        }
        self.events.push(event);
    }
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5000)))?;

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes audit events
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;

        Ok(result)
    }

    // ==================
    // Task Operations
    // ==================

    /// Create a task and queue it for sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the title is blank or the insert fails.
    pub fn create_task(&mut self, input: &TaskInput, actor: &str) -> Result<Task> {
        if input.title.trim().is_empty() {
            return Err(Error::InvalidArgument("title must not be empty".to_string()));
        }

        let task = Task::new(input);
        let payload = serde_json::to_string(&task)?;

        self.mutate("create_task", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO tasks (id, title, description, completed, created_at, updated_at, is_deleted, sync_status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 'pending')",
                rusqlite::params![
                    task.id,
                    task.title,
                    task.description,
                    task.completed,
                    task.created_at,
                    task.updated_at,
                ],
            )?;

            enqueue_in(tx, &task.id, Operation::Create, &payload)?;
            ctx.record_event("task", &task.id, EventType::TaskCreated);

            Ok(())
        })?;

        Ok(task)
    }

    /// Apply a partial update to a visible task and queue it for sync.
    ///
    /// Returns `None` if the task does not exist or is soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_task(&mut self, id: &str, update: &TaskUpdate, actor: &str) -> Result<Option<Task>> {
        if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(Error::InvalidArgument("title must not be empty".to_string()));
        }

        self.mutate("update_task", actor, |tx, ctx| {
            let Some(existing) = select_task(tx, id)?.filter(|t| !t.is_deleted) else {
                return Ok(None);
            };

            let mut task = existing.clone();
            if let Some(title) = &update.title {
                task.title.clone_from(title);
            }
            if let Some(description) = &update.description {
                task.description = Some(description.clone());
            }
            if let Some(completed) = update.completed {
                task.completed = completed;
            }
            task.updated_at = next_updated_at(existing.updated_at);
            task.sync_status = SyncStatus::Pending;

            tx.execute(
                "UPDATE tasks
                 SET title = ?1, description = ?2, completed = ?3, updated_at = ?4, sync_status = 'pending'
                 WHERE id = ?5",
                rusqlite::params![task.title, task.description, task.completed, task.updated_at, id],
            )?;

            let payload = serde_json::to_string(&task)?;
            enqueue_in(tx, id, Operation::Update, &payload)?;
            ctx.record_change(
                "task",
                id,
                EventType::TaskUpdated,
                Some(serde_json::to_string(&existing)?),
                Some(payload),
                None,
            );

            Ok(Some(task))
        })
    }

    /// Soft-delete a task and queue the deletion for sync.
    ///
    /// Returns `false` if the task does not exist or is already deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn delete_task(&mut self, id: &str, actor: &str) -> Result<bool> {
        self.mutate("delete_task", actor, |tx, ctx| {
            let Some(mut task) = select_task(tx, id)?.filter(|t| !t.is_deleted) else {
                return Ok(false);
            };

            task.is_deleted = true;
            task.updated_at = next_updated_at(task.updated_at);
            task.sync_status = SyncStatus::Pending;

            tx.execute(
                "UPDATE tasks SET is_deleted = 1, updated_at = ?1, sync_status = 'pending' WHERE id = ?2",
                rusqlite::params![task.updated_at, id],
            )?;

            let payload = serde_json::to_string(&task)?;
            enqueue_in(tx, id, Operation::Delete, &payload)?;
            ctx.record_event("task", id, EventType::TaskDeleted);

            Ok(true)
        })
    }

    /// Get a visible (not soft-deleted) task by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.find_task(id)?.filter(|t| !t.is_deleted))
    }

    /// Get a task by ID, including soft-deleted ones.
    ///
    /// The sync engine needs deleted tasks to reconcile their deletion.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_task(&self, id: &str) -> Result<Option<Task>> {
        select_task(&self.conn, id)
    }

    /// List all visible tasks, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        self.query_tasks("WHERE is_deleted = 0 ORDER BY created_at ASC, id ASC")
    }

    /// List tasks whose local state has not been confirmed by the remote.
    ///
    /// Includes soft-deleted tasks, since their deletion still has to sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn tasks_needing_sync(&self) -> Result<Vec<Task>> {
        self.query_tasks("WHERE sync_status IN ('pending', 'error') ORDER BY updated_at ASC, id ASC")
    }

    /// Most recent `last_synced_at` across all tasks, or `None` if nothing has synced.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn last_synced_at(&self) -> Result<Option<i64>> {
        let value: Option<i64> =
            self.conn
                .query_row("SELECT MAX(last_synced_at) FROM tasks", [], |row| row.get(0))?;
        Ok(value)
    }

    fn query_tasks(&self, clause: &str) -> Result<Vec<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks {clause}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], map_task_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

/// Read one task row by ID on any connection or transaction.
pub(crate) fn select_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    let task = conn.query_row(&sql, [id], map_task_row).optional()?;
    Ok(task)
}

pub(crate) fn map_task_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let sync_status: String = row.get(7)?;
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        completed: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        is_deleted: row.get(6)?,
        sync_status: SyncStatus::parse(&sync_status),
        server_id: row.get(8)?,
        last_synced_at: row.get(9)?,
    })
}

/// Next `updated_at` for a task: now, but never behind the previous value.
fn next_updated_at(previous: i64) -> i64 {
    chrono::Utc::now().timestamp_millis().max(previous)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(title: &str) -> TaskInput {
        TaskInput {
            title: title.to_string(),
            description: None,
            completed: None,
        }
    }

    #[test]
    fn test_create_task_enqueues_create() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let task = storage.create_task(&input("Write report"), "test").unwrap();

        let fetched = storage.get_task(&task.id).unwrap().unwrap();
        assert_eq!(fetched, task);

        let queue = storage.list_queue().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].task_id, task.id);
        assert_eq!(queue[0].operation, Operation::Create);
        assert_eq!(queue[0].retry_count, 0);

        let payload: Task = serde_json::from_str(&queue[0].data).unwrap();
        assert_eq!(payload.title, "Write report");
    }

    #[test]
    fn test_create_task_rejects_blank_title() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let result = storage.create_task(&input("   "), "test");
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(storage.list_queue().unwrap().is_empty());
    }

    #[test]
    fn test_update_task_is_monotonic_and_pending() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let task = storage.create_task(&input("Draft"), "test").unwrap();

        // Push the stored timestamp into the future; an update must not go backwards.
        let future = task.updated_at + 60_000;
        storage
            .conn()
            .execute(
                "UPDATE tasks SET updated_at = ?1, sync_status = 'synced' WHERE id = ?2",
                rusqlite::params![future, task.id],
            )
            .unwrap();

        let update = TaskUpdate {
            completed: Some(true),
            ..TaskUpdate::default()
        };
        let updated = storage.update_task(&task.id, &update, "test").unwrap().unwrap();

        assert!(updated.completed);
        assert_eq!(updated.updated_at, future);
        assert_eq!(updated.sync_status, SyncStatus::Pending);
        assert_eq!(updated.title, "Draft");
    }

    #[test]
    fn test_update_missing_task_returns_none() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let result = storage
            .update_task("nope", &TaskUpdate::default(), "test")
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_soft_delete_hides_task_but_keeps_it_for_sync() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let task = storage.create_task(&input("Temp"), "test").unwrap();

        assert!(storage.delete_task(&task.id, "test").unwrap());
        assert!(!storage.delete_task(&task.id, "test").unwrap());

        assert!(storage.get_task(&task.id).unwrap().is_none());
        assert!(storage.list_tasks().unwrap().is_empty());

        let raw = storage.find_task(&task.id).unwrap().unwrap();
        assert!(raw.is_deleted);

        let needing = storage.tasks_needing_sync().unwrap();
        assert_eq!(needing.len(), 1);
        assert_eq!(needing[0].id, task.id);
    }

    #[test]
    fn test_mutations_record_audit_events() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let task = storage.create_task(&input("Audit me"), "alice").unwrap();
        storage
            .update_task(
                &task.id,
                &TaskUpdate {
                    title: Some("Audited".into()),
                    ..TaskUpdate::default()
                },
                "alice",
            )
            .unwrap();

        let events =
            crate::storage::events::get_events(storage.conn(), "task", &task.id, None).unwrap();
        let kinds: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert!(kinds.contains(&EventType::TaskCreated));
        assert!(kinds.contains(&EventType::TaskUpdated));
        assert!(events.iter().all(|e| e.actor == "alice"));
    }

    #[test]
    fn test_last_synced_at_empty() {
        let storage = SqliteStorage::open_memory().unwrap();
        assert_eq!(storage.last_synced_at().unwrap(), None);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("tasksync.db");
        let mut storage = SqliteStorage::open(&path).unwrap();
        storage.create_task(&input("On disk"), "test").unwrap();
        assert!(path.exists());
    }
}
