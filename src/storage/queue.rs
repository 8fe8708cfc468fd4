//! Sync queue data access.
//!
//! The queue is a store-owned table; nothing outside this module touches it
//! directly. Every state change is a conditional UPDATE/DELETE so that a
//! stale writer (an old cycle, a duplicate failure report) becomes a no-op
//! instead of clobbering newer state.
//!
//! Item lifecycle:
//!
//! ```text
//! pending ──claim──▶ in_progress ──commit──▶ (deleted)
//!    ▲                   │
//!    └──retry────────────┤
//!                        └──budget exhausted──▶ failed ──requeue──▶ pending
//! ```

use crate::error::{Error, Result};
use crate::model::{Operation, QueueItem, QueueStatus, Task};
use crate::storage::events::EventType;
use crate::storage::sqlite::{select_task, SqliteStorage};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

const QUEUE_COLUMNS: &str =
    "id, task_id, operation, data, status, retry_count, last_error, created_at, next_attempt_at";

/// Marks a task `synced` unless another live intent for it is still queued.
///
/// `?1` is the task id. Used after the committed item has been deleted.
const SYNCED_UNLESS_REQUEUED: &str = "CASE WHEN EXISTS (
        SELECT 1 FROM sync_queue WHERE task_id = ?1 AND status IN ('pending', 'in_progress')
    ) THEN sync_status ELSE 'synced' END";

/// Queue size broken down by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub failed: usize,
}

impl QueueCounts {
    /// Items that will still be attempted automatically.
    #[must_use]
    pub fn live(&self) -> usize {
        self.pending + self.in_progress
    }

    /// Every row in the queue.
    #[must_use]
    pub fn total(&self) -> usize {
        self.live() + self.failed
    }
}

/// Bookkeeping written for one failed attempt.
#[derive(Debug, Clone)]
pub struct FailureRecord<'a> {
    /// The item's retry count after this failure.
    pub retry_count: u32,
    pub error: &'a str,
    /// Retry budget exhausted: move to `failed` and stop automatic retries.
    pub permanent: bool,
    /// Earliest time the item may be selected again.
    pub next_attempt_at: Option<i64>,
}

/// Record a new intent for `task_id` inside the caller's transaction.
///
/// If the task already has an unsent (`pending`) item, that item absorbs the
/// new intent and keeps its queue position; otherwise a new item is appended.
pub(crate) fn enqueue_in(
    conn: &Connection,
    task_id: &str,
    operation: Operation,
    payload: &str,
) -> Result<QueueItem> {
    let sql = format!(
        "SELECT {QUEUE_COLUMNS} FROM sync_queue
         WHERE task_id = ?1 AND status = 'pending'
         ORDER BY created_at DESC, rowid DESC LIMIT 1"
    );
    let existing = conn.query_row(&sql, [task_id], map_queue_row).optional()?;

    if let Some(mut item) = existing {
        item.operation = item.operation.coalesce(operation);
        item.data = payload.to_string();
        conn.execute(
            "UPDATE sync_queue SET operation = ?1, data = ?2 WHERE id = ?3",
            rusqlite::params![item.operation.as_str(), item.data, item.id],
        )?;
        return Ok(item);
    }

    let item = QueueItem {
        id: uuid::Uuid::new_v4().to_string(),
        task_id: task_id.to_string(),
        operation,
        data: payload.to_string(),
        status: QueueStatus::Pending,
        retry_count: 0,
        last_error: None,
        created_at: chrono::Utc::now().timestamp_millis(),
        next_attempt_at: None,
    };

    conn.execute(
        "INSERT INTO sync_queue (id, task_id, operation, data, status, retry_count, last_error, created_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', 0, NULL, ?5)",
        rusqlite::params![
            item.id,
            item.task_id,
            item.operation.as_str(),
            item.data,
            item.created_at
        ],
    )?;

    Ok(item)
}

impl SqliteStorage {
    /// Queue a mutation for a task in its own transaction.
    ///
    /// CRUD code should prefer the task operations, which enqueue atomically
    /// with the record write.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn enqueue(
        &mut self,
        task_id: &str,
        operation: Operation,
        payload: &str,
        actor: &str,
    ) -> Result<QueueItem> {
        self.mutate("enqueue", actor, |tx, _ctx| {
            enqueue_in(tx, task_id, operation, payload)
        })
    }

    /// Get a queue item by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_queue_item(&self, id: &str) -> Result<Option<QueueItem>> {
        select_queue_item(self.conn(), id)
    }

    /// Every queue item regardless of state, in FIFO order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_queue(&self) -> Result<Vec<QueueItem>> {
        self.query_queue("ORDER BY created_at ASC, rowid ASC", &[])
    }

    /// Whether `task_id` has an intent still waiting in `pending`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn has_pending_for(&self, task_id: &str) -> Result<bool> {
        let found = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM sync_queue WHERE task_id = ?1 AND status = 'pending')",
            [task_id],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Items eligible for submission at `now`, oldest first.
    ///
    /// Skips `in_progress` and `failed` items and anything still backing off.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn peek_pending(&self, now: i64) -> Result<Vec<QueueItem>> {
        self.query_queue(
            "WHERE status = 'pending' AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
             ORDER BY created_at ASC, rowid ASC",
            &[&now],
        )
    }

    /// Move the given items from `pending` to `in_progress`.
    ///
    /// Returns the items actually claimed, re-read so they carry any payload
    /// coalesced since they were peeked, in the order of `ids`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn claim_batch(&mut self, ids: &[String]) -> Result<Vec<QueueItem>> {
        self.mutate("claim_batch", "sync-engine", |tx, _ctx| {
            let mut claimed = Vec::with_capacity(ids.len());
            for id in ids {
                let changed = tx.execute(
                    "UPDATE sync_queue SET status = 'in_progress' WHERE id = ?1 AND status = 'pending'",
                    [id],
                )?;
                if changed == 1 {
                    if let Some(item) = select_queue_item(tx, id)? {
                        claimed.push(item);
                    }
                }
            }
            Ok(claimed)
        })
    }

    /// Return items stranded `in_progress` by an interrupted cycle to `pending`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn release_in_progress(&mut self) -> Result<usize> {
        let released = self.conn().execute(
            "UPDATE sync_queue SET status = 'pending' WHERE status = 'in_progress'",
            [],
        )?;
        Ok(released)
    }

    /// Commit a confirmed remote success: dequeue the item and mark its task synced.
    ///
    /// Returns `false` if the item was no longer `in_progress`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn commit_synced(
        &mut self,
        item: &QueueItem,
        server_id: Option<&str>,
        actor: &str,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp_millis();
        let server_id = server_id.filter(|s| !s.is_empty());

        self.mutate("commit_synced", actor, |tx, ctx| {
            if !dequeue_in(tx, &item.id)? {
                return Ok(false);
            }

            tx.execute(
                &format!(
                    "UPDATE tasks
                     SET last_synced_at = ?2, server_id = COALESCE(?3, server_id),
                         sync_status = {SYNCED_UNLESS_REQUEUED}
                     WHERE id = ?1"
                ),
                rusqlite::params![item.task_id, now, server_id],
            )?;

            ctx.record_change(
                "task",
                &item.task_id,
                EventType::ItemSynced,
                None,
                server_id.map(str::to_string),
                Some(item.operation.as_str()),
            );
            Ok(true)
        })
    }

    /// Commit a conflict resolution: persist `resolved`, dequeue the item and
    /// mark the task synced.
    ///
    /// `note` is stored on the audit event alongside the before/after state.
    /// Returns `false` if the item was no longer `in_progress`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn commit_resolution(
        &mut self,
        item: &QueueItem,
        resolved: &Task,
        note: &str,
        actor: &str,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("commit_resolution", actor, |tx, ctx| {
            if !dequeue_in(tx, &item.id)? {
                return Ok(false);
            }

            let before = select_task(tx, &item.task_id)?;

            tx.execute(
                &format!(
                    "UPDATE tasks
                     SET title = ?2, description = ?3, completed = ?4, updated_at = ?5,
                         is_deleted = ?6, server_id = COALESCE(?7, server_id), last_synced_at = ?8,
                         sync_status = {SYNCED_UNLESS_REQUEUED}
                     WHERE id = ?1"
                ),
                rusqlite::params![
                    item.task_id,
                    resolved.title,
                    resolved.description,
                    resolved.completed,
                    resolved.updated_at,
                    resolved.is_deleted,
                    resolved.server_id,
                    now,
                ],
            )?;

            let before = before.map(|t| serde_json::to_string(&t)).transpose()?;
            ctx.record_change(
                "task",
                &item.task_id,
                EventType::ConflictResolved,
                before,
                Some(serde_json::to_string(resolved)?),
                Some(note),
            );
            Ok(true)
        })
    }

    /// Record a failed attempt for a claimed item.
    ///
    /// Applies only if the item is still `in_progress` with the retry count it
    /// was claimed with, so reporting the same failure twice changes nothing.
    /// A permanent failure also flags the task's `sync_status` as `error`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn record_failure(
        &mut self,
        item: &QueueItem,
        failure: &FailureRecord<'_>,
        actor: &str,
    ) -> Result<bool> {
        let status = if failure.permanent {
            QueueStatus::Failed
        } else {
            QueueStatus::Pending
        };

        self.mutate("record_failure", actor, |tx, ctx| {
            let changed = tx.execute(
                "UPDATE sync_queue
                 SET retry_count = ?1, last_error = ?2, status = ?3, next_attempt_at = ?4
                 WHERE id = ?5 AND status = 'in_progress' AND retry_count = ?6",
                rusqlite::params![
                    failure.retry_count,
                    failure.error,
                    status.as_str(),
                    failure.next_attempt_at,
                    item.id,
                    item.retry_count,
                ],
            )?;
            if changed == 0 {
                return Ok(false);
            }

            let event_type = if failure.permanent {
                tx.execute(
                    "UPDATE tasks SET sync_status = 'error' WHERE id = ?1",
                    [&item.task_id],
                )?;
                EventType::PermanentlyFailed
            } else {
                EventType::RetryScheduled
            };

            ctx.record_change(
                "task",
                &item.task_id,
                event_type,
                Some(item.retry_count.to_string()),
                Some(failure.retry_count.to_string()),
                Some(failure.error),
            );
            Ok(true)
        })
    }

    /// Put a permanently failed item back in line with a fresh retry budget.
    ///
    /// # Errors
    ///
    /// Returns `QueueItemNotFound` if the item does not exist, or
    /// `InvalidArgument` if it is not in the `failed` state.
    pub fn requeue(&mut self, id: &str, actor: &str) -> Result<QueueItem> {
        self.mutate("requeue", actor, |tx, ctx| {
            let item = select_queue_item(tx, id)?
                .ok_or_else(|| Error::QueueItemNotFound { id: id.to_string() })?;

            if item.status != QueueStatus::Failed {
                return Err(Error::InvalidArgument(format!(
                    "queue item {id} is {}, only failed items can be requeued",
                    item.status.as_str()
                )));
            }

            tx.execute(
                "UPDATE sync_queue
                 SET status = 'pending', retry_count = 0, next_attempt_at = NULL
                 WHERE id = ?1",
                [id],
            )?;
            tx.execute(
                "UPDATE tasks SET sync_status = 'pending' WHERE id = ?1 AND sync_status = 'error'",
                [&item.task_id],
            )?;

            ctx.record_event("task", &item.task_id, EventType::Requeued);

            select_queue_item(tx, id)?.ok_or_else(|| Error::QueueItemNotFound { id: id.to_string() })
        })
    }

    /// Count queue items by state.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn queue_counts(&self) -> Result<QueueCounts> {
        let mut stmt = self
            .conn()
            .prepare("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let (status, count) = row?;
            let count = usize::try_from(count).unwrap_or(0);
            match QueueStatus::parse(&status) {
                QueueStatus::Pending => counts.pending += count,
                QueueStatus::InProgress => counts.in_progress += count,
                QueueStatus::Failed => counts.failed += count,
                QueueStatus::Completed => {}
            }
        }
        Ok(counts)
    }

    fn query_queue(&self, clause: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<QueueItem>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM sync_queue {clause}");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params, map_queue_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

/// Delete an item that is still `in_progress`. Returns whether it was.
fn dequeue_in(conn: &Connection, id: &str) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM sync_queue WHERE id = ?1 AND status = 'in_progress'",
        [id],
    )?;
    Ok(removed == 1)
}

fn select_queue_item(conn: &Connection, id: &str) -> Result<Option<QueueItem>> {
    let sql = format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE id = ?1");
    let item = conn.query_row(&sql, [id], map_queue_row).optional()?;
    Ok(item)
}

fn map_queue_row(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    let operation: String = row.get(2)?;
    let operation = Operation::parse(&operation).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;
    let status: String = row.get(4)?;

    Ok(QueueItem {
        id: row.get(0)?,
        task_id: row.get(1)?,
        operation,
        data: row.get(3)?,
        status: QueueStatus::parse(&status),
        retry_count: row.get(5)?,
        last_error: row.get(6)?,
        created_at: row.get(7)?,
        next_attempt_at: row.get(8)?,
    })
}
