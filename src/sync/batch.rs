//! Batch submission and per-item outcome routing.
//!
//! One batch goes out in one remote call. Each item's outcome then fans out:
//! success commits, conflict goes through the resolver and commits, error
//! goes to retry bookkeeping. A batch-level failure (no outcomes at all)
//! routes every item to retry bookkeeping.

use crate::config::SyncConfig;
use crate::error::Result;
use crate::model::{Operation, QueueItem};
use crate::storage::SqliteStorage;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::remote::BatchTransport;
use super::resolver::{resolve, Resolution, Winner};
use super::retry::{handle_failure, FailureOutcome};
use super::types::{BatchRequest, BatchResponse, ItemStatus, ProcessedItem};
use super::{now_ms, ACTOR};

/// What happened to one submitted item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ItemOutcome {
    Synced,
    Resolved { winner: Winner },
    Failed { error: String, failure: FailureOutcome },
}

#[derive(Debug, Clone)]
pub(crate) struct ItemReport {
    pub task_id: String,
    pub operation: Operation,
    pub outcome: ItemOutcome,
}

/// Submit `items` (already claimed) and apply every outcome locally.
///
/// # Errors
///
/// Returns an error only for local store failures; remote and transport
/// problems become per-item failures.
pub(crate) async fn process_batch<T: BatchTransport>(
    transport: &T,
    storage: &Mutex<SqliteStorage>,
    config: &SyncConfig,
    items: Vec<QueueItem>,
) -> Result<Vec<ItemReport>> {
    let request = BatchRequest {
        items,
        client_timestamp: now_ms(),
    };

    tracing::debug!(items = request.items.len(), "Submitting batch");

    let response = match tokio::time::timeout(config.request_timeout, transport.submit(&request)).await
    {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            let message = e.to_string();
            tracing::warn!(items = request.items.len(), error = %message, "Batch submission failed");
            return fail_all(storage, config, &request.items, &message).await;
        }
        Err(_) => {
            let message = format!(
                "batch request timed out after {}ms",
                config.request_timeout.as_millis()
            );
            tracing::warn!(items = request.items.len(), "Batch submission timed out");
            return fail_all(storage, config, &request.items, &message).await;
        }
    };

    apply_outcomes(storage, config, request.items, response).await
}

async fn apply_outcomes(
    storage: &Mutex<SqliteStorage>,
    config: &SyncConfig,
    items: Vec<QueueItem>,
    response: BatchResponse,
) -> Result<Vec<ItemReport>> {
    let mut outcomes: HashMap<String, ProcessedItem> = HashMap::new();
    for processed in response.processed_items {
        if items.iter().any(|i| i.id == processed.client_id) {
            outcomes.insert(processed.client_id.clone(), processed);
        } else {
            tracing::warn!(client_id = %processed.client_id, "Ignoring outcome for an item not in this batch");
        }
    }

    let mut reports = Vec::with_capacity(items.len());
    for item in items {
        let report = match outcomes.remove(&item.id) {
            None => {
                fail_item(storage, config, &item, "no outcome returned for item").await?
            }
            Some(processed) => apply_one(storage, config, &item, processed).await?,
        };
        reports.push(report);
    }
    Ok(reports)
}

async fn apply_one(
    storage: &Mutex<SqliteStorage>,
    config: &SyncConfig,
    item: &QueueItem,
    processed: ProcessedItem,
) -> Result<ItemReport> {
    let server_id = processed.server_id().map(str::to_string);

    match processed.status {
        ItemStatus::Success => {
            let committed = storage
                .lock()
                .await
                .commit_synced(item, server_id.as_deref(), ACTOR)?;
            if !committed {
                tracing::debug!(item_id = %item.id, "Item already left in_progress; commit skipped");
            }
            Ok(report(item, ItemOutcome::Synced))
        }
        ItemStatus::Conflict => {
            let Some(remote) = processed.resolved_data else {
                let error = processed
                    .error
                    .unwrap_or_else(|| "conflict reported without remote state".to_string());
                return fail_item(storage, config, item, &error).await;
            };

            // Read, resolve and write under one lock so no local write slips in between.
            let mut guard = storage.lock().await;
            let Some(local) = guard.find_task(&item.task_id)? else {
                drop(guard);
                return fail_item(storage, config, item, "conflict for a task missing locally").await;
            };

            // An edit queued behind this item still has to go out; the remote
            // must not overwrite it locally in the meantime.
            let mut resolution = if guard.has_pending_for(&item.task_id)? {
                tracing::info!(task_id = %item.task_id, "Newer local edit queued; keeping local version");
                Resolution {
                    task: local,
                    winner: Winner::Local,
                    strategy: config.conflict_strategy,
                }
            } else {
                resolve(&local, &remote, config.conflict_strategy)
            };
            if resolution.task.server_id.is_none() {
                resolution.task.server_id = server_id;
            }
            guard.commit_resolution(item, &resolution.task, &resolution.note(), ACTOR)?;

            Ok(report(
                item,
                ItemOutcome::Resolved {
                    winner: resolution.winner,
                },
            ))
        }
        ItemStatus::Error => {
            let error = processed
                .error
                .unwrap_or_else(|| "remote rejected item".to_string());
            fail_item(storage, config, item, &error).await
        }
    }
}

async fn fail_all(
    storage: &Mutex<SqliteStorage>,
    config: &SyncConfig,
    items: &[QueueItem],
    error: &str,
) -> Result<Vec<ItemReport>> {
    let mut reports = Vec::with_capacity(items.len());
    for item in items {
        reports.push(fail_item(storage, config, item, error).await?);
    }
    Ok(reports)
}

async fn fail_item(
    storage: &Mutex<SqliteStorage>,
    config: &SyncConfig,
    item: &QueueItem,
    error: &str,
) -> Result<ItemReport> {
    let failure = {
        let mut guard = storage.lock().await;
        handle_failure(&mut guard, &config.retry_policy(), item, error, ACTOR)?
    };
    Ok(report(
        item,
        ItemOutcome::Failed {
            error: error.to_string(),
            failure,
        },
    ))
}

fn report(item: &QueueItem, outcome: ItemOutcome) -> ItemReport {
    ItemReport {
        task_id: item.task_id.clone(),
        operation: item.operation,
        outcome,
    }
}
