//! Sync orchestrator.
//!
//! A cycle drains the queue oldest-first in fixed-size batches, one batch at
//! a time. Only one cycle runs at once per engine; a second caller gets
//! [`CycleOutcome::Busy`] back immediately.

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::model::{Operation, QueueItem};
use crate::storage::SqliteStorage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::batch::{process_batch, ItemOutcome};
use super::remote::{BatchTransport, ConnectivityProbe, HttpRemote};
use super::retry::FailureOutcome;
use super::types::{CycleOutcome, CycleResult, StatusSnapshot};
use super::now_ms;

/// Requests cancellation of the engine's running cycle.
///
/// Honored between batches, never mid-batch.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Drives sync cycles against a remote authority.
pub struct SyncEngine<T, P> {
    storage: Arc<Mutex<SqliteStorage>>,
    transport: T,
    probe: P,
    config: SyncConfig,
    cycle: Mutex<()>,
    cancel: Arc<AtomicBool>,
}

impl SyncEngine<HttpRemote, HttpRemote> {
    /// Engine talking HTTP to `config.api_base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn http(storage: Arc<Mutex<SqliteStorage>>, config: SyncConfig) -> Result<Self> {
        let remote = HttpRemote::new(
            &config.api_base_url,
            config.request_timeout,
            config.probe_timeout,
        )?;
        Ok(Self::new(storage, remote.clone(), remote, config))
    }
}

impl<T: BatchTransport, P: ConnectivityProbe> SyncEngine<T, P> {
    #[must_use]
    pub fn new(storage: Arc<Mutex<SqliteStorage>>, transport: T, probe: P, config: SyncConfig) -> Self {
        Self {
            storage,
            transport,
            probe,
            config,
            cycle: Mutex::new(()),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Shared handle to the local store.
    #[must_use]
    pub fn storage(&self) -> &Arc<Mutex<SqliteStorage>> {
        &self.storage
    }

    /// Ask the running cycle to stop after its current batch.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// A handle that can cancel cycles from elsewhere.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    /// Queue a mutation for `task_id`.
    ///
    /// Task CRUD already enqueues in the same transaction as its write; this
    /// is for callers that maintain records elsewhere.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON or the write fails.
    pub async fn enqueue(&self, task_id: &str, operation: Operation, payload: &str) -> Result<QueueItem> {
        serde_json::from_str::<serde_json::Value>(payload)
            .map_err(|e| Error::InvalidArgument(format!("queue payload is not JSON: {e}")))?;
        self.storage
            .lock()
            .await
            .enqueue(task_id, operation, payload, super::ACTOR)
    }

    /// Probe the remote with a bounded timeout.
    pub async fn check_connectivity(&self) -> bool {
        tokio::time::timeout(self.config.probe_timeout, self.probe.check_connectivity())
            .await
            .unwrap_or(false)
    }

    /// Read-only snapshot of the backlog plus a fresh connectivity probe.
    ///
    /// Never fails: a store read error yields zero counts and `store_error`.
    pub async fn status(&self) -> StatusSnapshot {
        let backlog = {
            let storage = self.storage.lock().await;
            storage
                .queue_counts()
                .and_then(|counts| Ok((counts, storage.last_synced_at()?)))
        };
        let online = self.check_connectivity().await;

        match backlog {
            Ok((counts, last_sync_time)) => StatusSnapshot {
                pending_count: counts.total(),
                failed_count: counts.failed,
                last_sync_time,
                online,
                store_error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Could not read sync backlog");
                StatusSnapshot {
                    pending_count: 0,
                    failed_count: 0,
                    last_sync_time: None,
                    online,
                    store_error: Some(e.to_string()),
                }
            }
        }
    }

    /// Run a cycle only if the remote answers the health probe.
    pub async fn sync_if_online(&self) -> CycleResult {
        if !self.check_connectivity().await {
            tracing::warn!(api = %self.config.api_base_url, "Remote unreachable, skipping sync");
            return CycleResult::new(CycleOutcome::Offline);
        }
        self.sync().await
    }

    /// Run one sync cycle. Never fails: problems are reported in the result.
    pub async fn sync(&self) -> CycleResult {
        let Ok(_running) = self.cycle.try_lock() else {
            tracing::info!("Sync cycle already running");
            return CycleResult::new(CycleOutcome::Busy);
        };
        self.cancel.store(false, Ordering::SeqCst);

        let mut result = CycleResult::new(CycleOutcome::Completed);
        if let Err(e) = self.run_cycle(&mut result).await {
            tracing::error!(error = %e, "Sync cycle aborted by local store failure");
            result.outcome = CycleOutcome::Aborted {
                error: e.to_string(),
            };
        }
        result.finish();

        if result.total > 0 {
            tracing::info!(
                total = result.total,
                synced = result.synced_items,
                failed = result.failed_items,
                conflicts = result.conflicts,
                permanently_failed = result.permanently_failed,
                outcome = ?result.outcome,
                "Sync cycle finished"
            );
        }
        result
    }

    async fn run_cycle(&self, result: &mut CycleResult) -> Result<()> {
        let eligible = {
            let mut storage = self.storage.lock().await;
            let released = storage.release_in_progress()?;
            if released > 0 {
                tracing::warn!(released, "Returned interrupted queue items to pending");
            }
            storage.peek_pending(now_ms())?
        };

        result.total = eligible.len();
        if eligible.is_empty() {
            tracing::debug!("Sync queue is empty");
            return Ok(());
        }

        let batch_size = self.config.batch_size.max(1);
        tracing::info!(
            items = eligible.len(),
            batches = eligible.len().div_ceil(batch_size),
            "Starting sync cycle"
        );

        for chunk in eligible.chunks(batch_size) {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::info!(synced = result.synced_items, "Sync cycle cancelled");
                result.outcome = CycleOutcome::Cancelled;
                return Ok(());
            }

            let ids: Vec<String> = chunk.iter().map(|item| item.id.clone()).collect();
            let claimed = self.storage.lock().await.claim_batch(&ids)?;
            if claimed.is_empty() {
                continue;
            }

            let reports = process_batch(&self.transport, &self.storage, &self.config, claimed).await?;
            for report in reports {
                match report.outcome {
                    ItemOutcome::Synced => result.record_synced(),
                    ItemOutcome::Resolved { winner } => result.record_conflict(
                        &report.task_id,
                        report.operation,
                        format!("conflict resolved, {} version kept", winner.as_str()),
                    ),
                    ItemOutcome::Failed { error, failure } => {
                        if matches!(failure, FailureOutcome::PermanentlyFailed { .. }) {
                            result.permanently_failed += 1;
                        }
                        result.record_error(&report.task_id, report.operation, error);
                    }
                }
            }
        }

        Ok(())
    }
}
