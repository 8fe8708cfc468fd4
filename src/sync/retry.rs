//! Retry and failure bookkeeping.
//!
//! Each failed attempt bumps an item's `retry_count` by exactly one. Below
//! the ceiling the item goes back to `pending` (after an optional backoff);
//! at the ceiling it becomes `failed` and waits for a manual requeue.

use crate::error::Result;
use crate::model::QueueItem;
use crate::storage::{FailureRecord, SqliteStorage};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay before a failed item becomes eligible again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BackoffPolicy {
    /// Eligible again on the next cycle.
    #[default]
    Immediate,
    /// `base_ms * 2^(retry_count - 1)`, capped at `max_ms`.
    Exponential { base_ms: u64, max_ms: u64 },
}

impl BackoffPolicy {
    /// Delay after the `retry_count`-th failure.
    #[must_use]
    pub fn delay(&self, retry_count: u32) -> Duration {
        match *self {
            Self::Immediate => Duration::ZERO,
            Self::Exponential { base_ms, max_ms } => {
                let exponent = retry_count.saturating_sub(1).min(63);
                let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
                Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
            }
        }
    }
}

/// Retry budget and pacing for queue items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failures after which an item is permanently failed
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::Immediate,
        }
    }
}

impl RetryPolicy {
    /// Bookkeeping for one more failure of `item`, observed at `now`.
    #[must_use]
    pub fn next_failure<'a>(&self, item: &QueueItem, error: &'a str, now: i64) -> FailureRecord<'a> {
        let retry_count = item.retry_count.saturating_add(1);
        let permanent = retry_count >= self.max_retries;

        let delay = self.backoff.delay(retry_count);
        let next_attempt_at = if permanent || delay.is_zero() {
            None
        } else {
            let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
            Some(now.saturating_add(delay_ms))
        };

        FailureRecord {
            retry_count,
            error,
            permanent,
            next_attempt_at,
        }
    }
}

/// What recording a failure did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to `pending`; will be retried.
    Retrying { retry_count: u32 },
    /// Budget exhausted; excluded from automatic selection.
    PermanentlyFailed { retry_count: u32 },
    /// The item had already left `in_progress`; nothing was written.
    AlreadyRecorded,
}

/// Record a failed attempt for a claimed item.
///
/// Safe to call more than once for the same attempt: only the first call
/// writes anything.
///
/// # Errors
///
/// Returns an error if the store write fails.
pub fn handle_failure(
    storage: &mut SqliteStorage,
    policy: &RetryPolicy,
    item: &QueueItem,
    error: &str,
    actor: &str,
) -> Result<FailureOutcome> {
    let failure = policy.next_failure(item, error, super::now_ms());

    if !storage.record_failure(item, &failure, actor)? {
        tracing::debug!(item_id = %item.id, "Failure already recorded for this attempt");
        return Ok(FailureOutcome::AlreadyRecorded);
    }

    if failure.permanent {
        tracing::warn!(
            item_id = %item.id,
            task_id = %item.task_id,
            operation = %item.operation,
            retry_count = failure.retry_count,
            error,
            "Queue item permanently failed"
        );
        Ok(FailureOutcome::PermanentlyFailed {
            retry_count: failure.retry_count,
        })
    } else {
        tracing::warn!(
            item_id = %item.id,
            task_id = %item.task_id,
            retry_count = failure.retry_count,
            next_attempt_at = ?failure.next_attempt_at,
            error,
            "Sync attempt failed, will retry"
        );
        Ok(FailureOutcome::Retrying {
            retry_count: failure.retry_count,
        })
    }
}
