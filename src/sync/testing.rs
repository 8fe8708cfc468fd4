//! Scripted remote stand-ins for engine tests.

use crate::error::Result;
use crate::model::RemoteTask;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::engine::CancelHandle;
use super::remote::{BatchTransport, ConnectivityProbe};
use super::types::{BatchRequest, BatchResponse, ItemStatus, ProcessedItem};

type Responder = Box<dyn Fn(&BatchRequest) -> Result<BatchResponse> + Send + Sync>;

/// Transport that answers every batch with a scripted response and records
/// what it was sent.
pub(crate) struct FakeTransport {
    respond: Responder,
    requests: Mutex<Vec<BatchRequest>>,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
    cancel_on_submit: Mutex<Option<CancelHandle>>,
}

impl FakeTransport {
    pub fn new(respond: impl Fn(&BatchRequest) -> Result<BatchResponse> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
            gate: None,
            cancel_on_submit: Mutex::new(None),
        }
    }

    /// Signal `started` on each submit, then wait for `release` before answering.
    pub fn with_gate(mut self, started: Arc<Notify>, release: Arc<Notify>) -> Self {
        self.gate = Some((started, release));
        self
    }

    /// Fire `handle` during every submit.
    pub fn cancel_on_submit(&self, handle: CancelHandle) {
        *self.cancel_on_submit.lock().unwrap() = Some(handle);
    }

    /// Every batch submitted so far.
    pub fn requests(&self) -> Vec<BatchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl BatchTransport for FakeTransport {
    async fn submit(&self, request: &BatchRequest) -> Result<BatchResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let handle = self.cancel_on_submit.lock().unwrap().clone();
        if let Some(handle) = handle {
            handle.cancel();
        }

        if let Some((started, release)) = &self.gate {
            started.notify_one();
            release.notified().await;
        }

        (self.respond)(request)
    }
}

/// Probe with a fixed answer, or one that never answers.
pub(crate) struct FakeProbe {
    online: bool,
    hang: bool,
}

impl FakeProbe {
    pub fn online() -> Self {
        Self {
            online: true,
            hang: false,
        }
    }

    pub fn offline() -> Self {
        Self {
            online: false,
            hang: false,
        }
    }

    pub fn hanging() -> Self {
        Self {
            online: true,
            hang: true,
        }
    }
}

impl ConnectivityProbe for FakeProbe {
    async fn check_connectivity(&self) -> bool {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.online
    }
}

fn outcome_for_all(
    request: &BatchRequest,
    build: impl Fn(&crate::model::QueueItem) -> ProcessedItem,
) -> Result<BatchResponse> {
    Ok(BatchResponse {
        processed_items: request.items.iter().map(build).collect(),
    })
}

/// Every item succeeds with server id `srv-{task_id}`.
pub(crate) fn success_for_all(request: &BatchRequest) -> Result<BatchResponse> {
    outcome_for_all(request, |item| ProcessedItem {
        client_id: item.id.clone(),
        server_id: Some(format!("srv-{}", item.task_id)),
        status: ItemStatus::Success,
        resolved_data: None,
        error: None,
    })
}

/// Every item is rejected with "validation failed".
pub(crate) fn error_for_all(request: &BatchRequest) -> Result<BatchResponse> {
    outcome_for_all(request, |item| ProcessedItem {
        client_id: item.id.clone(),
        server_id: None,
        status: ItemStatus::Error,
        resolved_data: None,
        error: Some("validation failed".to_string()),
    })
}

/// Every item conflicts with a remote version titled `title`.
pub(crate) fn conflict_with(
    request: &BatchRequest,
    updated_at: Option<i64>,
    title: &str,
) -> Result<BatchResponse> {
    outcome_for_all(request, |item| ProcessedItem {
        client_id: item.id.clone(),
        server_id: Some(format!("srv-{}", item.task_id)),
        status: ItemStatus::Conflict,
        resolved_data: Some(RemoteTask {
            id: Some(item.task_id.clone()),
            title: Some(title.to_string()),
            updated_at,
            ..RemoteTask::default()
        }),
        error: None,
    })
}
