//! Remote authority seams.
//!
//! The engine talks to the remote through two traits so tests (and other
//! transports) can stand in for HTTP:
//!
//! - [`ConnectivityProbe`] answers "is the remote reachable right now?"
//! - [`BatchTransport`] submits one batch and decodes per-item outcomes
//!
//! [`HttpRemote`] implements both against the REST endpoints.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;

use super::types::{BatchRequest, BatchResponse};

/// Reachability check against the remote authority.
pub trait ConnectivityProbe: Send + Sync {
    /// Returns true only on a definitive success. Never errors: timeouts,
    /// network faults and non-success statuses all read as `false`.
    fn check_connectivity(&self) -> impl Future<Output = bool> + Send;
}

/// Submits a batch of queue items to the remote authority.
pub trait BatchTransport: Send + Sync {
    /// Submit one batch.
    ///
    /// An `Err` means no per-item outcome is known; the caller treats every
    /// item in the batch as failed.
    fn submit(&self, request: &BatchRequest) -> impl Future<Output = Result<BatchResponse>> + Send;
}

/// HTTP client for the remote REST API.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    probe_timeout: Duration,
}

impl HttpRemote {
    /// Create a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, request_timeout: Duration, probe_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            probe_timeout,
        })
    }
}

impl ConnectivityProbe for HttpRemote {
    async fn check_connectivity(&self) -> bool {
        let url = format!("{}/health", self.base_url);

        match self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, url = %url, "Health probe failed");
                false
            }
        }
    }
}

impl BatchTransport for HttpRemote {
    async fn submit(&self, request: &BatchRequest) -> Result<BatchResponse> {
        let url = format!("{}/sync/batch", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("batch request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Remote(format!("batch rejected with HTTP {status}: {body}")));
        }

        response
            .json::<BatchResponse>()
            .await
            .map_err(|e| Error::Transport(format!("undecodable batch response: {e}")))
    }
}
