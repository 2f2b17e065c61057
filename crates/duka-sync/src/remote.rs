//! # Remote Apply Client
//!
//! The queue manager's only network-facing dependency: one insert per
//! operation kind against the remote store.
//!
//! ```text
//! QueuedOperation { kind: Sale,           payload } ──► POST <base>/sales
//! QueuedOperation { kind: ProductUpsert,  payload } ──► POST <base>/products
//! QueuedOperation { kind: CustomerUpsert, payload } ──► POST <base>/customers
//!
//!   2xx            ──► Ok(())
//!   non-2xx        ──► RemoteError::Rejected { status, message }
//!   timeout        ──► RemoteError::Timeout
//!   network error  ──► RemoteError::Transport
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::SyncConfig;
use crate::error::{RemoteError, SyncError, SyncResult};
use duka_core::{OperationKind, QueuedOperation};

/// Applies domain writes to the remote store.
#[async_trait]
pub trait RemoteApplyClient: Send + Sync {
    async fn insert_sale(&self, payload: &Value) -> Result<(), RemoteError>;

    async fn insert_product(&self, payload: &Value) -> Result<(), RemoteError>;

    async fn insert_customer(&self, payload: &Value) -> Result<(), RemoteError>;

    /// Dispatches a queued operation by kind.
    async fn apply(&self, operation: &QueuedOperation) -> Result<(), RemoteError> {
        match operation.kind {
            OperationKind::Sale => self.insert_sale(&operation.payload).await,
            OperationKind::ProductUpsert => self.insert_product(&operation.payload).await,
            OperationKind::CustomerUpsert => self.insert_customer(&operation.payload).await,
        }
    }
}

// =============================================================================
// REST Client
// =============================================================================

/// [`RemoteApplyClient`] over a PostgREST-style HTTP API.
#[derive(Debug, Clone)]
pub struct RestApplyClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl RestApplyClient {
    /// Creates a client for `base_url` (e.g. `https://host/rest/v1`).
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> SyncResult<Self> {
        let mut base_url = Url::parse(base_url)?;

        // Url::join replaces the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("HTTP client: {e}")))?;

        Ok(RestApplyClient {
            http,
            base_url,
            api_key,
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Builds a client from `[remote]` settings.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        let base_url = config
            .remote
            .base_url
            .as_deref()
            .ok_or_else(|| SyncError::InvalidConfig("remote.base_url is not set".into()))?;

        Self::new(
            base_url,
            config.remote.api_key.clone(),
            Duration::from_secs(config.remote.request_timeout_secs),
        )
    }

    /// Endpoint for a table.
    pub fn table_url(&self, table: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(table)
            .map_err(|e| RemoteError::Transport(format!("invalid table url: {e}")))
    }

    async fn insert(&self, table: &str, payload: &Value) -> Result<(), RemoteError> {
        let url = self.table_url(table)?;
        let mut request = self.http.post(url.clone()).json(payload);

        if let Some(ref key) = self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();

        if status.is_success() {
            debug!(%url, status = status.as_u16(), "Remote insert applied");
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    fn classify(&self, err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout(self.timeout_secs)
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl RemoteApplyClient for RestApplyClient {
    async fn insert_sale(&self, payload: &Value) -> Result<(), RemoteError> {
        self.insert(OperationKind::Sale.table(), payload).await
    }

    async fn insert_product(&self, payload: &Value) -> Result<(), RemoteError> {
        self.insert(OperationKind::ProductUpsert.table(), payload).await
    }

    async fn insert_customer(&self, payload: &Value) -> Result<(), RemoteError> {
        self.insert(OperationKind::CustomerUpsert.table(), payload).await
    }
}
