//! Connector to one remote peer.

use crate::error::{Result, SyncError};
use crate::transport::HttpClient;
use paysync_codec::{PushEnvelope, Record, Snapshot};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Path of the liveness and identity endpoint.
pub const IDENTITY_PATH: &str = "/sync/identity";

/// Wraps one peer's endpoint.
///
/// Push and pull never fail because of the network: transport problems are
/// logged and reported as `false` / `None` so that a single unavailable
/// peer cannot abort a pass. The only errors returned are configuration
/// errors, raised before any request is sent.
pub struct PeerConnector<C: HttpClient> {
    /// Base URL of the peer.
    endpoint: String,
    /// Bearer token, if configured.
    auth_token: Option<String>,
    /// HTTP client implementation.
    client: Arc<C>,
    /// Set once [`close`](Self::close) has been called.
    closed: AtomicBool,
    /// Last transport error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> PeerConnector<C> {
    /// Creates a connector. The endpoint is validated lazily, on first use.
    pub fn new(endpoint: impl Into<String>, auth_token: Option<String>, client: Arc<C>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_token,
            client,
            closed: AtomicBool::new(false),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns true once the connector has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Releases the connector. Later calls fail with
    /// [`SyncError::NotConnected`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Checks that the endpoint is usable without touching the network.
    pub fn validate(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SyncError::NotConnected);
        }
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(SyncError::Config("peer endpoint is not set".into()));
        }
        if !endpoint.contains("://") {
            return Err(SyncError::Config(format!(
                "peer endpoint `{endpoint}` has no scheme"
            )));
        }
        Ok(())
    }

    fn url(&self, path: &str) -> Result<String> {
        self.validate()?;
        let path = path.trim();
        if path.is_empty() || path == "/" {
            return Err(SyncError::Config("resource path is not set".into()));
        }
        Ok(format!(
            "{}/{}",
            self.endpoint.trim().trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        if let Some(token) = &self.auth_token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        headers
    }

    fn set_error(&self, err: impl Into<String>) {
        *self.last_error.write() = Some(err.into());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    /// Asks the peer for its identity record.
    ///
    /// Unlike push and pull this reports transport failures as errors: it
    /// decides whether a pass can start at all.
    pub async fn fetch_identity(&self) -> Result<Record> {
        let url = self.url(IDENTITY_PATH)?;
        let response = self
            .client
            .get(&url, &self.headers())
            .await
            .map_err(|e| {
                self.set_error(&e);
                SyncError::transport(e)
            })?;

        if !response.is_success() {
            self.set_error(format!("identity request returned {}", response.status));
            return Err(SyncError::status(response.status));
        }

        self.clear_error();
        Ok(serde_json::from_slice(&response.body).map_err(paysync_codec::CodecError::from)?)
    }

    /// Sends a snapshot to `path`. Returns true on a 200/201 answer.
    pub async fn push(&self, path: &str, snapshot: &Snapshot) -> Result<bool> {
        let url = self.url(path)?;
        let body = PushEnvelope::sync(snapshot.clone()).to_json()?;

        match self.client.post(&url, &self.headers(), body).await {
            Ok(response) if matches!(response.status, 200 | 201) => {
                debug!(url = %url, items = snapshot.len(), "pushed snapshot");
                self.clear_error();
                Ok(true)
            }
            Ok(response) => {
                warn!(url = %url, status = response.status, "peer rejected push");
                self.set_error(format!("push returned {}", response.status));
                Ok(false)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "push failed");
                self.set_error(e);
                Ok(false)
            }
        }
    }

    /// Fetches the snapshot at `path`.
    ///
    /// Returns `None` when the peer is unavailable, answers with anything
    /// but 200, or sends a body that is not a snapshot.
    pub async fn pull(&self, path: &str) -> Result<Option<Snapshot>> {
        let url = self.url(path)?;

        let response = match self.client.get(&url, &self.headers()).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "pull failed");
                self.set_error(e);
                return Ok(None);
            }
        };

        if response.status != 200 {
            warn!(url = %url, status = response.status, "peer returned no data");
            self.set_error(format!("pull returned {}", response.status));
            return Ok(None);
        }

        match Snapshot::from_json(&response.body) {
            Ok(snapshot) => {
                debug!(url = %url, items = snapshot.len(), "pulled snapshot");
                self.clear_error();
                Ok(Some(snapshot))
            }
            Err(e) => {
                warn!(url = %url, error = %e, "peer sent an unreadable snapshot");
                self.set_error(e.to_string());
                Ok(None)
            }
        }
    }
}
