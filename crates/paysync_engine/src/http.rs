//! HTTP transport implementation backed by `reqwest`.

use crate::error::{Result, SyncError};
use crate::transport::{Headers, HttpClient, HttpResponse};
use async_trait::async_trait;
use std::time::Duration;

/// Default timeout for a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// An [`HttpClient`] that talks to peers over real HTTP.
///
/// One client is meant to be shared by every connector of a fleet; the
/// underlying connection pool is reused across peers.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    http: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the default timeouts.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .user_agent(format!("paysync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Wraps an existing `reqwest` client.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        headers: &Headers,
    ) -> std::result::Result<HttpResponse, String> {
        let request = headers.iter().fold(request, |req, (name, value)| {
            req.header(name.as_str(), value.as_str())
        });

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                format!("request timed out: {e}")
            } else if e.is_connect() {
                format!("peer unreachable: {e}")
            } else {
                e.to_string()
            }
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(
        &self,
        url: &str,
        headers: &Headers,
    ) -> std::result::Result<HttpResponse, String> {
        self.send(self.http.get(url), headers).await
    }

    async fn post(
        &self,
        url: &str,
        headers: &Headers,
        body: Vec<u8>,
    ) -> std::result::Result<HttpResponse, String> {
        self.send(self.http.post(url).body(body), headers).await
    }
}
