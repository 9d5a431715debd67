//! Transport layer abstraction for peer communication.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Request headers as `(name, value)` pairs.
pub type Headers = [(String, String)];

/// HTTP method used by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET request.
    Get,
    /// POST request.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A 200 response with a JSON body.
    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    /// A bodiless response with the given status.
    pub fn empty(status: u16) -> Self {
        Self::new(status, Vec::new())
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. An `Err`
/// means the exchange never completed (refused connection, timeout, ...);
/// any answer from the peer, whatever its status, is an `Ok`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    async fn get(&self, url: &str, headers: &Headers) -> Result<HttpResponse, String>;

    /// Sends a POST request with a JSON body.
    async fn post(&self, url: &str, headers: &Headers, body: Vec<u8>)
        -> Result<HttpResponse, String>;
}

/// A request handed to a [`LoopbackServer`].
#[derive(Debug, Clone, Copy)]
pub struct LoopbackRequest<'a> {
    /// Request method.
    pub method: Method,
    /// Full request URL.
    pub url: &'a str,
    /// Path component of the URL, starting at `/sync/`.
    pub path: &'a str,
    /// Request headers.
    pub headers: &'a Headers,
    /// Request body (empty for GET).
    pub body: &'a [u8],
}

impl LoopbackRequest<'_> {
    /// Returns a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request. `Err` simulates a transport failure.
    fn handle(&self, request: LoopbackRequest<'_>) -> Result<HttpResponse, String>;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for Arc<S> {
    fn handle(&self, request: LoopbackRequest<'_>) -> Result<HttpResponse, String> {
        (**self).handle(request)
    }
}

/// A loopback HTTP client that routes requests directly to an in-process
/// server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server behind this client.
    pub fn server(&self) -> &S {
        &self.server
    }

    fn dispatch(
        &self,
        method: Method,
        url: &str,
        headers: &Headers,
        body: &[u8],
    ) -> Result<HttpResponse, String> {
        let path = url.find("/sync/").map(|i| &url[i..]).unwrap_or(url);
        self.server.handle(LoopbackRequest {
            method,
            url,
            path,
            headers,
            body,
        })
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn get(&self, url: &str, headers: &Headers) -> Result<HttpResponse, String> {
        self.dispatch(Method::Get, url, headers, &[])
    }

    async fn post(
        &self,
        url: &str,
        headers: &Headers,
        body: Vec<u8>,
    ) -> Result<HttpResponse, String> {
        self.dispatch(Method::Post, url, headers, &body)
    }
}

/// A request recorded by [`MockClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Request method.
    pub method: Method,
    /// Full request URL.
    pub url: String,
    /// Request body.
    pub body: Vec<u8>,
}

/// A scripted client for testing.
///
/// Responses are keyed by method and URL suffix; unscripted requests get a
/// 404. Every request is recorded.
#[derive(Debug, Default)]
pub struct MockClient {
    responses: Mutex<HashMap<(Method, String), HttpResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
    unreachable: AtomicBool,
}

impl MockClient {
    /// Creates a new mock client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the response for requests whose URL ends with `path`.
    pub fn set_response(&self, method: Method, path: impl Into<String>, response: HttpResponse) {
        self.responses.lock().insert((method, path.into()), response);
    }

    /// Makes every request fail at the transport level.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Returns every request seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Counts requests made with the given method.
    pub fn count(&self, method: Method) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    fn respond(&self, method: Method, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        self.requests.lock().push(RecordedRequest {
            method,
            url: url.to_string(),
            body,
        });
        if self.unreachable.load(Ordering::SeqCst) {
            return Err("connection refused".into());
        }
        let responses = self.responses.lock();
        Ok(responses
            .iter()
            .find(|((m, path), _)| *m == method && url.ends_with(path.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| HttpResponse::empty(404)))
    }
}

#[async_trait]
impl HttpClient for MockClient {
    async fn get(&self, url: &str, _headers: &Headers) -> Result<HttpResponse, String> {
        self.respond(Method::Get, url, Vec::new())
    }

    async fn post(
        &self,
        url: &str,
        _headers: &Headers,
        body: Vec<u8>,
    ) -> Result<HttpResponse, String> {
        self.respond(Method::Post, url, body)
    }
}
