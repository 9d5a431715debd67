//! Routing of loopback requests to several peers.

use crate::server::PeerServer;
use paysync_engine::{HttpResponse, LoopbackRequest, LoopbackServer};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Dispatches loopback requests to peers by endpoint host.
///
/// Requests to a host with no registered peer fail at the transport level,
/// as if the host were unreachable.
#[derive(Default)]
pub struct PeerRouter {
    peers: RwLock<HashMap<String, Arc<PeerServer>>>,
}

impl PeerRouter {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `host` with `server`, replacing any previous registration.
    pub fn register(&self, host: impl Into<String>, server: Arc<PeerServer>) {
        self.peers.write().insert(host.into(), server);
    }

    /// Stops serving `host`.
    pub fn unregister(&self, host: &str) -> Option<Arc<PeerServer>> {
        self.peers.write().remove(host)
    }

    /// Peer serving `host`.
    pub fn peer(&self, host: &str) -> Option<Arc<PeerServer>> {
        self.peers.read().get(host).cloned()
    }
}

/// Extracts the host (with port) from a URL.
pub fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?']).next().unwrap_or_default()
}

impl LoopbackServer for PeerRouter {
    fn handle(&self, request: LoopbackRequest<'_>) -> Result<HttpResponse, String> {
        let host = host_of(request.url);
        let peer = self
            .peer(host)
            .ok_or_else(|| format!("connection refused: {host}"))?;
        peer.handle(request)
    }
}
