//! Reference peer endpoint.

use crate::config::PeerConfig;
use crate::error::{PeerError, PeerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::state::PeerState;
use paysync_codec::EntityKind;
use paysync_engine::{HttpResponse, LoopbackRequest, LoopbackServer, Method};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// An in-process peer speaking the sync resource convention.
///
/// Serves `GET /sync/identity`, `GET /sync/<kind>` and `POST /sync/<kind>`.
/// Plug it into a [`paysync_engine::LoopbackClient`] to drive an engine
/// against it without a network.
///
/// # Example
///
/// ```
/// use paysync_codec::{EntityKind, Setting};
/// use paysync_peer::{PeerConfig, PeerServer};
///
/// let server = PeerServer::new(PeerConfig::new("eu-bot"));
/// server.state().publish_items(&[Setting::new("currency", "EUR")]);
/// assert_eq!(server.state().snapshot(EntityKind::Settings).len(), 1);
/// ```
pub struct PeerServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
    available: AtomicBool,
}

impl PeerServer {
    /// Creates a new peer with empty state.
    pub fn new(config: PeerConfig) -> Self {
        Self::with_state(config, Arc::new(PeerState::new()))
    }

    /// Creates a peer over existing state.
    pub fn with_state(config: PeerConfig, state: Arc<PeerState>) -> Self {
        let context = Arc::new(HandlerContext::new(config, state));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self {
            handler,
            context,
            available: AtomicBool::new(true),
        }
    }

    /// Peer name.
    pub fn name(&self) -> &str {
        &self.context.config.name
    }

    /// Peer data.
    pub fn state(&self) -> &Arc<PeerState> {
        &self.context.state
    }

    /// Simulates the peer going down (`false`) or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns true while the peer answers requests.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn route(&self, request: &LoopbackRequest<'_>) -> PeerResult<HttpResponse> {
        self.context
            .config
            .auth
            .check(request.header("authorization"))?;

        let path = request.path.split('?').next().unwrap_or_default();
        let resource = path
            .trim_end_matches('/')
            .strip_prefix("/sync/")
            .ok_or_else(|| PeerError::NotFound(path.to_string()))?;

        if resource == "identity" {
            return match request.method {
                Method::Get => json(&self.handler.handle_identity()),
                Method::Post => Err(PeerError::MethodNotAllowed(path.to_string())),
            };
        }

        let kind = EntityKind::from_name(resource)
            .ok_or_else(|| PeerError::NotFound(path.to_string()))?;
        match request.method {
            Method::Get => json(&self.handler.handle_pull(kind)),
            Method::Post => {
                let received = self.handler.handle_push(kind, request.body)?;
                json(&serde_json::json!({ "received": received }))
            }
        }
    }
}

fn json<T: serde::Serialize>(body: &T) -> PeerResult<HttpResponse> {
    serde_json::to_vec(body)
        .map(HttpResponse::json)
        .map_err(|e| PeerError::Internal(e.to_string()))
}

impl LoopbackServer for PeerServer {
    fn handle(&self, request: LoopbackRequest<'_>) -> Result<HttpResponse, String> {
        if !self.is_available() {
            return Err(format!("connection refused: {}", self.name()));
        }

        match self.route(&request) {
            Ok(response) => Ok(response),
            Err(e) => {
                debug!(peer = %self.name(), path = %request.path, error = %e, "request rejected");
                Ok(HttpResponse::new(e.status_code(), e.to_string()))
            }
        }
    }
}
