//! Request handlers for the sync endpoints.

use crate::config::PeerConfig;
use crate::error::{PeerError, PeerResult};
use crate::state::PeerState;
use paysync_codec::{EntityKind, PushEnvelope, Record, Snapshot, Value};
use std::sync::Arc;
use tracing::debug;

/// Context for request handling.
pub struct HandlerContext {
    /// Peer configuration.
    pub config: PeerConfig,
    /// Peer data (shared with the host).
    pub state: Arc<PeerState>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: PeerConfig, state: Arc<PeerState>) -> Self {
        Self { config, state }
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles an identity request.
    pub fn handle_identity(&self) -> Record {
        let kinds: Vec<Value> = EntityKind::ALL
            .iter()
            .map(|kind| Value::from(kind.name()))
            .collect();
        Record::from_pairs([
            ("name", Value::from(self.context.config.name.as_str())),
            ("version", Value::from(self.context.config.version.as_str())),
            ("kinds", Value::from(kinds)),
        ])
    }

    /// Handles a pull of one kind.
    pub fn handle_pull(&self, kind: EntityKind) -> Snapshot {
        self.context.state.snapshot(kind)
    }

    /// Handles a push of one kind. Returns the number of items received.
    pub fn handle_push(&self, kind: EntityKind, body: &[u8]) -> PeerResult<usize> {
        let envelope = PushEnvelope::from_json(body)?;
        if envelope.action != PushEnvelope::SYNC_ACTION {
            return Err(PeerError::InvalidRequest(format!(
                "unsupported action `{}`",
                envelope.action
            )));
        }

        let max = self.context.config.max_push_items;
        if envelope.data.len() > max {
            return Err(PeerError::InvalidRequest(format!(
                "too many items: {} > {max}",
                envelope.data.len()
            )));
        }

        if self.context.config.apply_pushes {
            self.context.state.apply(kind, &envelope.data)?;
        }

        let received = envelope.data.len();
        let sequence = self.context.state.record_push(kind, envelope.data);
        debug!(peer = %self.context.config.name, kind = %kind, items = received, sequence, "push received");
        Ok(received)
    }
}
