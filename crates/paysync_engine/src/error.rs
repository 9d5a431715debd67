//! Error types for the sync engine.

use crate::store::StoreError;
use paysync_codec::CodecError;
use thiserror::Error;

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Transport failures on push and pull never surface here; the connector
/// turns them into `false` / `None`. What remains is configuration,
/// data-format, store and fleet bookkeeping errors.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Required endpoint or resource path is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The peer could not be reached or answered with an error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// HTTP status, when the peer answered at all.
        status: Option<u16>,
    },

    /// Malformed record or snapshot.
    #[error("data format error: {0}")]
    Codec(#[from] CodecError),

    /// A local store rejected an operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The connector was closed.
    #[error("not connected to peer")]
    NotConnected,

    /// A peer with this name is already registered.
    #[error("peer already registered: {0}")]
    DuplicatePeer(String),

    /// No peer with this name is registered.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// A sync task panicked or was aborted.
    #[error("sync task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// Creates a transport error without a status code.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    /// Creates a transport error for an unexpected HTTP status.
    pub fn status(status: u16) -> Self {
        Self::Transport {
            message: format!("unexpected status {status}"),
            status: Some(status),
        }
    }

    /// Returns true for errors raised before any network call.
    pub fn is_config(&self) -> bool {
        matches!(self, SyncError::Config(_) | SyncError::NotConnected)
    }
}
