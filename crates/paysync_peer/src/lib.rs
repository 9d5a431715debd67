//! # paysync peer
//!
//! Reference in-process peer for the paysync engine.
//!
//! This crate provides:
//! - The sync resource endpoints (identity, pull, push)
//! - Published snapshots and an inbox of received pushes
//! - Bearer-token checks against a shared secret
//! - Host-based routing across several peers
//!
//! # Protocol
//!
//! ```text
//! GET  /sync/identity  -> {"name": ..., "version": ..., "kinds": [...]}
//! GET  /sync/<kind>    -> { identity: record, ... }
//! POST /sync/<kind>    <- {"action": "sync", "data": { identity: record, ... }}
//! ```
//!
//! A missing or bad token yields 401, an unknown path 404 and a malformed
//! envelope 400. A peer marked unavailable, or a host nobody serves on a
//! [`PeerRouter`], fails at the transport level.
//!
//! # Authentication
//!
//! ```
//! use paysync_peer::PeerConfig;
//!
//! let config = PeerConfig::new("eu-bot").with_shared_token("s3cret");
//! assert!(config.auth.check(Some("Bearer s3cret")).is_ok());
//! assert!(config.auth.check(None).is_err());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod router;
mod server;
mod state;

pub use auth::{PeerAuth, SimpleTokenValidator};
pub use config::PeerConfig;
pub use error::{PeerError, PeerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use router::{host_of, PeerRouter};
pub use server::PeerServer;
pub use state::{PeerState, ReceivedPush};
