//! # paysync engine
//!
//! Keeps payment configuration consistent across independently running bot
//! instances.
//!
//! This crate provides:
//! - Per-peer connector over an HTTP abstraction
//! - Conflict detection and pluggable resolution strategies
//! - Per-peer sync passes with bounded result history
//! - Background auto-sync with cooperative cancellation
//! - Fleet coordination with per-peer failure isolation
//!
//! ## Architecture
//!
//! ```text
//! FleetCoordinator
//!   └─ SyncOrchestrator (one per peer)
//!        ├─ local stores  → records (paysync_codec)
//!        ├─ PeerConnector → push / pull snapshots
//!        └─ ConflictResolver → reconcile into local stores
//! ```
//!
//! ## Key Invariants
//!
//! - Sync is additive: local items missing on the peer are never deleted
//! - Entity kinds are processed in a fixed order, peer items in the order
//!   the peer sent them
//! - A peer being unreachable fails that peer's pass only
//! - Transport failures on push and pull are logged, never raised

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connector;
mod error;
mod fleet;
mod http;
mod orchestrator;
mod resolver;
mod result;
mod store;
mod transport;

pub use config::{
    FleetConfig, SyncConfig, SyncDirection, DEFAULT_ERROR_BACKOFF, DEFAULT_HISTORY_LIMIT,
    DEFAULT_SYNC_INTERVAL,
};
pub use connector::{PeerConnector, IDENTITY_PATH};
pub use error::{Result, SyncError};
pub use fleet::FleetCoordinator;
pub use http::{ReqwestClient, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
pub use orchestrator::SyncOrchestrator;
pub use resolver::{detect_conflict, merge_records, ApprovalHook, ConflictResolution, ConflictResolver};
pub use result::{SyncConflict, SyncHistory, SyncResult, SyncStats, SyncStatus};
pub use store::{
    LocalStores, MemoryPromoRegistry, MemorySettings, MemoryStageCatalog,
    MemorySubscriptionRegistry, MemoryTemplateRegistry, PromoRegistry, SettingsStore,
    StageCatalog, StoreError, StoreResult, SubscriptionRegistry, TemplateRegistry,
};
pub use transport::{
    Headers, HttpClient, HttpResponse, LoopbackClient, LoopbackRequest, LoopbackServer, Method,
    MockClient, RecordedRequest,
};
