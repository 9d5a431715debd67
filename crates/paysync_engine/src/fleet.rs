//! Coordination of every configured peer.

use crate::config::{FleetConfig, SyncConfig};
use crate::error::{Result, SyncError};
use crate::orchestrator::SyncOrchestrator;
use crate::result::SyncResult;
use crate::store::LocalStores;
use crate::transport::HttpClient;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

/// Owns one [`SyncOrchestrator`] per peer.
///
/// Peers are kept in registration order and synced one after the other.
/// A failing or panicking peer produces a failed result for that peer only.
pub struct FleetCoordinator<C: HttpClient + 'static> {
    client: Arc<C>,
    stores: LocalStores,
    peers: RwLock<Vec<Arc<SyncOrchestrator<C>>>>,
}

impl<C: HttpClient + 'static> FleetCoordinator<C> {
    /// Creates an empty fleet. Every peer shares `client` and `stores`.
    pub fn new(client: Arc<C>, stores: LocalStores) -> Self {
        Self {
            client,
            stores,
            peers: RwLock::new(Vec::new()),
        }
    }

    /// Creates a fleet and registers every peer of `config`.
    pub fn from_config(config: FleetConfig, client: Arc<C>, stores: LocalStores) -> Result<Self> {
        let fleet = Self::new(client, stores);
        for peer in config.peers {
            fleet.add_peer(peer)?;
        }
        Ok(fleet)
    }

    /// Registers a peer.
    pub fn add_peer(&self, config: SyncConfig) -> Result<Arc<SyncOrchestrator<C>>> {
        let mut peers = self.peers.write();
        if peers.iter().any(|p| p.peer_name() == config.peer_name) {
            return Err(SyncError::DuplicatePeer(config.peer_name));
        }

        info!(peer = %config.peer_name, endpoint = %config.endpoint, "peer added");
        let orchestrator = Arc::new(SyncOrchestrator::new(
            config,
            Arc::clone(&self.client),
            self.stores.clone(),
        ));
        peers.push(Arc::clone(&orchestrator));
        Ok(orchestrator)
    }

    /// Unregisters a peer, stopping its background loop first.
    pub async fn remove_peer(&self, name: &str) -> Result<()> {
        let removed = {
            let mut peers = self.peers.write();
            let index = peers
                .iter()
                .position(|p| p.peer_name() == name)
                .ok_or_else(|| SyncError::UnknownPeer(name.to_string()))?;
            peers.remove(index)
        };

        removed.close().await;
        info!(peer = %name, "peer removed");
        Ok(())
    }

    /// Looks up a peer.
    pub fn peer(&self, name: &str) -> Option<Arc<SyncOrchestrator<C>>> {
        self.peers
            .read()
            .iter()
            .find(|p| p.peer_name() == name)
            .cloned()
    }

    /// Names of every peer, in registration order.
    pub fn peer_names(&self) -> Vec<String> {
        self.peers
            .read()
            .iter()
            .map(|p| p.peer_name().to_string())
            .collect()
    }

    /// Number of peers.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Returns true if no peer is registered.
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<SyncOrchestrator<C>>> {
        self.peers.read().clone()
    }

    /// Runs one pass per peer, sequentially, in registration order.
    pub async fn sync_all_peers(&self) -> Vec<(String, SyncResult)> {
        let mut results = Vec::new();
        for peer in self.snapshot() {
            let result = peer.sync_all_isolated().await;
            if !result.is_success() {
                warn!(peer = %peer.peer_name(), status = ?result.status, "peer sync did not complete cleanly");
            }
            results.push((peer.peer_name().to_string(), result));
        }
        results
    }

    /// Runs one pass against a single peer.
    pub async fn sync_peer(&self, name: &str) -> Result<SyncResult> {
        let peer = self
            .peer(name)
            .ok_or_else(|| SyncError::UnknownPeer(name.to_string()))?;
        Ok(peer.sync_all_isolated().await)
    }

    /// Starts the background loop of every peer that enables it. Returns
    /// the number of loops started.
    pub fn start_auto_sync_all(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|peer| peer.start_auto_sync())
            .count()
    }

    /// Stops every background loop.
    pub async fn stop_auto_sync_all(&self) {
        for peer in self.snapshot() {
            peer.stop_auto_sync().await;
        }
    }

    /// Stops every loop, closes every connector and forgets all peers.
    pub async fn shutdown(&self) {
        let peers = std::mem::take(&mut *self.peers.write());
        for peer in peers {
            peer.close().await;
        }
        info!("fleet shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::SyncStatus;
    use crate::transport::{HttpResponse, Method, MockClient};
    use std::time::Duration;

    fn fleet() -> FleetCoordinator<MockClient> {
        let client = MockClient::new();
        client.set_response(Method::Get, "/sync/identity", HttpResponse::json("{}"));
        FleetCoordinator::new(Arc::new(client), LocalStores::new())
    }

    #[tokio::test]
    async fn add_and_remove_peers() {
        let fleet = fleet();
        fleet.add_peer(SyncConfig::new("b", "https://b")).unwrap();
        fleet.add_peer(SyncConfig::new("a", "https://a")).unwrap();

        assert_eq!(fleet.peer_names(), ["b", "a"]);
        assert!(matches!(
            fleet.add_peer(SyncConfig::new("a", "https://other")),
            Err(SyncError::DuplicatePeer(_))
        ));

        fleet.remove_peer("b").await.unwrap();
        assert_eq!(fleet.len(), 1);
        assert!(fleet.peer("b").is_none());
        assert!(matches!(
            fleet.remove_peer("b").await,
            Err(SyncError::UnknownPeer(_))
        ));
    }

    #[tokio::test]
    async fn bad_peer_does_not_affect_others() {
        let fleet = fleet();
        fleet.add_peer(SyncConfig::new("broken", "")).unwrap();
        fleet.add_peer(SyncConfig::new("ok", "https://ok")).unwrap();

        let results = fleet.sync_all_peers().await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "broken");
        assert_eq!(results[0].1.status, SyncStatus::Failed);
        assert_eq!(results[1].1.status, SyncStatus::Completed);
    }

    #[tokio::test]
    async fn sync_unknown_peer() {
        let fleet = fleet();
        assert!(matches!(
            fleet.sync_peer("nobody").await,
            Err(SyncError::UnknownPeer(_))
        ));
    }

    #[tokio::test]
    async fn auto_sync_all_and_shutdown() {
        let fleet = fleet();
        fleet
            .add_peer(SyncConfig::new("a", "https://a").with_auto_sync(Duration::from_secs(60)))
            .unwrap();
        fleet.add_peer(SyncConfig::new("b", "https://b")).unwrap();

        assert_eq!(fleet.start_auto_sync_all(), 1);
        let a = fleet.peer("a").unwrap();
        assert!(a.is_auto_syncing());

        fleet.shutdown().await;
        assert!(fleet.is_empty());
        assert!(!a.is_auto_syncing());
        assert!(a.connector().is_closed());
    }

    #[test]
    fn from_config_rejects_duplicates() {
        let config = FleetConfig::from_json(
            r#"{"peers": [
                {"peer_name": "a", "endpoint": "https://a"},
                {"peer_name": "a", "endpoint": "https://a2"}
            ]}"#,
        )
        .unwrap();
        let result =
            FleetCoordinator::from_config(config, Arc::new(MockClient::new()), LocalStores::new());
        assert!(matches!(result, Err(SyncError::DuplicatePeer(_))));
    }
}
