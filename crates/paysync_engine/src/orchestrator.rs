//! Per-peer sync engine.

use crate::config::SyncConfig;
use crate::connector::PeerConnector;
use crate::error::Result;
use crate::resolver::{detect_conflict, ApprovalHook, ConflictResolver};
use crate::result::{SyncConflict, SyncHistory, SyncResult, SyncStats};
use crate::store::{KindStore, LocalStores};
use crate::transport::HttpClient;
use paysync_codec::{CodecResult, EntityKind, Snapshot};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Runs sync passes against one peer.
///
/// A pass asks the peer for its identity, then walks the enabled entity kinds in
/// [`EntityKind::ALL`] order. For each kind the local snapshot is pushed
/// and the peer snapshot pulled, as the configured direction allows, and
/// every peer item is reconciled against local state in the order the peer
/// sent it. Local items are never deleted.
///
/// Passes on one orchestrator never overlap: a manual pass started while
/// the background loop is mid-pass waits for it.
pub struct SyncOrchestrator<C: HttpClient + 'static> {
    inner: Arc<Inner<C>>,
    auto_sync: Mutex<Option<AutoSyncTask>>,
}

struct Inner<C: HttpClient> {
    config: SyncConfig,
    connector: PeerConnector<C>,
    resolver: RwLock<ConflictResolver>,
    stores: LocalStores,
    history: RwLock<SyncHistory>,
    pass_lock: tokio::sync::Mutex<()>,
}

struct AutoSyncTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl<C: HttpClient + 'static> SyncOrchestrator<C> {
    /// Creates an orchestrator for the peer described by `config`.
    pub fn new(config: SyncConfig, client: Arc<C>, stores: LocalStores) -> Self {
        let connector = PeerConnector::new(config.endpoint.clone(), config.auth_token.clone(), client);
        let resolver = ConflictResolver::new(config.conflict_resolution);
        let history = SyncHistory::new(config.history_limit);

        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                resolver: RwLock::new(resolver),
                stores,
                history: RwLock::new(history),
                pass_lock: tokio::sync::Mutex::new(()),
            }),
            auto_sync: Mutex::new(None),
        }
    }

    /// Installs the decision channel used by the `AskUser` strategy.
    pub fn set_approval_hook(&self, hook: Arc<dyn ApprovalHook>) {
        let mut resolver = self.inner.resolver.write();
        *resolver = resolver.clone().with_approval_hook(hook);
    }

    /// Peer configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Peer name.
    pub fn peer_name(&self) -> &str {
        &self.inner.config.peer_name
    }

    /// Connector to the peer.
    pub fn connector(&self) -> &PeerConnector<C> {
        &self.inner.connector
    }

    /// Runs one pass over every enabled kind.
    pub async fn sync_all(&self) -> SyncResult {
        self.inner.run_pass(&EntityKind::ALL).await
    }

    /// Runs one pass over a single kind.
    pub async fn sync_kind(&self, kind: EntityKind) -> SyncResult {
        self.inner.run_pass(&[kind]).await
    }

    /// Runs one pass in its own task, so that a panic inside the pass ends
    /// up as a failed result instead of unwinding into the caller.
    pub async fn sync_all_isolated(&self) -> SyncResult {
        let inner = Arc::clone(&self.inner);
        match tokio::spawn(async move { inner.run_pass(&EntityKind::ALL).await }).await {
            Ok(result) => result,
            Err(e) => self.inner.record_crash(&e),
        }
    }

    /// Starts the background loop.
    ///
    /// Returns false if auto-sync is disabled in the configuration or a
    /// loop is already running.
    pub fn start_auto_sync(&self) -> bool {
        let peer = &self.inner.config.peer_name;
        if !self.inner.config.auto_sync {
            debug!(peer = %peer, "auto sync disabled");
            return false;
        }

        let mut slot = self.auto_sync.lock();
        if slot.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(auto_sync_loop(Arc::clone(&self.inner), stop_rx));
        *slot = Some(AutoSyncTask { stop_tx, handle });

        info!(
            peer = %peer,
            interval_secs = self.inner.config.sync_interval.as_secs(),
            "auto sync started"
        );
        true
    }

    /// Stops the background loop and waits for it to finish. A pass in
    /// flight runs to completion first.
    ///
    /// Returns false if no loop was running.
    pub async fn stop_auto_sync(&self) -> bool {
        let Some(task) = self.auto_sync.lock().take() else {
            return false;
        };

        let _ = task.stop_tx.send(true);
        if let Err(e) = task.handle.await {
            warn!(peer = %self.peer_name(), error = %e, "auto sync task ended abnormally");
        }
        info!(peer = %self.peer_name(), "auto sync stopped");
        true
    }

    /// Returns true while the background loop is running.
    pub fn is_auto_syncing(&self) -> bool {
        self.auto_sync
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Retained results, oldest first.
    pub fn history(&self) -> Vec<SyncResult> {
        self.inner.history.read().iter().cloned().collect()
    }

    /// Most recent result.
    pub fn last_result(&self) -> Option<SyncResult> {
        self.inner.history.read().last().cloned()
    }

    /// Drops every retained result.
    pub fn clear_history(&self) {
        self.inner.history.write().clear();
    }

    /// Aggregates over the retained results.
    pub fn stats(&self) -> SyncStats {
        self.inner.history.read().stats()
    }

    /// Stops the background loop and closes the connector.
    pub async fn close(&self) {
        self.stop_auto_sync().await;
        self.inner.connector.close();
    }
}

impl<C: HttpClient> Inner<C> {
    async fn run_pass(&self, kinds: &[EntityKind]) -> SyncResult {
        let _pass = self.pass_lock.lock().await;
        let peer = self.config.peer_name.as_str();
        let mut result = SyncResult::begin(peer);
        debug!(peer = %peer, pass = %result.id, "sync pass started");

        match self.connector.fetch_identity().await {
            Ok(identity) => {
                debug!(peer = %peer, identity = ?identity.get_text("name"), "peer reachable");
                for &kind in kinds {
                    self.sync_kind(kind, &mut result).await;
                }
                result.finish();
            }
            Err(e) => {
                error!(peer = %peer, error = %e, "sync pass failed");
                result.fail(e.to_string());
            }
        }

        info!(
            peer = %peer,
            status = ?result.status,
            items = result.total_items(),
            conflicts = result.conflicts.len(),
            errors = result.errors.len(),
            "sync pass finished"
        );
        self.history.write().push(result.clone());
        result
    }

    /// Syncs one kind, recording its count, conflicts and errors into
    /// `result`. Disabled kinds and kinds without a local store count zero.
    async fn sync_kind(&self, kind: EntityKind, result: &mut SyncResult) {
        let store = match self.stores.store_for(kind) {
            Some(store) if self.config.is_enabled(kind) => store,
            _ => {
                result.record_items(kind, 0);
                return;
            }
        };

        let mut synced = 0;
        let outcome = self
            .reconcile(kind, &store, &mut synced, &mut result.conflicts)
            .await;
        result.record_items(kind, synced);

        if let Err(e) = outcome {
            warn!(peer = %self.config.peer_name, kind = %kind, error = %e, "kind sync failed");
            result.record_error(format!("{kind}: {e}"));
        }
    }

    async fn reconcile(
        &self,
        kind: EntityKind,
        store: &KindStore,
        synced: &mut u64,
        conflicts: &mut Vec<SyncConflict>,
    ) -> Result<()> {
        let path = self.config.resource_path(kind);
        let direction = self.config.direction;

        if direction.pushes() {
            let snapshot = Snapshot::from_records(kind, store.records()?)?;
            if !self.connector.push(&path, &snapshot).await? {
                warn!(peer = %self.config.peer_name, kind = %kind, "push not accepted");
            }
        }

        if !direction.pulls() {
            return Ok(());
        }

        let Some(snapshot) = self.connector.pull(&path).await? else {
            debug!(peer = %self.config.peer_name, kind = %kind, "no data from peer");
            return Ok(());
        };

        // Every item must decode before any of them is written.
        let incoming = snapshot
            .records()
            .iter()
            .map(|remote| kind.validate(remote).map(|identity| (identity, remote)))
            .collect::<CodecResult<Vec<_>>>()?;

        for (identity, remote) in incoming {
            let Some(local) = store.find(&identity, remote)? else {
                store.put(remote)?;
                *synced += 1;
                continue;
            };

            let differing = detect_conflict(kind, &local, remote);
            if differing.is_empty() {
                *synced += 1;
                continue;
            }

            let mut conflict = SyncConflict::new(kind, identity, local, remote.clone(), differing);
            let resolved = self.resolver.read().resolve(&mut conflict);
            debug!(
                peer = %self.config.peer_name,
                kind = %kind,
                entity = %conflict.entity_id,
                resolution = ?conflict.resolution,
                "conflict resolved"
            );
            conflicts.push(conflict);

            if let Some(fields) = resolved {
                store.put(&fields)?;
                *synced += 1;
            }
        }

        Ok(())
    }

    fn record_crash(&self, err: &tokio::task::JoinError) -> SyncResult {
        error!(peer = %self.config.peer_name, error = %err, "sync pass crashed");
        let result = SyncResult::failed(&self.config.peer_name, format!("sync task failed: {err}"));
        self.history.write().push(result.clone());
        result
    }
}

async fn auto_sync_loop<C: HttpClient + 'static>(
    inner: Arc<Inner<C>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut delay = inner.config.sync_interval;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
                continue;
            }
        }

        let pass = Arc::clone(&inner);
        delay = match tokio::spawn(async move { pass.run_pass(&EntityKind::ALL).await }).await {
            Ok(_) => inner.config.sync_interval,
            Err(e) => {
                inner.record_crash(&e);
                warn!(
                    peer = %inner.config.peer_name,
                    backoff_secs = inner.config.error_backoff.as_secs(),
                    "backing off after crashed pass"
                );
                inner.config.error_backoff
            }
        };

        if *stop_rx.borrow() {
            break;
        }
    }
}

impl<C: HttpClient + 'static> Drop for SyncOrchestrator<C> {
    fn drop(&mut self) {
        if let Some(task) = self.auto_sync.get_mut().take() {
            task.handle.abort();
        }
    }
}
