//! Data held by a reference peer.

use crate::error::PeerResult;
use paysync_codec::{Entity, EntityKind, Record, Snapshot};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// A push received from another instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedPush {
    /// Arrival order, starting at 1.
    pub sequence: u64,
    /// Entity kind pushed.
    pub kind: EntityKind,
    /// Pushed items.
    pub data: Snapshot,
}

/// Published snapshots plus the inbox of received pushes.
#[derive(Debug, Default)]
pub struct PeerState {
    published: RwLock<BTreeMap<EntityKind, Snapshot>>,
    inbox: RwLock<Vec<ReceivedPush>>,
}

impl PeerState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the published snapshot of `kind`.
    pub fn publish(&self, kind: EntityKind, snapshot: Snapshot) {
        self.published.write().insert(kind, snapshot);
    }

    /// Publishes typed items under their own kind.
    pub fn publish_items<E: Entity>(&self, items: &[E]) {
        self.publish(E::KIND, Snapshot::from_items(items));
    }

    /// Published snapshot of `kind`; empty if nothing was published.
    pub fn snapshot(&self, kind: EntityKind) -> Snapshot {
        self.published.read().get(&kind).cloned().unwrap_or_default()
    }

    /// Merges items into the published snapshot of `kind`, replacing items
    /// with the same identity in place and appending new ones.
    ///
    /// Nothing is applied if any item lacks its identity fields.
    pub fn apply(&self, kind: EntityKind, data: &Snapshot) -> PeerResult<usize> {
        let keyed = data
            .records()
            .iter()
            .map(|record| -> PeerResult<(String, Record)> {
                Ok((kind.identity_of(record)?, record.clone()))
            })
            .collect::<PeerResult<Vec<_>>>()?;

        let mut published = self.published.write();
        let snapshot = published.entry(kind).or_default();
        for (identity, record) in keyed {
            snapshot.insert(identity, record);
        }
        Ok(data.len())
    }

    /// Appends a push to the inbox.
    pub fn record_push(&self, kind: EntityKind, data: Snapshot) -> u64 {
        let mut inbox = self.inbox.write();
        let sequence = inbox.len() as u64 + 1;
        inbox.push(ReceivedPush {
            sequence,
            kind,
            data,
        });
        sequence
    }

    /// Every received push, oldest first.
    pub fn pushes(&self) -> Vec<ReceivedPush> {
        self.inbox.read().clone()
    }

    /// Received pushes of one kind, oldest first.
    pub fn pushes_for(&self, kind: EntityKind) -> Vec<ReceivedPush> {
        self.inbox
            .read()
            .iter()
            .filter(|push| push.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of received pushes.
    pub fn push_count(&self) -> usize {
        self.inbox.read().len()
    }
}
