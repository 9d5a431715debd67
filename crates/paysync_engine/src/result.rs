//! Outcome of sync passes and the bounded per-peer history.

use crate::resolver::ConflictResolution;
use chrono::{DateTime, Utc};
use paysync_codec::{EntityKind, Record};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

/// Lifecycle of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Created, not started.
    Pending,
    /// Running.
    InProgress,
    /// Finished without errors.
    Completed,
    /// Finished, but at least one entity kind recorded an error.
    Partial,
    /// Aborted by a top-level failure.
    Failed,
}

impl SyncStatus {
    /// Returns true once the pass can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::Completed | SyncStatus::Partial | SyncStatus::Failed
        )
    }
}

/// Two diverging versions of the same entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Entity kind.
    pub kind: EntityKind,
    /// Identity key of the entity.
    pub entity_id: String,
    /// Locally held fields.
    pub local: Record,
    /// Fields held by the peer.
    pub remote: Record,
    /// Human-readable reason.
    pub reason: String,
    /// Key fields whose values differ.
    pub differing_fields: Vec<String>,
    /// Strategy that was applied, once resolved.
    pub resolution: Option<ConflictResolution>,
}

impl SyncConflict {
    /// Creates an unresolved conflict.
    pub fn new(
        kind: EntityKind,
        entity_id: impl Into<String>,
        local: Record,
        remote: Record,
        differing_fields: Vec<String>,
    ) -> Self {
        let reason = format!("fields differ: {}", differing_fields.join(", "));
        Self {
            kind,
            entity_id: entity_id.into(),
            local,
            remote,
            reason,
            differing_fields,
            resolution: None,
        }
    }

    /// Returns true if a strategy has been applied.
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Record of one pass against one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Pass identifier.
    pub id: Uuid,
    /// Peer the pass ran against.
    pub peer: String,
    /// Current status.
    pub status: SyncStatus,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time, set when the pass finishes.
    pub finished_at: Option<DateTime<Utc>>,
    /// Items reconciled, by entity kind name.
    pub items_synced: BTreeMap<String, u64>,
    /// Conflicts met, in encounter order.
    pub conflicts: Vec<SyncConflict>,
    /// Error messages, in encounter order.
    pub errors: Vec<String>,
}

impl SyncResult {
    /// Starts a pass.
    pub fn begin(peer: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer: peer.into(),
            status: SyncStatus::InProgress,
            started_at: Utc::now(),
            finished_at: None,
            items_synced: BTreeMap::new(),
            conflicts: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Builds an already failed pass.
    pub fn failed(peer: impl Into<String>, error: impl Into<String>) -> Self {
        let mut result = Self::begin(peer);
        result.fail(error);
        result
    }

    /// Records the item count of one kind.
    pub fn record_items(&mut self, kind: EntityKind, count: u64) {
        self.items_synced.insert(kind.name().to_string(), count);
    }

    /// Records a per-kind error.
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Finishes the pass: `Completed` without errors, `Partial` otherwise.
    pub fn finish(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = if self.errors.is_empty() {
            SyncStatus::Completed
        } else {
            SyncStatus::Partial
        };
        self.finished_at = Some(Utc::now());
    }

    /// Aborts the pass with a top-level error.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.errors.push(error.into());
        self.status = SyncStatus::Failed;
        self.finished_at = Some(Utc::now());
    }

    /// Items reconciled for one kind (zero if the kind was skipped).
    pub fn items_synced_for(&self, kind: EntityKind) -> u64 {
        self.items_synced.get(kind.name()).copied().unwrap_or(0)
    }

    /// Items reconciled across all kinds.
    pub fn total_items(&self) -> u64 {
        self.items_synced.values().sum()
    }

    /// Wall-clock duration, once finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    /// Returns true if the pass finished without any error.
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Completed
    }
}

/// Bounded history of passes, oldest first.
#[derive(Debug, Clone)]
pub struct SyncHistory {
    results: VecDeque<SyncResult>,
    limit: usize,
}

impl SyncHistory {
    /// Creates a history keeping at most `limit` results.
    pub fn new(limit: usize) -> Self {
        Self {
            results: VecDeque::with_capacity(limit.min(128)),
            limit,
        }
    }

    /// Appends a result, evicting the oldest when full.
    pub fn push(&mut self, result: SyncResult) {
        if self.limit == 0 {
            return;
        }
        while self.results.len() >= self.limit {
            self.results.pop_front();
        }
        self.results.push_back(result);
    }

    /// Most recent result.
    pub fn last(&self) -> Option<&SyncResult> {
        self.results.back()
    }

    /// Number of retained results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Drops every retained result.
    pub fn clear(&mut self) {
        self.results.clear();
    }

    /// Iterates results, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &SyncResult> {
        self.results.iter()
    }

    /// Aggregates the retained results.
    pub fn stats(&self) -> SyncStats {
        let mut stats = SyncStats::default();
        for result in &self.results {
            stats.passes += 1;
            stats.items_synced += result.total_items();
            stats.conflicts += result.conflicts.len() as u64;
            match result.status {
                SyncStatus::Completed => stats.completed += 1,
                SyncStatus::Partial => stats.partial += 1,
                SyncStatus::Failed => stats.failed += 1,
                SyncStatus::Pending | SyncStatus::InProgress => {}
            }
        }
        stats.last_sync = self.last().and_then(|r| r.finished_at);
        stats
    }
}

/// Aggregate counters over a peer's retained history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Retained passes.
    pub passes: u64,
    /// Passes that completed cleanly.
    pub completed: u64,
    /// Passes with per-kind errors.
    pub partial: u64,
    /// Failed passes.
    pub failed: u64,
    /// Items reconciled.
    pub items_synced: u64,
    /// Conflicts met.
    pub conflicts: u64,
    /// End time of the most recent pass.
    pub last_sync: Option<DateTime<Utc>>,
}
