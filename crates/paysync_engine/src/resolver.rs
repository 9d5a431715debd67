//! Conflict detection and resolution.

use crate::result::SyncConflict;
use paysync_codec::{EntityKind, Record, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Strategy for conflicting versions of an entity.
///
/// "Source" is the local instance, "target" the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Keep the local version.
    #[default]
    SourceWins,
    /// Take the peer version.
    TargetWins,
    /// Field-wise merge preferring local values.
    Merge,
    /// Leave the local item untouched.
    Skip,
    /// Defer to an [`ApprovalHook`]; local version when none is installed.
    AskUser,
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConflictResolution::SourceWins => "source_wins",
            ConflictResolution::TargetWins => "target_wins",
            ConflictResolution::Merge => "merge",
            ConflictResolution::Skip => "skip",
            ConflictResolution::AskUser => "ask_user",
        };
        f.write_str(name)
    }
}

/// Host-supplied decision channel for [`ConflictResolution::AskUser`].
///
/// Answering `AskUser` again is treated as `SourceWins`.
pub trait ApprovalHook: Send + Sync {
    /// Chooses the strategy for one conflict.
    fn decide(&self, conflict: &SyncConflict) -> ConflictResolution;
}

/// Applies a configured strategy to conflicts.
#[derive(Clone, Default)]
pub struct ConflictResolver {
    strategy: ConflictResolution,
    hook: Option<Arc<dyn ApprovalHook>>,
}

impl fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("strategy", &self.strategy)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl ConflictResolver {
    /// Creates a resolver for the given strategy.
    pub fn new(strategy: ConflictResolution) -> Self {
        Self {
            strategy,
            hook: None,
        }
    }

    /// Installs the decision channel used by `AskUser`.
    pub fn with_approval_hook(mut self, hook: Arc<dyn ApprovalHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Configured strategy.
    pub fn strategy(&self) -> ConflictResolution {
        self.strategy
    }

    /// Resolves a conflict, recording the strategy actually applied on it.
    ///
    /// Returns the fields to store locally, or `None` to leave the local
    /// item as it is.
    pub fn resolve(&self, conflict: &mut SyncConflict) -> Option<Record> {
        let applied = self.effective_strategy(conflict);
        conflict.resolution = Some(applied);

        match applied {
            ConflictResolution::SourceWins | ConflictResolution::AskUser => {
                Some(conflict.local.clone())
            }
            ConflictResolution::TargetWins => Some(conflict.remote.clone()),
            ConflictResolution::Merge => Some(merge_records(&conflict.local, &conflict.remote)),
            ConflictResolution::Skip => None,
        }
    }

    fn effective_strategy(&self, conflict: &SyncConflict) -> ConflictResolution {
        if self.strategy != ConflictResolution::AskUser {
            return self.strategy;
        }

        match &self.hook {
            Some(hook) => match hook.decide(conflict) {
                ConflictResolution::AskUser => ConflictResolution::SourceWins,
                decided => decided,
            },
            None => {
                warn!(
                    kind = %conflict.kind,
                    entity = %conflict.entity_id,
                    fields = ?conflict.differing_fields,
                    "no approval channel, keeping local version"
                );
                ConflictResolution::SourceWins
            }
        }
    }
}

/// Field-wise merge of two records.
///
/// Fields present on one side only are kept, nested records are merged
/// recursively and every other field present on both sides takes the
/// `source` value.
pub fn merge_records(source: &Record, target: &Record) -> Record {
    let mut merged = target.clone();
    for (field, value) in source {
        let value = match (value, target.get(field)) {
            (Value::Map(ours), Some(Value::Map(theirs))) => Value::Map(merge_records(ours, theirs)),
            _ => value.clone(),
        };
        merged.insert(field.clone(), value);
    }
    merged
}

/// Returns the key fields of `kind` that are present on both sides with
/// different values. An empty list means no conflict.
///
/// Only the kind's key fields are compared; differences elsewhere are not
/// reported.
pub fn detect_conflict(kind: EntityKind, local: &Record, remote: &Record) -> Vec<String> {
    kind.key_fields()
        .iter()
        .filter(|field| match (local.get(field), remote.get(field)) {
            (Some(ours), Some(theirs)) => !ours.same_as(theirs),
            _ => false,
        })
        .map(|field| field.to_string())
        .collect()
}
