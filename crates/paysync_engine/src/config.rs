//! Configuration for the sync engine.

use crate::error::{Result, SyncError};
use crate::resolver::ConflictResolution;
use paysync_codec::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default interval between automatic passes.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Pause after a pass that failed unexpectedly.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(5 * 60);

/// Number of pass results kept per peer.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Which way data flows between this instance and a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Send local snapshots only.
    Push,
    /// Fetch peer snapshots only.
    Pull,
    /// Push, then pull.
    #[default]
    Bidirectional,
}

impl SyncDirection {
    /// Returns true if local snapshots are sent to the peer.
    pub fn pushes(&self) -> bool {
        matches!(self, SyncDirection::Push | SyncDirection::Bidirectional)
    }

    /// Returns true if peer snapshots are fetched and reconciled.
    pub fn pulls(&self) -> bool {
        matches!(self, SyncDirection::Pull | SyncDirection::Bidirectional)
    }
}

/// Configuration for one peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Peer name, unique within a fleet.
    pub peer_name: String,
    /// Base address of the peer, e.g. `https://bot-2.example.com/api`.
    pub endpoint: String,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Sync payment stages.
    #[serde(default = "enabled")]
    pub sync_stages: bool,
    /// Sync promo codes.
    #[serde(default = "enabled")]
    pub sync_promo_codes: bool,
    /// Sync subscriptions.
    #[serde(default = "enabled")]
    pub sync_subscriptions: bool,
    /// Sync notification templates.
    #[serde(default = "enabled")]
    pub sync_templates: bool,
    /// Sync instance settings.
    #[serde(default = "enabled")]
    pub sync_settings: bool,
    /// Data flow direction.
    #[serde(default)]
    pub direction: SyncDirection,
    /// Strategy applied to conflicting items.
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
    /// Whether the background loop may run for this peer.
    #[serde(default)]
    pub auto_sync: bool,
    /// Interval between automatic passes (minutes on the wire).
    #[serde(default = "default_interval", with = "minutes")]
    pub sync_interval: Duration,
    /// Pause after a pass that failed unexpectedly.
    #[serde(skip, default = "default_backoff")]
    pub error_backoff: Duration,
    /// Number of pass results retained.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Per-kind resource path overrides.
    #[serde(default)]
    pub resource_paths: BTreeMap<EntityKind, String>,
}

fn enabled() -> bool {
    true
}

fn default_interval() -> Duration {
    DEFAULT_SYNC_INTERVAL
}

fn default_backoff() -> Duration {
    DEFAULT_ERROR_BACKOFF
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl SyncConfig {
    /// Creates a configuration with every kind enabled, bidirectional flow
    /// and source-wins conflict handling.
    pub fn new(peer_name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            peer_name: peer_name.into(),
            endpoint: endpoint.into(),
            auth_token: None,
            sync_stages: true,
            sync_promo_codes: true,
            sync_subscriptions: true,
            sync_templates: true,
            sync_settings: true,
            direction: SyncDirection::default(),
            conflict_resolution: ConflictResolution::default(),
            auto_sync: false,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            history_limit: DEFAULT_HISTORY_LIMIT,
            resource_paths: BTreeMap::new(),
        }
    }

    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Sets the bearer token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Sets the data flow direction.
    pub fn with_direction(mut self, direction: SyncDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the conflict strategy.
    pub fn with_conflict_resolution(mut self, strategy: ConflictResolution) -> Self {
        self.conflict_resolution = strategy;
        self
    }

    /// Enables the background loop with the given interval.
    pub fn with_auto_sync(mut self, interval: Duration) -> Self {
        self.auto_sync = true;
        self.sync_interval = interval;
        self
    }

    /// Sets the pause taken after an unexpected pass failure.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Sets the number of retained pass results.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Enables or disables one entity kind.
    pub fn with_kind(mut self, kind: EntityKind, enabled: bool) -> Self {
        *self.flag_mut(kind) = enabled;
        self
    }

    /// Overrides the resource path of one kind. An empty path leaves the
    /// kind unroutable and its sync fails with a configuration error.
    pub fn with_resource_path(mut self, kind: EntityKind, path: impl Into<String>) -> Self {
        self.resource_paths.insert(kind, path.into());
        self
    }

    /// Returns true if the kind is enabled.
    pub fn is_enabled(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::PaymentStages => self.sync_stages,
            EntityKind::PromoCodes => self.sync_promo_codes,
            EntityKind::Subscriptions => self.sync_subscriptions,
            EntityKind::Templates => self.sync_templates,
            EntityKind::Settings => self.sync_settings,
        }
    }

    /// Resource path of a kind, relative to the endpoint.
    pub fn resource_path(&self, kind: EntityKind) -> String {
        self.resource_paths
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| kind.default_path())
    }

    fn flag_mut(&mut self, kind: EntityKind) -> &mut bool {
        match kind {
            EntityKind::PaymentStages => &mut self.sync_stages,
            EntityKind::PromoCodes => &mut self.sync_promo_codes,
            EntityKind::Subscriptions => &mut self.sync_subscriptions,
            EntityKind::Templates => &mut self.sync_templates,
            EntityKind::Settings => &mut self.sync_settings,
        }
    }
}

/// A list of peers, as loaded by a host at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Peer configurations.
    #[serde(default)]
    pub peers: Vec<SyncConfig>,
}

impl FleetConfig {
    /// Parses a fleet configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::Config(e.to_string()))
    }
}

mod minutes {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(interval: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(interval.as_secs() / 60)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let minutes = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(minutes.saturating_mul(60)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("eu", "https://eu.example.com")
            .with_auth_token("secret")
            .with_direction(SyncDirection::Pull)
            .with_conflict_resolution(ConflictResolution::Merge)
            .with_kind(EntityKind::Settings, false)
            .with_history_limit(5);

        assert_eq!(config.peer_name, "eu");
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.direction, SyncDirection::Pull);
        assert_eq!(config.conflict_resolution, ConflictResolution::Merge);
        assert!(!config.is_enabled(EntityKind::Settings));
        assert!(config.is_enabled(EntityKind::PromoCodes));
        assert_eq!(config.history_limit, 5);
        assert!(!config.auto_sync);
    }

    #[test]
    fn direction_gates() {
        assert!(SyncDirection::Push.pushes());
        assert!(!SyncDirection::Push.pulls());
        assert!(SyncDirection::Pull.pulls());
        assert!(!SyncDirection::Pull.pushes());
        assert!(SyncDirection::Bidirectional.pushes());
        assert!(SyncDirection::Bidirectional.pulls());
    }

    #[test]
    fn resource_path_overrides() {
        let config = SyncConfig::new("eu", "https://eu.example.com")
            .with_resource_path(EntityKind::Templates, "/v2/templates");
        assert_eq!(config.resource_path(EntityKind::Templates), "/v2/templates");
        assert_eq!(
            config.resource_path(EntityKind::PromoCodes),
            "/sync/promo_codes"
        );
    }

    #[test]
    fn from_json_applies_defaults() {
        let config = SyncConfig::from_json(
            r#"{
                "peer_name": "backup",
                "endpoint": "https://backup.example.com",
                "direction": "push",
                "conflict_resolution": "target_wins",
                "auto_sync": true,
                "sync_interval": 15,
                "sync_templates": false
            }"#,
        )
        .unwrap();

        assert_eq!(config.direction, SyncDirection::Push);
        assert_eq!(config.conflict_resolution, ConflictResolution::TargetWins);
        assert_eq!(config.sync_interval, Duration::from_secs(15 * 60));
        assert_eq!(config.error_backoff, DEFAULT_ERROR_BACKOFF);
        assert!(config.auto_sync);
        assert!(!config.sync_templates);
        assert!(config.sync_stages);
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn from_json_rejects_garbage() {
        let err = SyncConfig::from_json("{\"peer_name\": 1}").unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn fleet_config() {
        let fleet = FleetConfig::from_json(
            r#"{"peers": [
                {"peer_name": "a", "endpoint": "https://a"},
                {"peer_name": "b", "endpoint": "https://b", "direction": "pull"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(fleet.peers.len(), 2);
        assert_eq!(fleet.peers[1].direction, SyncDirection::Pull);
    }
}
