//! Peer configuration.

use crate::auth::{PeerAuth, SimpleTokenValidator};

/// Configuration for a reference peer.
#[derive(Clone)]
pub struct PeerConfig {
    /// Instance name, reported by the identity endpoint.
    pub name: String,
    /// Version string reported by the identity endpoint.
    pub version: String,
    /// Maximum number of items accepted in one push.
    pub max_push_items: usize,
    /// Whether pushed items are merged into the published snapshots.
    pub apply_pushes: bool,
    /// Token check applied to every request.
    pub auth: PeerAuth,
}

impl PeerConfig {
    /// Creates a new peer configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            max_push_items: 10_000,
            apply_pushes: true,
            auth: PeerAuth::Open,
        }
    }

    /// Sets the maximum push size.
    pub fn with_max_push_items(mut self, max: usize) -> Self {
        self.max_push_items = max;
        self
    }

    /// Keeps pushed items in the inbox only.
    pub fn without_applying_pushes(mut self) -> Self {
        self.apply_pushes = false;
        self
    }

    /// Requires the given shared bearer token.
    pub fn with_shared_token(mut self, token: impl Into<String>) -> Self {
        self.auth = PeerAuth::Shared(SimpleTokenValidator::new(token));
        self
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self::new("peer")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PeerConfig::default();
        assert_eq!(config.max_push_items, 10_000);
        assert!(config.apply_pushes);
        assert!(matches!(config.auth, PeerAuth::Open));
    }

    #[test]
    fn config_builder() {
        let config = PeerConfig::new("eu")
            .with_max_push_items(50)
            .without_applying_pushes()
            .with_shared_token("s3cret");

        assert_eq!(config.max_push_items, 50);
        assert!(!config.apply_pushes);
        assert!(matches!(config.auth, PeerAuth::Shared(_)));
    }
}
