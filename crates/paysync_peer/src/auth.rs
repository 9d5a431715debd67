//! Bearer-token authentication for peers.
//!
//! A protected peer shares one secret with every instance allowed to sync
//! with it. Tokens are checked by comparing HMAC-SHA256 tags keyed with
//! the secret, so the comparison takes the same time wherever the first
//! mismatching byte is.

use crate::error::{PeerError, PeerResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Validator comparing the bearer token with a shared secret.
#[derive(Clone)]
pub struct SimpleTokenValidator {
    secret: String,
}

impl SimpleTokenValidator {
    /// Creates a validator with a shared secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Checks that the token equals the secret.
    pub fn validate(&self, token: &str) -> PeerResult<()> {
        let expected = self.tag(self.secret.as_bytes())?.finalize().into_bytes();
        self.tag(token.as_bytes())?
            .verify_slice(&expected)
            .map_err(|_| PeerError::NotAuthorized("invalid token".into()))
    }

    fn tag(&self, data: &[u8]) -> PeerResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| PeerError::Internal(format!("invalid HMAC key: {e}")))?;
        mac.update(data);
        Ok(mac)
    }
}

/// How a peer checks incoming bearer tokens.
#[derive(Clone, Default)]
pub enum PeerAuth {
    /// Every request is accepted.
    #[default]
    Open,
    /// Token must equal a shared secret.
    Shared(SimpleTokenValidator),
}

impl PeerAuth {
    /// Checks the value of an `Authorization` header.
    pub fn check(&self, authorization: Option<&str>) -> PeerResult<()> {
        let PeerAuth::Shared(validator) = self else {
            return Ok(());
        };

        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| PeerError::NotAuthorized("missing bearer token".into()))?;
        validator.validate(token)
    }
}
