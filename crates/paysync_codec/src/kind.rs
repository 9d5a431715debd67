//! Entity kinds synchronized between peers.

use crate::error::{CodecError, CodecResult};
use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A category of business object kept consistent across peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Payment-stage catalog entries.
    PaymentStages,
    /// Promo codes.
    PromoCodes,
    /// Subscription records.
    Subscriptions,
    /// Notification templates.
    Templates,
    /// Instance-level settings.
    Settings,
}

impl EntityKind {
    /// Every kind, in the order a sync pass processes them.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::PaymentStages,
        EntityKind::PromoCodes,
        EntityKind::Subscriptions,
        EntityKind::Templates,
        EntityKind::Settings,
    ];

    /// Wire name, also used as the key of per-kind counters.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::PaymentStages => "payment_stages",
            EntityKind::PromoCodes => "promo_codes",
            EntityKind::Subscriptions => "subscriptions",
            EntityKind::Templates => "templates",
            EntityKind::Settings => "settings",
        }
    }

    /// Parses a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Resource path relative to a peer endpoint.
    pub fn default_path(&self) -> String {
        format!("/sync/{}", self.name())
    }

    /// Fields compared by conflict detection.
    ///
    /// Only this subset is inspected. Differences in any other field are
    /// not reported as conflicts.
    pub fn key_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::PaymentStages => &["title", "description", "price"],
            EntityKind::PromoCodes => &["code", "discount_type", "discount_value"],
            EntityKind::Subscriptions => &["plan_id", "status", "expires_at"],
            EntityKind::Templates => &["name", "title", "text"],
            EntityKind::Settings => &["name", "value"],
        }
    }

    /// Fields that together form the identity key.
    pub fn identity_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::PaymentStages => &["id"],
            EntityKind::PromoCodes => &["code"],
            EntityKind::Subscriptions => &["user_id", "plan_id"],
            EntityKind::Templates | EntityKind::Settings => &["name"],
        }
    }

    /// Extracts the identity key of a record of this kind.
    ///
    /// Composite keys are joined with `:`. Numeric parts are rendered as
    /// integers, so `7` and `7.0` yield the same key.
    pub fn identity_of(&self, record: &Record) -> CodecResult<String> {
        let mut parts = Vec::with_capacity(self.identity_fields().len());
        for field in self.identity_fields() {
            let part = match record.get(field) {
                Some(Value::Text(s)) if !s.is_empty() => s.clone(),
                Some(value) => match value.as_integer() {
                    Some(n) => n.to_string(),
                    None => return Err(CodecError::invalid_field(*field, "text or integer")),
                },
                None => return Err(CodecError::missing_field(*field)),
            };
            parts.push(part);
        }
        Ok(parts.join(":"))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
