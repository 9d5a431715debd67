//! # paysync codec
//!
//! Keyed-record model and per-entity codecs for paysync.
//!
//! This crate converts between a bot instance's business objects (payment
//! stages, promo codes, subscriptions, notification templates, settings)
//! and a transport-neutral [`Record`]: a map of field name to value. It is
//! pure and stateless; no network or store access happens here.
//!
//! ## Guarantees
//!
//! - Encoding is lossless: unknown fields ride along in each entity's
//!   `extra` record
//! - Records pass through [`ToRecord`] unchanged
//! - Timestamps are re-emitted exactly as they were read
//! - Malformed input is reported as a [`CodecError`], never dropped
//!
//! ## Usage
//!
//! ```
//! use paysync_codec::{Entity, PaymentStage, Snapshot};
//!
//! let stages = vec![PaymentStage::new("basic", "Basic", "Entry tier", 990)];
//! let snapshot = Snapshot::from_items(&stages);
//!
//! let bytes = snapshot.to_json().unwrap();
//! let decoded: Vec<PaymentStage> = Snapshot::from_json(&bytes).unwrap().decode().unwrap();
//! assert_eq!(decoded[0].identity(), "basic");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod kind;
mod snapshot;
mod time;
mod value;

pub use entity::{
    DiscountType, Entity, NotificationTemplate, PaymentStage, PromoCode, Setting, Subscription,
    SubscriptionStatus, ToRecord,
};
pub use error::{CodecError, CodecResult};
pub use kind::EntityKind;
pub use snapshot::{PushEnvelope, Snapshot};
pub use time::Timestamp;
pub use value::{Record, Value};
