//! Typed business objects and their record codecs.
//!
//! Each entity converts losslessly to a [`Record`]: known fields map to
//! struct members and anything else is carried in `extra`, so a record
//! coming from a newer peer survives a decode/encode cycle untouched.

use crate::error::{CodecError, CodecResult};
use crate::kind::EntityKind;
use crate::value::{Record, Value};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// Conversion of an in-memory object to a keyed record.
///
/// Implemented for every entity and for [`Record`] itself, so values that
/// are already in record form pass through unchanged.
pub trait ToRecord {
    /// Returns the keyed-record form of `self`.
    fn to_record(&self) -> Record;
}

impl ToRecord for Record {
    fn to_record(&self) -> Record {
        self.clone()
    }
}

/// A synchronized business object.
pub trait Entity: ToRecord + Sized {
    /// The kind this entity belongs to.
    const KIND: EntityKind;

    /// Identity key, unique within the kind.
    fn identity(&self) -> String;

    /// Reconstructs the entity from its record form.
    fn from_record(record: &Record) -> CodecResult<Self>;
}

impl EntityKind {
    /// Checks that `record` decodes as an entity of this kind and returns
    /// its identity key.
    pub fn validate(&self, record: &Record) -> CodecResult<String> {
        match self {
            EntityKind::PaymentStages => PaymentStage::from_record(record).map(drop)?,
            EntityKind::PromoCodes => PromoCode::from_record(record).map(drop)?,
            EntityKind::Subscriptions => Subscription::from_record(record).map(drop)?,
            EntityKind::Templates => NotificationTemplate::from_record(record).map(drop)?,
            EntityKind::Settings => Setting::from_record(record).map(drop)?,
        }
        self.identity_of(record)
    }
}

/// Pulls typed fields out of a record, leaving unknown ones behind.
struct FieldReader {
    rest: Record,
}

impl FieldReader {
    fn new(record: &Record) -> Self {
        Self {
            rest: record.clone(),
        }
    }

    fn text(&mut self, field: &str) -> CodecResult<String> {
        self.opt_text(field)?
            .ok_or_else(|| CodecError::missing_field(field))
    }

    fn opt_text(&mut self, field: &str) -> CodecResult<Option<String>> {
        match self.rest.remove(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(s)) => Ok(Some(s)),
            Some(_) => Err(CodecError::invalid_field(field, "text")),
        }
    }

    fn integer(&mut self, field: &str) -> CodecResult<i64> {
        self.opt_integer(field)?
            .ok_or_else(|| CodecError::missing_field(field))
    }

    fn opt_integer(&mut self, field: &str) -> CodecResult<Option<i64>> {
        match self.rest.remove(field) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_integer()
                .map(Some)
                .ok_or_else(|| CodecError::invalid_field(field, "integer")),
        }
    }

    fn float(&mut self, field: &str) -> CodecResult<f64> {
        match self.rest.remove(field) {
            None | Some(Value::Null) => Err(CodecError::missing_field(field)),
            Some(v) => v
                .as_float()
                .ok_or_else(|| CodecError::invalid_field(field, "number")),
        }
    }

    fn bool_or(&mut self, field: &str, default: bool) -> CodecResult<bool> {
        match self.rest.remove(field) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(b),
            Some(_) => Err(CodecError::invalid_field(field, "boolean")),
        }
    }

    fn opt_time(&mut self, field: &str) -> CodecResult<Option<Timestamp>> {
        match self.opt_text(field)? {
            None => Ok(None),
            Some(s) => Timestamp::parse(s)
                .map(Some)
                .map_err(|_| CodecError::invalid_field(field, "RFC 3339 timestamp")),
        }
    }

    fn value(&mut self, field: &str) -> CodecResult<Value> {
        self.rest
            .remove(field)
            .ok_or_else(|| CodecError::missing_field(field))
    }

    fn finish(self) -> Record {
        self.rest
    }
}

fn time_value(t: &Option<Timestamp>) -> Value {
    Value::from(t.as_ref().map(Timestamp::as_str))
}

/// An entry of the payment-stage catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentStage {
    /// Stage identifier.
    pub id: String,
    /// Invoice title.
    pub title: String,
    /// Invoice description.
    pub description: String,
    /// Price in minor currency units.
    pub price: i64,
    /// ISO 4217 currency code, if the stage pins one.
    pub currency: Option<String>,
    /// Fields not modelled above.
    pub extra: Record,
}

impl PaymentStage {
    /// Creates a stage with no extra fields.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        price: i64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            price,
            currency: None,
            extra: Record::new(),
        }
    }
}

impl ToRecord for PaymentStage {
    fn to_record(&self) -> Record {
        let mut record = self.extra.clone();
        record.insert("id", self.id.as_str());
        record.insert("title", self.title.as_str());
        record.insert("description", self.description.as_str());
        record.insert("price", self.price);
        if let Some(currency) = &self.currency {
            record.insert("currency", currency.as_str());
        }
        record
    }
}

impl Entity for PaymentStage {
    const KIND: EntityKind = EntityKind::PaymentStages;

    fn identity(&self) -> String {
        self.id.clone()
    }

    fn from_record(record: &Record) -> CodecResult<Self> {
        let mut r = FieldReader::new(record);
        Ok(Self {
            id: r.text("id")?,
            title: r.text("title")?,
            description: r.opt_text("description")?.unwrap_or_default(),
            price: r.integer("price")?,
            currency: r.opt_text("currency")?,
            extra: r.finish(),
        })
    }
}

/// How a promo code discounts a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// Percentage of the price.
    Percent,
    /// Fixed amount in minor units.
    Fixed,
}

impl DiscountType {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percent => "percent",
            DiscountType::Fixed => "fixed",
        }
    }

    /// Parses a wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "percent" | "percentage" => Some(DiscountType::Percent),
            "fixed" => Some(DiscountType::Fixed),
            _ => None,
        }
    }
}

/// A promo code.
#[derive(Debug, Clone, PartialEq)]
pub struct PromoCode {
    /// The code users type.
    pub code: String,
    /// Discount type.
    pub discount_type: DiscountType,
    /// Discount magnitude.
    pub discount_value: f64,
    /// Whether the code can currently be redeemed.
    pub active: bool,
    /// Redemption limit, if any.
    pub max_uses: Option<i64>,
    /// Redemptions so far.
    pub used_count: i64,
    /// Expiry, if any.
    pub expires_at: Option<Timestamp>,
    /// Fields not modelled above.
    pub extra: Record,
}

impl PromoCode {
    /// Creates an active, unlimited promo code.
    pub fn new(code: impl Into<String>, discount_type: DiscountType, discount_value: f64) -> Self {
        Self {
            code: code.into(),
            discount_type,
            discount_value,
            active: true,
            max_uses: None,
            used_count: 0,
            expires_at: None,
            extra: Record::new(),
        }
    }
}

impl ToRecord for PromoCode {
    fn to_record(&self) -> Record {
        let mut record = self.extra.clone();
        record.insert("code", self.code.as_str());
        record.insert("discount_type", self.discount_type.as_str());
        record.insert("discount_value", self.discount_value);
        record.insert("active", self.active);
        record.insert("max_uses", self.max_uses);
        record.insert("used_count", self.used_count);
        record.insert("expires_at", time_value(&self.expires_at));
        record
    }
}

impl Entity for PromoCode {
    const KIND: EntityKind = EntityKind::PromoCodes;

    fn identity(&self) -> String {
        self.code.clone()
    }

    fn from_record(record: &Record) -> CodecResult<Self> {
        let mut r = FieldReader::new(record);
        let code = r.text("code")?;
        let discount_type = r.text("discount_type")?;
        let discount_type = DiscountType::parse(&discount_type)
            .ok_or_else(|| CodecError::invalid_field("discount_type", "percent or fixed"))?;
        Ok(Self {
            code,
            discount_type,
            discount_value: r.float("discount_value")?,
            active: r.bool_or("active", true)?,
            max_uses: r.opt_integer("max_uses")?,
            used_count: r.opt_integer("used_count")?.unwrap_or(0),
            expires_at: r.opt_time("expires_at")?,
            extra: r.finish(),
        })
    }
}

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and in force.
    Active,
    /// Awaiting the first payment.
    Pending,
    /// Cancelled by the user.
    Cancelled,
    /// Lapsed.
    Expired,
}

impl SubscriptionStatus {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// Parses a wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "pending" => Some(SubscriptionStatus::Pending),
            "cancelled" | "canceled" => Some(SubscriptionStatus::Cancelled),
            "expired" => Some(SubscriptionStatus::Expired),
            _ => None,
        }
    }
}

/// A user's subscription to a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    /// Platform user id.
    pub user_id: i64,
    /// Plan identifier.
    pub plan_id: String,
    /// Current status.
    pub status: SubscriptionStatus,
    /// Start of the current period.
    pub started_at: Option<Timestamp>,
    /// End of the current period.
    pub expires_at: Option<Timestamp>,
    /// Whether the subscription renews automatically.
    pub auto_renew: bool,
    /// Fields not modelled above.
    pub extra: Record,
}

impl Subscription {
    /// Creates an active subscription with no period bounds.
    pub fn new(user_id: i64, plan_id: impl Into<String>) -> Self {
        Self {
            user_id,
            plan_id: plan_id.into(),
            status: SubscriptionStatus::Active,
            started_at: None,
            expires_at: None,
            auto_renew: false,
            extra: Record::new(),
        }
    }
}

impl ToRecord for Subscription {
    fn to_record(&self) -> Record {
        let mut record = self.extra.clone();
        record.insert("user_id", self.user_id);
        record.insert("plan_id", self.plan_id.as_str());
        record.insert("status", self.status.as_str());
        record.insert("started_at", time_value(&self.started_at));
        record.insert("expires_at", time_value(&self.expires_at));
        record.insert("auto_renew", self.auto_renew);
        record
    }
}

impl Entity for Subscription {
    const KIND: EntityKind = EntityKind::Subscriptions;

    fn identity(&self) -> String {
        format!("{}:{}", self.user_id, self.plan_id)
    }

    fn from_record(record: &Record) -> CodecResult<Self> {
        let mut r = FieldReader::new(record);
        let user_id = r.integer("user_id")?;
        let plan_id = r.text("plan_id")?;
        let status = match r.opt_text("status")? {
            None => SubscriptionStatus::Active,
            Some(s) => SubscriptionStatus::parse(&s)
                .ok_or_else(|| CodecError::invalid_field("status", "subscription status"))?,
        };
        Ok(Self {
            user_id,
            plan_id,
            status,
            started_at: r.opt_time("started_at")?,
            expires_at: r.opt_time("expires_at")?,
            auto_renew: r.bool_or("auto_renew", false)?,
            extra: r.finish(),
        })
    }
}

/// A notification template.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationTemplate {
    /// Template name.
    pub name: String,
    /// Optional heading.
    pub title: Option<String>,
    /// Message body with placeholders.
    pub text: String,
    /// Markup mode understood by the platform, if any.
    pub parse_mode: Option<String>,
    /// Fields not modelled above.
    pub extra: Record,
}

impl NotificationTemplate {
    /// Creates a plain-text template.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            text: text.into(),
            parse_mode: None,
            extra: Record::new(),
        }
    }
}

impl ToRecord for NotificationTemplate {
    fn to_record(&self) -> Record {
        let mut record = self.extra.clone();
        record.insert("name", self.name.as_str());
        record.insert("title", self.title.clone());
        record.insert("text", self.text.as_str());
        record.insert("parse_mode", self.parse_mode.clone());
        record
    }
}

impl Entity for NotificationTemplate {
    const KIND: EntityKind = EntityKind::Templates;

    fn identity(&self) -> String {
        self.name.clone()
    }

    fn from_record(record: &Record) -> CodecResult<Self> {
        let mut r = FieldReader::new(record);
        Ok(Self {
            name: r.text("name")?,
            title: r.opt_text("title")?,
            text: r.text("text")?,
            parse_mode: r.opt_text("parse_mode")?,
            extra: r.finish(),
        })
    }
}

/// A named instance setting.
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    /// Setting name.
    pub name: String,
    /// Setting value.
    pub value: Value,
}

impl Setting {
    /// Creates a setting.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl ToRecord for Setting {
    fn to_record(&self) -> Record {
        Record::from_pairs([("name", Value::from(self.name.as_str())), ("value", self.value.clone())])
    }
}

impl Entity for Setting {
    const KIND: EntityKind = EntityKind::Settings;

    fn identity(&self) -> String {
        self.name.clone()
    }

    fn from_record(record: &Record) -> CodecResult<Self> {
        let mut r = FieldReader::new(record);
        Ok(Self {
            name: r.text("name")?,
            value: r.value("value")?,
        })
    }
}
