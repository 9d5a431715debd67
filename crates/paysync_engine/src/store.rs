//! Local entity stores the engine reads from and writes to.
//!
//! The stores belong to the host instance. The engine only goes through the
//! narrow interfaces below and never locks anything itself; in-memory
//! implementations are provided for hosts without a persistent backend and
//! for tests.

use paysync_codec::{
    CodecError, DiscountType, Entity, EntityKind, NotificationTemplate, PaymentStage, PromoCode,
    Record, Setting, Subscription, ToRecord, Value,
};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by local stores.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The requested item does not exist.
    #[error("{kind} `{key}` not found")]
    NotFound {
        /// Entity kind.
        kind: EntityKind,
        /// Identity key.
        key: String,
    },

    /// The store refused the write.
    #[error("store rejected write: {0}")]
    Rejected(String),

    /// The fields could not be turned into an entity.
    #[error("invalid entity: {0}")]
    Codec(#[from] CodecError),
}

impl StoreError {
    /// Creates a not-found error.
    pub fn not_found(kind: EntityKind, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }
}

/// Catalog of payment stages.
pub trait StageCatalog: Send + Sync {
    /// Lists every stage.
    fn list(&self) -> StoreResult<Vec<PaymentStage>>;

    /// Creates or replaces the stage `id` from `fields`.
    fn create(&self, id: &str, fields: &Record) -> StoreResult<PaymentStage>;
}

/// Registry of promo codes.
pub trait PromoRegistry: Send + Sync {
    /// Lists codes, optionally only the active ones.
    fn list(&self, active_only: bool) -> StoreResult<Vec<PromoCode>>;

    /// Looks up one code.
    fn get(&self, code: &str) -> StoreResult<Option<PromoCode>>;

    /// Creates or replaces a code. `extra` carries every other field.
    fn create(
        &self,
        code: &str,
        discount_type: DiscountType,
        discount_value: f64,
        extra: &Record,
    ) -> StoreResult<PromoCode>;
}

/// Registry of user subscriptions.
pub trait SubscriptionRegistry: Send + Sync {
    /// Lists every subscription.
    fn list(&self) -> StoreResult<Vec<Subscription>>;

    /// Looks up the subscription of `user_id` to `plan_id`.
    fn get(&self, user_id: i64, plan_id: &str) -> StoreResult<Option<Subscription>>;

    /// Creates or replaces a subscription.
    fn create(&self, subscription: Subscription) -> StoreResult<Subscription>;
}

/// Registry of notification templates.
pub trait TemplateRegistry: Send + Sync {
    /// Lists every template.
    fn list(&self) -> StoreResult<Vec<NotificationTemplate>>;

    /// Looks up one template.
    fn get(&self, name: &str) -> StoreResult<Option<NotificationTemplate>>;

    /// Exports a template as a record.
    fn export(&self, name: &str) -> StoreResult<Record>;

    /// Imports a template from a record, replacing any with the same name.
    fn import(&self, record: &Record) -> StoreResult<NotificationTemplate>;
}

/// Instance-level settings.
pub trait SettingsStore: Send + Sync {
    /// Names of every setting.
    fn names(&self) -> StoreResult<Vec<String>>;

    /// Reads one setting.
    fn get(&self, name: &str) -> StoreResult<Option<Value>>;

    /// Writes one setting.
    fn set(&self, name: &str, value: Value) -> StoreResult<()>;
}

/// The stores a host makes available to the engine, one optional slot per
/// entity kind. Kinds without a store are skipped.
#[derive(Clone, Default)]
pub struct LocalStores {
    /// Payment stages.
    pub stages: Option<Arc<dyn StageCatalog>>,
    /// Promo codes.
    pub promo_codes: Option<Arc<dyn PromoRegistry>>,
    /// Subscriptions.
    pub subscriptions: Option<Arc<dyn SubscriptionRegistry>>,
    /// Notification templates.
    pub templates: Option<Arc<dyn TemplateRegistry>>,
    /// Settings.
    pub settings: Option<Arc<dyn SettingsStore>>,
}

impl fmt::Debug for LocalStores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let present: Vec<_> = EntityKind::ALL
            .into_iter()
            .filter(|kind| self.has(*kind))
            .map(|kind| kind.name())
            .collect();
        f.debug_struct("LocalStores")
            .field("present", &present)
            .finish()
    }
}

impl LocalStores {
    /// Creates an empty set of stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stage catalog.
    pub fn with_stages(mut self, store: Arc<dyn StageCatalog>) -> Self {
        self.stages = Some(store);
        self
    }

    /// Sets the promo registry.
    pub fn with_promo_codes(mut self, store: Arc<dyn PromoRegistry>) -> Self {
        self.promo_codes = Some(store);
        self
    }

    /// Sets the subscription registry.
    pub fn with_subscriptions(mut self, store: Arc<dyn SubscriptionRegistry>) -> Self {
        self.subscriptions = Some(store);
        self
    }

    /// Sets the template registry.
    pub fn with_templates(mut self, store: Arc<dyn TemplateRegistry>) -> Self {
        self.templates = Some(store);
        self
    }

    /// Sets the settings store.
    pub fn with_settings(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(store);
        self
    }

    /// Returns true if a store is present for `kind`.
    pub fn has(&self, kind: EntityKind) -> bool {
        self.store_for(kind).is_some()
    }

    pub(crate) fn store_for(&self, kind: EntityKind) -> Option<KindStore> {
        match kind {
            EntityKind::PaymentStages => self.stages.clone().map(KindStore::Stages),
            EntityKind::PromoCodes => self.promo_codes.clone().map(KindStore::Promos),
            EntityKind::Subscriptions => self.subscriptions.clone().map(KindStore::Subscriptions),
            EntityKind::Templates => self.templates.clone().map(KindStore::Templates),
            EntityKind::Settings => self.settings.clone().map(KindStore::Settings),
        }
    }
}

/// Record-level view over the store of one kind.
pub(crate) enum KindStore {
    Stages(Arc<dyn StageCatalog>),
    Promos(Arc<dyn PromoRegistry>),
    Subscriptions(Arc<dyn SubscriptionRegistry>),
    Templates(Arc<dyn TemplateRegistry>),
    Settings(Arc<dyn SettingsStore>),
}

impl KindStore {
    /// Every local item, in record form.
    pub(crate) fn records(&self) -> StoreResult<Vec<Record>> {
        Ok(match self {
            KindStore::Stages(s) => to_records(s.list()?),
            KindStore::Promos(s) => to_records(s.list(false)?),
            KindStore::Subscriptions(s) => to_records(s.list()?),
            KindStore::Templates(s) => to_records(s.list()?),
            KindStore::Settings(s) => {
                let mut records = Vec::new();
                for name in s.names()? {
                    if let Some(value) = s.get(&name)? {
                        records.push(Setting::new(name, value).to_record());
                    }
                }
                records
            }
        })
    }

    /// Local item matching a peer record, looked up by its identity.
    pub(crate) fn find(&self, identity: &str, remote: &Record) -> StoreResult<Option<Record>> {
        Ok(match self {
            KindStore::Stages(s) => s
                .list()?
                .into_iter()
                .find(|stage| stage.id == identity)
                .map(|stage| stage.to_record()),
            KindStore::Promos(s) => s.get(identity)?.map(|p| p.to_record()),
            KindStore::Subscriptions(s) => {
                let user_id = remote
                    .get("user_id")
                    .and_then(Value::as_integer)
                    .ok_or_else(|| CodecError::missing_field("user_id"))?;
                let plan_id = remote
                    .get_text("plan_id")
                    .ok_or_else(|| CodecError::missing_field("plan_id"))?;
                s.get(user_id, plan_id)?.map(|sub| sub.to_record())
            }
            KindStore::Templates(s) => match s.get(identity)? {
                Some(_) => Some(s.export(identity)?),
                None => None,
            },
            KindStore::Settings(s) => s
                .get(identity)?
                .map(|value| Setting::new(identity, value).to_record()),
        })
    }

    /// Creates or overwrites the local item described by `record`.
    pub(crate) fn put(&self, record: &Record) -> StoreResult<()> {
        match self {
            KindStore::Stages(s) => {
                let id = record
                    .get_text("id")
                    .ok_or_else(|| CodecError::missing_field("id"))?;
                s.create(id, record)?;
            }
            KindStore::Promos(s) => {
                let promo = PromoCode::from_record(record)?;
                let mut extra = promo.to_record();
                for field in ["code", "discount_type", "discount_value"] {
                    extra.remove(field);
                }
                s.create(
                    &promo.code,
                    promo.discount_type,
                    promo.discount_value,
                    &extra,
                )?;
            }
            KindStore::Subscriptions(s) => {
                s.create(Subscription::from_record(record)?)?;
            }
            KindStore::Templates(s) => {
                s.import(record)?;
            }
            KindStore::Settings(s) => {
                let setting = Setting::from_record(record)?;
                s.set(&setting.name, setting.value)?;
            }
        }
        Ok(())
    }
}

fn to_records<T: ToRecord>(items: Vec<T>) -> Vec<Record> {
    items.iter().map(ToRecord::to_record).collect()
}

/// Replaces the item matching `same`, or appends it.
fn upsert<T>(items: &mut Vec<T>, item: T, same: impl Fn(&T) -> bool) {
    match items.iter().position(same) {
        Some(i) => items[i] = item,
        None => items.push(item),
    }
}

/// In-memory [`StageCatalog`].
#[derive(Debug, Default)]
pub struct MemoryStageCatalog {
    stages: RwLock<Vec<PaymentStage>>,
}

impl MemoryStageCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog holding `stages`.
    pub fn with_stages(stages: Vec<PaymentStage>) -> Self {
        Self {
            stages: RwLock::new(stages),
        }
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.read().len()
    }

    /// Returns true if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.stages.read().is_empty()
    }

    /// Looks up a stage by id.
    pub fn get(&self, id: &str) -> Option<PaymentStage> {
        self.stages.read().iter().find(|s| s.id == id).cloned()
    }
}

impl StageCatalog for MemoryStageCatalog {
    fn list(&self) -> StoreResult<Vec<PaymentStage>> {
        Ok(self.stages.read().clone())
    }

    fn create(&self, id: &str, fields: &Record) -> StoreResult<PaymentStage> {
        let mut record = fields.clone();
        record.insert("id", id);
        let stage = PaymentStage::from_record(&record)?;
        upsert(&mut self.stages.write(), stage.clone(), |s| s.id == id);
        Ok(stage)
    }
}

/// In-memory [`PromoRegistry`].
#[derive(Debug, Default)]
pub struct MemoryPromoRegistry {
    codes: RwLock<Vec<PromoCode>>,
}

impl MemoryPromoRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `codes`.
    pub fn with_codes(codes: Vec<PromoCode>) -> Self {
        Self {
            codes: RwLock::new(codes),
        }
    }

    /// Number of codes.
    pub fn len(&self) -> usize {
        self.codes.read().len()
    }

    /// Returns true if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.codes.read().is_empty()
    }
}

impl PromoRegistry for MemoryPromoRegistry {
    fn list(&self, active_only: bool) -> StoreResult<Vec<PromoCode>> {
        Ok(self
            .codes
            .read()
            .iter()
            .filter(|p| !active_only || p.active)
            .cloned()
            .collect())
    }

    fn get(&self, code: &str) -> StoreResult<Option<PromoCode>> {
        Ok(self.codes.read().iter().find(|p| p.code == code).cloned())
    }

    fn create(
        &self,
        code: &str,
        discount_type: DiscountType,
        discount_value: f64,
        extra: &Record,
    ) -> StoreResult<PromoCode> {
        if !discount_value.is_finite() || discount_value < 0.0 {
            return Err(StoreError::Rejected(format!(
                "discount value {discount_value} for `{code}` is negative or non-finite"
            )));
        }
        let mut record = extra.clone();
        record.insert("code", code);
        record.insert("discount_type", discount_type.as_str());
        record.insert("discount_value", discount_value);
        let promo = PromoCode::from_record(&record)?;
        upsert(&mut self.codes.write(), promo.clone(), |p| p.code == code);
        Ok(promo)
    }
}

/// In-memory [`SubscriptionRegistry`].
#[derive(Debug, Default)]
pub struct MemorySubscriptionRegistry {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl MemorySubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `subscriptions`.
    pub fn with_subscriptions(subscriptions: Vec<Subscription>) -> Self {
        Self {
            subscriptions: RwLock::new(subscriptions),
        }
    }

    /// Number of subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Returns true if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }
}

impl SubscriptionRegistry for MemorySubscriptionRegistry {
    fn list(&self) -> StoreResult<Vec<Subscription>> {
        Ok(self.subscriptions.read().clone())
    }

    fn get(&self, user_id: i64, plan_id: &str) -> StoreResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .read()
            .iter()
            .find(|s| s.user_id == user_id && s.plan_id == plan_id)
            .cloned())
    }

    fn create(&self, subscription: Subscription) -> StoreResult<Subscription> {
        let key = subscription.identity();
        upsert(
            &mut self.subscriptions.write(),
            subscription.clone(),
            |s| s.identity() == key,
        );
        Ok(subscription)
    }
}

/// In-memory [`TemplateRegistry`].
#[derive(Debug, Default)]
pub struct MemoryTemplateRegistry {
    templates: RwLock<Vec<NotificationTemplate>>,
}

impl MemoryTemplateRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `templates`.
    pub fn with_templates(templates: Vec<NotificationTemplate>) -> Self {
        Self {
            templates: RwLock::new(templates),
        }
    }

    /// Number of templates.
    pub fn len(&self) -> usize {
        self.templates.read().len()
    }

    /// Returns true if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.templates.read().is_empty()
    }
}

impl TemplateRegistry for MemoryTemplateRegistry {
    fn list(&self) -> StoreResult<Vec<NotificationTemplate>> {
        Ok(self.templates.read().clone())
    }

    fn get(&self, name: &str) -> StoreResult<Option<NotificationTemplate>> {
        Ok(self.templates.read().iter().find(|t| t.name == name).cloned())
    }

    fn export(&self, name: &str) -> StoreResult<Record> {
        self.get(name)?
            .map(|t| t.to_record())
            .ok_or_else(|| StoreError::not_found(EntityKind::Templates, name))
    }

    fn import(&self, record: &Record) -> StoreResult<NotificationTemplate> {
        let template = NotificationTemplate::from_record(record)?;
        let name = template.name.clone();
        upsert(&mut self.templates.write(), template.clone(), |t| {
            t.name == name
        });
        Ok(template)
    }
}

/// In-memory [`SettingsStore`].
#[derive(Debug, Default)]
pub struct MemorySettings {
    settings: RwLock<Vec<Setting>>,
}

impl MemorySettings {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `settings`.
    pub fn with_settings(settings: Vec<Setting>) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Number of settings.
    pub fn len(&self) -> usize {
        self.settings.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.settings.read().is_empty()
    }
}

impl SettingsStore for MemorySettings {
    fn names(&self) -> StoreResult<Vec<String>> {
        Ok(self.settings.read().iter().map(|s| s.name.clone()).collect())
    }

    fn get(&self, name: &str) -> StoreResult<Option<Value>> {
        Ok(self
            .settings
            .read()
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.value.clone()))
    }

    fn set(&self, name: &str, value: Value) -> StoreResult<()> {
        upsert(
            &mut self.settings.write(),
            Setting::new(name, value),
            |s| s.name == name,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_catalog_upserts_in_place() {
        let catalog = MemoryStageCatalog::with_stages(vec![
            PaymentStage::new("basic", "Basic", "Entry plan", 100),
            PaymentStage::new("pro", "Pro", "Full plan", 500),
        ]);

        let fields = PaymentStage::new("basic", "Basic+", "Entry plan", 150).to_record();
        catalog.create("basic", &fields).unwrap();
        catalog
            .create("vip", &PaymentStage::new("vip", "VIP", "All", 900).to_record())
            .unwrap();

        let ids: Vec<_> = catalog.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, ["basic", "pro", "vip"]);
        assert_eq!(catalog.get("basic").unwrap().price, 150);
    }

    #[test]
    fn promo_registry_filters_and_rejects() {
        let mut expired = PromoCode::new("OLD", DiscountType::Fixed, 5.0);
        expired.active = false;
        let registry = MemoryPromoRegistry::with_codes(vec![
            PromoCode::new("SALE", DiscountType::Percent, 10.0),
            expired,
        ]);

        assert_eq!(registry.list(false).unwrap().len(), 2);
        assert_eq!(registry.list(true).unwrap().len(), 1);

        let mut extra = Record::new();
        extra.insert("max_uses", 3);
        let created = registry
            .create("NEW", DiscountType::Percent, 25.0, &extra)
            .unwrap();
        assert_eq!(created.max_uses, Some(3));
        assert!(registry.get("NEW").unwrap().is_some());

        let err = registry
            .create("BAD", DiscountType::Fixed, -1.0, &Record::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[test]
    fn promo_discount_bounds() {
        let registry = MemoryPromoRegistry::new();

        let free = registry
            .create("FREE", DiscountType::Fixed, 0.0, &Record::new())
            .unwrap();
        assert_eq!(free.discount_value, 0.0);

        for bad in [-0.5, f64::NAN, f64::INFINITY] {
            let err = registry
                .create("BAD", DiscountType::Percent, bad, &Record::new())
                .unwrap_err();
            assert!(err.to_string().contains("is negative or non-finite"), "{err}");
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn template_export_import() {
        let registry =
            MemoryTemplateRegistry::with_templates(vec![NotificationTemplate::new("paid", "Thanks!")]);
        let mut exported = registry.export("paid").unwrap();
        exported.insert("text", "Thank you!");
        registry.import(&exported).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("paid").unwrap().unwrap().text, "Thank you!");
        assert!(matches!(
            registry.export("missing"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn kind_store_round_trips_records() {
        let stores = LocalStores::new()
            .with_promo_codes(Arc::new(MemoryPromoRegistry::new()))
            .with_subscriptions(Arc::new(MemorySubscriptionRegistry::new()))
            .with_settings(Arc::new(MemorySettings::new()));

        assert!(stores.has(EntityKind::PromoCodes));
        assert!(!stores.has(EntityKind::PaymentStages));
        assert!(stores.store_for(EntityKind::Templates).is_none());

        let promos = stores.store_for(EntityKind::PromoCodes).unwrap();
        let mut promo = PromoCode::new("SALE", DiscountType::Percent, 10.0).to_record();
        promo.insert("campaign", "spring");
        promos.put(&promo).unwrap();
        assert_eq!(promos.find("SALE", &promo).unwrap(), Some(promo.clone()));
        assert_eq!(promos.records().unwrap(), vec![promo]);

        let subs = stores.store_for(EntityKind::Subscriptions).unwrap();
        let sub = Subscription::new(42, "monthly").to_record();
        subs.put(&sub).unwrap();
        assert_eq!(subs.find("42:monthly", &sub).unwrap(), Some(sub));

        let settings = stores.store_for(EntityKind::Settings).unwrap();
        let setting = Setting::new("currency", "EUR").to_record();
        settings.put(&setting).unwrap();
        assert_eq!(settings.find("currency", &setting).unwrap(), Some(setting));
        assert_eq!(settings.find("missing", &Record::new()).unwrap(), None);
    }

    #[test]
    fn kind_store_rejects_malformed_records() {
        let stores = LocalStores::new().with_stages(Arc::new(MemoryStageCatalog::new()));
        let stages = stores.store_for(EntityKind::PaymentStages).unwrap();

        let no_id = Record::from_pairs([("title", Value::from("x"))]);
        assert!(matches!(stages.put(&no_id), Err(StoreError::Codec(_))));

        let bad_price = Record::from_pairs([
            ("id", Value::from("x")),
            ("title", Value::from("x")),
            ("description", Value::from("x")),
            ("price", Value::from("free")),
        ]);
        assert!(matches!(stages.put(&bad_price), Err(StoreError::Codec(_))));
    }
}
