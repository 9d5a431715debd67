//! Integration tests for the sync engine against reference peers.

use paysync_codec::{
    DiscountType, Entity, EntityKind, NotificationTemplate, PaymentStage, PromoCode, Record,
    Setting, Snapshot, Subscription, Timestamp, ToRecord, Value,
};
use paysync_engine::{
    ApprovalHook, ConflictResolution, FleetCoordinator, LocalStores, LoopbackClient,
    MemoryPromoRegistry, MemorySettings, MemoryStageCatalog, MemorySubscriptionRegistry,
    MemoryTemplateRegistry, PromoRegistry, StageCatalog, SubscriptionRegistry, SyncConfig,
    SyncConflict, SyncDirection, SyncOrchestrator, SyncStatus, TemplateRegistry,
};
use paysync_peer::{PeerConfig, PeerRouter, PeerServer};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const EU: &str = "https://eu.bots.example/api";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Local stores of the instance under test.
struct Local {
    stages: Arc<MemoryStageCatalog>,
    promos: Arc<MemoryPromoRegistry>,
    subscriptions: Arc<MemorySubscriptionRegistry>,
    templates: Arc<MemoryTemplateRegistry>,
    settings: Arc<MemorySettings>,
}

impl Local {
    fn new() -> Self {
        Self {
            stages: Arc::new(MemoryStageCatalog::new()),
            promos: Arc::new(MemoryPromoRegistry::new()),
            subscriptions: Arc::new(MemorySubscriptionRegistry::new()),
            templates: Arc::new(MemoryTemplateRegistry::new()),
            settings: Arc::new(MemorySettings::new()),
        }
    }

    fn seeded() -> Self {
        Self {
            stages: Arc::new(MemoryStageCatalog::with_stages(vec![
                PaymentStage::new("basic", "Basic", "Entry plan", 100),
                PaymentStage::new("pro", "Pro", "Full plan", 500),
            ])),
            promos: Arc::new(MemoryPromoRegistry::with_codes(vec![PromoCode::new(
                "SPRING",
                DiscountType::Percent,
                15.0,
            )])),
            subscriptions: Arc::new(MemorySubscriptionRegistry::with_subscriptions(vec![
                Subscription::new(1, "monthly"),
            ])),
            templates: Arc::new(MemoryTemplateRegistry::with_templates(vec![
                NotificationTemplate::new("paid", "Thanks"),
            ])),
            settings: Arc::new(MemorySettings::with_settings(vec![Setting::new(
                "currency", "USD",
            )])),
        }
    }

    fn stores(&self) -> LocalStores {
        LocalStores::new()
            .with_stages(self.stages.clone())
            .with_promo_codes(self.promos.clone())
            .with_subscriptions(self.subscriptions.clone())
            .with_templates(self.templates.clone())
            .with_settings(self.settings.clone())
    }

    fn state(&self) -> Vec<Record> {
        let mut records: Vec<Record> = Vec::new();
        records.extend(self.stages.list().unwrap().iter().map(ToRecord::to_record));
        records.extend(self.promos.list(false).unwrap().iter().map(ToRecord::to_record));
        records.extend(self.templates.list().unwrap().iter().map(ToRecord::to_record));
        records
    }
}

type Client = LoopbackClient<Arc<PeerServer>>;

fn engine(
    config: SyncConfig,
    server: &Arc<PeerServer>,
    local: &Local,
) -> SyncOrchestrator<Client> {
    let client = Arc::new(LoopbackClient::new(Arc::clone(server)));
    SyncOrchestrator::new(config, client, local.stores())
}

fn peer(config: PeerConfig) -> Arc<PeerServer> {
    Arc::new(PeerServer::new(config))
}

#[tokio::test]
async fn local_only_items_survive_a_pass() {
    init_tracing();
    let server = peer(PeerConfig::new("eu").without_applying_pushes());
    server.state().publish_items(&[PaymentStage::new("basic", "Basic", "Entry plan", 100)]);
    let local = Local::seeded();
    let before = local.state();
    let sync = engine(SyncConfig::new("eu", EU), &server, &local);

    let result = sync.sync_all().await;

    assert_eq!(result.status, SyncStatus::Completed);
    assert!(result.conflicts.is_empty());
    assert_eq!(local.state(), before);
    assert_eq!(local.settings.len(), 1);
    assert_eq!(local.subscriptions.len(), 1);
}

#[tokio::test]
async fn unreachable_peer_leaves_local_state_alone() {
    init_tracing();
    let server = peer(PeerConfig::new("eu"));
    let local = Local::seeded();
    let before = local.state();
    let sync = engine(SyncConfig::new("eu", EU), &server, &local);

    server.set_available(false);
    let result = sync.sync_all().await;

    assert_eq!(result.status, SyncStatus::Failed);
    assert_eq!(local.state(), before);
    assert_eq!(server.state().push_count(), 0);
}

#[tokio::test]
async fn new_peer_items_are_created_once() {
    init_tracing();
    let server = peer(PeerConfig::new("eu"));
    let vip = PaymentStage::new("vip", "VIP", "Everything", 900);
    server.state().publish_items(&[vip.clone()]);
    server.state().publish_items(&[Subscription::new(7, "yearly")]);
    let local = Local::new();
    let sync = engine(
        SyncConfig::new("eu", EU).with_direction(SyncDirection::Pull),
        &server,
        &local,
    );

    let result = sync.sync_all().await;

    assert_eq!(result.status, SyncStatus::Completed);
    assert_eq!(local.stages.len(), 1);
    assert_eq!(local.stages.get("vip").unwrap(), vip);
    assert_eq!(result.items_synced_for(EntityKind::PaymentStages), 1);
    assert_eq!(result.items_synced_for(EntityKind::Subscriptions), 1);
    assert_eq!(result.items_synced_for(EntityKind::PromoCodes), 0);
}

#[tokio::test]
async fn second_pass_is_a_no_op() {
    init_tracing();
    let server = peer(PeerConfig::new("eu").without_applying_pushes());
    server.state().publish_items(&[
        PaymentStage::new("basic", "Basic", "Entry plan", 150),
        PaymentStage::new("vip", "VIP", "Everything", 900),
    ]);
    let local = Local::seeded();
    let sync = engine(
        SyncConfig::new("eu", EU).with_conflict_resolution(ConflictResolution::TargetWins),
        &server,
        &local,
    );

    let first = sync.sync_all().await;
    let after_first = local.state();
    let second = sync.sync_all().await;

    assert_eq!(first.conflicts.len(), 1);
    assert!(second.conflicts.is_empty());
    assert_eq!(local.state(), after_first);
    assert_eq!(local.stages.get("basic").unwrap().price, 150);
    assert_eq!(sync.history().len(), 2);
}

#[tokio::test]
async fn bidirectional_pass_reaches_the_peer() {
    init_tracing();
    let server = peer(PeerConfig::new("eu"));
    let local = Local::seeded();
    let sync = engine(SyncConfig::new("eu", EU), &server, &local);

    let result = sync.sync_all().await;

    assert_eq!(result.status, SyncStatus::Completed);
    assert_eq!(server.state().push_count(), EntityKind::ALL.len());
    assert_eq!(server.state().snapshot(EntityKind::PaymentStages).len(), 2);
    assert!(result.conflicts.is_empty());
    // every pulled item was already local
    assert_eq!(result.items_synced_for(EntityKind::PaymentStages), 2);
}

#[tokio::test]
async fn push_only_ignores_peer_data() {
    init_tracing();
    let server = peer(PeerConfig::new("eu").without_applying_pushes());
    server.state().publish_items(&[PaymentStage::new("basic", "Hacked", "Entry plan", 1)]);
    let local = Local::seeded();
    let before = local.state();
    let sync = engine(
        SyncConfig::new("eu", EU).with_direction(SyncDirection::Push),
        &server,
        &local,
    );

    let result = sync.sync_all().await;

    assert_eq!(result.status, SyncStatus::Completed);
    assert!(result.conflicts.is_empty());
    assert_eq!(local.state(), before);
    let pushed = server.state().pushes_for(EntityKind::PaymentStages);
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].data.len(), 2);
}

#[tokio::test]
async fn merge_keeps_peer_only_fields() {
    init_tracing();
    let server = peer(PeerConfig::new("eu"));
    let mut remote = NotificationTemplate::new("paid", "Thank you");
    remote.extra.insert("footer", "See you soon");
    server.state().publish_items(&[remote]);
    let local = Local::seeded();
    let sync = engine(
        SyncConfig::new("eu", EU)
            .with_direction(SyncDirection::Pull)
            .with_conflict_resolution(ConflictResolution::Merge),
        &server,
        &local,
    );

    let result = sync.sync_all().await;

    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].differing_fields, vec!["text".to_string()]);
    let merged = local.templates.get("paid").unwrap().unwrap();
    assert_eq!(merged.text, "Thanks");
    assert_eq!(merged.extra.get_text("footer"), Some("See you soon"));
}

#[tokio::test]
async fn skip_keeps_local_item_identical() {
    init_tracing();
    let server = peer(PeerConfig::new("eu"));
    server.state().publish_items(&[PromoCode::new("SPRING", DiscountType::Fixed, 300.0)]);
    let local = Local::seeded();
    let before = local.promos.get("SPRING").unwrap().unwrap().to_record();
    let sync = engine(
        SyncConfig::new("eu", EU)
            .with_direction(SyncDirection::Pull)
            .with_conflict_resolution(ConflictResolution::Skip),
        &server,
        &local,
    );

    let result = sync.sync_all().await;

    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(
        result.conflicts[0].differing_fields,
        vec!["discount_type".to_string(), "discount_value".to_string()]
    );
    assert_eq!(result.conflicts[0].resolution, Some(ConflictResolution::Skip));
    assert_eq!(
        local.promos.get("SPRING").unwrap().unwrap().to_record(),
        before
    );
}

struct TrustPeerPrices;

impl ApprovalHook for TrustPeerPrices {
    fn decide(&self, conflict: &SyncConflict) -> ConflictResolution {
        if conflict.kind == EntityKind::PaymentStages {
            ConflictResolution::TargetWins
        } else {
            ConflictResolution::Skip
        }
    }
}

#[tokio::test]
async fn ask_user_routes_through_hook() {
    init_tracing();
    let server = peer(PeerConfig::new("eu"));
    server.state().publish_items(&[PaymentStage::new("pro", "Pro", "Full plan", 450)]);
    server.state().publish_items(&[NotificationTemplate::new("paid", "Merci")]);
    let local = Local::seeded();
    let sync = engine(
        SyncConfig::new("eu", EU)
            .with_direction(SyncDirection::Pull)
            .with_conflict_resolution(ConflictResolution::AskUser),
        &server,
        &local,
    );
    sync.set_approval_hook(Arc::new(TrustPeerPrices));

    let result = sync.sync_all().await;

    assert_eq!(result.conflicts.len(), 2);
    assert_eq!(local.stages.get("pro").unwrap().price, 450);
    assert_eq!(local.templates.get("paid").unwrap().unwrap().text, "Thanks");
}

#[tokio::test]
async fn ask_user_without_hook_keeps_local() {
    init_tracing();
    let server = peer(PeerConfig::new("eu"));
    server.state().publish_items(&[PaymentStage::new("pro", "Pro", "Full plan", 450)]);
    let local = Local::seeded();
    let sync = engine(
        SyncConfig::new("eu", EU)
            .with_direction(SyncDirection::Pull)
            .with_conflict_resolution(ConflictResolution::AskUser),
        &server,
        &local,
    );

    let result = sync.sync_all().await;

    assert_eq!(result.conflicts[0].resolution, Some(ConflictResolution::SourceWins));
    assert_eq!(local.stages.get("pro").unwrap().price, 500);
}

#[tokio::test]
async fn malformed_peer_item_marks_pass_partial() {
    init_tracing();
    let server = peer(PeerConfig::new("eu"));
    let mut promos = Snapshot::from_items(&[PromoCode::new("FIRST", DiscountType::Fixed, 100.0)]);
    promos.insert(
        "BROKEN",
        Record::from_pairs([("code", Value::from("BROKEN")), ("discount_value", Value::from(5))]),
    );
    promos.insert("NEVER", PromoCode::new("NEVER", DiscountType::Fixed, 100.0).to_record());
    server.state().publish(EntityKind::PromoCodes, promos);
    server.state().publish_items(&[Setting::new("lang", "de")]);
    let local = Local::new();
    let sync = engine(
        SyncConfig::new("eu", EU).with_direction(SyncDirection::Pull),
        &server,
        &local,
    );

    let result = sync.sync_all().await;

    assert_eq!(result.status, SyncStatus::Partial);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("promo_codes:"));
    // the whole kind is rejected, including items ahead of the bad one
    assert_eq!(result.items_synced_for(EntityKind::PromoCodes), 0);
    assert_eq!(local.promos.len(), 0);
    // later kinds still run
    assert_eq!(result.items_synced_for(EntityKind::Settings), 1);
}

#[tokio::test]
async fn peer_timestamps_stay_conflict_free() {
    init_tracing();
    let server = peer(PeerConfig::new("eu"));
    let mut subscriptions = Snapshot::new();
    subscriptions.insert(
        "7:monthly",
        Record::from_pairs([
            ("user_id", Value::from(7)),
            ("plan_id", Value::from("monthly")),
            ("status", Value::from("active")),
            ("expires_at", Value::from("2026-01-31T12:00:00Z")),
        ]),
    );
    server.state().publish(EntityKind::Subscriptions, subscriptions);
    let local = Local::new();
    let sync = engine(
        SyncConfig::new("eu", EU)
            .with_direction(SyncDirection::Pull)
            .with_conflict_resolution(ConflictResolution::TargetWins),
        &server,
        &local,
    );

    let first = sync.sync_all().await;
    assert_eq!(first.status, SyncStatus::Completed);
    assert_eq!(first.items_synced_for(EntityKind::Subscriptions), 1);

    for _ in 0..2 {
        let again = sync.sync_all().await;
        assert_eq!(again.status, SyncStatus::Completed);
        assert!(again.conflicts.is_empty(), "{:?}", again.conflicts);
        assert_eq!(again.items_synced_for(EntityKind::Subscriptions), 1);
    }

    let stored = local.subscriptions.get(7, "monthly").unwrap().unwrap();
    assert_eq!(
        stored.expires_at.as_ref().map(Timestamp::as_str),
        Some("2026-01-31T12:00:00Z")
    );
}

#[tokio::test]
async fn keyed_object_pull_creates_items() {
    init_tracing();
    let server = peer(PeerConfig::new("eu"));
    let pulled =
        Snapshot::from_json(br#"{"7:m": {"user_id": 7.0, "plan_id": "m", "status": "active"}}"#)
            .unwrap();
    server.state().publish(EntityKind::Subscriptions, pulled);
    let local = Local::new();
    let sync = engine(
        SyncConfig::new("eu", EU).with_direction(SyncDirection::Pull),
        &server,
        &local,
    );

    let result = sync.sync_all().await;

    assert_eq!(result.status, SyncStatus::Completed);
    assert_eq!(result.items_synced_for(EntityKind::Subscriptions), 1);
    let created = local.subscriptions.get(7, "m").unwrap().unwrap();
    assert_eq!(created.identity(), "7:m");

    // a second pass matches the stored item instead of creating another
    sync.sync_all().await;
    assert_eq!(local.subscriptions.len(), 1);
}

#[tokio::test]
async fn shared_tokens_are_checked() {
    init_tracing();
    let server = peer(PeerConfig::new("eu").with_shared_token("fleet-secret"));
    let local = Local::seeded();

    let good = engine(
        SyncConfig::new("eu", EU).with_auth_token("fleet-secret"),
        &server,
        &local,
    );
    assert_eq!(good.sync_all().await.status, SyncStatus::Completed);

    let bad = engine(
        SyncConfig::new("eu", EU).with_auth_token("forged"),
        &server,
        &local,
    );
    let result = bad.sync_all().await;
    assert_eq!(result.status, SyncStatus::Failed);
    assert!(result.errors[0].contains("401"));
}

#[tokio::test]
async fn fleet_isolates_unreachable_peer() {
    init_tracing();
    let router = Arc::new(PeerRouter::new());
    let healthy = peer(PeerConfig::new("b"));
    healthy.state().publish_items(&[Setting::new("currency", "EUR"), Setting::new("lang", "fr")]);
    router.register("b.bots.example", Arc::clone(&healthy));

    let local = Local::new();
    let client = Arc::new(LoopbackClient::new(Arc::clone(&router)));
    let fleet = FleetCoordinator::new(client, local.stores());
    fleet
        .add_peer(SyncConfig::new("a", "https://a.bots.example"))
        .unwrap();
    fleet
        .add_peer(SyncConfig::new("b", "https://b.bots.example"))
        .unwrap();

    let results = fleet.sync_all_peers().await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "a");
    assert_eq!(results[0].1.status, SyncStatus::Failed);
    assert_eq!(results[1].0, "b");
    assert_eq!(results[1].1.status, SyncStatus::Completed);
    assert_eq!(results[1].1.items_synced_for(EntityKind::Settings), 2);
    assert_eq!(local.settings.len(), 2);

    assert_eq!(fleet.peer("a").unwrap().stats().failed, 1);
    assert_eq!(fleet.peer("b").unwrap().stats().completed, 1);
}

#[tokio::test]
async fn fleet_peers_share_local_state() {
    init_tracing();
    let router = Arc::new(PeerRouter::new());
    let a = peer(PeerConfig::new("a"));
    a.state().publish_items(&[NotificationTemplate::new("welcome", "Hi")]);
    let b = peer(PeerConfig::new("b"));
    router.register("a.bots.example", Arc::clone(&a));
    router.register("b.bots.example", Arc::clone(&b));

    let local = Local::new();
    let client = Arc::new(LoopbackClient::new(Arc::clone(&router)));
    let fleet = FleetCoordinator::new(client, local.stores());
    fleet
        .add_peer(SyncConfig::new("a", "https://a.bots.example"))
        .unwrap();
    fleet
        .add_peer(SyncConfig::new("b", "https://b.bots.example"))
        .unwrap();

    fleet.sync_all_peers().await;

    // learned from a, then handed on to b
    assert!(local.templates.get("welcome").unwrap().is_some());
    assert_eq!(b.state().snapshot(EntityKind::Templates).len(), 1);
}

#[tokio::test]
async fn auto_sync_runs_against_peer() {
    init_tracing();
    let server = peer(PeerConfig::new("eu"));
    server.state().publish_items(&[Setting::new("lang", "es")]);
    let local = Local::new();
    let sync = engine(
        SyncConfig::new("eu", EU).with_auto_sync(Duration::from_millis(20)),
        &server,
        &local,
    );

    assert!(sync.start_auto_sync());
    for _ in 0..50 {
        if !sync.history().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(sync.stop_auto_sync().await);

    assert!(!sync.history().is_empty());
    assert_eq!(local.settings.len(), 1);
    assert!(!sync.is_auto_syncing());
}
