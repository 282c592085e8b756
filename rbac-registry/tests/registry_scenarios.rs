//! End-to-end registry scenarios against the in-memory ledger.

use rbac_ledger::{ConditionDetails, HealthStatus, Keypair, MemoryLedger};
use rbac_model::{
    AppRef, AssetPayload, CanLink, EntityKind, EntityState, GroupRef, MetadataPayload, OwnerSet, TypeRef,
};
use rbac_registry::{
    ErrorKind, Registry, RegistryConfig, RegistryContext, RegistryError, UserAction,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct TestFixture {
    ledger: Arc<MemoryLedger>,
    registry: Registry,
    admin: Keypair,
}

impl TestFixture {
    fn new() -> Self {
        Self::with_config(RegistryConfig::default(), [])
    }

    fn with_config<I>(config: RegistryConfig, other_admins: I) -> Self
    where
        I: IntoIterator<Item = rbac_model::PublicKey>,
    {
        let admin = Keypair::generate();
        let ledger = Arc::new(MemoryLedger::new());
        let context = RegistryContext::new(config, admin.clone(), other_admins).unwrap();
        let registry = Registry::new(ledger.clone(), context);
        Self {
            ledger,
            registry,
            admin,
        }
    }

    /// Admin group, app and a "catalogers" type authorized by the group.
    async fn catalog(&self) -> (GroupRef, AppRef, TypeRef) {
        let group = self.registry.bootstrap_admin_group().await.unwrap();
        let app = self.registry.bootstrap_app(&group).await.unwrap();
        let catalogers = self
            .registry
            .create_type("catalogers", &app, &group)
            .await
            .unwrap();
        (group, app, catalogers)
    }
}

fn work(title: &str) -> AssetPayload {
    AssetPayload::empty()
        .with_field("@type", json!("bf:Work"))
        .unwrap()
        .with_field("schema:name", json!(title))
        .unwrap()
}

fn note(text: &str) -> MetadataPayload {
    MetadataPayload::empty()
        .with_field("schema:description", json!(text))
        .unwrap()
}

#[tokio::test]
async fn test_admin_keys_can_instantiate_and_outsiders_cannot() {
    let b = Keypair::generate();
    let c = Keypair::generate();
    let fixture = TestFixture::with_config(RegistryConfig::default(), [b.public_key()]);
    let (_, _, catalogers) = fixture.catalog().await;

    let err = fixture
        .registry
        .create_type_instance("catalogers", &catalogers, work("Moby Dick"), note("c"), &c)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(!err.is_retryable());
    match err {
        RegistryError::Authorization { signer, link, .. } => {
            assert_eq!(signer, Some(c.public_key()));
            assert_eq!(link.as_ref(), Some(catalogers.id()));
        }
        other => panic!("expected authorization error, got {other:?}"),
    }

    let by_admin = fixture
        .registry
        .create_type_instance("catalogers", &catalogers, work("Moby Dick"), note("a"), &fixture.admin)
        .await
        .unwrap();
    let by_b = fixture
        .registry
        .create_type_instance("catalogers", &catalogers, work("Moby Dick"), note("b"), &b)
        .await
        .unwrap();
    assert_ne!(by_admin.id(), by_b.id());
}

#[tokio::test]
async fn test_assigned_user_creates_instances_of_delegated_type() {
    let fixture = TestFixture::new();
    let (_, app, catalogers) = fixture.catalog().await;
    let works = fixture
        .registry
        .create_type("works", &app, &catalogers)
        .await
        .unwrap();

    let alice = Keypair::generate();
    let mallory = Keypair::generate();
    fixture
        .registry
        .create_user(&catalogers, "catalogers", &alice.public_key())
        .await
        .unwrap();

    let instance = fixture
        .registry
        .create_type_instance("works", &works, work("Walden"), note("first edition"), &alice)
        .await
        .unwrap();

    let record = fixture.registry.fetch_asset(instance.id()).await.unwrap();
    assert_eq!(record.kind, EntityKind::TypeInstance);
    assert_eq!(record.link(), Some(works.id()));
    assert_eq!(record.owners, vec![alice.public_key()]);
    assert_eq!(
        record.asset.data().identifier().unwrap().value(),
        "org.library.catalog.works"
    );

    let err = fixture
        .registry
        .create_type_instance("works", &works, work("Walden"), note("forged"), &mallory)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn test_create_user_twice_yields_distinct_records() {
    let fixture = TestFixture::new();
    let (_, _, catalogers) = fixture.catalog().await;
    let alice = Keypair::generate();

    let first = fixture
        .registry
        .create_user(&catalogers, "catalogers", &alice.public_key())
        .await
        .unwrap();
    let second = fixture
        .registry
        .create_user(&catalogers, "catalogers", &alice.public_key())
        .await
        .unwrap();
    assert_ne!(first, second);

    for user in [&first, &second] {
        let record = fixture.registry.fetch_asset(user.id()).await.unwrap();
        assert_eq!(record.kind, EntityKind::User);
        assert_eq!(record.state, EntityState::Transferred);
        assert_eq!(record.owners, vec![alice.public_key()]);
    }
}

#[tokio::test]
async fn test_user_record_carries_provenance() {
    let fixture = TestFixture::new();
    let (_, _, catalogers) = fixture.catalog().await;
    let alice = Keypair::generate();

    let user = fixture
        .registry
        .create_user(&catalogers, "catalogers", &alice.public_key())
        .await
        .unwrap();
    let record = fixture.registry.fetch_asset(user.id()).await.unwrap();

    assert_eq!(
        record.asset.data().field("creator"),
        Some(&json!(fixture.admin.public_key().as_str()))
    );
    assert_eq!(record.link(), Some(catalogers.id()));

    let created = record.metadata.as_ref().unwrap();
    assert_eq!(created.field("schema:name"), Some(&json!(UserAction::Added.as_str())));

    let transfer = record.latest_transaction();
    assert_eq!(
        transfer.metadata().unwrap().field("schema:name"),
        Some(&json!(UserAction::AssignedToGroup.as_str()))
    );
    assert_eq!(transfer.signers(), vec![fixture.admin.public_key()]);
}

#[tokio::test]
async fn test_asset_round_trip() {
    let fixture = TestFixture::new();
    let payload = work("Leaves of Grass")
        .with_field("bf:identifiedBy", json!([{ "@type": "bf:Isbn", "rdf:value": "9780140421996" }]))
        .unwrap();
    let metadata = note("imported");

    let asset = fixture
        .registry
        .create_asset(payload.clone(), Some(metadata.clone()), None, None)
        .await
        .unwrap();

    let record = fixture.registry.fetch_asset(asset.id()).await.unwrap();
    assert_eq!(record.asset, payload);
    assert_eq!(record.metadata, Some(metadata));
    assert_eq!(record.kind, EntityKind::Asset);
    assert_eq!(record.owners, vec![fixture.admin.public_key()]);
}

#[tokio::test]
async fn test_co_owned_asset() {
    let fixture = TestFixture::new();
    let alice = Keypair::generate();
    let bob = Keypair::generate();
    let owners = OwnerSet::new([alice.public_key(), bob.public_key()]).unwrap();

    let asset = fixture
        .registry
        .create_asset(work("Shared"), None, Some(&alice), Some(owners))
        .await
        .unwrap();

    let record = fixture.registry.fetch_asset(asset.id()).await.unwrap();
    assert_eq!(record.owners, vec![alice.public_key(), bob.public_key()]);
    let output = &record.latest_transaction().outputs()[0];
    assert!(matches!(
        output.condition.details,
        ConditionDetails::Threshold { threshold: 2, .. }
    ));
    assert_eq!(record.latest_transaction().signers(), vec![alice.public_key()]);
}

#[tokio::test]
async fn test_single_owner_set_is_explicit_recipient() {
    let fixture = TestFixture::new();
    let alice = Keypair::generate();

    let asset = fixture
        .registry
        .create_asset(work("Gift"), None, None, Some(OwnerSet::single(alice.public_key())))
        .await
        .unwrap();

    let record = fixture.registry.fetch_asset(asset.id()).await.unwrap();
    assert_eq!(record.owners, vec![alice.public_key()]);
    assert_eq!(record.latest_transaction().signers(), vec![fixture.admin.public_key()]);
}

#[tokio::test]
async fn test_authorized_type_follows_two_links() {
    let fixture = TestFixture::new();
    let (_, app, catalogers) = fixture.catalog().await;
    let k = Keypair::generate();

    let user = fixture
        .registry
        .create_user(&catalogers, "catalogers", &k.public_key())
        .await
        .unwrap();

    let membership = fixture.registry.authorized_type(&k.public_key()).await.unwrap();
    assert_eq!(membership.user, user);
    assert_eq!(membership.type_ref(), Some(catalogers.clone()));
    assert!(!membership.is_admin());
    assert_eq!(membership.type_name(), Some("catalogers"));
    assert_eq!(membership.hops(), 2);

    let anchor = membership.anchor.as_ref().unwrap();
    assert_eq!(anchor.kind, EntityKind::App);
    assert_eq!(&anchor.id, app.id());
    assert_eq!(
        membership.path(),
        vec![user.id().clone(), catalogers.id().clone(), app.id().clone()]
    );
}

#[tokio::test]
async fn test_authorized_type_for_admin_group_user() {
    let fixture = TestFixture::new();
    let (group, _, _) = fixture.catalog().await;
    let k = Keypair::generate();

    let user = fixture
        .registry
        .create_user(&group, "admins", &k.public_key())
        .await
        .unwrap();

    let membership = fixture.registry.authorized_type(&k.public_key()).await.unwrap();
    assert_eq!(membership.user, user);
    assert!(membership.is_admin());
    assert_eq!(&membership.role.id, group.id());
    assert_eq!(membership.type_ref(), None);
    assert!(membership.anchor.is_none());
    assert_eq!(membership.hops(), 1);
}

#[tokio::test]
async fn test_authorized_type_reports_user_without_type() {
    let fixture = TestFixture::new();
    let shelf = fixture
        .registry
        .create_asset(work("Shelf"), None, None, None)
        .await
        .unwrap();
    let k = Keypair::generate();

    let user = fixture
        .registry
        .create_user(&shelf, "readers", &k.public_key())
        .await
        .unwrap();

    let err = fixture
        .registry
        .authorized_type(&k.public_key())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let message = err.to_string();
    assert!(message.contains("not linked to a type"), "got {message}");
    assert!(message.contains(user.id().as_str()));
}

#[tokio::test]
async fn test_authorized_type_unknown_key() {
    let fixture = TestFixture::new();
    fixture.catalog().await;

    let err = fixture
        .registry
        .authorized_type(&Keypair::generate().public_key())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_partial_user_creation_can_be_completed() {
    let fixture = TestFixture::new();
    let (_, _, catalogers) = fixture.catalog().await;
    let alice = Keypair::generate();

    fixture.ledger.fail_next_transfers(1);
    let err = fixture
        .registry
        .create_user(&catalogers, "catalogers", &alice.public_key())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PartialFailure);
    assert!(err.is_recoverable());
    let user = err.created_user().cloned().unwrap();

    let stranded = fixture.registry.fetch_asset(user.id()).await.unwrap();
    assert_eq!(stranded.state, EntityState::Created);
    assert_eq!(stranded.owners, vec![fixture.admin.public_key()]);
    assert!(fixture.registry.authorized_type(&alice.public_key()).await.is_err());

    let completed = fixture
        .registry
        .complete_user_transfer(&user, "catalogers", &alice.public_key())
        .await
        .unwrap();
    assert_eq!(completed, user);

    let record = fixture.registry.fetch_asset(user.id()).await.unwrap();
    assert_eq!(record.state, EntityState::Transferred);
    assert_eq!(record.owners, vec![alice.public_key()]);

    let membership = fixture.registry.authorized_type(&alice.public_key()).await.unwrap();
    assert_eq!(membership.user, user);

    let again = fixture
        .registry
        .complete_user_transfer(&user, "catalogers", &alice.public_key())
        .await
        .unwrap_err();
    assert_eq!(again.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_complete_transfer_rejects_non_users() {
    let fixture = TestFixture::new();
    let asset = fixture
        .registry
        .create_asset(work("Not a user"), None, None, None)
        .await
        .unwrap();

    let err = fixture
        .registry
        .complete_user_transfer(
            &rbac_model::UserRef::new(asset.id().clone()),
            "catalogers",
            &Keypair::generate().public_key(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_slow_ledger_times_out() {
    let config = RegistryConfig {
        call_timeout_ms: 50,
        ..RegistryConfig::default()
    };
    let fixture = TestFixture::with_config(config, []);
    fixture.ledger.set_delay(Duration::from_millis(500));

    let err = fixture
        .registry
        .create_asset(work("Slow"), None, None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::Timeout { after, .. } if after == Duration::from_millis(50)));
    assert_eq!(err.kind(), ErrorKind::Connectivity);
    assert_eq!(err.error_code(), "LEDGER_TIMEOUT");
    assert_eq!(fixture.ledger.commit_count(), 0);
}

#[tokio::test]
async fn test_unreachable_ledger_is_connectivity() {
    let fixture = TestFixture::new();
    fixture.ledger.set_unavailable(true);

    let err = fixture.registry.bootstrap_admin_group().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connectivity);
    assert!(err.is_retryable());
    assert_eq!(err.error_code(), "LEDGER_UNREACHABLE");
}

#[tokio::test]
async fn test_duplicate_group_and_type_rejected() {
    let fixture = TestFixture::new();
    let (group, app, catalogers) = fixture.catalog().await;
    let commits = fixture.ledger.commit_count();

    let err = fixture.registry.bootstrap_admin_group().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = fixture
        .registry
        .create_type("catalogers", &app, &group)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(fixture.ledger.commit_count(), commits);

    // Same name under another parent is a different type.
    fixture
        .registry
        .create_type("catalogers", &catalogers, &group)
        .await
        .unwrap();
    assert_eq!(fixture.ledger.commit_count(), commits + 1);
}

#[tokio::test]
async fn test_duplicate_type_found_behind_many_instances() {
    let fixture = TestFixture::new();
    let (group, app, catalogers) = fixture.catalog().await;
    let works = fixture
        .registry
        .create_type("works", &app, &group)
        .await
        .unwrap();
    for i in 0..60 {
        fixture
            .registry
            .create_type_instance("works", &works, work(&format!("Work {i}")), note("bulk"), &fixture.admin)
            .await
            .unwrap();
    }

    fixture
        .registry
        .create_type("works", &catalogers, &group)
        .await
        .unwrap();
    let commits = fixture.ledger.commit_count();

    let err = fixture
        .registry
        .create_type("works", &catalogers, &catalogers)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("already exists"));
    assert_eq!(fixture.ledger.commit_count(), commits);
}

#[tokio::test]
async fn test_ledger_rejects_identical_group_without_search() {
    let config = RegistryConfig {
        reject_duplicates: false,
        ..RegistryConfig::default()
    };
    let fixture = TestFixture::with_config(config, []);

    let first = fixture.registry.bootstrap_admin_group().await.unwrap();
    let second = fixture.registry.bootstrap_admin_group().await;
    assert_eq!(second.unwrap_err().kind(), ErrorKind::Validation);
    assert!(fixture.registry.fetch_asset(first.id()).await.is_ok());
}

#[tokio::test]
async fn test_bootstrap_app_requires_admin_group() {
    let fixture = TestFixture::new();
    let asset = fixture
        .registry
        .create_asset(work("Impostor"), None, None, None)
        .await
        .unwrap();

    let err = fixture
        .registry
        .bootstrap_app(&GroupRef::new(asset.id().clone()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_instance_metadata_cannot_carry_can_link() {
    let fixture = TestFixture::new();
    let (group, _, catalogers) = fixture.catalog().await;
    let commits = fixture.ledger.commit_count();

    let metadata = note("sneaky").with_can_link(CanLink::to(&group));
    let err = fixture
        .registry
        .create_type_instance("catalogers", &catalogers, work("Leaf"), metadata, &fixture.admin)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(fixture.ledger.commit_count(), commits);
}

#[tokio::test]
async fn test_type_cannot_hang_under_instance() {
    let fixture = TestFixture::new();
    let (group, _, catalogers) = fixture.catalog().await;
    let instance = fixture
        .registry
        .create_type_instance("catalogers", &catalogers, work("Leaf"), note("x"), &fixture.admin)
        .await
        .unwrap();

    let err = fixture
        .registry
        .create_type("chapters", &instance, &group)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_load_hierarchy() {
    let fixture = TestFixture::new();
    let (group, _, catalogers) = fixture.catalog().await;
    let alice = Keypair::generate();
    let user = fixture
        .registry
        .create_user(&catalogers, "catalogers", &alice.public_key())
        .await
        .unwrap();

    let hierarchy = fixture
        .registry
        .load_hierarchy(&[user.id().clone(), group.id().clone()])
        .await
        .unwrap();

    assert_eq!(hierarchy.len(), 4);
    assert!(hierarchy.orphans().is_empty());
    assert_eq!(hierarchy.ancestors(user.id()).len(), 2);
    assert!(hierarchy.is_member(catalogers.id(), &alice.public_key()));
    assert!(hierarchy.is_member(group.id(), &fixture.admin.public_key()));
    assert!(!hierarchy.is_member(group.id(), &alice.public_key()));
}

#[tokio::test]
async fn test_ledger_health() {
    let fixture = TestFixture::new();
    assert_eq!(fixture.registry.ledger_health().await.status, HealthStatus::Healthy);

    fixture.ledger.set_unavailable(true);
    let health = fixture.registry.ledger_health().await;
    assert_eq!(health.status, HealthStatus::Unhealthy);
    assert!(health.error.is_some());
}
