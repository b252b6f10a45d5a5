//! End-to-end conformance tests for the tiered store.
//!
//! Most tests drive a `[remote, local, memory]` chain of in-memory
//! [`FaultyTier`]s from [`faulty_chain`], taking tiers down between
//! operations. The `remote_backed_*` tests run the real HTTP remote tier
//! against [`MockRemote`] with an in-memory SQLite local tier.
//!
//! # Coverage
//!
//! | Test | Property |
//! |------|----------|
//! | `healthy_create_is_read_back_from_primary` | writes land in the strongest tier |
//! | `primary_create_failure_falls_through` | create cascades on outage |
//! | `all_tiers_down_create_fails_and_stores_nothing` | aggregate failure |
//! | `every_tier_refusing_create_fails_and_stores_nothing` | aggregate failure in the cascade |
//! | `every_tier_refusing_keyless_create_fails` | aggregate failure without a key |
//! | `primary_conflict_does_not_cascade` | conflicts are definitive |
//! | `duplicate_key_on_primary_fails_while_weaker_tiers_are_healthy` | conflicts are definitive |
//! | `duplicate_key_is_rejected_before_any_write` | natural-key uniqueness |
//! | `listing_is_idempotent` | merged listing is stable |
//! | `merged_listing_prefers_stronger_tier` | reconciliation order |
//! | `patch_reaches_record_only_in_weakest_tier` | patch finds any holder |
//! | `degraded_create_read_patch` | remote outage scenario |
//! | `reachability_follows_outcomes` | tier health tracking |
//! | `delete_every_tier_removes_all_copies` | delete scope |
//! | `aggregate_falls_back_to_next_listing_tier` | authoritative aggregation |
//! | `remote_backed_outage_and_recovery` | real HTTP remote tier |
//! | `remote_backed_expense_summary` | facade in degraded mode |

use std::sync::Arc;
use std::time::Duration;

use carledger::{
    Entity, ExpenseCategory, ExpenseEntry, MergePatch, UserRecord, UserType, Vehicle,
};
use carledger_conformance::{faulty_chain, FaultyTier, MockRemote};
use carledger_storage::{
    DeleteScope, Durability, Lookup, MemoryTier, Records, RemoteClient, RemoteTier, SqliteTier,
    StorageError, TierChain,
};
use chrono::NaiveDate;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn user(email: &str) -> UserRecord {
    UserRecord::new(email, "Conformance User", "argon2-hash")
}

async fn stored<T: Entity>(tier: &FaultyTier<T>) -> Vec<T> {
    tier.inner().list_all().await.unwrap()
}

fn remote_backed_chain<T: Entity>(mock: &MockRemote) -> TierChain<T> {
    let client = RemoteClient::new(mock.base_url(), None, Duration::from_secs(5)).unwrap();
    TierChain::<T>::new()
        .with_tier(Durability::DurableRemote, Arc::new(RemoteTier::<T>::new(client)))
        .with_tier(
            Durability::DurableLocal,
            Arc::new(SqliteTier::<T>::open_in_memory().unwrap()),
        )
        .with_tier(Durability::VolatileMemory, Arc::new(MemoryTier::<T>::new()))
}

async fn remote_backed_records() -> (MockRemote, Records) {
    let mock = MockRemote::spawn(&[("users", "email"), ("vehicles", "license_plate")]).await;
    let records = Records::new(
        remote_backed_chain(&mock),
        remote_backed_chain(&mock),
        remote_backed_chain(&mock),
    );
    (mock, records)
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn healthy_create_is_read_back_from_primary() {
    let f = faulty_chain::<UserRecord>();

    let written = f.chain.create(&user("first@example.com")).await.unwrap();
    assert_eq!(written.source, Durability::DurableRemote);
    assert_eq!(
        written.replicas,
        vec![Durability::DurableLocal, Durability::VolatileMemory]
    );
    assert!(!written.degraded);
    assert!(written.warnings.is_empty());

    let found = f
        .chain
        .read(&Lookup::id(&written.record.id))
        .await
        .unwrap()
        .expect("record is readable");
    assert_eq!(found.served_by, Durability::DurableRemote);
    assert_eq!(found.record, written.record);
}

#[tokio::test]
async fn primary_create_failure_falls_through() {
    let f = faulty_chain::<UserRecord>();
    f.remote.fail_creates(true);

    let written = f.chain.create(&user("cascade@example.com")).await.unwrap();
    assert_eq!(written.source, Durability::DurableLocal);
    assert_eq!(written.replicas, vec![Durability::VolatileMemory]);
    assert!(written.degraded);
    assert_eq!(written.warnings.len(), 1);
    assert_eq!(written.warnings[0].tier, Durability::DurableRemote);

    assert!(stored(&f.remote).await.is_empty());
    assert_eq!(stored(&f.local).await.len(), 1);
    assert_eq!(stored(&f.memory).await.len(), 1);
}

#[tokio::test]
async fn all_tiers_down_create_fails_and_stores_nothing() {
    let f = faulty_chain::<UserRecord>();
    for tier in [&f.remote, &f.local, &f.memory] {
        tier.set_down(true);
    }

    let err = f.chain.create(&user("nowhere@example.com")).await.unwrap_err();
    match err {
        StorageError::AllTiersFailed(failures) => {
            let tiers: Vec<_> = failures.iter().map(|f| f.tier).collect();
            assert_eq!(
                tiers,
                vec![
                    Durability::DurableRemote,
                    Durability::DurableLocal,
                    Durability::VolatileMemory
                ]
            );
        }
        other => panic!("expected AllTiersFailed, got {other:?}"),
    }

    for tier in [&f.remote, &f.local, &f.memory] {
        assert!(tier.calls() > 0);
        assert!(stored(tier).await.is_empty());
    }
}

#[tokio::test]
async fn every_tier_refusing_create_fails_and_stores_nothing() {
    let f = faulty_chain::<UserRecord>();
    for tier in [&f.remote, &f.local, &f.memory] {
        tier.fail_creates(true);
    }

    // Lookups still answer, so the failure comes from the create cascade.
    let err = f.chain.create(&user("refused@example.com")).await.unwrap_err();
    match err {
        StorageError::AllTiersFailed(failures) => {
            assert_eq!(failures.len(), 3);
            assert!(failures
                .iter()
                .all(|f| f.reason.contains("injected create failure")));
        }
        other => panic!("expected AllTiersFailed, got {other:?}"),
    }

    for tier in [&f.remote, &f.local, &f.memory] {
        assert!(stored(tier).await.is_empty());
    }
}

#[tokio::test]
async fn every_tier_refusing_keyless_create_fails() {
    let f = faulty_chain::<ExpenseEntry>();
    for tier in [&f.remote, &f.local, &f.memory] {
        tier.fail_creates(true);
    }

    let day = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
    let entry = ExpenseEntry::new("u1", "c1", ExpenseCategory::Parking, 800, day);
    let err = f.chain.create(&entry).await.unwrap_err();
    assert!(
        matches!(&err, StorageError::AllTiersFailed(failures) if failures.len() == 3),
        "got {err:?}"
    );

    for tier in [&f.remote, &f.local, &f.memory] {
        assert!(stored(tier).await.is_empty());
    }
}

#[tokio::test]
async fn primary_conflict_does_not_cascade() {
    let f = faulty_chain::<UserRecord>();
    f.remote.reject_creates(true);

    let err = f.chain.create(&user("strict@example.com")).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)), "got {err:?}");

    assert!(stored(&f.local).await.is_empty());
    assert!(stored(&f.memory).await.is_empty());
}

#[tokio::test]
async fn duplicate_key_on_primary_fails_while_weaker_tiers_are_healthy() {
    let f = faulty_chain::<UserRecord>();
    f.remote
        .inner()
        .create(&user("owner@example.com"))
        .await
        .unwrap();

    let err = f.chain.create(&user("owner@example.com")).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)), "got {err:?}");
    assert!(stored(&f.local).await.is_empty());
    assert!(stored(&f.memory).await.is_empty());
}

#[tokio::test]
async fn duplicate_key_is_rejected_before_any_write() {
    let f = faulty_chain::<UserRecord>();
    // Only the weakest tier knows the address.
    f.memory
        .inner()
        .create(&user("taken@example.com"))
        .await
        .unwrap();

    let err = f.chain.create(&user("Taken@Example.com")).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)), "got {err:?}");
    assert!(stored(&f.remote).await.is_empty());
    assert!(stored(&f.local).await.is_empty());
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

#[tokio::test]
async fn listing_is_idempotent() {
    let f = faulty_chain::<UserRecord>();
    f.chain.create(&user("one@example.com")).await.unwrap();
    f.remote.set_down(true);
    f.chain.create(&user("two@example.com")).await.unwrap();
    f.remote.set_down(false);

    let first = f.chain.list_merged().await.unwrap();
    let second = f.chain.list_merged().await.unwrap();

    let ids = |list: &carledger_storage::MergedList<UserRecord>| -> Vec<String> {
        list.items.iter().map(|u| u.id.clone()).collect()
    };
    assert_eq!(first.items.len(), 2);
    assert_eq!(ids(&first), ids(&second));
}

#[tokio::test]
async fn merged_listing_prefers_stronger_tier() {
    let f = faulty_chain::<UserRecord>();

    let mut strong = user("shared@example.com");
    strong.name = "From Remote".into();
    let mut weak = strong.clone();
    weak.name = "From Memory".into();
    f.remote.inner().create(&strong).await.unwrap();
    f.memory.inner().create(&weak).await.unwrap();

    // Same address, different id: a split-brain duplicate.
    let mut stray = user("shared@example.com");
    stray.name = "Stray Local".into();
    f.local.inner().create(&stray).await.unwrap();

    let merged = f.chain.list_merged().await.unwrap();
    assert_eq!(merged.items.len(), 1);
    assert_eq!(merged.items[0].name, "From Remote");

    assert_eq!(merged.collisions.len(), 1);
    let collision = &merged.collisions[0];
    assert_eq!(collision.kept_id, strong.id);
    assert_eq!(collision.kept_from, Durability::DurableRemote);
    assert_eq!(collision.shadowed_id, stray.id);
    assert_eq!(collision.shadowed_from, Durability::DurableLocal);
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn patch_reaches_record_only_in_weakest_tier() {
    let f = faulty_chain::<UserRecord>();
    let only = user("volatile@example.com");
    f.memory.inner().create(&only).await.unwrap();

    let patched = f
        .chain
        .patch(&Lookup::id(&only.id), &MergePatch::new().set("name", "Renamed"))
        .await
        .unwrap()
        .expect("record is patched");
    assert_eq!(patched.source, Durability::VolatileMemory);
    assert!(patched.replicas.is_empty());
    assert_eq!(patched.record.name, "Renamed");

    // A patch never creates copies.
    assert!(stored(&f.remote).await.is_empty());
    assert!(stored(&f.local).await.is_empty());
}

#[tokio::test]
async fn degraded_create_read_patch() {
    let f = faulty_chain::<UserRecord>();
    f.remote.set_down(true);

    let written = f.chain.create(&user("a@b.com")).await.unwrap();
    assert_eq!(written.source, Durability::DurableLocal);
    assert_eq!(written.warnings.len(), 1);
    assert_eq!(written.warnings[0].tier, Durability::DurableRemote);

    let found = f
        .chain
        .read(&Lookup::key("a@b.com"))
        .await
        .unwrap()
        .expect("user is readable");
    assert_eq!(found.served_by, Durability::DurableLocal);
    assert_eq!(found.record.id, written.record.id);

    let patched = f
        .chain
        .patch(
            &Lookup::id(&written.record.id),
            &MergePatch::new().set("user_type", "ADMIN"),
        )
        .await
        .unwrap()
        .expect("user is patched");
    assert_eq!(patched.source, Durability::DurableLocal);
    assert_eq!(patched.replicas, vec![Durability::VolatileMemory]);
    assert_eq!(patched.record.user_type, UserType::Admin);
    assert_eq!(patched.warnings.len(), 1);
    assert_eq!(patched.warnings[0].tier, Durability::DurableRemote);

    let replica = f
        .memory
        .inner()
        .find_by_id(&written.record.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replica.user_type, UserType::Admin);
}

// ---------------------------------------------------------------------------
// Health, delete, aggregate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reachability_follows_outcomes() {
    let f = faulty_chain::<UserRecord>();
    f.remote.set_down(true);
    f.chain.create(&user("health@example.com")).await.unwrap();

    let status = f.chain.status();
    assert_eq!(status[0].tier, Durability::DurableRemote);
    assert!(!status[0].reachable);
    assert!(status[1].reachable);

    f.remote.set_down(false);
    let probed = f.chain.probe().await;
    assert!(probed.iter().all(|s| s.reachable));
}

#[tokio::test]
async fn delete_every_tier_removes_all_copies() {
    let f = faulty_chain::<UserRecord>();
    let written = f.chain.create(&user("gone@example.com")).await.unwrap();

    let deleted = f
        .chain
        .delete(&Lookup::id(&written.record.id), DeleteScope::EveryTier)
        .await
        .unwrap()
        .expect("record existed");
    assert_eq!(deleted.deleted_from.len(), 3);

    let after = f.chain.read(&Lookup::id(&written.record.id)).await.unwrap();
    assert!(after.is_none());
}

#[tokio::test]
async fn aggregate_falls_back_to_next_listing_tier() {
    let f = faulty_chain::<ExpenseEntry>();
    let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
    let entry = |amount| ExpenseEntry::new("u1", "c1", ExpenseCategory::Fuel, amount, day);

    f.chain.create(&entry(1_000)).await.unwrap();
    // Only the local tier sees this one.
    f.local.inner().create(&entry(500)).await.unwrap();

    let healthy = f
        .chain
        .aggregate(|all| all.iter().map(|e| e.amount_cents).sum::<i64>())
        .await
        .unwrap();
    assert_eq!(healthy.served_by, Durability::DurableRemote);
    assert_eq!(healthy.value, 1_000);

    f.remote.set_down(true);
    let degraded = f
        .chain
        .aggregate(|all| all.iter().map(|e| e.amount_cents).sum::<i64>())
        .await
        .unwrap();
    assert_eq!(degraded.served_by, Durability::DurableLocal);
    assert_eq!(degraded.value, 1_500);
    assert_eq!(degraded.warnings.len(), 1);
}

// ---------------------------------------------------------------------------
// Real remote tier
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remote_backed_outage_and_recovery() {
    let (mock, records) = remote_backed_records().await;

    let first = records
        .register_user(&user("online@example.com"))
        .await
        .unwrap();
    assert_eq!(first.source, Durability::DurableRemote);
    assert_eq!(mock.rows("users").len(), 1);

    mock.set_down(true);
    let second = records
        .register_user(&user("offline@example.com"))
        .await
        .unwrap();
    assert_eq!(second.source, Durability::DurableLocal);
    assert_eq!(second.warnings[0].tier, Durability::DurableRemote);

    let listed = records.list_users().await.unwrap();
    assert_eq!(listed.items.len(), 2);
    assert_eq!(listed.warnings.len(), 1);

    mock.set_down(false);
    let back = records
        .user_by_email("ONLINE@example.com")
        .await
        .unwrap()
        .expect("remote user is readable");
    assert_eq!(back.served_by, Durability::DurableRemote);

    let local_only = records
        .user_by_id(&second.record.id)
        .await
        .unwrap()
        .expect("degraded user is readable");
    assert_eq!(local_only.served_by, Durability::DurableLocal);
}

#[tokio::test]
async fn remote_backed_expense_summary() {
    let (mock, records) = remote_backed_records().await;

    let owner = records
        .register_user(&user("driver@example.com"))
        .await
        .unwrap()
        .record;
    let car = records
        .add_vehicle(&Vehicle::new(&owner.id, "AB123CD", "Toyota", "Corolla"))
        .await
        .unwrap()
        .record;

    mock.set_down(true);
    let day = NaiveDate::from_ymd_opt(2026, 5, 20).unwrap();
    let service = ExpenseEntry::new(&owner.id, &car.id, ExpenseCategory::Maintenance, 12_000, day);
    let written = records.add_expense(&service).await.unwrap();
    assert_eq!(written.source, Durability::DurableLocal);

    let summary = records.expense_summary(&owner.id, None).await.unwrap();
    assert_eq!(summary.served_by, Durability::DurableLocal);
    assert_eq!(summary.value.total_cents, 12_000);
    assert_eq!(summary.value.count, 1);

    // The running total was adjusted in the tiers that answered.
    let vehicle = records
        .vehicle_by_plate("ab123cd")
        .await
        .unwrap()
        .expect("vehicle is readable");
    assert_eq!(vehicle.served_by, Durability::DurableLocal);
    assert_eq!(vehicle.record.maintenance_total_cents, 12_000);
}
