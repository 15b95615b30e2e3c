//! Contract Test: Durable Store & Schema Migration
//!
//! Verifies that the durable backend round-trips bindings across a close and
//! reopen, and that opening a legacy-format file consolidates it into the
//! unified layout:
//! - expired legacy reservations are dropped at migration time
//! - expired legacy leases are retained
//! - an unknown stored schema version refuses to open
//!
//! If this test fails, restarts lose or corrupt binding state.

use std::net::Ipv4Addr;

use chrono::{Duration, Utc};
use leasehold_core::{BindingStore, Deadline, DurableBindingStore, Error};
use redb::{Database, TableDefinition};

// the layout written by pre-migration builds
const LEGACY_LEASES: TableDefinition<u32, &[u8]> = TableDefinition::new("leases");
const LEGACY_RESERVATIONS: TableDefinition<u32, &[u8]> = TableDefinition::new("reservations");
const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

fn ip(s: &str) -> Ipv4Addr {
    s.parse().expect("valid test address")
}

fn legacy_blob(expiration_ts: i64, mac: &str, hostname: &str) -> Vec<u8> {
    serde_json::json!({
        "expiration": expiration_ts,
        "created": expiration_ts - 3600,
        "mac": mac,
        "hostname": hostname,
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn bindings_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bindings.redb");
    let expiration = Utc::now() + Duration::hours(4);

    {
        let store = DurableBindingStore::open(&path).await.unwrap();
        store
            .create(ip("192.168.1.50"), "aa:bb:cc:dd:ee:ff", true, expiration, Deadline::none())
            .await
            .unwrap();
    }

    let store = DurableBindingStore::open(&path).await.unwrap();
    let binding = store
        .find_by_address(ip("192.168.1.50"), Deadline::none())
        .await
        .unwrap();
    assert_eq!(binding.client_id, "aa:bb:cc:dd:ee:ff");
    assert!(binding.leased);
    // stored at second resolution
    assert_eq!(binding.expiration.timestamp(), expiration.timestamp());
}

#[tokio::test]
async fn migration_drops_expired_reservations_but_keeps_expired_leases() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bindings.redb");
    let expired = (Utc::now() - Duration::hours(2)).timestamp();

    // craft a version-0 file: no meta record, two legacy tables, one expired
    // entry in each for two different clients
    {
        let db = Database::create(&path).unwrap();
        let txn = db.begin_write().unwrap();
        {
            let mut leases = txn.open_table(LEGACY_LEASES).unwrap();
            leases
                .insert(
                    u32::from(ip("10.1.0.5")),
                    legacy_blob(expired, "AA:00:00:00:00:01", "printer").as_slice(),
                )
                .unwrap();
            let mut reservations = txn.open_table(LEGACY_RESERVATIONS).unwrap();
            reservations
                .insert(
                    u32::from(ip("10.1.0.6")),
                    legacy_blob(expired, "AA:00:00:00:00:02", "laptop").as_slice(),
                )
                .unwrap();
        }
        txn.commit().unwrap();
    }

    let store = DurableBindingStore::open(&path).await.unwrap();

    // exactly the lease survived, keyed by the normalized MAC
    let addresses = store.list_addresses(Deadline::none()).await.unwrap();
    assert_eq!(addresses, vec![ip("10.1.0.5")]);
    let clients = store.list_clients(Deadline::none()).await.unwrap();
    assert_eq!(clients, vec!["aa:00:00:00:00:01".to_string()]);

    let binding = store
        .find_by_address(ip("10.1.0.5"), Deadline::none())
        .await
        .unwrap();
    assert!(binding.leased);
    assert_eq!(binding.expiration.timestamp(), expired);

    assert!(matches!(
        store.find_by_address(ip("10.1.0.6"), Deadline::none()).await,
        Err(Error::AddressNotFound(_))
    ));
}

#[tokio::test]
async fn migration_deduplicates_by_client_keeping_the_latest_expiration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bindings.redb");
    let older = (Utc::now() + Duration::hours(1)).timestamp();
    let newer = (Utc::now() + Duration::hours(8)).timestamp();

    {
        let db = Database::create(&path).unwrap();
        let txn = db.begin_write().unwrap();
        {
            let mut leases = txn.open_table(LEGACY_LEASES).unwrap();
            leases
                .insert(
                    u32::from(ip("10.1.0.5")),
                    legacy_blob(older, "aa:00:00:00:00:01", "nas").as_slice(),
                )
                .unwrap();
            leases
                .insert(
                    u32::from(ip("10.1.0.9")),
                    legacy_blob(newer, "aa:00:00:00:00:01", "nas").as_slice(),
                )
                .unwrap();
        }
        txn.commit().unwrap();
    }

    let store = DurableBindingStore::open(&path).await.unwrap();

    let addresses = store.list_addresses(Deadline::none()).await.unwrap();
    assert_eq!(addresses, vec![ip("10.1.0.9")]);
    let binding = store.find_by_client("aa:00:00:00:00:01", Deadline::none()).await.unwrap();
    assert_eq!(binding.expiration.timestamp(), newer);
}

#[tokio::test]
async fn migration_runs_before_any_domain_operation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bindings.redb");
    let valid = (Utc::now() + Duration::hours(1)).timestamp();

    {
        let db = Database::create(&path).unwrap();
        let txn = db.begin_write().unwrap();
        {
            let mut reservations = txn.open_table(LEGACY_RESERVATIONS).unwrap();
            reservations
                .insert(
                    u32::from(ip("10.1.0.7")),
                    legacy_blob(valid, "aa:00:00:00:00:03", "phone").as_slice(),
                )
                .unwrap();
        }
        txn.commit().unwrap();
    }

    // a still-valid legacy reservation is immediately visible through the
    // unified client index, which only exists after migration
    let store = DurableBindingStore::open(&path).await.unwrap();
    let binding = store
        .find_by_client("aa:00:00:00:00:03", Deadline::none())
        .await
        .unwrap();
    assert_eq!(binding.address, ip("10.1.0.7"));
    assert!(!binding.leased);
}

#[tokio::test]
async fn unknown_schema_version_refuses_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bindings.redb");

    {
        let db = Database::create(&path).unwrap();
        let txn = db.begin_write().unwrap();
        {
            let mut meta = txn.open_table(META).unwrap();
            meta.insert("schema_version", "42").unwrap();
        }
        txn.commit().unwrap();
    }

    let err = DurableBindingStore::open(&path).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedSchema(version) if version == "42"));
}
