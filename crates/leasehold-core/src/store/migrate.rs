//! Schema migrations for the durable store
//!
//! Each migration is a single step from one stored version to the next,
//! applied inside the caller's write transaction; the chain repeats until
//! [`SCHEMA_VERSION`] is reached. An unknown version with no registered step
//! fails with [`Error::UnsupportedSchema`], which is fatal to opening the
//! store. Keeping every step self-contained means future migrations are
//! additive and never touch earlier ones.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::{DateTime, Utc};
use redb::{ReadableTable, TableDefinition, WriteTransaction};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::tables::{
    BINDINGS, CLIENTS, LEGACY_LEASES, LEGACY_RESERVATIONS, META, SCHEMA_VERSION,
    SCHEMA_VERSION_KEY, StoredBinding,
};
use crate::error::{Error, Result};

/// One migration step: consumes the layout of its source version, returns the
/// version it migrated to
type Migration = fn(&WriteTransaction) -> Result<String>;

fn registry() -> HashMap<&'static str, Migration> {
    let mut steps: HashMap<&'static str, Migration> = HashMap::new();
    steps.insert("0", migrate_v0_to_v1);
    steps
}

/// Bring the store at `txn` up to the current schema version
///
/// A file with no stored version is treated as version 0; a fresh file walks
/// the same chain over empty legacy tables.
pub(crate) fn run(txn: &WriteTransaction) -> Result<()> {
    let steps = registry();
    let mut version = read_version(txn)?;
    while version != SCHEMA_VERSION {
        let Some(step) = steps.get(version.as_str()) else {
            return Err(Error::UnsupportedSchema(version));
        };
        info!(from = %version, "migrating binding store schema");
        version = step(txn)?;
        write_version(txn, &version)?;
    }

    // every current table must exist before the first reader arrives
    txn.open_table(BINDINGS)?;
    txn.open_table(CLIENTS)?;
    Ok(())
}

fn read_version(txn: &WriteTransaction) -> Result<String> {
    let meta = txn.open_table(META)?;
    Ok(meta
        .get(SCHEMA_VERSION_KEY)?
        .map(|guard| guard.value().to_string())
        .unwrap_or_else(|| "0".to_string()))
}

fn write_version(txn: &WriteTransaction, version: &str) -> Result<()> {
    let mut meta = txn.open_table(META)?;
    meta.insert(SCHEMA_VERSION_KEY, version)?;
    Ok(())
}

/// Value column of the legacy tables
#[derive(Debug, Deserialize)]
struct LegacyRecord {
    #[serde(with = "chrono::serde::ts_seconds")]
    expiration: DateTime<Utc>,
    mac: String,
}

/// Candidate row for the unified layout, keyed by derived client id
struct Survivor {
    address: u32,
    expiration: DateTime<Utc>,
    leased: bool,
}

/// Consolidate the legacy two-table layout into the unified one
///
/// Reservations already expired at migration time are dropped; leases keep
/// their row regardless of expiry. Entries are deduplicated per derived
/// client id, keeping the latest expiration (a lease wins a tie). The legacy
/// tables are deleted afterwards, all inside the same transaction.
fn migrate_v0_to_v1(txn: &WriteTransaction) -> Result<String> {
    let now = Utc::now();
    let mut survivors: HashMap<String, Survivor> = HashMap::new();

    collect_legacy(txn, LEGACY_RESERVATIONS, false, now, &mut survivors)?;
    collect_legacy(txn, LEGACY_LEASES, true, now, &mut survivors)?;

    {
        let mut bindings = txn.open_table(BINDINGS)?;
        let mut clients = txn.open_table(CLIENTS)?;
        for (client_id, survivor) in &survivors {
            if bindings.get(survivor.address)?.is_some() {
                warn!(
                    address = %std::net::Ipv4Addr::from(survivor.address),
                    client = %client_id,
                    "address already migrated for another client, dropping entry"
                );
                continue;
            }
            let blob = serde_json::to_vec(&StoredBinding {
                expiration: survivor.expiration,
                client_id: client_id.clone(),
                leased: survivor.leased,
            })?;
            bindings.insert(survivor.address, blob.as_slice())?;
            clients.insert(client_id.as_str(), survivor.address)?;
        }
    }

    txn.delete_table(LEGACY_LEASES)?;
    txn.delete_table(LEGACY_RESERVATIONS)?;

    info!(migrated = survivors.len(), "legacy layout consolidated");
    Ok("1".to_string())
}

fn collect_legacy(
    txn: &WriteTransaction,
    table: TableDefinition<u32, &[u8]>,
    leased: bool,
    now: DateTime<Utc>,
    survivors: &mut HashMap<String, Survivor>,
) -> Result<()> {
    let table = txn.open_table(table)?;
    for entry in table.iter()? {
        let (address, blob) = entry?;
        let address = address.value();
        let record: LegacyRecord = match serde_json::from_slice(blob.value()) {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    address = %std::net::Ipv4Addr::from(address),
                    error = %err,
                    "skipping unreadable legacy record"
                );
                continue;
            }
        };

        // a stale soft hold is not worth carrying forward
        if !leased && record.expiration <= now {
            debug!(
                address = %std::net::Ipv4Addr::from(address),
                "dropping expired legacy reservation"
            );
            continue;
        }

        let client_id = record.mac.trim().to_ascii_lowercase();
        let candidate = Survivor {
            address,
            expiration: record.expiration,
            leased,
        };
        match survivors.entry(client_id) {
            Entry::Occupied(mut current) => {
                let kept = current.get();
                let replaces = candidate.expiration > kept.expiration
                    || (candidate.expiration == kept.expiration && leased && !kept.leased);
                if replaces {
                    current.insert(candidate);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(candidate);
            }
        }
    }
    Ok(())
}
