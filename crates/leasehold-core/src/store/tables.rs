//! redb table definitions and blob formats for the durable store
//!
//! The unified layout (schema version 1) keeps two associative tables plus a
//! metadata record, all in one transactional file:
//! - `bindings`: address (u32) → JSON binding blob
//! - `clients`: client id → address (the reverse index)
//! - `meta`: holds the schema-version string
//!
//! The address is the table key and is not duplicated inside the blob.

use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};

pub(crate) const BINDINGS: TableDefinition<u32, &[u8]> = TableDefinition::new("bindings");
pub(crate) const CLIENTS: TableDefinition<&str, u32> = TableDefinition::new("clients");
pub(crate) const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

pub(crate) const SCHEMA_VERSION_KEY: &str = "schema_version";

/// The on-disk layout revision this build reads and writes
pub(crate) const SCHEMA_VERSION: &str = "1";

// Legacy (version 0) layout: separate lease and reservation tables, each
// keyed by address, the MAC carried inside the value, no client index.
pub(crate) const LEGACY_LEASES: TableDefinition<u32, &[u8]> = TableDefinition::new("leases");
pub(crate) const LEGACY_RESERVATIONS: TableDefinition<u32, &[u8]> =
    TableDefinition::new("reservations");

/// Value column of the `bindings` table
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoredBinding {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expiration: DateTime<Utc>,
    pub client_id: String,
    pub leased: bool,
}
