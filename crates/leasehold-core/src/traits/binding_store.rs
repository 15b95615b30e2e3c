// # Binding Store Trait
//
// Defines the persistence contract for address↔client bindings.
//
// ## Purpose
//
// A binding store answers one question: which client owns which address, and
// until when. It enforces two uniqueness invariants regardless of backend:
// - at most one binding per address
// - at most one binding per client
//
// The two are maintained jointly by a reverse index from client id to
// address beside the primary index from address to binding.
//
// ## Implementations
//
// - Memory: concurrent map-based store, no durability
// - Durable: transactional on-disk store with schema migrations
//
// ## Concurrency
//
// Create/Update/Delete must each be atomic with respect to both indices. A
// crash or error mid-operation must never leave the reverse index
// disagreeing with the primary one. All operations take a [`Deadline`] and
// must abort the wait rather than block past it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::deadline::Deadline;
use crate::error::Result;

/// One persisted address↔client binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// The bound IPv4 address
    pub address: Ipv4Addr,

    /// Identity of the owning client
    pub client_id: String,

    /// `false` is a reservation (soft hold), `true` a committed lease
    pub leased: bool,

    /// When the binding stops being valid; evaluated lazily by callers
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expiration: DateTime<Utc>,
}

impl Binding {
    /// Whether the binding has expired as of `now`
    ///
    /// An expired binding is still physically present until the next
    /// operation touching its address acts on the expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }
}

/// Trait for binding store implementations
///
/// All methods must be safe to call concurrently from multiple tasks, and
/// mutations on one store instance observe a total order consistent with a
/// single exclusive writer at a time.
#[async_trait]
pub trait BindingStore: Send + Sync {
    /// Store a new binding and update both indices atomically
    ///
    /// # Errors
    ///
    /// - `DuplicateAddress`: the address is already bound to another client
    /// - `DuplicateClient`: the client already owns a different address
    /// - `AlreadyExists`: the exact (address, client) pair is already stored
    async fn create(
        &self,
        address: Ipv4Addr,
        client_id: &str,
        leased: bool,
        expiration: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<()>;

    /// Replace the leased flag and expiration of an existing binding
    ///
    /// Fails with `AddressNotFound` when no binding exists for `address`.
    /// Client identity does not change in normal use; when the caller passes
    /// a different owner (reservation takeover) the client-uniqueness
    /// invariant is re-validated and the reverse index is re-pointed in the
    /// same atomic step, failing with `DuplicateClient` when the new owner
    /// already holds a different address.
    async fn update(
        &self,
        address: Ipv4Addr,
        client_id: &str,
        leased: bool,
        expiration: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<()>;

    /// Remove a binding
    ///
    /// A non-empty `client_id` must match the stored owner
    /// (`ClientMismatch` otherwise); an empty `client_id` deletes
    /// unconditionally. Fails with `AddressNotFound` when nothing is bound.
    async fn delete(&self, address: Ipv4Addr, client_id: &str, deadline: Deadline) -> Result<()>;

    /// Look up the binding for an address
    async fn find_by_address(&self, address: Ipv4Addr, deadline: Deadline) -> Result<Binding>;

    /// Look up the binding owned by a client
    async fn find_by_client(&self, client_id: &str, deadline: Deadline) -> Result<Binding>;

    /// Every bound address
    ///
    /// Always the same length as [`list_clients`](Self::list_clients); every
    /// binding contributes exactly one entry to each.
    async fn list_addresses(&self, deadline: Deadline) -> Result<Vec<Ipv4Addr>>;

    /// Every owning client id
    async fn list_clients(&self, deadline: Deadline) -> Result<Vec<String>>;
}

/// Helper trait for constructing binding stores from configuration
///
/// Factories are registered by name in the [`crate::registry::StoreRegistry`]
/// and receive the serialized store configuration.
#[async_trait]
pub trait BindingStoreFactory: Send + Sync {
    /// Create a store instance from driver-specific configuration
    async fn create(&self, config: &serde_json::Value) -> Result<Box<dyn BindingStore>>;
}
