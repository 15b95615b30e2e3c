//! Allocation engine
//!
//! The Allocator is the domain-level state machine layered on the
//! persistence contract: it turns raw find/reserve/lease/release requests
//! into the correct sequence of store calls, applying expiration and
//! ownership policy.
//!
//! ## Event Flow
//!
//! 1. A protocol handler asks for an address for a client
//! 2. The allocator looks up the current binding of that address
//! 3. The decision tables below pick the mutation (or the typed error)
//! 4. The store applies it atomically against both indices
//!
//! Expiration is evaluated lazily against a wall clock read once per
//! operation; nothing sweeps expired bindings in the background. No lock is
//! held across a store call, and each operation issues at most one lookup
//! plus one conditional mutation.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::config::EngineConfig;
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::range::{AddressRange, AddressRangeSet};
use crate::traits::{Binding, BindingStore};

/// The allocation orchestrator
///
/// Wraps one binding store plus the configured pool of allocatable
/// addresses. Safe to share across tasks.
pub struct Allocator {
    store: Arc<dyn BindingStore>,
    ranges: RwLock<AddressRangeSet>,
    reservation_ttl: chrono::Duration,
}

impl Allocator {
    /// Create an allocator over a store, with an empty pool
    ///
    /// Ranges are supplied afterwards through [`add_range`](Self::add_range).
    pub fn new(store: Arc<dyn BindingStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            ranges: RwLock::new(AddressRangeSet::new()),
            reservation_ttl: chrono::Duration::seconds(config.reservation_ttl_secs as i64),
        }
    }

    /// Merge a range into the allocatable pool
    pub async fn add_range(&self, range: AddressRange) {
        let mut ranges = self.ranges.write().await;
        ranges.insert(range);
        debug!(pool = %ranges, "range added");
    }

    /// Subtract a range from the allocatable pool
    ///
    /// Bindings already held inside the removed range stay valid until they
    /// are released or reclaimed; removal only stops new allocations there.
    pub async fn remove_range(&self, range: &AddressRange) {
        let mut ranges = self.ranges.write().await;
        ranges.subtract(range);
        debug!(pool = %ranges, "range removed");
    }

    /// Snapshot of the current pool
    pub async fn ranges(&self) -> AddressRangeSet {
        self.ranges.read().await.clone()
    }

    /// Find an address for a client
    ///
    /// A client that already owns a binding, leased or reserved, gets its
    /// address back. Otherwise the pool is scanned in range order, address
    /// order, for the first address with no binding at all.
    pub async fn find_address(&self, client: &Client, deadline: Deadline) -> Result<Ipv4Addr> {
        match self.store.find_by_client(&client.id, deadline).await {
            Ok(binding) => return Ok(binding.address),
            Err(Error::AddressNotFound(_)) => {}
            Err(err) => return Err(err),
        }

        // clone the snapshot so the pool lock is not held across store calls
        let pool = self.ranges.read().await.clone();
        for range in pool.ranges() {
            for address in range.iter() {
                match self.store.find_by_address(address, deadline).await {
                    Ok(_) => continue,
                    Err(Error::AddressNotFound(_)) => {
                        debug!(%address, client = %client.id, "address available");
                        return Ok(address);
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Err(Error::NoAddressAvailable)
    }

    /// Place a soft hold on an address for a client
    ///
    /// The full decision table lives in the match below; the one case worth
    /// calling out is an expired lease held by a *different* client, which
    /// is logged and left untouched. [`lease`](Self::lease) reclaims that
    /// situation, reserve deliberately does not.
    pub async fn reserve(
        &self,
        address: Ipv4Addr,
        client: &Client,
        deadline: Deadline,
    ) -> Result<()> {
        let now = Utc::now();
        let existing = match self.store.find_by_address(address, deadline).await {
            Ok(binding) => binding,
            Err(Error::AddressNotFound(_)) => {
                debug!(%address, client = %client.id, "creating reservation");
                return self
                    .store
                    .create(
                        address,
                        &client.id,
                        false,
                        now + self.reservation_ttl,
                        deadline,
                    )
                    .await;
            }
            Err(err) => return Err(err),
        };

        let expired = existing.is_expired_at(now);

        if existing.client_id == client.id {
            if !expired {
                // the hold is still valid, nothing to do
                return Ok(());
            }
            if existing.leased {
                warn!(
                    %address,
                    client = %client.id,
                    "expired lease on file, reserve leaves it untouched"
                );
                return Ok(());
            }
            debug!(%address, client = %client.id, "refreshing expired reservation");
            return self
                .store
                .update(
                    address,
                    &client.id,
                    false,
                    now + self.reservation_ttl,
                    deadline,
                )
                .await;
        }

        if !expired {
            return Err(Error::AddressReserved(address));
        }
        if existing.leased {
            warn!(
                %address,
                owner = %existing.client_id,
                client = %client.id,
                "expired lease held by another client, not reclaiming on reserve"
            );
            return Ok(());
        }

        debug!(
            %address,
            previous = %existing.client_id,
            client = %client.id,
            "taking over expired reservation"
        );
        self.store
            .update(
                address,
                &client.id,
                false,
                now + self.reservation_ttl,
                deadline,
            )
            .await
    }

    /// Commit a lease on an address for a client
    ///
    /// Returns the active lease time: `lease_time` whenever a fresh
    /// expiration was set (renewal, expiry, or a reservation turning into a
    /// lease), otherwise the time remaining on the existing lease. An
    /// expired binding held by a different client is reclaimed here.
    pub async fn lease(
        &self,
        address: Ipv4Addr,
        client: &Client,
        lease_time: Duration,
        renew: bool,
        deadline: Deadline,
    ) -> Result<Duration> {
        let now = Utc::now();
        let lease_span = chrono::Duration::seconds(lease_time.as_secs() as i64);

        let existing = match self.store.find_by_address(address, deadline).await {
            Ok(binding) => Some(binding),
            Err(Error::AddressNotFound(_)) => None,
            Err(err) => return Err(err),
        };

        if let Some(existing) = existing {
            if existing.client_id == client.id {
                return self
                    .lease_same_owner(&existing, client, now, lease_span, lease_time, renew, deadline)
                    .await;
            }
            if !existing.is_expired_at(now) {
                return Err(Error::AddressReserved(address));
            }
            info!(
                %address,
                previous = %existing.client_id,
                client = %client.id,
                "reclaiming expired binding"
            );
            self.store
                .delete(address, &existing.client_id, deadline)
                .await?;
        }

        debug!(%address, client = %client.id, "creating lease");
        self.store
            .create(address, &client.id, true, now + lease_span, deadline)
            .await?;
        Ok(lease_time)
    }

    #[allow(clippy::too_many_arguments)]
    async fn lease_same_owner(
        &self,
        existing: &Binding,
        client: &Client,
        now: DateTime<Utc>,
        lease_span: chrono::Duration,
        lease_time: Duration,
        renew: bool,
        deadline: Deadline,
    ) -> Result<Duration> {
        let expired = existing.is_expired_at(now);
        let (expiration, active) = if renew || expired || !existing.leased {
            (now + lease_span, lease_time)
        } else {
            let remaining = (existing.expiration - now).to_std().unwrap_or_default();
            (existing.expiration, remaining)
        };

        if !existing.leased || expiration != existing.expiration {
            self.store
                .update(existing.address, &client.id, true, expiration, deadline)
                .await?;
        }
        debug!(
            address = %existing.address,
            client = %client.id,
            active_secs = active.as_secs(),
            "lease confirmed"
        );
        Ok(active)
    }

    /// Drop whatever binding holds an address
    pub async fn release(&self, address: Ipv4Addr, deadline: Deadline) -> Result<()> {
        debug!(%address, "releasing binding");
        self.store.delete(address, "", deadline).await
    }

    /// Remove a reservation
    ///
    /// When a client is supplied its id must match the stored owner. An
    /// active lease cannot be removed through this path.
    pub async fn delete_reservation(
        &self,
        address: Ipv4Addr,
        client: Option<&Client>,
        deadline: Deadline,
    ) -> Result<()> {
        let existing = self.store.find_by_address(address, deadline).await?;
        if let Some(client) = client {
            if existing.client_id != client.id {
                return Err(Error::ClientMismatch(address));
            }
        }
        if existing.leased {
            return Err(Error::ReservationNotFound(address));
        }
        debug!(%address, client = %existing.client_id, "deleting reservation");
        self.store.delete(address, &existing.client_id, deadline).await
    }
}
