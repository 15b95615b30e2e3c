// # Memory Binding Store
//
// In-memory implementation of BindingStore.
//
// ## Purpose
//
// A fast store with no durability, for tests and for deployments where
// losing bindings on restart is acceptable (clients simply re-acquire).
//
// ## Layout
//
// Three indices over one binding table:
// - primary, keyed by the composite (client id, address)
// - address → primary key
// - client id → primary key
//
// Every operation takes the single deadline-aware mutex before touching any
// index, so the two uniqueness invariants can be checked and updated as one
// step. Reads go through the same lock as writes.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::deadline::{Deadline, DeadlineMutex};
use crate::error::{Error, Result};
use crate::traits::binding_store::{Binding, BindingStore, BindingStoreFactory};

/// Composite primary key: the owning client plus the bound address
type Key = (String, u32);

#[derive(Debug, Default)]
struct Indices {
    bindings: HashMap<Key, Binding>,
    by_address: HashMap<u32, Key>,
    by_client: HashMap<String, Key>,
}

/// In-memory binding store
#[derive(Debug, Default)]
pub struct MemoryBindingStore {
    state: DeadlineMutex<Indices>,
}

impl MemoryBindingStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live bindings
    pub async fn len(&self) -> usize {
        self.state.lock().await.bindings.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.bindings.is_empty()
    }

    /// Drop every binding
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.bindings.clear();
        state.by_address.clear();
        state.by_client.clear();
    }
}

#[async_trait]
impl BindingStore for MemoryBindingStore {
    async fn create(
        &self,
        address: Ipv4Addr,
        client_id: &str,
        leased: bool,
        expiration: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<()> {
        let mut guard = self.state.lock_by(deadline).await?;
        let state = &mut *guard;
        let addr = u32::from(address);

        if let Some(key) = state.by_address.get(&addr) {
            return Err(if key.0 == client_id {
                Error::AlreadyExists(address)
            } else {
                Error::DuplicateAddress(address)
            });
        }
        if state.by_client.contains_key(client_id) {
            return Err(Error::DuplicateClient(client_id.to_string()));
        }

        let key: Key = (client_id.to_string(), addr);
        state.by_address.insert(addr, key.clone());
        state.by_client.insert(client_id.to_string(), key.clone());
        state.bindings.insert(
            key,
            Binding {
                address,
                client_id: client_id.to_string(),
                leased,
                expiration,
            },
        );
        Ok(())
    }

    async fn update(
        &self,
        address: Ipv4Addr,
        client_id: &str,
        leased: bool,
        expiration: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<()> {
        let mut guard = self.state.lock_by(deadline).await?;
        let state = &mut *guard;
        let addr = u32::from(address);

        let Some(key) = state.by_address.get(&addr).cloned() else {
            return Err(Error::address_not_found(address));
        };

        if key.0 == client_id {
            if let Some(binding) = state.bindings.get_mut(&key) {
                binding.leased = leased;
                binding.expiration = expiration;
            }
            return Ok(());
        }

        // Owner change: only valid while the new owner holds nothing else.
        if let Some(other) = state.by_client.get(client_id) {
            if other.1 != addr {
                return Err(Error::DuplicateClient(client_id.to_string()));
            }
        }
        state.bindings.remove(&key);
        state.by_client.remove(&key.0);
        let new_key: Key = (client_id.to_string(), addr);
        state.by_address.insert(addr, new_key.clone());
        state.by_client.insert(client_id.to_string(), new_key.clone());
        state.bindings.insert(
            new_key,
            Binding {
                address,
                client_id: client_id.to_string(),
                leased,
                expiration,
            },
        );
        Ok(())
    }

    async fn delete(&self, address: Ipv4Addr, client_id: &str, deadline: Deadline) -> Result<()> {
        let mut guard = self.state.lock_by(deadline).await?;
        let state = &mut *guard;
        let addr = u32::from(address);

        let Some(key) = state.by_address.get(&addr).cloned() else {
            return Err(Error::address_not_found(address));
        };
        if !client_id.is_empty() && key.0 != client_id {
            return Err(Error::ClientMismatch(address));
        }

        state.by_address.remove(&addr);
        state.by_client.remove(&key.0);
        state.bindings.remove(&key);
        Ok(())
    }

    async fn find_by_address(&self, address: Ipv4Addr, deadline: Deadline) -> Result<Binding> {
        let guard = self.state.lock_by(deadline).await?;
        let addr = u32::from(address);
        guard
            .by_address
            .get(&addr)
            .and_then(|key| guard.bindings.get(key))
            .cloned()
            .ok_or_else(|| Error::address_not_found(address))
    }

    async fn find_by_client(&self, client_id: &str, deadline: Deadline) -> Result<Binding> {
        let guard = self.state.lock_by(deadline).await?;
        guard
            .by_client
            .get(client_id)
            .and_then(|key| guard.bindings.get(key))
            .cloned()
            .ok_or_else(|| Error::client_not_found(client_id))
    }

    async fn list_addresses(&self, deadline: Deadline) -> Result<Vec<Ipv4Addr>> {
        let guard = self.state.lock_by(deadline).await?;
        let mut addresses: Vec<Ipv4Addr> =
            guard.by_address.keys().map(|&a| Ipv4Addr::from(a)).collect();
        addresses.sort();
        Ok(addresses)
    }

    async fn list_clients(&self, deadline: Deadline) -> Result<Vec<String>> {
        let guard = self.state.lock_by(deadline).await?;
        let mut clients: Vec<String> = guard.by_client.keys().cloned().collect();
        clients.sort();
        Ok(clients)
    }
}

/// Factory registered under the driver name `memory`
pub struct MemoryStoreFactory;

#[async_trait]
impl BindingStoreFactory for MemoryStoreFactory {
    async fn create(&self, _config: &serde_json::Value) -> Result<Box<dyn BindingStore>> {
        Ok(Box::new(MemoryBindingStore::new()))
    }
}
