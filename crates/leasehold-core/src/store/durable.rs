// # Durable Binding Store
//
// redb-backed implementation of BindingStore.
//
// ## Purpose
//
// Persists bindings across restarts in a single transactional file. Every
// mutation runs in one write transaction spanning the binding table and the
// client index, so a crash mid-operation cannot leave the reverse index
// disagreeing with the primary store.
//
// ## Layout
//
// See [`super::tables`]. Binding blobs are JSON-serialized into redb byte
// columns; the address is the table key. A metadata record carries the
// schema-version string, and [`super::migrate`] upgrades older layouts in
// place when the store is opened.
//
// ## Concurrency
//
// redb gives a single writer at a time and snapshot-isolated readers, which
// is exactly the contract's single-writer requirement. Blocking storage
// calls run under spawn_blocking; the caller's deadline is checked before
// any work is handed to the blocking pool.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadTransaction, ReadableTable, WriteTransaction};
use tracing::debug;

use super::migrate;
use super::tables::{BINDINGS, CLIENTS, StoredBinding};
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::traits::binding_store::{Binding, BindingStore, BindingStoreFactory};

/// Durable binding store backed by a single redb file
///
/// Cloning is cheap; all clones share one database handle.
#[derive(Clone, Debug)]
pub struct DurableBindingStore {
    db: Arc<Database>,
}

impl DurableBindingStore {
    /// Open or create the store at `path`, migrating older layouts forward
    ///
    /// Migration failures are fatal; there is no degraded mode for a file
    /// whose schema cannot be brought up to date.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let db = tokio::task::spawn_blocking(move || -> Result<Database> {
            let db = Database::create(&path)?;
            let txn = db.begin_write()?;
            migrate::run(&txn)?;
            txn.commit()?;
            debug!(path = %path.display(), "binding store opened");
            Ok(db)
        })
        .await
        .map_err(|err| Error::store(format!("store task failed: {err}")))??;

        Ok(Self { db: Arc::new(db) })
    }

    async fn with_write<F, T>(&self, deadline: Deadline, op: F) -> Result<T>
    where
        F: FnOnce(&WriteTransaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if deadline.is_expired() {
            return Err(Error::DeadlineExceeded);
        }
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write()?;
            // an error drops the transaction, aborting both tables at once
            let out = op(&txn)?;
            txn.commit()?;
            Ok(out)
        })
        .await
        .map_err(|err| Error::store(format!("store task failed: {err}")))?
    }

    async fn with_read<F, T>(&self, deadline: Deadline, op: F) -> Result<T>
    where
        F: FnOnce(&ReadTransaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if deadline.is_expired() {
            return Err(Error::DeadlineExceeded);
        }
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read()?;
            op(&txn)
        })
        .await
        .map_err(|err| Error::store(format!("store task failed: {err}")))?
    }
}

fn decode(address: Ipv4Addr, blob: &[u8]) -> Result<Binding> {
    let stored: StoredBinding = serde_json::from_slice(blob)?;
    Ok(Binding {
        address,
        client_id: stored.client_id,
        leased: stored.leased,
        expiration: stored.expiration,
    })
}

#[async_trait]
impl BindingStore for DurableBindingStore {
    async fn create(
        &self,
        address: Ipv4Addr,
        client_id: &str,
        leased: bool,
        expiration: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<()> {
        let client_id = client_id.to_string();
        self.with_write(deadline, move |txn| {
            let mut bindings = txn.open_table(BINDINGS)?;
            let mut clients = txn.open_table(CLIENTS)?;
            let addr = u32::from(address);

            if let Some(existing) = bindings.get(addr)? {
                let stored: StoredBinding = serde_json::from_slice(existing.value())?;
                return Err(if stored.client_id == client_id {
                    Error::AlreadyExists(address)
                } else {
                    Error::DuplicateAddress(address)
                });
            }
            if clients.get(client_id.as_str())?.is_some() {
                return Err(Error::DuplicateClient(client_id));
            }

            let blob = serde_json::to_vec(&StoredBinding {
                expiration,
                client_id: client_id.clone(),
                leased,
            })?;
            bindings.insert(addr, blob.as_slice())?;
            clients.insert(client_id.as_str(), addr)?;
            Ok(())
        })
        .await
    }

    async fn update(
        &self,
        address: Ipv4Addr,
        client_id: &str,
        leased: bool,
        expiration: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<()> {
        let client_id = client_id.to_string();
        self.with_write(deadline, move |txn| {
            let mut bindings = txn.open_table(BINDINGS)?;
            let mut clients = txn.open_table(CLIENTS)?;
            let addr = u32::from(address);

            let stored: StoredBinding = match bindings.get(addr)? {
                Some(existing) => serde_json::from_slice(existing.value())?,
                None => return Err(Error::address_not_found(address)),
            };

            if stored.client_id != client_id {
                // owner change: re-point the reverse index in the same txn
                if let Some(other) = clients.get(client_id.as_str())? {
                    if other.value() != addr {
                        return Err(Error::DuplicateClient(client_id));
                    }
                }
                clients.remove(stored.client_id.as_str())?;
                clients.insert(client_id.as_str(), addr)?;
            }

            let blob = serde_json::to_vec(&StoredBinding {
                expiration,
                client_id: client_id.clone(),
                leased,
            })?;
            bindings.insert(addr, blob.as_slice())?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, address: Ipv4Addr, client_id: &str, deadline: Deadline) -> Result<()> {
        let client_id = client_id.to_string();
        self.with_write(deadline, move |txn| {
            let mut bindings = txn.open_table(BINDINGS)?;
            let mut clients = txn.open_table(CLIENTS)?;
            let addr = u32::from(address);

            let stored: StoredBinding = match bindings.get(addr)? {
                Some(existing) => serde_json::from_slice(existing.value())?,
                None => return Err(Error::address_not_found(address)),
            };
            if !client_id.is_empty() && stored.client_id != client_id {
                return Err(Error::ClientMismatch(address));
            }

            bindings.remove(addr)?;
            clients.remove(stored.client_id.as_str())?;
            Ok(())
        })
        .await
    }

    async fn find_by_address(&self, address: Ipv4Addr, deadline: Deadline) -> Result<Binding> {
        self.with_read(deadline, move |txn| {
            let bindings = txn.open_table(BINDINGS)?;
            match bindings.get(u32::from(address))? {
                Some(blob) => decode(address, blob.value()),
                None => Err(Error::address_not_found(address)),
            }
        })
        .await
    }

    async fn find_by_client(&self, client_id: &str, deadline: Deadline) -> Result<Binding> {
        let client_id = client_id.to_string();
        self.with_read(deadline, move |txn| {
            let clients = txn.open_table(CLIENTS)?;
            let addr = match clients.get(client_id.as_str())? {
                Some(addr) => addr.value(),
                None => return Err(Error::client_not_found(&client_id)),
            };
            let bindings = txn.open_table(BINDINGS)?;
            match bindings.get(addr)? {
                Some(blob) => decode(Ipv4Addr::from(addr), blob.value()),
                None => Err(Error::store(format!(
                    "client index for {client_id} points at a missing binding"
                ))),
            }
        })
        .await
    }

    async fn list_addresses(&self, deadline: Deadline) -> Result<Vec<Ipv4Addr>> {
        self.with_read(deadline, move |txn| {
            let bindings = txn.open_table(BINDINGS)?;
            let mut addresses = Vec::new();
            for entry in bindings.iter()? {
                let (address, _) = entry?;
                addresses.push(Ipv4Addr::from(address.value()));
            }
            addresses.sort();
            Ok(addresses)
        })
        .await
    }

    async fn list_clients(&self, deadline: Deadline) -> Result<Vec<String>> {
        self.with_read(deadline, move |txn| {
            let clients = txn.open_table(CLIENTS)?;
            let mut ids = Vec::new();
            for entry in clients.iter()? {
                let (client_id, _) = entry?;
                ids.push(client_id.value().to_string());
            }
            ids.sort();
            Ok(ids)
        })
        .await
    }
}

/// Factory registered under the driver name `durable`
///
/// Expects the serialized store configuration to carry a `path` field.
pub struct DurableStoreFactory;

#[async_trait]
impl BindingStoreFactory for DurableStoreFactory {
    async fn create(&self, config: &serde_json::Value) -> Result<Box<dyn BindingStore>> {
        let path = config
            .get("path")
            .and_then(|value| value.as_str())
            .ok_or_else(|| Error::config("durable store requires a \"path\""))?;
        Ok(Box::new(DurableBindingStore::open(path).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn hour_from_now() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::hours(1)
    }

    #[tokio::test]
    async fn create_find_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableBindingStore::open(dir.path().join("bindings.redb"))
            .await
            .unwrap();

        store
            .create(ip("10.0.0.1"), "c1", true, hour_from_now(), Deadline::none())
            .await
            .unwrap();

        let binding = store
            .find_by_address(ip("10.0.0.1"), Deadline::none())
            .await
            .unwrap();
        assert_eq!(binding.client_id, "c1");
        assert!(binding.leased);

        let by_client = store.find_by_client("c1", Deadline::none()).await.unwrap();
        assert_eq!(by_client.address, ip("10.0.0.1"));

        store
            .delete(ip("10.0.0.1"), "c1", Deadline::none())
            .await
            .unwrap();
        assert!(
            store
                .find_by_address(ip("10.0.0.1"), Deadline::none())
                .await
                .is_err()
        );
        assert!(store.find_by_client("c1", Deadline::none()).await.is_err());
    }

    #[tokio::test]
    async fn uniqueness_violations_leave_both_indices_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableBindingStore::open(dir.path().join("bindings.redb"))
            .await
            .unwrap();

        store
            .create(ip("10.0.0.1"), "c1", false, hour_from_now(), Deadline::none())
            .await
            .unwrap();

        let err = store
            .create(ip("10.0.0.2"), "c1", false, hour_from_now(), Deadline::none())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateClient(_)));

        let err = store
            .create(ip("10.0.0.1"), "c2", false, hour_from_now(), Deadline::none())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateAddress(_)));

        let addresses = store.list_addresses(Deadline::none()).await.unwrap();
        let clients = store.list_clients(Deadline::none()).await.unwrap();
        assert_eq!(addresses, vec![ip("10.0.0.1")]);
        assert_eq!(clients, vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn update_persists_owner_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableBindingStore::open(dir.path().join("bindings.redb"))
            .await
            .unwrap();

        store
            .create(ip("10.0.0.1"), "c1", false, hour_from_now(), Deadline::none())
            .await
            .unwrap();
        store
            .update(ip("10.0.0.1"), "c2", false, hour_from_now(), Deadline::none())
            .await
            .unwrap();

        assert!(store.find_by_client("c1", Deadline::none()).await.is_err());
        assert_eq!(
            store.find_by_client("c2", Deadline::none()).await.unwrap().address,
            ip("10.0.0.1")
        );
    }

    #[tokio::test]
    async fn elapsed_deadline_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableBindingStore::open(dir.path().join("bindings.redb"))
            .await
            .unwrap();

        let err = store
            .create(
                ip("10.0.0.1"),
                "c1",
                false,
                hour_from_now(),
                Deadline::within(std::time::Duration::ZERO),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded));
    }
}
