//! Shared fixtures for the contract tests

use std::net::Ipv4Addr;
use std::sync::Arc;

use leasehold_core::{Allocator, Client, EngineConfig, MemoryBindingStore};

pub fn ip(s: &str) -> Ipv4Addr {
    s.parse().expect("valid test address")
}

pub fn client(mac: &str) -> Client {
    Client::new(mac, None)
}

/// An allocator over a memory store, with the store handle kept for
/// inspecting state the engine does not expose directly
pub fn allocator_with_store() -> (Allocator, Arc<MemoryBindingStore>) {
    let store = Arc::new(MemoryBindingStore::new());
    let allocator = Allocator::new(store.clone(), &EngineConfig::default());
    (allocator, store)
}
