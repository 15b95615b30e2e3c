// # leasehold-core
//
// Core library for the leasehold IPv4 address allocation engine.
//
// ## Architecture Overview
//
// This library tracks which client owns which IPv4 address:
// - **AddressRange / AddressRangeSet**: the algebra describing the pool of
//   allocatable addresses
// - **BindingStore**: trait for persisting address↔client bindings with
//   uniqueness guarantees on both the address and the client
// - **Allocator**: the engine that turns reserve/lease/release requests into
//   the correct sequence of store mutations, applying expiration policy
// - **StoreRegistry**: explicit registry mapping driver names to store
//   factories, populated at process start
//
// ## Design Principles
//
// 1. **Separation of Concerns**: allocation policy is separate from storage
// 2. **Lazy Expiration**: nothing sweeps expired bindings in the background;
//    expiry is evaluated at the point of each operation
// 3. **Plugin-Based**: stores are selected by name through the registry, no
//    hard-coded if-else and no module-load side effects
// 4. **Library-First**: the engine performs no network I/O; protocol handlers
//    sit above it

pub mod client;
pub mod config;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod range;
pub mod registry;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use client::Client;
pub use config::{Config, EngineConfig, RangeConfig, StoreConfig};
pub use deadline::{Deadline, DeadlineMutex};
pub use engine::Allocator;
pub use error::{Error, Result};
pub use range::{AddressRange, AddressRangeSet};
pub use registry::StoreRegistry;
pub use store::{DurableBindingStore, MemoryBindingStore};
pub use traits::{Binding, BindingStore, BindingStoreFactory};
