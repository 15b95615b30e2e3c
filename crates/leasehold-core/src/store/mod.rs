//! Binding store implementations

pub mod durable;
pub mod memory;

mod migrate;
mod tables;

pub use durable::{DurableBindingStore, DurableStoreFactory};
pub use memory::{MemoryBindingStore, MemoryStoreFactory};
