//! Core trait definitions
//!
//! The persistence contract lives here; implementations are in
//! [`crate::store`].

pub mod binding_store;

pub use binding_store::{Binding, BindingStore, BindingStoreFactory};
