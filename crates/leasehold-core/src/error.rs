//! Error types for the allocation engine
//!
//! This module defines all error types used throughout the crate.

use std::net::Ipv4Addr;
use thiserror::Error;

/// Result type alias for allocation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the allocation engine
#[derive(Error, Debug)]
pub enum Error {
    /// The address is already bound to a different client
    #[error("address {0} is already bound to another client")]
    DuplicateAddress(Ipv4Addr),

    /// The client already owns a binding for a different address
    #[error("client {0} already owns a different address")]
    DuplicateClient(String),

    /// The exact (address, client) pair is already stored
    #[error("binding for address {0} already exists")]
    AlreadyExists(Ipv4Addr),

    /// No binding exists for the given address or client
    #[error("no binding for {0}")]
    AddressNotFound(String),

    /// The stored binding is owned by a different client
    #[error("client does not own the binding for address {0}")]
    ClientMismatch(Ipv4Addr),

    /// The address is held by a different, still-valid owner
    #[error("address {0} is reserved or leased by another client")]
    AddressReserved(Ipv4Addr),

    /// The configured pool has no unbound address left
    #[error("no address available in the configured pool")]
    NoAddressAvailable,

    /// The binding is an active lease and cannot be removed as a reservation
    #[error("binding for address {0} is an active lease, not a reservation")]
    ReservationNotFound(Ipv4Addr),

    /// A range endpoint failed to parse as an IPv4 address
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),

    /// Range start does not lie below range end
    #[error("invalid range: start {start} must be below end {end}")]
    InvalidRange { start: Ipv4Addr, end: Ipv4Addr },

    /// The migration chain cannot reach the current schema version
    #[error("no migration registered for schema version {0}")]
    UnsupportedSchema(String),

    /// The caller's deadline elapsed before the operation could run
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Store-internal errors (storage engine, task join, index corruption)
    #[error("store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "not found" error for an address lookup
    pub fn address_not_found(address: Ipv4Addr) -> Self {
        Self::AddressNotFound(format!("address {address}"))
    }

    /// Create a "not found" error for a client lookup
    pub fn client_not_found(client_id: &str) -> Self {
        Self::AddressNotFound(format!("client {client_id}"))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<redb::DatabaseError> for Error {
    fn from(err: redb::DatabaseError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<redb::TransactionError> for Error {
    fn from(err: redb::TransactionError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<redb::TableError> for Error {
    fn from(err: redb::TableError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<redb::StorageError> for Error {
    fn from(err: redb::StorageError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<redb::CommitError> for Error {
    fn from(err: redb::CommitError) -> Self {
        Self::Store(err.to_string())
    }
}
