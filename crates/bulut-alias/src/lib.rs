//! # bulut-alias
//!
//! The alias directory: a one-to-one mapping between `@handles` and chain
//! addresses.
//!
//! A binding is created only with an EIP-191 signature by the address being
//! bound, over a canonical challenge naming both the handle and the address.
//! Uniqueness of both sides is checked and enforced in a single critical
//! section of the backing store.
//!
//! ## Modules
//!
//! - [`challenge`]: Canonical registration and release messages
//! - [`store`]: The `AliasStore` trait with in-memory and SQLite backends
//! - [`directory`]: `AliasDirectory`, the signature-checked front end

pub mod challenge;
pub mod directory;
pub mod store;

pub use directory::AliasDirectory;
pub use store::{AliasStore, MemoryAliasStore, SqliteAliasStore};

use bulut_types::{Address, Handle};

/// Error types for alias operations.
#[derive(Debug, thiserror::Error)]
pub enum AliasError {
    /// No binding for the handle or address.
    #[error("alias not found: {0}")]
    NotFound(String),

    /// The handle is bound to a different address.
    #[error("handle {handle} is already bound to {address}")]
    AliasTaken { handle: Handle, address: Address },

    /// The address is bound to a different handle.
    #[error("address {address} is already bound to {handle}")]
    AddressTaken { address: Address, handle: Handle },

    /// The signature does not prove control of the address.
    #[error("signature does not match address")]
    InvalidSignature,

    /// The handle text is not a valid handle.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// The address text is not a valid address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Backing store failure.
    #[error("alias store error: {0}")]
    Store(String),
}

impl From<bulut_db::DbError> for AliasError {
    fn from(e: bulut_db::DbError) -> Self {
        AliasError::Store(e.to_string())
    }
}

/// Convenience result type for alias operations.
pub type Result<T> = std::result::Result<T, AliasError>;
