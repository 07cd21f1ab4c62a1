//! Signature-checked alias directory.

use std::sync::Arc;

use bulut_crypto::secp256k1;
use bulut_types::{Address, Alias, Handle};

use crate::challenge::{registration_challenge, release_challenge};
use crate::store::{AliasStore, BindOutcome};
use crate::{AliasError, Result};

/// Front end over an [`AliasStore`] that enforces ownership proofs.
#[derive(Clone)]
pub struct AliasDirectory {
    store: Arc<dyn AliasStore>,
}

fn parse_handle(text: &str) -> Result<Handle> {
    text.parse()
        .map_err(|_| AliasError::InvalidHandle(text.to_string()))
}

fn parse_address(text: &str) -> Result<Address> {
    text.parse()
        .map_err(|_| AliasError::InvalidAddress(text.to_string()))
}

/// Recover the signer of `message` and require it to be `expected`.
fn verify_owner(message: &str, signature_hex: &str, expected: &Address) -> Result<()> {
    let signature =
        secp256k1::decode_signature(signature_hex).map_err(|_| AliasError::InvalidSignature)?;
    let recovered = secp256k1::recover_address(message.as_bytes(), &signature)
        .map_err(|_| AliasError::InvalidSignature)?;
    if Address(recovered) != *expected {
        return Err(AliasError::InvalidSignature);
    }
    Ok(())
}

impl AliasDirectory {
    pub fn new(store: Arc<dyn AliasStore>) -> Self {
        Self { store }
    }

    /// Bind `handle` to `address`, proven by `signature` over the
    /// registration challenge.
    ///
    /// Re-registering the exact same binding is an idempotent refresh.
    /// Moving a handle to another address requires a release first.
    ///
    /// # Errors
    ///
    /// - [`AliasError::InvalidHandle`] / [`AliasError::InvalidAddress`] for malformed input
    /// - [`AliasError::InvalidSignature`] if the signer is not `address`
    /// - [`AliasError::AliasTaken`] if the handle belongs to another address
    /// - [`AliasError::AddressTaken`] if the address has another handle
    pub fn register(&self, handle: &str, address: &str, signature: &str, now: u64) -> Result<Alias> {
        let handle = parse_handle(handle)?;
        let address = parse_address(address)?;

        if let Err(e) = verify_owner(&registration_challenge(&handle, &address), signature, &address) {
            tracing::warn!(%handle, %address, "alias registration rejected: bad signature");
            return Err(e);
        }

        match self.store.bind(&handle, &address, now)? {
            BindOutcome::Inserted => {
                tracing::info!(%handle, %address, "alias registered");
            }
            BindOutcome::Unchanged => {
                tracing::debug!(%handle, %address, "alias re-registration is a no-op");
            }
            BindOutcome::HandleTaken(current) => {
                tracing::warn!(%handle, %address, "alias already taken");
                return Err(AliasError::AliasTaken {
                    handle,
                    address: current,
                });
            }
            BindOutcome::AddressTaken(current) => {
                tracing::warn!(%handle, %address, "address already has an alias");
                return Err(AliasError::AddressTaken {
                    address,
                    handle: current,
                });
            }
        }

        self.store
            .by_handle(&handle)?
            .ok_or_else(|| AliasError::NotFound(handle.to_string()))
    }

    /// The full binding for a handle, including its registration time.
    pub fn lookup(&self, handle: &str) -> Result<Alias> {
        let handle = parse_handle(handle)?;
        self.store
            .by_handle(&handle)?
            .ok_or_else(|| AliasError::NotFound(handle.to_string()))
    }

    /// Resolve a handle to its address.
    pub fn resolve(&self, handle: &str) -> Result<Address> {
        self.lookup(handle).map(|a| a.address)
    }

    /// Resolve and record the lookup time.
    pub fn resolve_and_touch(&self, handle: &str, now: u64) -> Result<Address> {
        let address = self.resolve(handle)?;
        self.store.touch(&parse_handle(handle)?, now)?;
        Ok(address)
    }

    /// Resolve an address to its handle.
    pub fn reverse_resolve(&self, address: &str) -> Result<Handle> {
        let address = parse_address(address)?;
        self.store
            .by_address(&address)?
            .map(|a| a.handle)
            .ok_or_else(|| AliasError::NotFound(address.to_string()))
    }

    /// Remove a binding, proven by the bound address signing the release
    /// challenge for this binding's registration time.
    pub fn release(&self, handle: &str, signature: &str) -> Result<Alias> {
        let alias = self.lookup(handle)?;
        let handle = alias.handle.clone();

        let challenge = release_challenge(&handle, &alias.address, alias.registered_at);
        if let Err(e) = verify_owner(&challenge, signature, &alias.address) {
            tracing::warn!(%handle, address = %alias.address, "alias release rejected: bad signature");
            return Err(e);
        }

        if !self.store.remove(&handle)? {
            return Err(AliasError::NotFound(handle.to_string()));
        }
        tracing::info!(%handle, address = %alias.address, "alias released");
        Ok(alias)
    }

    pub fn list(&self) -> Result<Vec<Alias>> {
        self.store.list()
    }
}
