//! Canonical messages signed by wallets to prove control of an address.
//!
//! Both the handle and the address appear in the message, so a signature
//! for one binding can never be replayed for another. Release messages also
//! carry the binding's registration time, so a release signed for an
//! earlier binding of the same pair does not remove a later one.

use bulut_types::{Address, Handle};

/// Message a wallet signs to bind `handle` to `address`.
pub fn registration_challenge(handle: &Handle, address: &Address) -> String {
    format!("Bulut alias registration\nhandle: {handle}\naddress: {address}")
}

/// Message a wallet signs to remove the binding registered at
/// `registered_at`.
pub fn release_challenge(handle: &Handle, address: &Address, registered_at: u64) -> String {
    format!("Bulut alias release\nhandle: {handle}\naddress: {address}\nregistered: {registered_at}")
}
