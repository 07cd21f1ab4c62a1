//! # bulut-crypto
//!
//! Cryptographic primitives for the Bulut payment engine.
//!
//! Wallet ownership is proven with Ethereum-style `personal_sign` signatures
//! (secp256k1, EIP-191), so the address claimed by a caller can be recovered
//! from the signature itself. Internal identifiers and payload fingerprints
//! use domain-separated BLAKE3.
//!
//! ## Modules
//!
//! - [`blake3`]: Domain-separated BLAKE3 hashing (fingerprints, derived ids)
//! - [`secp256k1`]: EIP-191 digest, address derivation and signature recovery

pub mod blake3;
pub mod secp256k1;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Signature could not be verified or recovered.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Invalid key or signature length.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
