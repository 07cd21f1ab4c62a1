//! Domain-separated BLAKE3 hashing.
//!
//! Every derived value in Bulut uses BLAKE3's key derivation mode with a
//! registered context string, so a fingerprint can never collide with an
//! identifier derived from the same bytes.

/// Registered BLAKE3 context strings.
pub mod contexts {
    pub const INTENT_FINGERPRINT: &str = "Bulut v1 intent-fingerprint";
    pub const SUBSCRIPTION_ID: &str = "Bulut v1 subscription-id";
    pub const EXECUTION_ID: &str = "Bulut v1 execution-id";
    pub const GATEWAY_REF: &str = "Bulut v1 gateway-ref";

    /// All registered context strings.
    pub const ALL_CONTEXTS: &[&str] = &[
        INTENT_FINGERPRINT,
        SUBSCRIPTION_ID,
        EXECUTION_ID,
        GATEWAY_REF,
    ];
}

/// Compute the BLAKE3 hash of the input data.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// Derive a 32-byte value using BLAKE3's key derivation mode.
///
/// # Arguments
///
/// * `context` - A registered context string from [`contexts`]
/// * `key_material` - The input bytes
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}

/// Derive a short printable identifier: `prefix` followed by the first
/// `bytes` bytes of the derived value in lowercase hex.
pub fn derive_id(prefix: &str, context: &str, key_material: &[u8], bytes: usize) -> String {
    let derived = derive_key(context, key_material);
    let take = bytes.min(derived.len());
    format!("{prefix}{}", hex::encode(&derived[..take]))
}

/// Generate a random identifier with the given prefix (16 random bytes).
pub fn random_id(prefix: &str) -> String {
    let mut bytes = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
    format!("{prefix}{}", hex::encode(bytes))
}
