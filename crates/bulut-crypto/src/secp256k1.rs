//! secp256k1 ownership proofs (EIP-191 `personal_sign`).
//!
//! A wallet proves control of its address by signing a canonical challenge.
//! The signature is 65 bytes `r || s || v`; the public key is recovered from
//! it and hashed into a 20-byte address, which must equal the claimed one.
//!
//! Key custody is external. [`LocalSigner`] exists for tests and local
//! tooling that need to produce valid proofs.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};

use crate::{CryptoError, Result};

/// Length of a recoverable signature (`r || s || v`).
pub const SIGNATURE_LEN: usize = 65;

/// Length of a chain address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Raw 20-byte chain address.
pub type AddressBytes = [u8; ADDRESS_LEN];

/// Keccak-256 of the input.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// EIP-191 digest: `keccak256("\x19Ethereum Signed Message:\n" || len || message)`.
pub fn personal_message_digest(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n");
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Derive the chain address of a public key: last 20 bytes of the Keccak-256
/// of the uncompressed point without its `0x04` tag.
pub fn address_of(key: &VerifyingKey) -> AddressBytes {
    let point = key.as_affine().to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; ADDRESS_LEN];
    address.copy_from_slice(&digest[12..]);
    address
}

/// Recover the signer's address from a `personal_sign` signature.
///
/// Accepts `v` in `{0, 1, 27, 28}`.
///
/// # Errors
///
/// - [`CryptoError::InvalidLength`] if the signature is not 65 bytes
/// - [`CryptoError::InvalidInput`] if `v` is not a recognised recovery byte
/// - [`CryptoError::SignatureVerification`] if recovery fails
pub fn recover_address(message: &[u8], signature: &[u8]) -> Result<AddressBytes> {
    if signature.len() != SIGNATURE_LEN {
        return Err(CryptoError::InvalidLength {
            expected: SIGNATURE_LEN,
            actual: signature.len(),
        });
    }

    let v = match signature[64] {
        0 | 1 => signature[64],
        27 | 28 => signature[64] - 27,
        other => {
            return Err(CryptoError::InvalidInput(format!(
                "unrecognised recovery byte {other}"
            )))
        }
    };
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| CryptoError::InvalidInput(format!("recovery byte {v}")))?;
    let sig =
        Signature::from_slice(&signature[..64]).map_err(|_| CryptoError::SignatureVerification)?;

    let digest = personal_message_digest(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|_| CryptoError::SignatureVerification)?;
    Ok(address_of(&key))
}

/// Decode a hex signature, with or without a `0x` prefix.
pub fn decode_signature(text: &str) -> Result<[u8; SIGNATURE_LEN]> {
    let stripped = text.trim().trim_start_matches("0x");
    let bytes = hex::decode(stripped).map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    if bytes.len() != SIGNATURE_LEN {
        return Err(CryptoError::InvalidLength {
            expected: SIGNATURE_LEN,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; SIGNATURE_LEN];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// A locally held secp256k1 key producing `personal_sign` signatures.
pub struct LocalSigner {
    inner: SigningKey,
}

impl LocalSigner {
    /// Generate a new random signer.
    pub fn generate() -> Self {
        Self {
            inner: SigningKey::random(&mut rand::rngs::OsRng),
        }
    }

    /// Create a signer from a 32-byte secret scalar.
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self> {
        let inner = SigningKey::from_slice(secret)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        Ok(Self { inner })
    }

    /// The address controlled by this signer.
    pub fn address(&self) -> AddressBytes {
        address_of(self.inner.verifying_key())
    }

    /// Sign `message` as an EIP-191 personal message. `v` is encoded as 27/28.
    pub fn sign_personal(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN]> {
        let digest = personal_message_digest(message);
        let (sig, recovery_id) = self
            .inner
            .sign_prehash_recoverable(&digest)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        let mut out = [0u8; SIGNATURE_LEN];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recovery_id.to_byte() + 27;
        Ok(out)
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &hex::encode(self.address()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Well-known development key (hardhat account #0).
    const DEV_SECRET: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "f39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    /// `personal_sign("hello world")` by the development key, as produced
    /// by common wallet libraries.
    const HELLO_WORLD_SIGNATURE: &str = "0xa461f509887bd19e312c0c58467ce8ff8e300d3c1a90b608a760c5b80318eaf15fe57c96f9175d6cd4daad4663763baa7e78836e067d0163e9a2ccf2ff753f5b1b";

    fn dev_signer() -> LocalSigner {
        let secret = hex::decode(DEV_SECRET).expect("valid hex");
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&secret);
        LocalSigner::from_bytes(&bytes).expect("valid scalar")
    }

    #[test]
    fn test_known_key_address() {
        assert_eq!(hex::encode(dev_signer().address()), DEV_ADDRESS);
    }

    #[test]
    fn test_keccak_and_personal_digest_vectors() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_eq!(
            hex::encode(personal_message_digest(b"hello world")),
            "d9eba16ed0ecae432b71fe008c98cc872bb4cc214d3220a36f365326cf807d68"
        );
        assert_eq!(
            hex::encode(personal_message_digest(b"Hello World")),
            "a1de988600a42c4b4ab089b619297c17d53cffae5d5120d82d8a92d0bb3b78f2"
        );
    }

    #[test]
    fn test_recover_external_signature() {
        let sig = decode_signature(HELLO_WORLD_SIGNATURE).expect("decode");
        assert_eq!(
            hex::encode(recover_address(b"hello world", &sig).expect("recover")),
            DEV_ADDRESS
        );
        assert_ne!(
            hex::encode(recover_address(b"hello world!", &sig).unwrap_or_default()),
            DEV_ADDRESS
        );
    }

    #[test]
    fn test_local_signer_matches_external_signature() {
        // RFC 6979 nonces make signing deterministic.
        let sig = dev_signer().sign_personal(b"hello world").expect("sign");
        assert_eq!(format!("0x{}", hex::encode(sig)), HELLO_WORLD_SIGNATURE);
    }

    #[test]
    fn test_sign_recover_roundtrip() {
        let signer = LocalSigner::generate();
        let sig = signer.sign_personal(b"register @alice").expect("sign");
        let recovered = recover_address(b"register @alice", &sig).expect("recover");
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn test_wrong_message_recovers_other_address() {
        let signer = LocalSigner::generate();
        let sig = signer.sign_personal(b"correct").expect("sign");
        match recover_address(b"tampered", &sig) {
            Ok(addr) => assert_ne!(addr, signer.address()),
            Err(CryptoError::SignatureVerification) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_low_recovery_byte_accepted() {
        let signer = LocalSigner::generate();
        let mut sig = signer.sign_personal(b"msg").expect("sign");
        sig[64] -= 27;
        assert_eq!(recover_address(b"msg", &sig).expect("recover"), signer.address());
    }

    #[test]
    fn test_bad_recovery_byte_rejected() {
        let signer = LocalSigner::generate();
        let mut sig = signer.sign_personal(b"msg").expect("sign");
        sig[64] = 5;
        assert!(matches!(
            recover_address(b"msg", &sig),
            Err(CryptoError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_short_signature_rejected() {
        assert!(matches!(
            recover_address(b"msg", &[0u8; 64]),
            Err(CryptoError::InvalidLength { expected: 65, actual: 64 })
        ));
    }

    #[test]
    fn test_decode_signature() {
        let signer = LocalSigner::generate();
        let sig = signer.sign_personal(b"msg").expect("sign");
        let text = format!("0x{}", hex::encode(sig));
        assert_eq!(decode_signature(&text).expect("decode"), sig);
        assert!(decode_signature("0x1234").is_err());
        assert!(decode_signature("zz").is_err());
    }

    #[test]
    fn test_personal_digest_differs_from_raw_keccak() {
        assert_ne!(personal_message_digest(b"abc"), keccak256(b"abc"));
    }
}
