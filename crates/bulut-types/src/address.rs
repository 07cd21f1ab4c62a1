//! Chain addresses and alias handles.

use std::fmt;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::{Result, TypesError};

/// A 20-byte chain address, rendered as `0x` + 40 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = TypesError;

    /// Parses `0x`-prefixed hex in any letter case. Checksums are not enforced.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| TypesError::InvalidAddress(s.to_string()))?;
        if digits.len() != 40 {
            return Err(TypesError::InvalidAddress(s.to_string()));
        }
        let bytes = hex::decode(digits).map_err(|_| TypesError::InvalidAddress(s.to_string()))?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

/// An alias handle: `@` followed by 3 to 20 of `[a-zA-Z0-9_]`, stored lowercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr)]
pub struct Handle(String);

impl Handle {
    pub const MIN_LEN: usize = 3;
    pub const MAX_LEN: usize = 20;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Handle {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix('@')
            .ok_or_else(|| TypesError::InvalidHandle(s.to_string()))?;
        let valid_len = (Self::MIN_LEN..=Self::MAX_LEN).contains(&body.len());
        let valid_chars = body
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_len || !valid_chars {
            return Err(TypesError::InvalidHandle(s.to_string()));
        }
        Ok(Self(format!("@{}", body.to_ascii_lowercase())))
    }
}

/// A handle bound to an address.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Alias {
    pub handle: Handle,
    pub address: Address,
    pub registered_at: u64,
    pub last_used_at: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrip_lowercase() {
        let addr: Address = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0"
            .parse()
            .expect("parse");
        assert_eq!(addr.to_string(), "0x742d35cc6634c0532925a3b844bc9e7595f0beb0");
        let again: Address = addr.to_string().parse().expect("reparse");
        assert_eq!(addr, again);
    }

    #[test]
    fn test_address_rejects_bad_input() {
        assert!("742d35cc6634c0532925a3b844bc9e7595f0beb0".parse::<Address>().is_err());
        assert!("0x1234".parse::<Address>().is_err());
        assert!("0xzz2d35cc6634c0532925a3b844bc9e7595f0beb0".parse::<Address>().is_err());
    }

    #[test]
    fn test_address_serde_as_string() {
        let addr = Address([0xab; 20]);
        let json = serde_json::to_string(&addr).expect("serialize");
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(20)));
        let back: Address = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, addr);
    }

    #[test]
    fn test_handle_normalized() {
        let handle: Handle = " @Alice_01 ".parse().expect("parse");
        assert_eq!(handle.as_str(), "@alice_01");
    }

    #[test]
    fn test_handle_rules() {
        assert!("alice".parse::<Handle>().is_err());
        assert!("@ab".parse::<Handle>().is_err());
        assert!("@abc".parse::<Handle>().is_ok());
        assert!("@abcdefghijklmnopqrst".parse::<Handle>().is_ok());
        assert!("@abcdefghijklmnopqrstu".parse::<Handle>().is_err());
        assert!("@ali-ce".parse::<Handle>().is_err());
        assert!("@al ice".parse::<Handle>().is_err());
    }
}
