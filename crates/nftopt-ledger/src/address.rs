/// ACCOUNT ADDRESSES
///
/// 20-byte account identifiers shared by the payment ledger, the asset
/// registry, the claim-token issuer and the vault itself.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of an address in bytes
pub const ADDRESS_LEN: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Address(bytes)
    }

    /// Deterministic address from an arbitrary label.
    ///
    /// The first 20 bytes of `SHA-256(label)`. Used for vault addresses,
    /// claim-token instances and named test accounts.
    pub fn derive(label: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(label.as_ref());
        let digest = hasher.finalize();
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest[..ADDRESS_LEN]);
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AddressParseError {
    #[error("Invalid hex in address: {0}")]
    InvalidHex(String),
    #[error("Address must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let decoded = hex::decode(raw).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        if decoded.len() != ADDRESS_LEN {
            return Err(AddressParseError::InvalidLength {
                expected: ADDRESS_LEN,
                actual: decoded.len(),
            });
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Address(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        assert_eq!(Address::derive("alice"), Address::derive("alice"));
        assert_ne!(Address::derive("alice"), Address::derive("bob"));
        assert!(!Address::derive("alice").is_zero());
    }

    #[test]
    fn test_hex_parse() {
        let addr = Address::derive("vault");
        let parsed: Address = addr.to_hex().parse().unwrap();
        assert_eq!(parsed, addr);

        assert_eq!(
            "0x1234".parse::<Address>(),
            Err(AddressParseError::InvalidLength { expected: 20, actual: 2 })
        );
        assert!("0xzz".parse::<Address>().is_err());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let addr = Address::derive("registry");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr.to_hex()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
