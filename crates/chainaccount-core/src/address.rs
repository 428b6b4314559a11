//! 32-byte account address with base-58 text form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DecodeError;

/// Length of an address in bytes.
pub const ADDRESS_BYTES: usize = 32;

/// An opaque 32-byte account or program identifier.
///
/// Equality is byte-exact. The base-58 form is only used for display, RPC
/// parameters and registry keys.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_BYTES]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_BYTES] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; ADDRESS_BYTES] {
        self.0
    }

    /// Build from a slice, failing unless it is exactly 32 bytes long.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let arr: [u8; ADDRESS_BYTES] =
            bytes
                .try_into()
                .map_err(|_| DecodeError::InvalidValue {
                    reason: format!("address must be {ADDRESS_BYTES} bytes, got {}", bytes.len()),
                })?;
        Ok(Self(arr))
    }

    /// Base-58 encoding of the address.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl From<[u8; ADDRESS_BYTES]> for Address {
    fn from(bytes: [u8; ADDRESS_BYTES]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| DecodeError::InvalidValue {
                reason: format!("invalid base58 address '{s}': {e}"),
            })?;
        Self::try_from_slice(&bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_base58())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
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
    fn default_address_is_all_ones_in_base58() {
        assert_eq!(Address::default().to_string(), "11111111111111111111111111111111");
    }

    #[test]
    fn parse_base58() {
        let addr: Address = "4vJ9JU1bJJE96FWSJKvHsmmFADCg4gpZQff4P3bkLKi".parse().unwrap();
        assert_eq!(addr, Address::new([1u8; 32]));
    }

    #[test]
    fn reject_wrong_length() {
        // 8 bytes, valid base58 but not an address
        assert!("cJJWPqNMczr".parse::<Address>().is_err());
        assert!("not-base58!".parse::<Address>().is_err());
    }

    #[test]
    fn serde_as_string() {
        let addr = Address::new([1u8; 32]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"4vJ9JU1bJJE96FWSJKvHsmmFADCg4gpZQff4P3bkLKi\"");
    }
}
