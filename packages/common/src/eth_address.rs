//! Counterparty (EVM) address type
//!
//! Addresses are 20 raw bytes. They travel as `0x`-prefixed lowercase hex in
//! messages and query responses, and as raw bytes inside storage keys and
//! ABI encodings.

use std::fmt;

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced while parsing an [`EthAddress`]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EthAddressError {
    #[error("invalid hex in eth address: {0}")]
    InvalidHex(String),

    #[error("eth address must be 20 or 32 bytes, got {0} bytes")]
    InvalidLength(usize),

    #[error("32-byte eth address has non-zero padding")]
    NonZeroPadding,
}

/// A 20-byte counterparty account or contract address
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EthAddress(pub [u8; 20]);

impl EthAddress {
    /// The all-zero address, used as the "no reward token" sentinel
    pub const ZERO: EthAddress = EthAddress([0u8; 20]);

    /// Create from hex string (with or without 0x prefix)
    ///
    /// Accepts both 20-byte addresses (40 hex chars) and 32-byte padded addresses
    /// (64 hex chars). For 32-byte addresses, the first 12 bytes must be zeros
    /// and the last 20 bytes are extracted.
    pub fn from_hex(hex_str: &str) -> Result<Self, EthAddressError> {
        let stripped = hex_str
            .strip_prefix("0x")
            .or_else(|| hex_str.strip_prefix("0X"))
            .unwrap_or(hex_str);
        let bytes =
            hex::decode(stripped).map_err(|e| EthAddressError::InvalidHex(e.to_string()))?;

        match bytes.len() {
            20 => Self::from_slice(&bytes),
            32 => {
                if bytes[..12].iter().any(|&b| b != 0) {
                    return Err(EthAddressError::NonZeroPadding);
                }
                Self::from_slice(&bytes[12..])
            }
            len => Err(EthAddressError::InvalidLength(len)),
        }
    }

    /// Create from a raw 20-byte slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EthAddressError> {
        let raw: [u8; 20] = bytes
            .try_into()
            .map_err(|_| EthAddressError::InvalidLength(bytes.len()))?;
        Ok(EthAddress(raw))
    }

    /// Convert to hex string with 0x prefix
    pub fn as_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Convert to bytes32 (left-padded with zeros), the ABI word form
    pub fn as_bytes32(&self) -> [u8; 32] {
        let mut result = [0u8; 32];
        result[12..].copy_from_slice(&self.0);
        result
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl fmt::Debug for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EthAddress({})", self.as_hex())
    }
}

impl std::str::FromStr for EthAddress {
    type Err = EthAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// ============================================================================
// Serde / Schema
// ============================================================================

impl Serialize for EthAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_hex())
    }
}

struct EthAddressVisitor;

impl<'de> Visitor<'de> for EthAddressVisitor {
    type Value = EthAddress;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a 0x-prefixed 20-byte hex address")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        EthAddress::from_hex(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for EthAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(EthAddressVisitor)
    }
}

impl JsonSchema for EthAddress {
    fn schema_name() -> String {
        "EthAddress".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}
