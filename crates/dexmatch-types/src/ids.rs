//! Identifiers used throughout the exchange core.
//!
//! Every identifier is a raw 32-byte value. Ordering is plain byte order,
//! which is what gives the canonical "ascending market id" processing
//! order and the sorted subaccount lists inside a batch execution.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{ExchangeError, Result};

fn decode_32(input: &str) -> std::result::Result<[u8; 32], String> {
    let trimmed = input.strip_prefix("0x").unwrap_or(input);
    let bytes = hex::decode(trimmed).map_err(|e| e.to_string())?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| format!("expected 32 bytes, got {}", bytes.len()))
}

// ---------------------------------------------------------------------------
// MarketId
// ---------------------------------------------------------------------------

/// Identifier of a spot, derivative or binary-options market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct MarketId(pub [u8; 32]);

impl MarketId {
    /// Decode from a `0x`-prefixed (or bare) hex string.
    pub fn from_hex(input: &str) -> Result<Self> {
        decode_32(input)
            .map(Self)
            .map_err(|reason| ExchangeError::MalformedHash {
                input: input.to_string(),
                reason,
            })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// SubaccountId
// ---------------------------------------------------------------------------

/// An isolated sub-ledger under a master account: 20 address bytes
/// followed by a 12-byte big-endian nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct SubaccountId(pub [u8; 32]);

impl SubaccountId {
    #[must_use]
    pub fn new(address: [u8; 20], nonce: u32) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..20].copy_from_slice(&address);
        bytes[28..].copy_from_slice(&nonce.to_be_bytes());
        Self(bytes)
    }

    /// Decode from a `0x`-prefixed (or bare) hex string.
    pub fn from_hex(input: &str) -> Result<Self> {
        decode_32(input)
            .map(Self)
            .map_err(|reason| ExchangeError::MalformedSubaccountId {
                input: input.to_string(),
                reason,
            })
    }

    /// The owning account address.
    #[must_use]
    pub fn address(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        out.copy_from_slice(&self.0[..20]);
        out
    }

    #[must_use]
    pub fn nonce(&self) -> u32 {
        u32::from_be_bytes([self.0[28], self.0[29], self.0[30], self.0[31]])
    }
}

impl fmt::Display for SubaccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// OrderHash
// ---------------------------------------------------------------------------

/// Deterministic hash identifying an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct OrderHash(pub [u8; 32]);

impl OrderHash {
    pub fn from_hex(input: &str) -> Result<Self> {
        decode_32(input)
            .map(Self)
            .map_err(|reason| ExchangeError::MalformedHash {
                input: input.to_string(),
                reason,
            })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for OrderHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// Identifiers travel as `0x` hex strings so they can key JSON maps.
macro_rules! hex_serde {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                $ty::from_hex(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_serde!(MarketId);
hex_serde!(SubaccountId);
hex_serde!(OrderHash);

/// Type alias for bank denominations (e.g., "usdt", "peggy0x...").
pub type Denom = String;

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
mod helpers {
    use super::{MarketId, OrderHash, SubaccountId};

    impl MarketId {
        pub fn from_byte(b: u8) -> Self {
            Self([b; 32])
        }
    }

    impl SubaccountId {
        pub fn from_byte(b: u8) -> Self {
            Self::new([b; 20], 0)
        }
    }

    impl OrderHash {
        pub fn from_byte(b: u8) -> Self {
            Self([b; 32])
        }

        /// Order hash derived from a counter, for building long order lists.
        pub fn from_index(i: u64) -> Self {
            let mut bytes = [0u8; 32];
            bytes[24..].copy_from_slice(&i.to_be_bytes());
            Self(bytes)
        }
    }
}
