//! Identifiers used throughout postmatch.
//!
//! Entity ids are 128-bit UUIDs built deterministically from the block height
//! and a per-block sequence number, so every replica assigns the same id to
//! the same command. The leading bytes are the big-endian height and
//! sequence, which keeps ids (and therefore store keys) in creation order.
//!
//! Accounts are identified by a 20-byte [`Address`].

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{PostmatchError, Result};

/// `[height BE 8][sequence BE 4][SHA-256(domain, height, sequence)[..4]]`
fn derive_id_bytes(domain: &[u8], height: u64, sequence: u32) -> [u8; 16] {
    let mut hasher = Sha256::new();
    hasher.update(b"postmatch:id:v1:");
    hasher.update(domain);
    hasher.update(height.to_be_bytes());
    hasher.update(sequence.to_be_bytes());
    let hash = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&height.to_be_bytes());
    bytes[8..12].copy_from_slice(&sequence.to_be_bytes());
    bytes[12..].copy_from_slice(&hash[..4]);
    bytes
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $domain:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Deterministic id for the `sequence`-th entity issued in block `height`.
            #[must_use]
            pub fn deterministic(height: u64, sequence: u32) -> Self {
                Self(Uuid::from_bytes(derive_id_bytes($domain, height, sequence)))
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Block height embedded in the id.
            #[must_use]
            pub fn height(&self) -> u64 {
                let mut height = [0u8; 8];
                height.copy_from_slice(&self.0.as_bytes()[..8]);
                u64::from_be_bytes(height)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Entity ids
// ---------------------------------------------------------------------------

entity_id!(
    /// Identifier of a buy or sell [`crate::Order`].
    OrderId,
    b"order"
);

entity_id!(
    /// Identifier of a matched [`crate::Trade`].
    TradeId,
    b"trade"
);

entity_id!(
    /// Identifier of an [`crate::Escrow`] custody record.
    EscrowId,
    b"escrow"
);

entity_id!(
    /// Identifier of a [`crate::Dispute`].
    DisputeId,
    b"dispute"
);

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Human-readable prefix of a rendered [`Address`].
pub const ADDRESS_PREFIX: &str = "pm1";

/// A 20-byte account address.
///
/// User addresses are derived from ed25519 public keys; module and custody
/// addresses are derived from a domain tag so no private key exists for them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Address(pub [u8; 20]);

impl Address {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Address owned by the holder of `key`.
    #[must_use]
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self::derived(b"account", key.as_bytes())
    }

    /// Keyless module account, e.g. the fee collector.
    #[must_use]
    pub fn module(name: &str) -> Self {
        Self::derived(b"module", name.as_bytes())
    }

    /// Custody address holding the escrow pledged by an order.
    #[must_use]
    pub fn custody_for_order(order_id: OrderId) -> Self {
        Self::derived(b"custody:order", order_id.as_bytes())
    }

    /// Custody address holding an escrow bound directly to a trade.
    #[must_use]
    pub fn custody_for_escrow(escrow_id: EscrowId) -> Self {
        Self::derived(b"custody:escrow", escrow_id.as_bytes())
    }

    fn derived(domain: &[u8], seed: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"postmatch:address:");
        hasher.update(domain);
        hasher.update(b":");
        hasher.update(seed);
        let hash = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash[..20]);
        Self(bytes)
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ADDRESS_PREFIX}{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = PostmatchError;

    fn from_str(s: &str) -> Result<Self> {
        let body = s
            .strip_prefix(ADDRESS_PREFIX)
            .ok_or_else(|| PostmatchError::Validation {
                reason: format!("address {s:?} lacks the {ADDRESS_PREFIX} prefix"),
            })?;
        let raw = hex::decode(body).map_err(|e| PostmatchError::Validation {
            reason: format!("address {s:?} is not hex: {e}"),
        })?;
        let bytes: [u8; 20] = raw.try_into().map_err(|_| PostmatchError::Validation {
            reason: format!("address {s:?} must encode 20 bytes"),
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Address {
    pub fn dummy(n: u8) -> Self {
        Self([n; 20])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_ids_are_stable() {
        assert_eq!(OrderId::deterministic(7, 3), OrderId::deterministic(7, 3));
        assert_ne!(OrderId::deterministic(7, 3), OrderId::deterministic(7, 4));
    }

    #[test]
    fn domains_separate_entity_kinds() {
        let order = OrderId::deterministic(1, 0);
        let trade = TradeId::deterministic(1, 0);
        assert_ne!(order.as_bytes(), trade.as_bytes());
    }

    #[test]
    fn ids_sort_by_height_then_sequence() {
        let a = OrderId::deterministic(5, 9);
        let b = OrderId::deterministic(6, 0);
        let c = OrderId::deterministic(6, 1);
        assert!(a < b && b < c);
        assert_eq!(b.height(), 6);
    }

    #[test]
    fn address_display_parse_roundtrip() {
        let addr = Address::dummy(0xab);
        let rendered = addr.to_string();
        assert!(rendered.starts_with("pm1abab"));
        assert_eq!(rendered.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn address_parse_rejects_garbage() {
        assert!("xx1abcd".parse::<Address>().is_err());
        assert!("pm1zz".parse::<Address>().is_err());
        assert!("pm1abcd".parse::<Address>().is_err());
    }

    #[test]
    fn custody_addresses_depend_on_subject() {
        let o1 = OrderId::deterministic(1, 0);
        let o2 = OrderId::deterministic(1, 1);
        assert_ne!(Address::custody_for_order(o1), Address::custody_for_order(o2));
        assert_eq!(Address::custody_for_order(o1), Address::custody_for_order(o1));
        assert_ne!(Address::module("fees"), Address::module("admin"));
    }

    #[test]
    fn address_from_verifying_key() {
        let key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let a = Address::from_verifying_key(&key.verifying_key());
        let b = Address::from_verifying_key(&key.verifying_key());
        assert_eq!(a, b);
    }

    #[test]
    fn address_serde_as_string() {
        let addr = Address::dummy(1);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{addr}\""));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
