//! Persisted key layout.
//!
//! Primary records live under one prefix byte per entity. Secondary indexes
//! map `prefix ‖ derived key ‖ id` to [`MARKER`] and are read by prefix
//! scan. Expiry queues embed the big-endian expiry in milliseconds so a
//! range scan up to "now" touches only expired entries.
//!
//! String buckets are length-prefixed so `"1100"` never scans into `"11001"`.

use postmatch_types::{Address, DisputeId, EscrowId, OrderId, OrderSide, TradeId};

pub const ORDER: u8 = 0x50;
pub const TRADE: u8 = 0x51;
pub const ESCROW: u8 = 0x53;
pub const DISPUTE: u8 = 0x54;
pub const STATS: u8 = 0x55;
pub const KYC: u8 = 0x56;
pub const ESCROW_BY_ORDER: u8 = 0x57;
pub const ESCROW_BY_TRADE: u8 = 0x58;
pub const DISPUTE_BY_ESCROW: u8 = 0x59;
pub const ESCROW_EXPIRY: u8 = 0x5A;
pub const ORDER_EXPIRY: u8 = 0x5B;
pub const ORDER_BY_TYPE: u8 = 0x5C;
pub const ORDER_BY_POSTAL: u8 = 0x5D;
pub const ORDER_BY_DISTRICT: u8 = 0x5E;
pub const ORDER_BY_STATE: u8 = 0x5F;
pub const ORDER_BY_CREATOR: u8 = 0x60;
pub const TRADE_BY_USER: u8 = 0x61;
pub const TRADE_EXPIRY: u8 = 0x62;
pub const META: u8 = 0x6F;

/// Value of every index entry.
pub const MARKER: &[u8] = &[0x01];

/// Length of an entity id suffix.
pub const ID_LEN: usize = 16;

fn key(prefix: u8, parts: &[&[u8]]) -> Vec<u8> {
    let len = 1 + parts.iter().map(|p| p.len()).sum::<usize>();
    let mut out = Vec::with_capacity(len);
    out.push(prefix);
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}

/// `prefix ‖ varint length ‖ bytes`. The LEB128 length is self-delimiting,
/// so no two names share a bucket whatever their length.
fn bucket(prefix: u8, name: &str) -> Vec<u8> {
    let bytes = name.as_bytes();
    key(prefix, &[&varint(bytes.len()), bytes])
}

#[allow(clippy::cast_possible_truncation)]
fn varint(mut n: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(2);
    loop {
        let low = (n & 0x7F) as u8;
        n >>= 7;
        if n == 0 {
            out.push(low);
            return out;
        }
        out.push(low | 0x80);
    }
}

fn with_id(mut prefix: Vec<u8>, id: &[u8; ID_LEN]) -> Vec<u8> {
    prefix.extend_from_slice(id);
    prefix
}

/// Trailing 16-byte id of an index key.
#[must_use]
pub fn trailing_id(key: &[u8]) -> Option<[u8; ID_LEN]> {
    let start = key.len().checked_sub(ID_LEN)?;
    key[start..].try_into().ok()
}

/// Expiry embedded after the prefix byte of an expiry-queue key.
#[must_use]
pub fn expiry_millis(key: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = key.get(1..9)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// `[prefix, prefix ‖ be(now))`: every queued entry expiring strictly
/// before `now_millis`.
#[must_use]
pub fn expired_range(prefix: u8, now_millis: u64) -> (Vec<u8>, Vec<u8>) {
    (vec![prefix], key(prefix, &[&now_millis.to_be_bytes()]))
}

// =====================================================================
// Primary records
// =====================================================================

#[must_use]
pub fn order(id: &OrderId) -> Vec<u8> {
    key(ORDER, &[id.as_bytes()])
}

#[must_use]
pub fn trade(id: &TradeId) -> Vec<u8> {
    key(TRADE, &[id.as_bytes()])
}

#[must_use]
pub fn escrow(id: &EscrowId) -> Vec<u8> {
    key(ESCROW, &[id.as_bytes()])
}

#[must_use]
pub fn dispute(id: &DisputeId) -> Vec<u8> {
    key(DISPUTE, &[id.as_bytes()])
}

#[must_use]
pub fn stats(who: &Address) -> Vec<u8> {
    key(STATS, &[who.as_bytes()])
}

#[must_use]
pub fn kyc(who: &Address) -> Vec<u8> {
    key(KYC, &[who.as_bytes()])
}

#[must_use]
pub fn meta(name: &str) -> Vec<u8> {
    key(META, &[name.as_bytes()])
}

// =====================================================================
// Lookups
// =====================================================================

#[must_use]
pub fn escrow_by_order(id: &OrderId) -> Vec<u8> {
    key(ESCROW_BY_ORDER, &[id.as_bytes()])
}

#[must_use]
pub fn escrow_by_trade(id: &TradeId) -> Vec<u8> {
    key(ESCROW_BY_TRADE, &[id.as_bytes()])
}

#[must_use]
pub fn dispute_by_escrow(id: &EscrowId) -> Vec<u8> {
    key(DISPUTE_BY_ESCROW, &[id.as_bytes()])
}

// =====================================================================
// Order indexes
// =====================================================================

#[must_use]
pub fn order_type_prefix(side: OrderSide) -> Vec<u8> {
    key(ORDER_BY_TYPE, &[&[side.as_byte()]])
}

#[must_use]
pub fn order_by_type(side: OrderSide, id: &OrderId) -> Vec<u8> {
    with_id(order_type_prefix(side), id.as_bytes())
}

#[must_use]
pub fn postal_prefix(postal_code: &str) -> Vec<u8> {
    bucket(ORDER_BY_POSTAL, postal_code)
}

#[must_use]
pub fn order_by_postal(postal_code: &str, id: &OrderId) -> Vec<u8> {
    with_id(postal_prefix(postal_code), id.as_bytes())
}

#[must_use]
pub fn district_prefix(district: &str) -> Vec<u8> {
    bucket(ORDER_BY_DISTRICT, district)
}

#[must_use]
pub fn order_by_district(district: &str, id: &OrderId) -> Vec<u8> {
    with_id(district_prefix(district), id.as_bytes())
}

#[must_use]
pub fn state_prefix(state: &str) -> Vec<u8> {
    bucket(ORDER_BY_STATE, state)
}

#[must_use]
pub fn order_by_state(state: &str, id: &OrderId) -> Vec<u8> {
    with_id(state_prefix(state), id.as_bytes())
}

#[must_use]
pub fn creator_prefix(creator: &Address) -> Vec<u8> {
    key(ORDER_BY_CREATOR, &[creator.as_bytes()])
}

#[must_use]
pub fn order_by_creator(creator: &Address, id: &OrderId) -> Vec<u8> {
    with_id(creator_prefix(creator), id.as_bytes())
}

// =====================================================================
// Expiry queues
// =====================================================================

#[must_use]
pub fn order_expiry(millis: u64, id: &OrderId) -> Vec<u8> {
    key(ORDER_EXPIRY, &[&millis.to_be_bytes(), id.as_bytes()])
}

#[must_use]
pub fn escrow_expiry(millis: u64, id: &EscrowId) -> Vec<u8> {
    key(ESCROW_EXPIRY, &[&millis.to_be_bytes(), id.as_bytes()])
}

#[must_use]
pub fn trade_expiry(millis: u64, id: &TradeId) -> Vec<u8> {
    key(TRADE_EXPIRY, &[&millis.to_be_bytes(), id.as_bytes()])
}

// =====================================================================
// Trade indexes
// =====================================================================

#[must_use]
pub fn trade_user_prefix(user: &Address) -> Vec<u8> {
    key(TRADE_BY_USER, &[user.as_bytes()])
}

#[must_use]
pub fn trade_by_user(user: &Address, id: &TradeId) -> Vec<u8> {
    with_id(trade_user_prefix(user), id.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_are_length_prefixed() {
        let short = postal_prefix("1100");
        let long = postal_prefix("110001");
        assert!(!long.starts_with(&short));
        assert_eq!(&short[..2], &[ORDER_BY_POSTAL, 4]);
    }

    #[test]
    fn oversized_names_keep_their_own_bucket() {
        let base = "7".repeat(usize::from(u16::MAX));
        let a = state_prefix(&format!("{base}A"));
        let b = state_prefix(&format!("{base}B"));
        assert_ne!(a, b);
        assert_eq!(a.len(), 1 + 3 + base.len() + 1);
        assert!(!a.starts_with(&state_prefix(&base)));
        assert_eq!(varint(300), vec![0xAC, 0x02]);
    }

    #[test]
    fn trailing_id_roundtrip() {
        let id = OrderId::deterministic(7, 3);
        let k = order_by_postal("110001", &id);
        assert_eq!(trailing_id(&k), Some(*id.as_bytes()));
        assert_eq!(trailing_id(&[1, 2, 3]), None);
    }

    #[test]
    fn expiry_keys_sort_by_time() {
        let a = EscrowId::deterministic(1, 9);
        let b = EscrowId::deterministic(1, 0);
        let early = escrow_expiry(1_000, &a);
        let late = escrow_expiry(2_000, &b);
        assert!(early < late);
        assert_eq!(expiry_millis(&early), Some(1_000));

        let (start, end) = expired_range(ESCROW_EXPIRY, 2_000);
        assert!(early >= start && early < end);
        assert!(late >= end, "entry expiring exactly at now is not expired");
    }

    #[test]
    fn sides_do_not_share_type_bucket() {
        let id = OrderId::deterministic(1, 1);
        let buy = order_by_type(OrderSide::Buy, &id);
        assert!(buy.starts_with(&order_type_prefix(OrderSide::Buy)));
        assert!(!buy.starts_with(&order_type_prefix(OrderSide::Sell)));
    }
}
