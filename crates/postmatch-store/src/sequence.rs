//! Per-block id sequence.
//!
//! Every id issued in a block takes the next value of a counter that resets
//! when the height changes. The counter is persisted under the meta prefix,
//! so it is journaled and rolled back with the command that consumed it.

use postmatch_types::{DisputeId, EscrowId, OrderId, PostmatchError, Result, TradeId};

use crate::keys;
use crate::kv::KvStore;

const SEQ_KEY: &str = "seq";

/// Next sequence number for `height`.
pub fn next_sequence(store: &mut impl KvStore, height: u64) -> Result<u32> {
    let key = keys::meta(SEQ_KEY);
    let next = match store.get(&key) {
        None => 0,
        Some(raw) => {
            let (stored_height, stored_seq) = decode(&raw)?;
            if stored_height == height {
                stored_seq.checked_add(1).ok_or_else(|| PostmatchError::Storage {
                    reason: format!("id sequence exhausted at height {height}"),
                })?
            } else {
                0
            }
        }
    };
    store.set(&key, &encode(height, next));
    Ok(next)
}

pub fn next_order_id(store: &mut impl KvStore, height: u64) -> Result<OrderId> {
    Ok(OrderId::deterministic(height, next_sequence(store, height)?))
}

pub fn next_trade_id(store: &mut impl KvStore, height: u64) -> Result<TradeId> {
    Ok(TradeId::deterministic(height, next_sequence(store, height)?))
}

pub fn next_escrow_id(store: &mut impl KvStore, height: u64) -> Result<EscrowId> {
    Ok(EscrowId::deterministic(height, next_sequence(store, height)?))
}

pub fn next_dispute_id(store: &mut impl KvStore, height: u64) -> Result<DisputeId> {
    Ok(DisputeId::deterministic(height, next_sequence(store, height)?))
}

fn encode(height: u64, seq: u32) -> [u8; 12] {
    let mut out = [0u8; 12];
    out[..8].copy_from_slice(&height.to_be_bytes());
    out[8..].copy_from_slice(&seq.to_be_bytes());
    out
}

fn decode(raw: &[u8]) -> Result<(u64, u32)> {
    let corrupt = || PostmatchError::Storage {
        reason: format!("corrupt id sequence ({} bytes)", raw.len()),
    };
    let height: [u8; 8] = raw.get(..8).and_then(|b| b.try_into().ok()).ok_or_else(corrupt)?;
    let seq: [u8; 4] = raw.get(8..12).and_then(|b| b.try_into().ok()).ok_or_else(corrupt)?;
    Ok((u64::from_be_bytes(height), u32::from_be_bytes(seq)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemStore;

    #[test]
    fn counts_within_block_and_resets() {
        let mut store = MemStore::new();
        assert_eq!(next_sequence(&mut store, 5).unwrap(), 0);
        assert_eq!(next_sequence(&mut store, 5).unwrap(), 1);
        assert_eq!(next_sequence(&mut store, 5).unwrap(), 2);
        assert_eq!(next_sequence(&mut store, 6).unwrap(), 0);
    }

    #[test]
    fn ids_are_distinct_across_kinds() {
        let mut store = MemStore::new();
        let order = next_order_id(&mut store, 1).unwrap();
        let escrow = next_escrow_id(&mut store, 1).unwrap();
        assert_ne!(order.as_bytes(), escrow.as_bytes());
        assert_eq!(order.height(), 1);
    }

    #[test]
    fn rollback_rewinds_sequence() {
        let mut store = MemStore::new();
        next_sequence(&mut store, 1).unwrap();
        store.begin().unwrap();
        assert_eq!(next_sequence(&mut store, 1).unwrap(), 1);
        store.rollback().unwrap();
        assert_eq!(next_sequence(&mut store, 1).unwrap(), 1);
    }

    #[test]
    fn corrupt_counter_is_an_error() {
        let mut store = MemStore::new();
        store.set(&keys::meta(SEQ_KEY), &[1, 2, 3]);
        assert!(matches!(
            next_sequence(&mut store, 1),
            Err(PostmatchError::Storage { .. })
        ));
    }
}
