//! Escrow records, their subject lookups, and the escrow expiry queue.
//!
//! An escrow sits in the expiry queue while it is `ACTIVE` with an expiry
//! set. Writing it in any other state removes the entry, so a released,
//! refunded or disputed escrow is never swept.

use chrono::{DateTime, Utc};
use postmatch_types::{Escrow, EscrowId, EscrowStatus, EscrowSubject, OrderId, PostmatchError, Result, TradeId, millis};

use crate::keys;
use crate::kv::{KvStore, get_json, put_json};

fn expiry_key(escrow: &Escrow) -> Option<Vec<u8>> {
    match (escrow.status, escrow.expires_at) {
        (EscrowStatus::Active, Some(at)) => Some(keys::escrow_expiry(millis(at), &escrow.id)),
        _ => None,
    }
}

fn subject_key(subject: &EscrowSubject) -> Vec<u8> {
    match subject {
        EscrowSubject::Order(id) => keys::escrow_by_order(id),
        EscrowSubject::Trade(id) => keys::escrow_by_trade(id),
    }
}

/// An escrow queued for expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryEntry {
    pub key: Vec<u8>,
    pub escrow_id: EscrowId,
    pub expires_at_millis: u64,
}

pub fn put(store: &mut impl KvStore, escrow: &Escrow) -> Result<()> {
    if let Some(key) = find(store, &escrow.id)?.as_ref().and_then(expiry_key) {
        store.delete(&key);
    }
    put_json(store, &keys::escrow(&escrow.id), escrow)?;
    store.set(&subject_key(&escrow.subject), escrow.id.as_bytes());
    if let Some(key) = expiry_key(escrow) {
        store.set(&key, keys::MARKER);
    }
    Ok(())
}

pub fn find(store: &impl KvStore, id: &EscrowId) -> Result<Option<Escrow>> {
    get_json(store, &keys::escrow(id))
}

pub fn get(store: &impl KvStore, id: &EscrowId) -> Result<Escrow> {
    find(store, id)?.ok_or(PostmatchError::EscrowNotFound(*id))
}

fn lookup(store: &impl KvStore, key: &[u8]) -> Result<Option<Escrow>> {
    let Some(raw) = store.get(key) else {
        return Ok(None);
    };
    let id: [u8; 16] = raw.as_slice().try_into().map_err(|_| PostmatchError::Storage {
        reason: "corrupt escrow lookup entry".into(),
    })?;
    get(store, &EscrowId::from_bytes(id)).map(Some)
}

pub fn for_order(store: &impl KvStore, order_id: &OrderId) -> Result<Option<Escrow>> {
    lookup(store, &keys::escrow_by_order(order_id))
}

pub fn for_trade(store: &impl KvStore, trade_id: &TradeId) -> Result<Option<Escrow>> {
    lookup(store, &keys::escrow_by_trade(trade_id))
}

/// Queue entries expiring strictly before `now`, earliest first.
pub fn expired(store: &impl KvStore, now: DateTime<Utc>) -> Vec<ExpiryEntry> {
    let (start, end) = keys::expired_range(keys::ESCROW_EXPIRY, millis(now));
    store
        .range(&start, Some(&end))
        .into_iter()
        .filter_map(|(key, _)| {
            let id = keys::trailing_id(&key)?;
            let at = keys::expiry_millis(&key)?;
            Some(ExpiryEntry {
                escrow_id: EscrowId::from_bytes(id),
                expires_at_millis: at,
                key,
            })
        })
        .collect()
}

/// Every escrow record, in id order.
pub fn all(store: &impl KvStore) -> Result<Vec<Escrow>> {
    store
        .scan_prefix(&[keys::ESCROW])
        .into_iter()
        .map(|(_, raw)| serde_json::from_slice(&raw).map_err(PostmatchError::from))
        .collect()
}
