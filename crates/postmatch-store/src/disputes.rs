//! Dispute records and the escrow-to-dispute lookup.

use postmatch_types::{Dispute, DisputeId, EscrowId, PostmatchError, Result};

use crate::keys;
use crate::kv::{KvStore, get_json, put_json};

pub fn put(store: &mut impl KvStore, dispute: &Dispute) -> Result<()> {
    put_json(store, &keys::dispute(&dispute.id), dispute)?;
    if let Some(escrow_id) = dispute.escrow_id {
        store.set(&keys::dispute_by_escrow(&escrow_id), dispute.id.as_bytes());
    }
    Ok(())
}

pub fn find(store: &impl KvStore, id: &DisputeId) -> Result<Option<Dispute>> {
    get_json(store, &keys::dispute(id))
}

pub fn get(store: &impl KvStore, id: &DisputeId) -> Result<Dispute> {
    find(store, id)?.ok_or(PostmatchError::DisputeNotFound(*id))
}

pub fn for_escrow(store: &impl KvStore, escrow_id: &EscrowId) -> Result<Option<Dispute>> {
    let Some(raw) = store.get(&keys::dispute_by_escrow(escrow_id)) else {
        return Ok(None);
    };
    let id: [u8; 16] = raw.as_slice().try_into().map_err(|_| PostmatchError::Storage {
        reason: "corrupt dispute lookup entry".into(),
    })?;
    get(store, &DisputeId::from_bytes(id)).map(Some)
}
