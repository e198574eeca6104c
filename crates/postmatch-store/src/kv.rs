//! Ordered key/value storage.
//!
//! [`KvStore`] is the authoritative state seen by the engine. Keys sort
//! lexicographically, which the key layout relies on for prefix scans and
//! bounded expiry ranges. A store supports one level of journaling: writes
//! made after [`KvStore::begin`] are undone by [`KvStore::rollback`] and kept
//! by [`KvStore::commit`].

use std::collections::BTreeMap;

use postmatch_types::{PostmatchError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

/// Key/value pairs returned by range scans, in key order.
pub type Entries = Vec<(Vec<u8>, Vec<u8>)>;

pub trait KvStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn set(&mut self, key: &[u8], value: &[u8]);

    fn delete(&mut self, key: &[u8]);

    /// Entries with `start <= key < end`; no upper bound when `end` is `None`.
    fn range(&self, start: &[u8], end: Option<&[u8]>) -> Entries;

    fn has(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Every entry whose key starts with `prefix`.
    fn scan_prefix(&self, prefix: &[u8]) -> Entries {
        let end = prefix_end(prefix);
        self.range(prefix, end.as_deref())
    }

    /// Start journaling writes.
    fn begin(&mut self) -> Result<()>;

    /// Keep every write since [`KvStore::begin`].
    fn commit(&mut self) -> Result<()>;

    /// Undo every write since [`KvStore::begin`].
    fn rollback(&mut self) -> Result<()>;
}

/// Smallest key greater than every key starting with `prefix`, or `None`
/// when the prefix is all `0xFF`.
#[must_use]
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

// =====================================================================
// JSON record codec
// =====================================================================

pub fn put_json<T: Serialize>(store: &mut impl KvStore, key: &[u8], value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.set(key, &bytes);
    Ok(())
}

pub fn get_json<T: DeserializeOwned>(store: &impl KvStore, key: &[u8]) -> Result<Option<T>> {
    store
        .get(key)
        .map(|bytes| serde_json::from_slice(&bytes))
        .transpose()
        .map_err(PostmatchError::from)
}

// =====================================================================
// MemStore
// =====================================================================

/// Prior value of a key, captured on write while journaling.
type UndoEntry = (Vec<u8>, Option<Vec<u8>>);

/// In-memory [`KvStore`] backed by a `BTreeMap`.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    journal: Option<Vec<UndoEntry>>,
}

impl MemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn in_journal(&self) -> bool {
        self.journal.is_some()
    }

    /// SHA-256 over every key/value pair in key order. Two replicas that
    /// executed the same blocks have the same digest.
    #[must_use]
    pub fn state_digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"postmatch:state:v1:");
        for (key, value) in &self.data {
            hasher.update((key.len() as u64).to_be_bytes());
            hasher.update(key);
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value);
        }
        hasher.finalize().into()
    }

    #[must_use]
    pub fn state_digest_hex(&self) -> String {
        hex::encode(self.state_digest())
    }

    fn record_undo(&mut self, key: &[u8]) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push((key.to_vec(), self.data.get(key).cloned()));
        }
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.record_undo(key);
        self.data.insert(key.to_vec(), value.to_vec());
    }

    fn delete(&mut self, key: &[u8]) {
        if self.data.contains_key(key) {
            self.record_undo(key);
            self.data.remove(key);
        }
    }

    fn range(&self, start: &[u8], end: Option<&[u8]>) -> Entries {
        if end.is_some_and(|end| end <= start) {
            return Vec::new();
        }
        let iter = self.data.range::<[u8], _>((
            std::ops::Bound::Included(start),
            end.map_or(std::ops::Bound::Unbounded, std::ops::Bound::Excluded),
        ));
        iter.map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    fn begin(&mut self) -> Result<()> {
        if self.journal.is_some() {
            return Err(PostmatchError::Storage {
                reason: "journal already open".into(),
            });
        }
        self.journal = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.journal
            .take()
            .map(drop)
            .ok_or_else(|| PostmatchError::Storage {
                reason: "commit without open journal".into(),
            })
    }

    fn rollback(&mut self) -> Result<()> {
        let journal = self.journal.take().ok_or_else(|| PostmatchError::Storage {
            reason: "rollback without open journal".into(),
        })?;
        for (key, prior) in journal.into_iter().rev() {
            match prior {
                Some(value) => {
                    self.data.insert(key, value);
                }
                None => {
                    self.data.remove(&key);
                }
            }
        }
        Ok(())
    }
}
