//! Order book: persisted orders, their secondary indexes, and the live
//! candidate cache.
//!
//! The store is authoritative. The [`LiveBook`] is rebuilt from it with
//! [`OrderBook::rebuild`] at start-up and after a rolled-back command; every
//! [`OrderBook::put`] keeps the two in step.
//!
//! Index keys are produced by one function, [`index_keys`], for both insert
//! and delete, so removing an order always clears exactly the keys that
//! storing it wrote.

use chrono::{DateTime, Utc};
use postmatch_matchcore::LiveBook;
use postmatch_types::{Address, Order, OrderId, OrderSide, OrderStatus, PostmatchError, Result, millis};

use crate::keys::{self, MARKER};
use crate::kv::{KvStore, get_json, put_json};

/// Every index key `order` occupies in its current state.
///
/// The expiry entry exists only while the order is `PENDING` or `ACTIVE`.
#[must_use]
pub fn index_keys(order: &Order) -> Vec<Vec<u8>> {
    let location = &order.location;
    let mut out = vec![
        keys::order_by_type(order.side, &order.id),
        keys::order_by_postal(&location.postal_code, &order.id),
        keys::order_by_district(&location.district, &order.id),
        keys::order_by_state(&location.state, &order.id),
        keys::order_by_creator(&order.creator, &order.id),
    ];
    if matches!(order.status, OrderStatus::Pending | OrderStatus::Active) {
        out.push(keys::order_expiry(millis(order.expires_at), &order.id));
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    live: LiveBook,
}

impl OrderBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the book from every persisted order.
    pub fn load(store: &impl KvStore) -> Result<Self> {
        let mut book = Self::new();
        book.rebuild(store)?;
        Ok(book)
    }

    /// Discard the live cache and repopulate it from the store.
    pub fn rebuild(&mut self, store: &impl KvStore) -> Result<()> {
        let orders = store
            .scan_prefix(&[keys::ORDER])
            .into_iter()
            .map(|(_, raw)| serde_json::from_slice::<Order>(&raw).map_err(PostmatchError::from))
            .collect::<Result<Vec<_>>>()?;
        self.live = LiveBook::rebuild(orders);
        tracing::debug!(live = self.live.len(), "live book rebuilt");
        Ok(())
    }

    /// Live orders available for matching.
    #[must_use]
    pub fn live(&self) -> &LiveBook {
        &self.live
    }

    // =================================================================
    // Writes
    // =================================================================

    /// Write the record and its indexes, replacing any previous version.
    pub fn put(&mut self, store: &mut impl KvStore, order: &Order) -> Result<()> {
        if let Some(previous) = self.find(store, &order.id)? {
            for key in index_keys(&previous) {
                store.delete(&key);
            }
        }
        put_json(store, &keys::order(&order.id), order)?;
        for key in index_keys(order) {
            store.set(&key, MARKER);
        }
        self.live.upsert(order.clone());
        tracing::debug!(order = %order.id, status = %order.status, "order stored");
        Ok(())
    }

    /// Remove the record and every index key it wrote.
    pub fn delete(&mut self, store: &mut impl KvStore, order_id: &OrderId) -> Result<Order> {
        let order = self.get(store, order_id)?;
        for key in index_keys(&order) {
            store.delete(&key);
        }
        store.delete(&keys::order(order_id));
        self.live.remove(order_id);
        Ok(order)
    }

    // =================================================================
    // Reads
    // =================================================================

    pub fn find(&self, store: &impl KvStore, order_id: &OrderId) -> Result<Option<Order>> {
        get_json(store, &keys::order(order_id))
    }

    pub fn get(&self, store: &impl KvStore, order_id: &OrderId) -> Result<Order> {
        self.find(store, order_id)?
            .ok_or(PostmatchError::OrderNotFound(*order_id))
    }

    pub fn query_by_type(&self, store: &impl KvStore, side: OrderSide) -> Result<Vec<Order>> {
        self.load_indexed(store, &keys::order_type_prefix(side))
    }

    pub fn query_by_postal_code(&self, store: &impl KvStore, postal_code: &str) -> Result<Vec<Order>> {
        self.load_indexed(store, &keys::postal_prefix(postal_code))
    }

    pub fn query_by_district(&self, store: &impl KvStore, district: &str) -> Result<Vec<Order>> {
        self.load_indexed(store, &keys::district_prefix(district))
    }

    pub fn query_by_state(&self, store: &impl KvStore, state: &str) -> Result<Vec<Order>> {
        self.load_indexed(store, &keys::state_prefix(state))
    }

    pub fn query_by_user(&self, store: &impl KvStore, creator: &Address) -> Result<Vec<Order>> {
        self.load_indexed(store, &keys::creator_prefix(creator))
    }

    /// `ACTIVE` orders whose expiry is before `now`.
    pub fn query_expired(&self, store: &impl KvStore, now: DateTime<Utc>) -> Result<Vec<Order>> {
        Ok(self
            .query_lapsed(store, now)?
            .into_iter()
            .filter(Order::is_active)
            .collect())
    }

    /// `PENDING` or `ACTIVE` orders whose expiry is before `now`, in expiry
    /// order.
    pub fn query_lapsed(&self, store: &impl KvStore, now: DateTime<Utc>) -> Result<Vec<Order>> {
        let (start, end) = keys::expired_range(keys::ORDER_EXPIRY, millis(now));
        store
            .range(&start, Some(&end))
            .into_iter()
            .filter_map(|(key, _)| keys::trailing_id(&key))
            .map(|id| self.get(store, &OrderId::from_bytes(id)))
            .collect()
    }

    fn load_indexed(&self, store: &impl KvStore, prefix: &[u8]) -> Result<Vec<Order>> {
        store
            .scan_prefix(prefix)
            .into_iter()
            .filter_map(|(key, _)| keys::trailing_id(&key))
            .map(|id| self.get(store, &OrderId::from_bytes(id)))
            .collect()
    }
}
