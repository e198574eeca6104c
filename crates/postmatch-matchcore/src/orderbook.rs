//! The live candidate book.
//!
//! Holds every `ACTIVE` order and three geographic indexes keyed by
//! `(side, bucket)`:
//! - **Postal**: `BTreeMap<(OrderSide, String), BTreeSet<OrderId>>`
//! - **District** and **State**: same shape, coarser buckets
//!
//! The book is a derived cache over the persisted order store. It is built
//! only from orders and holds no other state, so [`LiveBook::rebuild`] over
//! the persisted orders reproduces it exactly, including iteration order.

use std::collections::{BTreeMap, BTreeSet};

use postmatch_types::{Order, OrderId, OrderSide};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::price_level::{DepthLevel, MarketDepth};

type BucketIndex = BTreeMap<(OrderSide, String), BTreeSet<OrderId>>;

/// In-memory index of matchable orders.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LiveBook {
    orders: BTreeMap<OrderId, Order>,
    by_postal: BucketIndex,
    by_district: BucketIndex,
    by_state: BucketIndex,
}

/// Live order counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BookStats {
    pub buy_orders: usize,
    pub sell_orders: usize,
    /// `(currency, side) -> count`
    pub by_currency: BTreeMap<String, (usize, usize)>,
}

impl LiveBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a book from persisted orders; non-active orders are skipped.
    pub fn rebuild(orders: impl IntoIterator<Item = Order>) -> Self {
        let mut book = Self::new();
        for order in orders {
            book.upsert(order);
        }
        book
    }

    // =================================================================
    // Maintenance
    // =================================================================

    /// Insert or refresh `order`. Orders that are not `ACTIVE` are removed.
    pub fn upsert(&mut self, order: Order) {
        self.remove(&order.id);
        if !order.is_active() {
            return;
        }
        let id = order.id;
        let side = order.side;
        add(&mut self.by_postal, side, &order.location.postal_code, id);
        add(&mut self.by_district, side, &order.location.district, id);
        add(&mut self.by_state, side, &order.location.state, id);
        self.orders.insert(id, order);
    }

    /// Remove an order and its index entries. Returns the removed order.
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Order> {
        let order = self.orders.remove(order_id)?;
        let side = order.side;
        drop_entry(&mut self.by_postal, side, &order.location.postal_code, order_id);
        drop_entry(&mut self.by_district, side, &order.location.district, order_id);
        drop_entry(&mut self.by_state, side, &order.location.state, order_id);
        Some(order)
    }

    // =================================================================
    // Queries
    // =================================================================

    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    #[must_use]
    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.orders.contains_key(order_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// All live orders in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn by_postal_code<'a>(
        &'a self,
        side: OrderSide,
        postal_code: &str,
    ) -> impl Iterator<Item = &'a Order> + 'a {
        self.bucket(&self.by_postal, side, postal_code)
    }

    pub fn by_district<'a>(
        &'a self,
        side: OrderSide,
        district: &str,
    ) -> impl Iterator<Item = &'a Order> + 'a {
        self.bucket(&self.by_district, side, district)
    }

    pub fn by_state<'a>(
        &'a self,
        side: OrderSide,
        state: &str,
    ) -> impl Iterator<Item = &'a Order> + 'a {
        self.bucket(&self.by_state, side, state)
    }

    fn bucket<'a>(
        &'a self,
        index: &'a BucketIndex,
        side: OrderSide,
        key: &str,
    ) -> impl Iterator<Item = &'a Order> + 'a {
        index
            .get(&(side, key.to_string()))
            .into_iter()
            .flatten()
            .filter_map(|id| self.orders.get(id))
    }

    #[must_use]
    pub fn stats(&self) -> BookStats {
        let mut stats = BookStats::default();
        for order in self.orders.values() {
            let entry = stats
                .by_currency
                .entry(order.fiat_currency.clone())
                .or_insert((0, 0));
            match order.side {
                OrderSide::Buy => {
                    stats.buy_orders += 1;
                    entry.0 += 1;
                }
                OrderSide::Sell => {
                    stats.sell_orders += 1;
                    entry.1 += 1;
                }
            }
        }
        stats
    }

    /// Live orders for `currency` aggregated by rate. Bids are listed
    /// highest rate first, asks lowest first.
    #[must_use]
    pub fn depth(&self, currency: &str) -> MarketDepth {
        let mut bids: BTreeMap<Decimal, DepthLevel> = BTreeMap::new();
        let mut asks: BTreeMap<Decimal, DepthLevel> = BTreeMap::new();
        for order in self
            .orders
            .values()
            .filter(|o| o.fiat_currency == currency)
        {
            let rate = order.rate();
            let levels = match order.side {
                OrderSide::Buy => &mut bids,
                OrderSide::Sell => &mut asks,
            };
            levels
                .entry(rate)
                .or_insert_with(|| DepthLevel::new(rate))
                .add(order.effective_range().max);
        }
        MarketDepth {
            currency: currency.to_string(),
            bids: bids.into_values().rev().collect(),
            asks: asks.into_values().collect(),
        }
    }
}

fn add(index: &mut BucketIndex, side: OrderSide, key: &str, id: OrderId) {
    index.entry((side, key.to_string())).or_default().insert(id);
}

fn drop_entry(index: &mut BucketIndex, side: OrderSide, key: &str, id: &OrderId) {
    let bucket_key = (side, key.to_string());
    if let Some(bucket) = index.get_mut(&bucket_key) {
        bucket.remove(id);
        if bucket.is_empty() {
            index.remove(&bucket_key);
        }
    }
}

// =====================================================================
// Tests
// =====================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use postmatch_types::{Address, OrderStatus};

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn upsert_indexes_all_buckets() {
        let mut book = LiveBook::new();
        book.upsert(Order::dummy_sell(0, Address::dummy(1), "110001", dec(1000)));

        assert_eq!(book.len(), 1);
        assert_eq!(book.by_postal_code(OrderSide::Sell, "110001").count(), 1);
        assert_eq!(book.by_district(OrderSide::Sell, "District-110").count(), 1);
        assert_eq!(book.by_state(OrderSide::Sell, "Delhi").count(), 1);
        assert_eq!(book.by_postal_code(OrderSide::Buy, "110001").count(), 0);
    }

    #[test]
    fn non_active_orders_leave_the_book() {
        let mut book = LiveBook::new();
        let mut order = Order::dummy_sell(0, Address::dummy(1), "110001", dec(1000));
        book.upsert(order.clone());
        order.status = OrderStatus::Matched;
        book.upsert(order);
        assert!(book.is_empty());
        assert_eq!(book.by_state(OrderSide::Sell, "Delhi").count(), 0);
        assert_eq!(book, LiveBook::new());
    }

    #[test]
    fn absent_bucket_is_empty() {
        let book = LiveBook::new();
        assert_eq!(book.by_postal_code(OrderSide::Buy, "999999").count(), 0);
    }

    #[test]
    fn rebuild_matches_incremental() {
        let orders: Vec<Order> = (0..20)
            .map(|i| {
                let code = if i % 2 == 0 { "110001" } else { "110045" };
                let mut o = Order::dummy_buy(i, Address::dummy(1), code, dec(100));
                if i % 5 == 0 {
                    o.status = OrderStatus::Pending;
                }
                o
            })
            .collect();

        let mut incremental = LiveBook::new();
        for o in orders.iter().rev() {
            incremental.upsert(o.clone());
        }
        let rebuilt = LiveBook::rebuild(orders);
        assert_eq!(incremental, rebuilt);
        assert_eq!(rebuilt.len(), 16);
    }

    #[test]
    fn depth_orders_levels() {
        let mut book = LiveBook::new();
        book.upsert(Order::dummy(0, Address::dummy(1), OrderSide::Buy, "110001", dec(10), dec(79)));
        book.upsert(Order::dummy(1, Address::dummy(1), OrderSide::Buy, "110001", dec(10), dec(81)));
        book.upsert(Order::dummy(2, Address::dummy(1), OrderSide::Buy, "110001", dec(5), dec(81)));
        book.upsert(Order::dummy(3, Address::dummy(2), OrderSide::Sell, "110001", dec(7), dec(82)));

        let depth = book.depth("INR");
        assert_eq!(depth.bids.len(), 2);
        assert_eq!(depth.bids[0].rate, dec(81));
        assert_eq!(depth.bids[0].total_amount, dec(15));
        assert_eq!(depth.bids[0].order_count, 2);
        assert_eq!(depth.asks[0].rate, dec(82));
        assert!(book.depth("USD").bids.is_empty());

        let stats = book.stats();
        assert_eq!(stats.buy_orders, 3);
        assert_eq!(stats.sell_orders, 1);
        assert_eq!(stats.by_currency["INR"], (3, 1));
    }
}
