//! Trade records, the per-user trade index, and the settlement-window queue.

use chrono::{DateTime, Utc};
use postmatch_types::{Address, PostmatchError, Result, Trade, TradeId, millis};

use crate::keys::{self, MARKER};
use crate::kv::{KvStore, get_json, put_json};

/// Queue entry only while the trade still awaits settlement.
fn window_key(trade: &Trade) -> Option<Vec<u8>> {
    trade
        .status
        .is_open()
        .then(|| keys::trade_expiry(millis(trade.expires_at), &trade.id))
}

pub fn put(store: &mut impl KvStore, trade: &Trade) -> Result<()> {
    if let Some(key) = find(store, &trade.id)?.as_ref().and_then(window_key) {
        store.delete(&key);
    }
    put_json(store, &keys::trade(&trade.id), trade)?;
    store.set(&keys::trade_by_user(&trade.buyer, &trade.id), MARKER);
    store.set(&keys::trade_by_user(&trade.seller, &trade.id), MARKER);
    if let Some(key) = window_key(trade) {
        store.set(&key, MARKER);
    }
    Ok(())
}

pub fn find(store: &impl KvStore, id: &TradeId) -> Result<Option<Trade>> {
    get_json(store, &keys::trade(id))
}

pub fn get(store: &impl KvStore, id: &TradeId) -> Result<Trade> {
    find(store, id)?.ok_or(PostmatchError::TradeNotFound(*id))
}

/// Trades where `user` is buyer or seller, oldest first.
pub fn by_user(store: &impl KvStore, user: &Address) -> Result<Vec<Trade>> {
    store
        .scan_prefix(&keys::trade_user_prefix(user))
        .into_iter()
        .filter_map(|(key, _)| keys::trailing_id(&key))
        .map(|id| get(store, &TradeId::from_bytes(id)))
        .collect()
}

/// Open trades whose settlement window closed before `now`.
pub fn overdue(store: &impl KvStore, now: DateTime<Utc>) -> Vec<TradeId> {
    let (start, end) = keys::expired_range(keys::TRADE_EXPIRY, millis(now));
    store
        .range(&start, Some(&end))
        .into_iter()
        .filter_map(|(key, _)| keys::trailing_id(&key))
        .map(TradeId::from_bytes)
        .collect()
}

/// Drop a trade from the settlement-window queue without touching the record.
pub fn dequeue(store: &mut impl KvStore, trade: &Trade) {
    store.delete(&keys::trade_expiry(millis(trade.expires_at), &trade.id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemStore;
    use postmatch_types::{OrderId, PaymentMethod, PaymentMethodType, TradeStatus};
    use rust_decimal::Decimal;

    fn make_trade(seq: u32) -> Trade {
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        Trade {
            id: TradeId::deterministic(1, seq),
            buy_order_id: OrderId::deterministic(1, 100),
            sell_order_id: OrderId::deterministic(1, 101),
            buyer: Address::dummy(2),
            seller: Address::dummy(1),
            amount: Decimal::new(1000, 0),
            fiat_amount: Decimal::new(80_000, 0),
            fiat_currency: "INR".into(),
            payment_method: PaymentMethod::new(PaymentMethodType::Upi, ""),
            escrow_address: Address::dummy(9),
            status: TradeStatus::Matched,
            created_at: now,
            expires_at: now + chrono::Duration::hours(2),
            payment_sent_at: None,
            closed_at: None,
        }
    }

    #[test]
    fn indexed_for_both_parties() {
        let mut store = MemStore::new();
        let trade = make_trade(0);
        put(&mut store, &trade).unwrap();
        assert_eq!(by_user(&store, &Address::dummy(1)).unwrap(), vec![trade.clone()]);
        assert_eq!(by_user(&store, &Address::dummy(2)).unwrap(), vec![trade]);
        assert!(by_user(&store, &Address::dummy(3)).unwrap().is_empty());
    }

    #[test]
    fn closed_trade_leaves_window_queue() {
        let mut store = MemStore::new();
        let mut trade = make_trade(0);
        put(&mut store, &trade).unwrap();
        let late = trade.expires_at + chrono::Duration::seconds(1);
        assert_eq!(overdue(&store, late), vec![trade.id]);
        assert!(overdue(&store, trade.expires_at).is_empty());

        trade.transition_to(TradeStatus::Completed).unwrap();
        put(&mut store, &trade).unwrap();
        assert!(overdue(&store, late).is_empty());
    }

    #[test]
    fn missing_trade_is_not_found() {
        let store = MemStore::new();
        assert!(get(&store, &TradeId::deterministic(1, 1)).unwrap_err().is_not_found());
    }
}
