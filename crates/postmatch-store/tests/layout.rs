//! Store layout checks across record kinds.

use postmatch_store::{KvStore, MemStore, OrderBook, accounts, keys, sequence};
use postmatch_types::{Address, Order, OrderStatus};
use rust_decimal::Decimal;

#[test]
fn rolled_back_command_leaves_no_trace() {
    let mut store = MemStore::new();
    let mut book = OrderBook::new();
    let seller = Address::dummy(1);

    let first = Order::dummy_sell(0, seller, "110001", Decimal::new(500, 0));
    book.put(&mut store, &first).unwrap();
    let digest = store.state_digest();

    store.begin().unwrap();
    let id = sequence::next_order_id(&mut store, 2).unwrap();
    let mut second = Order::dummy_sell(1, seller, "110001", Decimal::new(700, 0));
    second.id = id;
    book.put(&mut store, &second).unwrap();
    accounts::set_kyc(&mut store, &seller, true);
    store.rollback().unwrap();
    book.rebuild(&store).unwrap();

    assert_eq!(store.state_digest(), digest);
    assert_eq!(book.live().len(), 1);
    assert!(book.find(&store, &id).unwrap().is_none());
}

#[test]
fn every_order_key_is_under_its_prefix() {
    let mut store = MemStore::new();
    let mut book = OrderBook::new();
    let mut order = Order::dummy_buy(0, Address::dummy(2), "560001", Decimal::new(50, 0));
    order.status = OrderStatus::Pending;
    book.put(&mut store, &order).unwrap();

    let prefixes: Vec<u8> = store
        .range(&[], None)
        .into_iter()
        .map(|(k, _)| k[0])
        .collect();
    assert_eq!(
        prefixes,
        vec![
            keys::ORDER,
            keys::ORDER_EXPIRY,
            keys::ORDER_BY_TYPE,
            keys::ORDER_BY_POSTAL,
            keys::ORDER_BY_DISTRICT,
            keys::ORDER_BY_STATE,
            keys::ORDER_BY_CREATOR,
        ]
    );
    assert_eq!(store.scan_prefix(&keys::state_prefix("Karnataka")).len(), 1);
}
