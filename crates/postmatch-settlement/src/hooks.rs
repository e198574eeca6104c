//! Listener interface for sibling subsystems.
//!
//! The engine never calls into liquidity pools or fee distributors
//! directly. It notifies a [`SubsystemHooks`] implementation after a
//! command commits; a rolled-back command notifies nobody.

use std::cell::RefCell;
use std::rc::Rc;

use rust_decimal::Decimal;

/// Callbacks from the P2P engine. Every method defaults to a no-op.
pub trait SubsystemHooks {
    /// A platform fee reached the fee collector.
    fn on_trading_fee_collected(&self, _asset: &str, _amount: Decimal, _source: &str) {}

    fn on_pool_created(&self, _pool_id: u64, _asset_a: &str, _asset_b: &str) {}

    fn on_swap(
        &self,
        _pool_id: u64,
        _asset_in: &str,
        _amount_in: Decimal,
        _asset_out: &str,
        _amount_out: Decimal,
    ) {
    }
}

/// Listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl SubsystemHooks for NoopHooks {}

/// Fans every notification out to each listener in registration order.
#[derive(Default, Clone)]
pub struct MultiHooks {
    listeners: Vec<Rc<dyn SubsystemHooks>>,
}

impl MultiHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Rc<dyn SubsystemHooks>) {
        self.listeners.push(listener);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for MultiHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiHooks")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl SubsystemHooks for MultiHooks {
    fn on_trading_fee_collected(&self, asset: &str, amount: Decimal, source: &str) {
        for listener in &self.listeners {
            listener.on_trading_fee_collected(asset, amount, source);
        }
    }

    fn on_pool_created(&self, pool_id: u64, asset_a: &str, asset_b: &str) {
        for listener in &self.listeners {
            listener.on_pool_created(pool_id, asset_a, asset_b);
        }
    }

    fn on_swap(
        &self,
        pool_id: u64,
        asset_in: &str,
        amount_in: Decimal,
        asset_out: &str,
        amount_out: Decimal,
    ) {
        for listener in &self.listeners {
            listener.on_swap(pool_id, asset_in, amount_in, asset_out, amount_out);
        }
    }
}

/// One observed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookCall {
    FeeCollected {
        asset: String,
        amount: Decimal,
        source: String,
    },
    PoolCreated {
        pool_id: u64,
        asset_a: String,
        asset_b: String,
    },
    Swap {
        pool_id: u64,
        asset_in: String,
        amount_in: Decimal,
        asset_out: String,
        amount_out: Decimal,
    },
}

/// Records every notification, for tests and the replay driver.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    calls: RefCell<Vec<HookCall>>,
}

impl RecordingHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.borrow().clone()
    }

    /// Sum of fees reported for `asset`.
    #[must_use]
    pub fn fees_collected(&self, asset: &str) -> Decimal {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                HookCall::FeeCollected { asset: a, amount, .. } if a == asset => Some(*amount),
                _ => None,
            })
            .sum()
    }

    fn push(&self, call: HookCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl SubsystemHooks for RecordingHooks {
    fn on_trading_fee_collected(&self, asset: &str, amount: Decimal, source: &str) {
        self.push(HookCall::FeeCollected {
            asset: asset.to_string(),
            amount,
            source: source.to_string(),
        });
    }

    fn on_pool_created(&self, pool_id: u64, asset_a: &str, asset_b: &str) {
        self.push(HookCall::PoolCreated {
            pool_id,
            asset_a: asset_a.to_string(),
            asset_b: asset_b.to_string(),
        });
    }

    fn on_swap(
        &self,
        pool_id: u64,
        asset_in: &str,
        amount_in: Decimal,
        asset_out: &str,
        amount_out: Decimal,
    ) {
        self.push(HookCall::Swap {
            pool_id,
            asset_in: asset_in.to_string(),
            amount_in,
            asset_out: asset_out.to_string(),
            amount_out,
        });
    }
}
