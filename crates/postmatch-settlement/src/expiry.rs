//! Per-block expiry sweep.
//!
//! Three queues are walked, each bounded to the key range below block time:
//!
//! 1. **Escrow expiry**: `ACTIVE` escrows past expiry are refunded in full
//!    with reason `expired`; the owning order becomes `REFUNDED`.
//! 2. **Order expiry**: `PENDING` orders past expiry are cancelled (they
//!    hold no funds). `ACTIVE` orders still live after step 1 pledged
//!    nothing and are marked `REFUNDED` directly.
//! 3. **Settlement window**: trades still open after their window are
//!    escalated into a system dispute.
//!
//! The scheduler only collects the work; the engine executes each item in
//! its own journaled unit and logs failures without stopping the sweep.

use chrono::{DateTime, Utc};
use postmatch_store::{ExpiryEntry, KvStore, OrderBook, escrows, trades};
use postmatch_types::{EscrowId, OrderId, Result, TradeId};
use serde::Serialize;

/// Work due at one block time, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepPlan {
    pub escrows: Vec<ExpiryEntry>,
    /// Lapsed `PENDING` and `ACTIVE` orders.
    pub orders: Vec<OrderId>,
    pub trades: Vec<TradeId>,
}

impl SweepPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.escrows.is_empty() && self.orders.is_empty() && self.trades.is_empty()
    }
}

/// What a sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub refunded: Vec<EscrowId>,
    pub cancelled: Vec<OrderId>,
    /// Active orders with nothing escrowed, closed as refunded.
    pub lapsed: Vec<OrderId>,
    pub escalated: Vec<TradeId>,
    /// Items that failed and were logged.
    pub failed: usize,
}

impl SweepReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refunded.is_empty()
            && self.cancelled.is_empty()
            && self.lapsed.is_empty()
            && self.escalated.is_empty()
            && self.failed == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExpiryScheduler;

impl ExpiryScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Everything that expired strictly before `now`.
    pub fn plan(&self, store: &impl KvStore, book: &OrderBook, now: DateTime<Utc>) -> Result<SweepPlan> {
        let plan = SweepPlan {
            escrows: escrows::expired(store, now),
            orders: book
                .query_lapsed(store, now)?
                .into_iter()
                .map(|order| order.id)
                .collect(),
            trades: trades::overdue(store, now),
        };
        if !plan.is_empty() {
            tracing::debug!(
                escrows = plan.escrows.len(),
                orders = plan.orders.len(),
                trades = plan.trades.len(),
                "sweep planned"
            );
        }
        Ok(plan)
    }
}
