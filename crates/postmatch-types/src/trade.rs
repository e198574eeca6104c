//! Trade types.
//!
//! A [`Trade`] pairs one buy order with one sell order. The seller's escrow
//! backs it; the buyer pays fiat off-platform within the settlement window
//! and the seller confirms receipt to release the tokens.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, OrderId, PaymentMethod, PostmatchError, Result, TradeId};

/// Lifecycle status of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum TradeStatus {
    /// Created by the matcher; waiting for the buyer's fiat payment.
    Matched,
    /// Buyer reports the fiat payment as sent.
    PaymentPending,
    /// Seller confirmed receipt and escrow was released.
    Completed,
    /// A dispute is open against the trade.
    Disputed,
    /// The dispute was resolved; funds moved per the resolution.
    Resolved,
}

impl TradeStatus {
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Matched, Self::PaymentPending | Self::Completed | Self::Disputed)
                | (Self::PaymentPending, Self::Completed | Self::Disputed)
                | (Self::Disputed, Self::Resolved)
        )
    }

    /// Still waiting on the parties.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Matched | Self::PaymentPending)
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Matched => write!(f, "MATCHED"),
            Self::PaymentPending => write!(f, "PAYMENT_PENDING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Disputed => write!(f, "DISPUTED"),
            Self::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// A matched buy/sell pair committed to settle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer: Address,
    pub seller: Address,
    /// Settled token amount.
    pub amount: Decimal,
    /// Fiat owed by the buyer, at the buy order's rate.
    pub fiat_amount: Decimal,
    pub fiat_currency: String,
    pub payment_method: PaymentMethod,
    /// Custody address of the seller's escrow.
    pub escrow_address: Address,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    /// End of the settlement window.
    pub expires_at: DateTime<Utc>,
    pub payment_sent_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Trade {
    #[must_use]
    pub fn is_party(&self, who: &Address) -> bool {
        self.buyer == *who || self.seller == *who
    }

    /// The other party, `None` if `who` is not on the trade.
    #[must_use]
    pub fn counterparty(&self, who: &Address) -> Option<Address> {
        if self.buyer == *who {
            Some(self.seller)
        } else if self.seller == *who {
            Some(self.buyer)
        } else {
            None
        }
    }

    pub fn transition_to(&mut self, target: TradeStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(PostmatchError::invalid_status(
                "trade",
                self.id,
                self.status,
                target,
            ));
        }
        self.status = target;
        Ok(())
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade[{}] {} -> {} {} for {} {} via {}",
            self.id,
            self.seller,
            self.buyer,
            self.amount,
            self.fiat_amount,
            self.fiat_currency,
            self.payment_method,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PaymentMethodType;

    fn make_trade() -> Trade {
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        Trade {
            id: TradeId::deterministic(1, 0),
            buy_order_id: OrderId::deterministic(1, 1),
            sell_order_id: OrderId::deterministic(1, 2),
            buyer: Address::dummy(1),
            seller: Address::dummy(2),
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
    fn parties() {
        let t = make_trade();
        assert!(t.is_party(&Address::dummy(1)));
        assert!(!t.is_party(&Address::dummy(3)));
        assert_eq!(t.counterparty(&Address::dummy(1)), Some(Address::dummy(2)));
        assert_eq!(t.counterparty(&Address::dummy(3)), None);
    }

    #[test]
    fn completed_is_final() {
        let mut t = make_trade();
        t.transition_to(TradeStatus::PaymentPending).unwrap();
        t.transition_to(TradeStatus::Completed).unwrap();
        assert!(t.transition_to(TradeStatus::Disputed).is_err());
        assert!(t.transition_to(TradeStatus::Matched).is_err());
    }

    #[test]
    fn dispute_path() {
        let mut t = make_trade();
        t.transition_to(TradeStatus::Disputed).unwrap();
        assert!(!t.status.is_open());
        assert!(t.transition_to(TradeStatus::Completed).is_err());
        t.transition_to(TradeStatus::Resolved).unwrap();
    }

    #[test]
    fn trade_display() {
        let s = make_trade().to_string();
        assert!(s.contains("80000"));
        assert!(s.contains("UPI"));
    }
}
