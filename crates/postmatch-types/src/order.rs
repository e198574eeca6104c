//! Order types.
//!
//! An [`Order`] is a user's intent to buy or sell the settlement token for
//! fiat at a postal location. Orders start `PENDING`, become `ACTIVE` once
//! their escrow is funded, and leave the live book when they match, expire,
//! or are cancelled.
//!
//! ```text
//!   PENDING ──fund──▶ ACTIVE ──match──▶ MATCHED ──settle──▶ COMPLETED
//!      │                 │
//!      │                 ├──expire──▶ REFUNDED
//!      └──cancel─────────┴──────────▶ CANCELLED
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, Location, OrderId, PaymentMethod, PostmatchError, Result};

/// Which side of the book this order is on. Buyers pay fiat and receive
/// tokens; sellers escrow tokens and receive fiat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Single byte used in the type index key.
    #[must_use]
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Buy => 0x01,
            Self::Sell => 0x02,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle status of an order. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Active,
    Matched,
    Completed,
    Refunded,
    Cancelled,
}

impl OrderStatus {
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Active | Self::Cancelled)
                | (Self::Active, Self::Matched | Self::Refunded | Self::Cancelled)
                | (Self::Matched, Self::Completed)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Refunded | Self::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Matched => write!(f, "MATCHED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Refunded => write!(f, "REFUNDED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Inclusive token amount range an order will settle for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl AmountRange {
    #[must_use]
    pub fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn contains(&self, amount: Decimal) -> bool {
        amount >= self.min && amount <= self.max
    }

    /// Intersection of two ranges, `None` when they do not overlap.
    #[must_use]
    pub fn overlap(&self, other: &AmountRange) -> Option<AmountRange> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (min <= max).then_some(AmountRange { min, max })
    }
}

/// A buy or sell intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub creator: Address,
    pub side: OrderSide,
    /// Headline token amount; the range collapses to this when unset.
    pub amount: Decimal,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    /// Fiat owed for `amount` tokens; `fiat_amount / amount` is the rate.
    pub fiat_amount: Decimal,
    pub fiat_currency: String,
    pub location: Location,
    pub payment_methods: Vec<PaymentMethod>,
    pub preferred_languages: Vec<String>,
    pub max_distance_km: u32,
    pub min_trust_score: u8,
    pub require_kyc: bool,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub escrow_address: Address,
    pub escrow_amount: Decimal,
}

impl Order {
    /// Effective `[min, max]`: each missing bound defaults to `amount`.
    #[must_use]
    pub fn effective_range(&self) -> AmountRange {
        AmountRange::new(
            self.min_amount.unwrap_or(self.amount),
            self.max_amount.unwrap_or(self.amount),
        )
    }

    /// Fiat per token.
    #[must_use]
    pub fn rate(&self) -> Decimal {
        self.fiat_amount
            .checked_div(self.amount)
            .unwrap_or(Decimal::ZERO)
    }

    /// Expired once `now` is strictly past `expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == OrderStatus::Active
    }

    /// Move to `target`, rejecting any backward or sideways transition.
    pub fn transition_to(&mut self, target: OrderStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(PostmatchError::invalid_status(
                "order",
                self.id,
                self.status,
                target,
            ));
        }
        self.status = target;
        Ok(())
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    /// An `ACTIVE` order at `postal_code` for `amount` tokens at `rate` INR each,
    /// payable over UPI.
    pub fn dummy(
        seq: u32,
        creator: Address,
        side: OrderSide,
        postal_code: &str,
        amount: Decimal,
        rate: Decimal,
    ) -> Self {
        let created_at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        let id = OrderId::deterministic(1, seq);
        Self {
            id,
            creator,
            side,
            amount,
            min_amount: None,
            max_amount: None,
            fiat_amount: amount * rate,
            fiat_currency: "INR".to_string(),
            location: Location::from_postal_code(postal_code).unwrap(),
            payment_methods: vec![PaymentMethod::new(crate::PaymentMethodType::Upi, "")],
            preferred_languages: Vec::new(),
            max_distance_km: 50,
            min_trust_score: 0,
            require_kyc: false,
            status: OrderStatus::Active,
            created_at,
            expires_at: created_at + chrono::Duration::hours(24),
            escrow_address: Address::custody_for_order(id),
            escrow_amount: amount,
        }
    }

    pub fn dummy_sell(seq: u32, creator: Address, postal_code: &str, amount: Decimal) -> Self {
        Self::dummy(seq, creator, OrderSide::Sell, postal_code, amount, Decimal::new(80, 0))
    }

    pub fn dummy_buy(seq: u32, creator: Address, postal_code: &str, amount: Decimal) -> Self {
        Self::dummy(seq, creator, OrderSide::Buy, postal_code, amount, Decimal::new(80, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_only() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(Matched));
        assert!(Active.can_transition_to(Refunded));
        assert!(Matched.can_transition_to(Completed));

        assert!(!Active.can_transition_to(Pending));
        assert!(!Matched.can_transition_to(Active));
        assert!(!Matched.can_transition_to(Refunded));
        assert!(!Refunded.can_transition_to(Active));
        assert!(!Completed.can_transition_to(Matched));
        assert!(!Cancelled.can_transition_to(Active));
    }

    #[test]
    fn transition_to_rejects_regression() {
        let mut order = Order::dummy_sell(0, Address::dummy(1), "110001", Decimal::new(1000, 0));
        order.transition_to(OrderStatus::Matched).unwrap();
        let err = order.transition_to(OrderStatus::Active).unwrap_err();
        assert!(matches!(err, PostmatchError::InvalidStatus { .. }));
        assert_eq!(order.status, OrderStatus::Matched);
    }

    #[test]
    fn effective_range_defaults_to_amount() {
        let mut order = Order::dummy_buy(0, Address::dummy(1), "110001", Decimal::new(1000, 0));
        assert_eq!(
            order.effective_range(),
            AmountRange::new(Decimal::new(1000, 0), Decimal::new(1000, 0))
        );
        order.min_amount = Some(Decimal::new(500, 0));
        assert_eq!(order.effective_range().min, Decimal::new(500, 0));
        assert_eq!(order.effective_range().max, Decimal::new(1000, 0));
    }

    #[test]
    fn range_overlap() {
        let a = AmountRange::new(Decimal::new(100, 0), Decimal::new(500, 0));
        let b = AmountRange::new(Decimal::new(400, 0), Decimal::new(900, 0));
        let c = AmountRange::new(Decimal::new(600, 0), Decimal::new(900, 0));
        assert_eq!(
            a.overlap(&b),
            Some(AmountRange::new(Decimal::new(400, 0), Decimal::new(500, 0)))
        );
        assert_eq!(a.overlap(&c), None);
    }

    #[test]
    fn rate_is_fiat_per_token() {
        let order = Order::dummy_sell(0, Address::dummy(1), "110001", Decimal::new(1000, 0));
        assert_eq!(order.rate(), Decimal::new(80, 0));
    }

    #[test]
    fn status_display() {
        assert_eq!(OrderStatus::Pending.to_string(), "PENDING");
        assert_eq!(OrderSide::Sell.to_string(), "SELL");
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }
}
