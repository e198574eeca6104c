//! Escrow custody records.
//!
//! ```text
//!   ACTIVE ──release──▶ RELEASED
//!     │  └──refund───▶ REFUNDED
//!     └──dispute──▶ DISPUTED ──▶ RELEASED | REFUNDED
//! ```
//!
//! While an escrow is `ACTIVE` or `DISPUTED` its custody address holds
//! exactly `principal + fee`. Terminal states never re-open.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, EscrowId, OrderId, PostmatchError, Result, TradeId};

/// What an escrow is pledged against. Exactly one subject per escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowSubject {
    Order(OrderId),
    Trade(TradeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum EscrowStatus {
    Active,
    Released,
    Refunded,
    Disputed,
}

impl EscrowStatus {
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Active, Self::Released | Self::Refunded | Self::Disputed)
                | (Self::Disputed, Self::Released | Self::Refunded)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Released => write!(f, "RELEASED"),
            Self::Refunded => write!(f, "REFUNDED"),
            Self::Disputed => write!(f, "DISPUTED"),
        }
    }
}

/// Custodied funds pledged against an order or trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escrow {
    pub id: EscrowId,
    pub subject: EscrowSubject,
    pub depositor: Address,
    /// Address holding the funds; derived from the subject id.
    pub custody: Address,
    pub asset: String,
    pub principal: Decimal,
    /// Platform fee collected on release, returned on refund.
    pub fee: Decimal,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub refund_to: Address,
    pub release_to: Option<Address>,
    pub close_reason: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Escrow {
    /// Amount the custody address must hold while funds are locked.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.principal + self.fee
    }

    #[must_use]
    pub fn order_id(&self) -> Option<OrderId> {
        match self.subject {
            EscrowSubject::Order(id) => Some(id),
            EscrowSubject::Trade(_) => None,
        }
    }

    #[must_use]
    pub fn trade_id(&self) -> Option<TradeId> {
        match self.subject {
            EscrowSubject::Trade(id) => Some(id),
            EscrowSubject::Order(_) => None,
        }
    }

    /// `ACTIVE` or `DISPUTED`: funds still sit at the custody address.
    #[must_use]
    pub fn holds_funds(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn transition_to(&mut self, target: EscrowStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(PostmatchError::invalid_status(
                "escrow",
                self.id,
                self.status,
                target,
            ));
        }
        self.status = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_way_transitions() {
        use EscrowStatus::*;
        assert!(Active.can_transition_to(Released));
        assert!(Active.can_transition_to(Refunded));
        assert!(Active.can_transition_to(Disputed));
        assert!(Disputed.can_transition_to(Released));
        assert!(Disputed.can_transition_to(Refunded));

        assert!(!Released.can_transition_to(Active));
        assert!(!Refunded.can_transition_to(Refunded));
        assert!(!Released.can_transition_to(Disputed));
        assert!(!Disputed.can_transition_to(Active));
    }

    #[test]
    fn subject_accessors() {
        let order = OrderId::deterministic(1, 0);
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let mut escrow = Escrow {
            id: EscrowId::deterministic(1, 1),
            subject: EscrowSubject::Order(order),
            depositor: Address::dummy(1),
            custody: Address::custody_for_order(order),
            asset: "RMT".into(),
            principal: Decimal::new(1000, 0),
            fee: Decimal::new(5, 0),
            status: EscrowStatus::Active,
            created_at: now,
            expires_at: None,
            refund_to: Address::dummy(1),
            release_to: None,
            close_reason: None,
            closed_at: None,
        };
        assert_eq!(escrow.order_id(), Some(order));
        assert_eq!(escrow.trade_id(), None);
        assert_eq!(escrow.total(), Decimal::new(1005, 0));

        escrow.transition_to(EscrowStatus::Refunded).unwrap();
        assert!(!escrow.holds_funds());
        assert!(escrow.transition_to(EscrowStatus::Refunded).is_err());
    }
}
