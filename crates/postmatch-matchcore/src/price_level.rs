//! Aggregated market depth.
//!
//! Live orders sharing the same fiat rate are folded into one
//! [`DepthLevel`]; a [`MarketDepth`] lists the levels of both sides for
//! one fiat currency.

use rust_decimal::Decimal;
use serde::Serialize;

/// All live orders at one rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepthLevel {
    /// Fiat per token.
    pub rate: Decimal,
    pub order_count: usize,
    /// Sum of the orders' maximum token amounts.
    pub total_amount: Decimal,
}

impl DepthLevel {
    #[must_use]
    pub fn new(rate: Decimal) -> Self {
        Self {
            rate,
            order_count: 0,
            total_amount: Decimal::ZERO,
        }
    }

    pub fn add(&mut self, amount: Decimal) {
        self.order_count += 1;
        self.total_amount += amount;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order_count == 0
    }
}

/// Both sides of the book for one fiat currency, best level first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketDepth {
    pub currency: String,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

impl MarketDepth {
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.rate)
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.rate)
    }

    /// `best_ask - best_bid`, `None` if either side is empty.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_accumulates() {
        let mut level = DepthLevel::new(Decimal::new(80, 0));
        assert!(level.is_empty());
        level.add(Decimal::new(10, 0));
        level.add(Decimal::new(5, 0));
        assert_eq!(level.order_count, 2);
        assert_eq!(level.total_amount, Decimal::new(15, 0));
    }

    #[test]
    fn spread_needs_both_sides() {
        let mut depth = MarketDepth {
            currency: "INR".into(),
            bids: vec![DepthLevel::new(Decimal::new(79, 0))],
            asks: vec![],
        };
        assert_eq!(depth.spread(), None);
        depth.asks.push(DepthLevel::new(Decimal::new(81, 0)));
        assert_eq!(depth.spread(), Some(Decimal::new(2, 0)));
    }
}
