//! Block trade digest.
//!
//! Two nodes replaying the same block must match the same orders into the
//! same trades. Comparing the 32-byte root is enough to detect divergence.

use postmatch_types::Trade;
use sha2::{Digest, Sha256};

/// SHA-256 over a block's trades in creation order.
///
/// Amounts are hashed in normalized form, so `1000` and `1000.00` agree.
#[must_use]
pub fn compute_trade_root(trades: &[Trade]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"postmatch:trade_root:v1:");
    hasher.update((trades.len() as u64).to_le_bytes());

    for trade in trades {
        hasher.update(trade.id.as_bytes());
        hasher.update(trade.buy_order_id.as_bytes());
        hasher.update(trade.sell_order_id.as_bytes());
        hasher.update(trade.buyer.as_bytes());
        hasher.update(trade.seller.as_bytes());
        hasher.update(trade.amount.normalize().to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(trade.fiat_amount.normalize().to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(trade.fiat_currency.as_bytes());
        hasher.update(b"|");
        hasher.update(trade.payment_method.to_string().as_bytes());
        hasher.update(trade.created_at.timestamp_millis().to_le_bytes());
    }

    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use postmatch_types::{
        Address, OrderId, PaymentMethod, PaymentMethodType, TradeId, TradeStatus,
    };
    use rust_decimal::Decimal;

    use super::*;

    fn trade(seq: u32, units: i64) -> Trade {
        let at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        Trade {
            id: TradeId::deterministic(3, seq),
            buy_order_id: OrderId::deterministic(3, seq + 100),
            sell_order_id: OrderId::deterministic(3, seq + 200),
            buyer: Address::dummy(2),
            seller: Address::dummy(4),
            amount: Decimal::new(units, 0),
            fiat_amount: Decimal::new(units * 80, 0),
            fiat_currency: "INR".into(),
            payment_method: PaymentMethod::new(PaymentMethodType::Upi, ""),
            escrow_address: Address::dummy(9),
            status: TradeStatus::Matched,
            created_at: at,
            expires_at: at,
            payment_sent_at: None,
            closed_at: None,
        }
    }

    #[test]
    fn root_tracks_content() {
        let base = compute_trade_root(&[trade(0, 1000)]);
        assert_eq!(base, compute_trade_root(&[trade(0, 1000)]));
        assert_ne!(base, compute_trade_root(&[trade(1, 1000)]));
        assert_ne!(base, compute_trade_root(&[trade(0, 999)]));

        let mut by_card = trade(0, 1000);
        by_card.payment_method = PaymentMethod::new(PaymentMethodType::Imps, "");
        assert_ne!(base, compute_trade_root(&[by_card]));
    }

    #[test]
    fn decimal_scale_is_ignored() {
        let mut scaled = trade(0, 1000);
        scaled.amount = Decimal::new(1_000_000, 3);
        assert_eq!(
            compute_trade_root(&[trade(0, 1000)]),
            compute_trade_root(&[scaled])
        );
    }

    #[test]
    fn sequence_is_part_of_the_root() {
        let (a, b) = (trade(0, 10), trade(1, 10));
        assert_ne!(
            compute_trade_root(&[a.clone(), b.clone()]),
            compute_trade_root(&[b, a])
        );
        // An empty block still has a root, distinct from any trade.
        assert_ne!(compute_trade_root(&[]), compute_trade_root(&[trade(0, 10)]));
    }
}
