//! Events emitted for notification and analytics consumers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Address, DisputeId, EscrowId, OrderId, OrderSide, PaymentMethodType, Resolution, TradeId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    OrderCreated {
        order_id: OrderId,
        creator: Address,
        side: OrderSide,
        amount: Decimal,
        fiat_amount: Decimal,
        fiat_currency: String,
        postal_code: String,
    },
    EscrowFunded {
        order_id: OrderId,
        escrow_id: EscrowId,
        depositor: Address,
        principal: Decimal,
        fee: Decimal,
    },
    TradeMatched {
        trade_id: TradeId,
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        buyer: Address,
        seller: Address,
        amount: Decimal,
        fiat_amount: Decimal,
        payment_method: PaymentMethodType,
    },
    PaymentMarkedSent {
        trade_id: TradeId,
        buyer: Address,
    },
    TradeCompleted {
        trade_id: TradeId,
        buyer: Address,
        seller: Address,
        amount: Decimal,
        fee: Decimal,
    },
    OrderRefunded {
        order_id: OrderId,
        escrow_id: EscrowId,
        depositor: Address,
        amount: Decimal,
        reason: String,
    },
    OrderCancelled {
        order_id: OrderId,
        creator: Address,
        reason: String,
    },
    DisputeRaised {
        dispute_id: DisputeId,
        trade_id: TradeId,
        escrow_id: Option<EscrowId>,
        raised_by: Address,
        raised_against: Address,
        reason: String,
    },
    DisputeResolved {
        dispute_id: DisputeId,
        trade_id: TradeId,
        resolution: Resolution,
        resolver: Address,
        buyer_amount: Decimal,
        seller_amount: Decimal,
    },
    UserBanned {
        user: Address,
        until: DateTime<Utc>,
        reason: String,
    },
    UserUnbanned {
        user: Address,
    },
}

impl Event {
    /// Stable event name, used as the log/event-stream topic.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OrderCreated { .. } => "order_created",
            Self::EscrowFunded { .. } => "escrow_funded",
            Self::TradeMatched { .. } => "trade_matched",
            Self::PaymentMarkedSent { .. } => "payment_marked_sent",
            Self::TradeCompleted { .. } => "trade_completed",
            Self::OrderRefunded { .. } => "order_refunded",
            Self::OrderCancelled { .. } => "order_cancelled",
            Self::DisputeRaised { .. } => "dispute_raised",
            Self::DisputeResolved { .. } => "dispute_resolved",
            Self::UserBanned { .. } => "user_banned",
            Self::UserUnbanned { .. } => "user_unbanned",
        }
    }
}
