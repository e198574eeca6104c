//! Serializable engine commands.

use chrono::{DateTime, Utc};
use postmatch_ingress::OrderRequest;
use postmatch_types::{Address, DisputeId, OrderId, Resolution, TradeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Every state-changing operation the engine accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    CreateOrder {
        creator: Address,
        order: OrderRequest,
    },
    DepositToEscrow {
        order_id: OrderId,
        depositor: Address,
        amount: Decimal,
    },
    CancelOrder {
        order_id: OrderId,
        by: Address,
        reason: String,
    },
    MarkPaymentSent {
        trade_id: TradeId,
        by: Address,
    },
    CompleteTrade {
        trade_id: TradeId,
        confirmed_by: Address,
    },
    /// Anyone may trigger a refund once the order has expired.
    RefundOrder {
        order_id: OrderId,
        by: Address,
    },
    CreateDispute {
        trade_id: TradeId,
        raised_by: Address,
        reason: String,
    },
    ResolveDispute {
        dispute_id: DisputeId,
        resolution: Resolution,
        resolved_by: Address,
    },
    BanUser {
        user: Address,
        until: DateTime<Utc>,
        reason: String,
        by: Address,
    },
    UnbanUser {
        user: Address,
        by: Address,
    },
    SetKycStatus {
        user: Address,
        verified: bool,
        by: Address,
    },
}

impl Command {
    /// The account that must have signed this command.
    #[must_use]
    pub fn actor(&self) -> Address {
        match self {
            Self::CreateOrder { creator, .. } => *creator,
            Self::DepositToEscrow { depositor, .. } => *depositor,
            Self::CompleteTrade { confirmed_by, .. } => *confirmed_by,
            Self::CreateDispute { raised_by, .. } => *raised_by,
            Self::ResolveDispute { resolved_by, .. } => *resolved_by,
            Self::CancelOrder { by, .. }
            | Self::MarkPaymentSent { by, .. }
            | Self::RefundOrder { by, .. }
            | Self::BanUser { by, .. }
            | Self::UnbanUser { by, .. }
            | Self::SetKycStatus { by, .. } => *by,
        }
    }

    /// Stable name, matching the serde tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateOrder { .. } => "create_order",
            Self::DepositToEscrow { .. } => "deposit_to_escrow",
            Self::CancelOrder { .. } => "cancel_order",
            Self::MarkPaymentSent { .. } => "mark_payment_sent",
            Self::CompleteTrade { .. } => "complete_trade",
            Self::RefundOrder { .. } => "refund_order",
            Self::CreateDispute { .. } => "create_dispute",
            Self::ResolveDispute { .. } => "resolve_dispute",
            Self::BanUser { .. } => "ban_user",
            Self::UnbanUser { .. } => "unban_user",
            Self::SetKycStatus { .. } => "set_kyc_status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_serde_tag() {
        let cmd = Command::ResolveDispute {
            dispute_id: DisputeId::deterministic(4, 0),
            resolution: Resolution::Split { buyer_pct: 60 },
            resolved_by: Address::dummy(9),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], cmd.kind());
        assert_eq!(json["resolution"]["buyer_pct"], 60);
        assert_eq!(cmd.actor(), Address::dummy(9));
    }

    #[test]
    fn create_order_from_json() {
        let json = format!(
            r#"{{
                "type": "create_order",
                "creator": "{}",
                "order": {{
                    "side": "Sell",
                    "amount": "1000",
                    "fiat_amount": "80000",
                    "fiat_currency": "INR",
                    "postal_code": "110001",
                    "payment_methods": [{{ "method_type": "UPI" }}]
                }}
            }}"#,
            Address::dummy(1)
        );
        let cmd: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd.actor(), Address::dummy(1));
        assert!(matches!(cmd, Command::CreateOrder { ref order, .. } if order.amount == Decimal::new(1000, 0)));
    }
}
