//! Error types for postmatch.
//!
//! All errors use the `PM_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors (rejected before any side effect)
//! - 2xx: Lookup errors
//! - 3xx: State-machine errors
//! - 4xx: Authorization errors
//! - 5xx: Funds and custody errors
//! - 6xx: Storage / codec errors
//! - 9xx: Configuration errors

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::{Address, DisputeId, EscrowId, OrderId, TradeId};

/// Central error enum for all postmatch operations.
#[derive(Debug, Error)]
pub enum PostmatchError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// A command argument failed validation.
    #[error("PM_ERR_100: Validation failed: {reason}")]
    Validation { reason: String },

    /// Postal code is not six digits with a non-zero leading digit.
    #[error("PM_ERR_101: Invalid postal code: {code:?}")]
    InvalidPostalCode { code: String },

    // =================================================================
    // Lookup Errors (2xx)
    // =================================================================
    #[error("PM_ERR_200: Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("PM_ERR_201: Trade not found: {0}")]
    TradeNotFound(TradeId),

    #[error("PM_ERR_202: Escrow not found: {0}")]
    EscrowNotFound(EscrowId),

    #[error("PM_ERR_203: Dispute not found: {0}")]
    DisputeNotFound(DisputeId),

    /// The order has no escrow record (it was never funded).
    #[error("PM_ERR_204: No escrow recorded for order {0}")]
    NoEscrowForOrder(OrderId),

    // =================================================================
    // State-machine Errors (3xx)
    // =================================================================
    /// The operation is not legal from the entity's current status.
    #[error("PM_ERR_300: Invalid status for {entity} {id}: cannot move from {from} to {to}")]
    InvalidStatus {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    /// Refund requested before the entity's expiry.
    #[error("PM_ERR_301: {entity} {id} has not expired (expires at {expires_at})")]
    NotExpired {
        entity: &'static str,
        id: String,
        expires_at: DateTime<Utc>,
    },

    /// The entity's lifetime is over.
    #[error("PM_ERR_302: {entity} {id} expired at {expires_at}")]
    Expired {
        entity: &'static str,
        id: String,
        expires_at: DateTime<Utc>,
    },

    // =================================================================
    // Authorization Errors (4xx)
    // =================================================================
    /// The signer is not allowed to perform this action.
    #[error("PM_ERR_400: Unauthorized: {actor} may not {action}")]
    Unauthorized {
        actor: Address,
        action: &'static str,
    },

    /// The user is banned until the given time.
    #[error("PM_ERR_401: User {user} is banned until {until}")]
    UserBanned { user: Address, until: DateTime<Utc> },

    /// A signed command envelope did not verify.
    #[error("PM_ERR_402: Invalid signature: {reason}")]
    InvalidSignature { reason: String },

    // =================================================================
    // Funds Errors (5xx)
    // =================================================================
    /// The paying account cannot cover the transfer.
    #[error("PM_ERR_500: Insufficient funds in {account} for {asset}: need {needed}, have {available}")]
    InsufficientFunds {
        account: Address,
        asset: String,
        needed: Decimal,
        available: Decimal,
    },

    /// A custody or module account cannot cover a payout.
    #[error("PM_ERR_501: Insufficient liquidity: {reason}")]
    InsufficientLiquidity { reason: String },

    /// Deposit amount differs from the amount the order requires.
    #[error("PM_ERR_502: Amount mismatch: expected {expected}, got {got}")]
    AmountMismatch { expected: Decimal, got: Decimal },

    /// An escrow's custody balance disagrees with its record.
    #[error("PM_ERR_503: Custody mismatch for escrow {escrow}: expected {expected}, found {actual}")]
    CustodyMismatch {
        escrow: EscrowId,
        expected: Decimal,
        actual: Decimal,
    },

    /// Ledger supply disagrees with minted supply.
    #[error("PM_ERR_504: Supply mismatch for {asset}: expected {expected}, found {actual}")]
    SupplyMismatch {
        asset: String,
        expected: Decimal,
        actual: Decimal,
    },

    // =================================================================
    // Storage Errors (6xx)
    // =================================================================
    /// A persisted record failed to encode or decode.
    #[error("PM_ERR_600: Codec error: {reason}")]
    Codec { reason: String },

    /// The store is in an unexpected state.
    #[error("PM_ERR_601: Storage error: {reason}")]
    Storage { reason: String },

    // =================================================================
    // Configuration Errors (9xx)
    // =================================================================
    #[error("PM_ERR_900: Invalid configuration: {reason}")]
    Config { reason: String },
}

/// Convenience type alias for postmatch results.
pub type Result<T> = std::result::Result<T, PostmatchError>;

impl PostmatchError {
    /// Shorthand for an [`PostmatchError::InvalidStatus`] error.
    pub fn invalid_status(
        entity: &'static str,
        id: impl ToString,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidStatus {
            entity,
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::OrderNotFound(_)
                | Self::TradeNotFound(_)
                | Self::EscrowNotFound(_)
                | Self::DisputeNotFound(_)
                | Self::NoEscrowForOrder(_)
        )
    }

    #[must_use]
    pub fn is_invalid_status(&self) -> bool {
        matches!(
            self,
            Self::InvalidStatus { .. } | Self::NotExpired { .. } | Self::Expired { .. }
        )
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized { .. } | Self::UserBanned { .. } | Self::InvalidSignature { .. }
        )
    }

    #[must_use]
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. } | Self::InsufficientLiquidity { .. }
        )
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::InvalidPostalCode { .. } | Self::AmountMismatch { .. }
        )
    }
}

impl From<serde_json::Error> for PostmatchError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec {
            reason: e.to_string(),
        }
    }
}
