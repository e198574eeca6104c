//! Fiat payment methods.
//!
//! Payment methods are metadata only: they decide which orders can trade
//! with each other and which rail a trade settles on, but no payment is ever
//! executed here.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fiat rail a user accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethodType {
    Upi,
    Imps,
    Neft,
    Rtgs,
    Cash,
    BankTransfer,
    Wallet,
}

impl PaymentMethodType {
    /// Rails that interoperate across providers.
    #[must_use]
    pub fn is_interbank(self) -> bool {
        matches!(self, Self::Upi | Self::Imps | Self::Neft | Self::Rtgs)
    }

    /// Position in the settlement preference order, lower is preferred.
    /// Types outside the ranked set are never chosen as a trade's rail.
    #[must_use]
    pub fn preference_rank(self) -> Option<usize> {
        PAYMENT_PREFERENCE.iter().position(|t| *t == self)
    }
}

impl fmt::Display for PaymentMethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upi => write!(f, "UPI"),
            Self::Imps => write!(f, "IMPS"),
            Self::Neft => write!(f, "NEFT"),
            Self::Rtgs => write!(f, "RTGS"),
            Self::Cash => write!(f, "CASH"),
            Self::BankTransfer => write!(f, "BANK_TRANSFER"),
            Self::Wallet => write!(f, "WALLET"),
        }
    }
}

/// Rails in settlement preference order.
pub const PAYMENT_PREFERENCE: [PaymentMethodType; 5] = [
    PaymentMethodType::Upi,
    PaymentMethodType::Imps,
    PaymentMethodType::Neft,
    PaymentMethodType::Rtgs,
    PaymentMethodType::Cash,
];

/// A rail plus the provider behind it (bank, wallet app, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub method_type: PaymentMethodType,
    #[serde(default)]
    pub provider: String,
}

impl PaymentMethod {
    pub fn new(method_type: PaymentMethodType, provider: impl Into<String>) -> Self {
        Self {
            method_type,
            provider: provider.into(),
        }
    }

    /// Interbank rails match on type alone; everything else also needs the
    /// same provider.
    #[must_use]
    pub fn is_compatible_with(&self, other: &PaymentMethod) -> bool {
        if self.method_type != other.method_type {
            return false;
        }
        self.method_type.is_interbank() || self.provider.eq_ignore_ascii_case(&other.provider)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.provider.is_empty() {
            write!(f, "{}", self.method_type)
        } else {
            write!(f, "{}:{}", self.method_type, self.provider)
        }
    }
}
