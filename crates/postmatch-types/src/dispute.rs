//! Disputes over a trade's outcome.
//!
//! A dispute is `OPEN` until an authorized resolver applies a
//! [`Resolution`]; `RESOLVED` is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Address, DisputeId, EscrowId, PostmatchError, Result, TradeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeStatus {
    Open,
    Resolved,
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// How a resolver disposes of the disputed escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Settle the trade: tokens go to the buyer.
    ReleaseToBuyer,
    /// Tokens go back to the seller; the platform fee is still collected.
    ReleaseToSeller,
    /// Divide the settled amount, `buyer_pct` percent to the buyer.
    Split { buyer_pct: u8 },
    /// Unwind: principal and fee go back to the depositor.
    Refund,
}

impl Resolution {
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Split { buyer_pct } if *buyer_pct > 100 => Err(PostmatchError::validation(
                format!("split percentage {buyer_pct} exceeds 100"),
            )),
            _ => Ok(()),
        }
    }

    /// `Some(true)` if the buyer won, `Some(false)` if the seller won,
    /// `None` for a neutral outcome.
    #[must_use]
    pub fn buyer_prevails(&self) -> Option<bool> {
        match self {
            Self::ReleaseToBuyer => Some(true),
            Self::ReleaseToSeller => Some(false),
            Self::Split { buyer_pct } => match buyer_pct.cmp(&50) {
                std::cmp::Ordering::Greater => Some(true),
                std::cmp::Ordering::Less => Some(false),
                std::cmp::Ordering::Equal => None,
            },
            Self::Refund => None,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReleaseToBuyer => write!(f, "RELEASE_TO_BUYER"),
            Self::ReleaseToSeller => write!(f, "RELEASE_TO_SELLER"),
            Self::Split { buyer_pct } => write!(f, "SPLIT({buyer_pct})"),
            Self::Refund => write!(f, "REFUND"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub escrow_id: Option<EscrowId>,
    pub trade_id: TradeId,
    pub raised_by: Address,
    pub raised_against: Address,
    pub reason: String,
    pub status: DisputeStatus,
    pub resolution: Option<Resolution>,
    pub resolver: Option<Address>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    /// Record the resolution. Fails if the dispute is already resolved.
    pub fn resolve(
        &mut self,
        resolution: Resolution,
        resolver: Address,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != DisputeStatus::Open {
            return Err(PostmatchError::invalid_status(
                "dispute",
                self.id,
                self.status,
                DisputeStatus::Resolved,
            ));
        }
        self.status = DisputeStatus::Resolved;
        self.resolution = Some(resolution);
        self.resolver = Some(resolver);
        self.resolved_at = Some(at);
        Ok(())
    }
}
