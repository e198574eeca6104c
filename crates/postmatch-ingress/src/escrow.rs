//! Escrow ledger: custodies pledged funds against an order or trade.
//!
//! Creating an escrow moves principal plus platform fee from the depositor
//! to a custody address derived from the subject id. Closing it pays the
//! custody balance out in one all-or-nothing batch and moves the escrow to a
//! terminal status. Every precondition is checked before any transfer.
//!
//! ```text
//! ACTIVE ──▶ RELEASED | REFUNDED | DISPUTED
//! DISPUTED ──▶ RELEASED | REFUNDED
//! ```

use chrono::{DateTime, Utc};
use postmatch_store::{KvStore, escrows, sequence};
use postmatch_types::{
    Address, BlockContext, EngineConfig, Escrow, EscrowId, EscrowStatus, EscrowSubject,
    PostmatchError, Result,
};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::balance_manager::FundsTransfer;

/// Decimal places kept on computed fees.
pub const FEE_DECIMALS: u32 = 8;

/// Parameters of a new escrow.
#[derive(Debug, Clone, PartialEq)]
pub struct EscrowRequest {
    pub subject: EscrowSubject,
    pub depositor: Address,
    pub principal: Decimal,
    /// Fraction of the platform fee waived, from the depositor's trust level.
    pub fee_discount: Decimal,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Party asking to pay custody out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorizer {
    pub who: Address,
    pub is_admin: bool,
}

impl Authorizer {
    #[must_use]
    pub fn from_config(who: Address, config: &EngineConfig) -> Self {
        Self {
            who,
            is_admin: config.is_admin(&who),
        }
    }
}

/// Where an escrow's funds went when it closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Payout {
    pub escrow: Escrow,
    pub legs: Vec<(Address, Decimal)>,
}

impl Payout {
    #[must_use]
    pub fn amount_to(&self, who: &Address) -> Decimal {
        self.legs
            .iter()
            .filter(|(to, _)| to == who)
            .map(|(_, amount)| *amount)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EscrowLedger {
    asset: String,
    fee_rate: Decimal,
    fee_collector: Address,
}

impl EscrowLedger {
    #[must_use]
    pub fn new(asset: impl Into<String>, fee_rate: Decimal, fee_collector: Address) -> Self {
        Self {
            asset: asset.into(),
            fee_rate,
            fee_collector,
        }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.asset.clone(), config.platform_fee_rate, config.fee_collector)
    }

    #[must_use]
    pub fn asset(&self) -> &str {
        &self.asset
    }

    #[must_use]
    pub fn fee_collector(&self) -> Address {
        self.fee_collector
    }

    /// `principal × rate × (1 − discount)`, truncated.
    #[must_use]
    pub fn fee_for(&self, principal: Decimal, discount: Decimal) -> Decimal {
        let discount = discount.clamp(Decimal::ZERO, Decimal::ONE);
        (principal * self.fee_rate * (Decimal::ONE - discount))
            .round_dp_with_strategy(FEE_DECIMALS, RoundingStrategy::ToZero)
    }

    // =================================================================
    // Create
    // =================================================================

    /// Lock principal plus fee at the subject's custody address.
    pub fn create(
        &self,
        store: &mut impl KvStore,
        bank: &mut impl FundsTransfer,
        ctx: &BlockContext,
        request: EscrowRequest,
    ) -> Result<Escrow> {
        if request.principal <= Decimal::ZERO {
            return Err(PostmatchError::validation("escrow principal must be positive"));
        }
        let existing = match request.subject {
            EscrowSubject::Order(id) => escrows::for_order(store, &id)?,
            EscrowSubject::Trade(id) => escrows::for_trade(store, &id)?,
        };
        if let Some(existing) = existing {
            return Err(PostmatchError::validation(format!(
                "subject already escrowed by {}",
                existing.id
            )));
        }

        let fee = self.fee_for(request.principal, request.fee_discount);
        let total = request.principal + fee;
        let available = bank.balance(&request.depositor, &self.asset);
        if available < total {
            return Err(PostmatchError::InsufficientFunds {
                account: request.depositor,
                asset: self.asset.clone(),
                needed: total,
                available,
            });
        }

        let id = sequence::next_escrow_id(store, ctx.height)?;
        let custody = match request.subject {
            EscrowSubject::Order(order_id) => Address::custody_for_order(order_id),
            EscrowSubject::Trade(_) => Address::custody_for_escrow(id),
        };
        bank.transfer(&request.depositor, &custody, &self.asset, total)?;

        let escrow = Escrow {
            id,
            subject: request.subject,
            depositor: request.depositor,
            custody,
            asset: self.asset.clone(),
            principal: request.principal,
            fee,
            status: EscrowStatus::Active,
            created_at: ctx.time,
            expires_at: request.expires_at,
            refund_to: request.depositor,
            release_to: None,
            close_reason: None,
            closed_at: None,
        };
        escrows::put(store, &escrow)?;
        tracing::info!(
            escrow = %id,
            depositor = %escrow.depositor,
            principal = %escrow.principal,
            fee = %escrow.fee,
            "escrow created"
        );
        Ok(escrow)
    }

    // =================================================================
    // Close
    // =================================================================

    /// Whole principal to `to`, fee to the collector.
    pub fn release(
        &self,
        store: &mut impl KvStore,
        bank: &mut impl FundsTransfer,
        escrow_id: &EscrowId,
        to: Address,
        authorizer: Authorizer,
        now: DateTime<Utc>,
    ) -> Result<Payout> {
        let principal = escrows::get(store, escrow_id)?.principal;
        self.settle(store, bank, escrow_id, to, principal, authorizer, "released", now)
    }

    /// Release `amount` of the principal to `recipient` with the matching
    /// share of the fee; the unused principal and fee return to the
    /// depositor. Only the depositor (the party whose funds are held) or an
    /// admin may authorize.
    #[allow(clippy::too_many_arguments)]
    pub fn settle(
        &self,
        store: &mut impl KvStore,
        bank: &mut impl FundsTransfer,
        escrow_id: &EscrowId,
        recipient: Address,
        amount: Decimal,
        authorizer: Authorizer,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Payout> {
        let escrow = escrows::get(store, escrow_id)?;
        if authorizer.who != escrow.depositor && !authorizer.is_admin {
            return Err(PostmatchError::Unauthorized {
                actor: authorizer.who,
                action: "release escrow",
            });
        }
        if amount <= Decimal::ZERO || amount > escrow.principal {
            return Err(PostmatchError::validation(format!(
                "settled amount {amount} outside escrow principal {}",
                escrow.principal
            )));
        }
        let fee = self.fee_share(&escrow, amount);
        let remainder = escrow.total() - amount - fee;
        let legs = vec![
            (recipient, amount),
            (self.fee_collector, fee),
            (escrow.refund_to, remainder),
        ];
        self.close(store, bank, escrow_id, legs, EscrowStatus::Released, reason, now)
    }

    /// Principal plus fee back to the refund address.
    pub fn refund(
        &self,
        store: &mut impl KvStore,
        bank: &mut impl FundsTransfer,
        escrow_id: &EscrowId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Payout> {
        let escrow = escrows::get(store, escrow_id)?;
        let legs = vec![(escrow.refund_to, escrow.total())];
        self.close(store, bank, escrow_id, legs, EscrowStatus::Refunded, reason, now)
    }

    /// Freeze the escrow pending dispute resolution. `by` must be the
    /// depositor or one of `parties`.
    pub fn dispute(
        &self,
        store: &mut impl KvStore,
        escrow_id: &EscrowId,
        by: Address,
        parties: &[Address],
    ) -> Result<Escrow> {
        let mut escrow = escrows::get(store, escrow_id)?;
        if by != escrow.depositor && !parties.contains(&by) {
            return Err(PostmatchError::Unauthorized {
                actor: by,
                action: "dispute escrow",
            });
        }
        escrow.transition_to(EscrowStatus::Disputed)?;
        escrows::put(store, &escrow)?;
        tracing::info!(escrow = %escrow.id, by = %by, "escrow disputed");
        Ok(escrow)
    }

    /// Pay the custody balance out along `legs` and close the escrow with
    /// `outcome`. The legs must account for principal plus fee exactly.
    #[allow(clippy::too_many_arguments)]
    pub fn close(
        &self,
        store: &mut impl KvStore,
        bank: &mut impl FundsTransfer,
        escrow_id: &EscrowId,
        legs: Vec<(Address, Decimal)>,
        outcome: EscrowStatus,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Payout> {
        let mut escrow = escrows::get(store, escrow_id)?;
        if !escrow.holds_funds() || !escrow.status.can_transition_to(outcome) {
            return Err(PostmatchError::invalid_status(
                "escrow",
                escrow.id,
                escrow.status,
                outcome,
            ));
        }

        let legs: Vec<(Address, Decimal)> =
            legs.into_iter().filter(|(_, amount)| !amount.is_zero()).collect();
        let paid: Decimal = legs.iter().map(|(_, amount)| *amount).sum();
        if paid != escrow.total() {
            return Err(PostmatchError::validation(format!(
                "payout {paid} does not match escrow total {}",
                escrow.total()
            )));
        }
        let held = bank.balance(&escrow.custody, &escrow.asset);
        if held < paid {
            return Err(PostmatchError::InsufficientLiquidity {
                reason: format!("custody {} holds {held}, payout needs {paid}", escrow.custody),
            });
        }

        bank.transfer_batch(&escrow.custody, &legs, &escrow.asset)?;

        escrow.transition_to(outcome)?;
        escrow.release_to = match outcome {
            EscrowStatus::Released => legs.first().map(|(to, _)| *to),
            _ => None,
        };
        escrow.close_reason = Some(reason.to_string());
        escrow.closed_at = Some(now);
        escrows::put(store, &escrow)?;
        tracing::info!(
            escrow = %escrow.id,
            status = %escrow.status,
            reason,
            legs = legs.len(),
            "escrow closed"
        );
        Ok(Payout { escrow, legs })
    }

    /// Fee attributable to `amount` of the principal, truncated.
    #[must_use]
    pub fn fee_share(&self, escrow: &Escrow, amount: Decimal) -> Decimal {
        if escrow.principal.is_zero() || amount >= escrow.principal {
            return escrow.fee;
        }
        (escrow.fee * amount / escrow.principal)
            .round_dp_with_strategy(FEE_DECIMALS, RoundingStrategy::ToZero)
    }
}
