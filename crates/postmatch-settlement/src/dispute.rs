//! Dispute lifecycle over the seller's escrow.
//!
//! ```text
//!   trade MATCHED | PAYMENT_PENDING ──raise──▶ DISPUTED ──resolve──▶ RESOLVED
//!   escrow ACTIVE ──────────────────────────▶ DISPUTED ──────────▶ RELEASED | REFUNDED
//!   dispute ────────────────────────────────▶ OPEN ──────────────▶ RESOLVED
//! ```
//!
//! Only the seller's escrow backs a trade, so it is the one frozen and paid
//! out. The buyer's commitment escrow is returned by the engine once the
//! trade closes.

use postmatch_ingress::escrow::FEE_DECIMALS;
use postmatch_ingress::{EscrowLedger, FundsTransfer, Payout, validate_reason};
use postmatch_store::{KvStore, accounts, disputes, escrows, sequence, trades};
use postmatch_types::{
    Address, BlockContext, Dispute, DisputeId, DisputeStatus, EngineConfig, Escrow, EscrowStatus,
    PostmatchError, Resolution, Result, Trade, TradeId, TradeStatus,
};
use rust_decimal::{Decimal, RoundingStrategy};

/// Close reason recorded on an escrow paid out by a resolution.
pub const CLOSE_REASON_RESOLVED: &str = "dispute_resolved";

/// A resolution applied to the escrow.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDispute {
    pub dispute: Dispute,
    pub trade: Trade,
    pub payout: Payout,
    pub buyer_amount: Decimal,
    pub seller_amount: Decimal,
    pub fee: Decimal,
}

pub struct DisputeResolver<'a> {
    config: &'a EngineConfig,
    ledger: &'a EscrowLedger,
}

impl<'a> DisputeResolver<'a> {
    #[must_use]
    pub fn new(config: &'a EngineConfig, ledger: &'a EscrowLedger) -> Self {
        Self { config, ledger }
    }

    // =================================================================
    // Open
    // =================================================================

    /// A trade party disputes the trade; the other party is the respondent.
    pub fn raise(
        &self,
        store: &mut impl KvStore,
        ctx: &BlockContext,
        trade_id: &TradeId,
        raised_by: Address,
        reason: &str,
    ) -> Result<Dispute> {
        let trade = trades::get(store, trade_id)?;
        let against = trade.counterparty(&raised_by).ok_or(PostmatchError::Unauthorized {
            actor: raised_by,
            action: "dispute a trade it is not party to",
        })?;
        let parties = [trade.buyer, trade.seller];
        self.open(store, ctx, trade, raised_by, against, reason, &parties)
    }

    /// A module account escalates an overdue trade against `against`.
    pub fn escalate(
        &self,
        store: &mut impl KvStore,
        ctx: &BlockContext,
        trade_id: &TradeId,
        system: Address,
        against: Address,
        reason: &str,
    ) -> Result<Dispute> {
        let trade = trades::get(store, trade_id)?;
        if !trade.is_party(&against) {
            return Err(PostmatchError::validation(format!(
                "{against} is not a party to trade {trade_id}"
            )));
        }
        self.open(store, ctx, trade, system, against, reason, &[system])
    }

    #[allow(clippy::too_many_arguments)]
    fn open(
        &self,
        store: &mut impl KvStore,
        ctx: &BlockContext,
        mut trade: Trade,
        raised_by: Address,
        raised_against: Address,
        reason: &str,
        parties: &[Address],
    ) -> Result<Dispute> {
        validate_reason(reason, self.config.max_reason_len)?;
        trade.transition_to(TradeStatus::Disputed)?;

        let escrow = seller_escrow(store, &trade)?;
        self.ledger.dispute(store, &escrow.id, raised_by, parties)?;

        let dispute = Dispute {
            id: sequence::next_dispute_id(store, ctx.height)?,
            escrow_id: Some(escrow.id),
            trade_id: trade.id,
            raised_by,
            raised_against,
            reason: reason.to_string(),
            status: DisputeStatus::Open,
            resolution: None,
            resolver: None,
            created_at: ctx.time,
            resolved_at: None,
        };
        disputes::put(store, &dispute)?;
        trades::put(store, &trade)?;
        for party in [trade.buyer, trade.seller] {
            accounts::update_stats(store, &party, ctx.time, |s| s.record_dispute_opened(ctx.time))?;
        }

        tracing::info!(
            dispute = %dispute.id,
            trade = %trade.id,
            raised_by = %raised_by,
            against = %raised_against,
            "dispute raised"
        );
        Ok(dispute)
    }

    // =================================================================
    // Resolve
    // =================================================================

    /// Apply `resolution`. Fails without effect if the dispute is already
    /// resolved or `resolver` lacks the role.
    pub fn resolve(
        &self,
        store: &mut impl KvStore,
        bank: &mut impl FundsTransfer,
        ctx: &BlockContext,
        dispute_id: &DisputeId,
        resolution: Resolution,
        resolver: Address,
    ) -> Result<ResolvedDispute> {
        if !self.config.is_resolver(&resolver) {
            return Err(PostmatchError::Unauthorized {
                actor: resolver,
                action: "resolve disputes",
            });
        }
        resolution.validate()?;

        let mut dispute = disputes::get(store, dispute_id)?;
        dispute.resolve(resolution, resolver, ctx.time)?;

        let mut trade = trades::get(store, &dispute.trade_id)?;
        trade.transition_to(TradeStatus::Resolved)?;
        let escrow = match dispute.escrow_id {
            Some(id) => escrows::get(store, &id)?,
            None => seller_escrow(store, &trade)?,
        };

        let (legs, outcome) = self.payout_legs(&escrow, &trade, resolution);
        let payout = self.ledger.close(
            store,
            bank,
            &escrow.id,
            legs,
            outcome,
            CLOSE_REASON_RESOLVED,
            ctx.time,
        )?;

        trade.closed_at = Some(ctx.time);
        trades::put(store, &trade)?;
        disputes::put(store, &dispute)?;
        self.record_outcome(store, ctx, &trade, resolution)?;

        let resolved = ResolvedDispute {
            buyer_amount: payout.amount_to(&trade.buyer),
            seller_amount: payout.amount_to(&trade.seller),
            fee: payout.amount_to(&self.ledger.fee_collector()),
            dispute,
            trade,
            payout,
        };
        tracing::info!(
            dispute = %dispute_id,
            trade = %resolved.trade.id,
            %resolution,
            resolver = %resolver,
            buyer_amount = %resolved.buyer_amount,
            seller_amount = %resolved.seller_amount,
            "dispute resolved"
        );
        Ok(resolved)
    }

    /// Payout of the seller's escrow under `resolution`.
    ///
    /// Split divides the settled amount directly between the parties; the
    /// unsettled part of the principal returns to the seller and the fee
    /// goes whole to the collector.
    #[must_use]
    pub fn payout_legs(
        &self,
        escrow: &Escrow,
        trade: &Trade,
        resolution: Resolution,
    ) -> (Vec<(Address, Decimal)>, EscrowStatus) {
        let collector = self.ledger.fee_collector();
        let settled = trade.amount.min(escrow.principal);
        match resolution {
            Resolution::ReleaseToBuyer => {
                let fee = self.ledger.fee_share(escrow, settled);
                let rest = escrow.total() - settled - fee;
                (
                    vec![(trade.buyer, settled), (collector, fee), (escrow.refund_to, rest)],
                    EscrowStatus::Released,
                )
            }
            Resolution::ReleaseToSeller => (
                vec![(escrow.refund_to, escrow.principal), (collector, escrow.fee)],
                EscrowStatus::Released,
            ),
            Resolution::Split { buyer_pct } => {
                let to_buyer = (settled * Decimal::from(buyer_pct) / Decimal::ONE_HUNDRED)
                    .round_dp_with_strategy(FEE_DECIMALS, RoundingStrategy::ToZero);
                (
                    vec![
                        (trade.buyer, to_buyer),
                        (escrow.refund_to, escrow.principal - to_buyer),
                        (collector, escrow.fee),
                    ],
                    EscrowStatus::Released,
                )
            }
            Resolution::Refund => (
                vec![(escrow.refund_to, escrow.total())],
                EscrowStatus::Refunded,
            ),
        }
    }

    fn record_outcome(
        &self,
        store: &mut impl KvStore,
        ctx: &BlockContext,
        trade: &Trade,
        resolution: Resolution,
    ) -> Result<()> {
        let volume = matches!(resolution, Resolution::ReleaseToBuyer).then_some(trade.amount);
        let buyer_won = resolution.buyer_prevails();
        for (party, is_buyer) in [(trade.buyer, true), (trade.seller, false)] {
            accounts::update_stats(store, &party, ctx.time, |s| {
                if let Some(buyer_won) = buyer_won {
                    s.record_dispute_outcome(buyer_won == is_buyer);
                }
                if let Some(volume) = volume {
                    s.add_volume(volume);
                }
                s.touch(ctx.time);
            })?;
        }
        Ok(())
    }
}

/// The escrow pledged by the trade's sell order.
pub fn seller_escrow(store: &impl KvStore, trade: &Trade) -> Result<Escrow> {
    escrows::for_order(store, &trade.sell_order_id)?
        .ok_or(PostmatchError::NoEscrowForOrder(trade.sell_order_id))
}
