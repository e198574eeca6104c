//! The P2P engine: block lifecycle, commands and queries.
//!
//! ```text
//! begin_block(ctx)
//!   ├─ command ─▶ journal ─▶ validate ─▶ escrow / match / settle ─▶ commit | rollback
//!   ├─ command ─▶ ...
//! end_block()
//!   └─ sweep: escrow expiry ─▶ order expiry ─▶ settlement-window escalation
//! ```
//!
//! Every command runs inside one journaled unit spanning the store and the
//! balance ledger. A command that fails leaves no write behind: both
//! journals roll back, the live book is rebuilt from the store, and events
//! and hook notifications queued by the command are discarded.

use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use postmatch_ingress::escrow::FEE_DECIMALS;
use postmatch_ingress::{
    Authorizer, BalanceManager, EscrowLedger, EscrowRequest, FundsTransfer, OrderRequest, OrderValidator,
    validate_reason,
};
use postmatch_matchcore::{
    BookStats, MarketDepth, MatchingEngine, TrustLevel, TrustScoreEngine, compute_trade_root,
};
use postmatch_store::{KvStore, MemStore, OrderBook, accounts, disputes, escrows, sequence, trades};
use postmatch_types::constants::{REFUND_REASON_EXPIRED, REFUND_REASON_TRADE_CLOSED, SWEEPER_MODULE};
use postmatch_types::{
    Address, BlockContext, Dispute, DisputeId, EngineConfig, Escrow, EscrowId, EscrowSubject,
    Event, Order, OrderId, OrderSide, OrderStatus, PostmatchError, Resolution, Result, Trade,
    TradeId, TradeStatus, UserStats,
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::command::Command;
use crate::custody_audit::{AuditReport, CustodyAudit};
use crate::dispute::{DisputeResolver, seller_escrow};
use crate::expiry::{ExpiryScheduler, SweepReport};
use crate::hooks::{NoopHooks, SubsystemHooks};
use crate::reputation::StoreReputation;

const CANCEL_REASON_EXPIRED: &str = "expired";
const CANCEL_REASON_BANNED: &str = "user_banned";
const ESCALATION_REASON: &str = "settlement window elapsed";

/// Output of one block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockResult {
    pub height: u64,
    pub time: DateTime<Utc>,
    pub events: Vec<Event>,
    /// Trades matched in this block, in match order.
    pub trades: Vec<Trade>,
    /// Hex SHA-256 over `trades`.
    pub trade_root: String,
    pub sweep: SweepReport,
}

pub struct P2pEngine<S: KvStore = MemStore> {
    config: EngineConfig,
    store: S,
    bank: BalanceManager,
    book: OrderBook,
    ledger: EscrowLedger,
    matcher: MatchingEngine,
    trust: TrustScoreEngine,
    validator: OrderValidator,
    scheduler: ExpiryScheduler,
    hooks: Rc<dyn SubsystemHooks>,
    block: Option<BlockContext>,
    last_block: Option<BlockContext>,
    events: Vec<Event>,
    trades: Vec<Trade>,
    /// Fees awaiting hook notification: `(amount, source)`.
    fees: Vec<(Decimal, &'static str)>,
}

impl P2pEngine<MemStore> {
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_store(config, MemStore::new())
    }
}

impl<S: KvStore> P2pEngine<S> {
    /// Build an engine over an existing store; the live book is rebuilt from
    /// the persisted orders.
    pub fn with_store(config: EngineConfig, store: S) -> Result<Self> {
        config.validate()?;
        let book = OrderBook::load(&store)?;
        tracing::info!(
            asset = %config.asset,
            fee_rate = %config.platform_fee_rate,
            live_orders = book.live().len(),
            "engine ready"
        );
        Ok(Self {
            ledger: EscrowLedger::from_config(&config),
            matcher: MatchingEngine::new(config.matching.clone()),
            trust: TrustScoreEngine::new(),
            validator: OrderValidator::from_config(&config),
            scheduler: ExpiryScheduler::new(),
            hooks: Rc::new(NoopHooks),
            bank: BalanceManager::new(),
            block: None,
            last_block: None,
            events: Vec::new(),
            trades: Vec::new(),
            fees: Vec::new(),
            config,
            store,
            book,
        })
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Rc<dyn SubsystemHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn bank(&self) -> &BalanceManager {
        &self.bank
    }

    /// Direct access to balances, for seeding accounts.
    pub fn bank_mut(&mut self) -> &mut BalanceManager {
        &mut self.bank
    }

    #[must_use]
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    #[must_use]
    pub fn matcher(&self) -> &MatchingEngine {
        &self.matcher
    }

    /// Discard the live book and rebuild it from the store.
    pub fn rebuild_book(&mut self) -> Result<()> {
        self.book.rebuild(&self.store)
    }

    /// Current block time, or the last finished block's.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.block
            .or(self.last_block)
            .map_or(DateTime::<Utc>::UNIX_EPOCH, |ctx| ctx.time)
    }

    // =================================================================
    // Block lifecycle
    // =================================================================

    pub fn begin_block(&mut self, ctx: BlockContext) -> Result<()> {
        if let Some(open) = self.block {
            return Err(PostmatchError::Storage {
                reason: format!("block {} is still open", open.height),
            });
        }
        if let Some(last) = self.last_block {
            if ctx.height <= last.height || ctx.time < last.time {
                return Err(PostmatchError::validation(format!(
                    "block {} at {} does not follow block {} at {}",
                    ctx.height, ctx.time, last.height, last.time
                )));
            }
        }
        self.block = Some(ctx);
        self.events.clear();
        self.trades.clear();
        tracing::debug!(height = ctx.height, time = %ctx.time, "block opened");
        Ok(())
    }

    /// Run the expiry sweep and seal the block.
    pub fn end_block(&mut self) -> Result<BlockResult> {
        let ctx = self.context()?;
        let sweep = self.sweep(&ctx)?;

        let trades = std::mem::take(&mut self.trades);
        let trade_root = hex::encode(compute_trade_root(&trades));
        let events = std::mem::take(&mut self.events);
        self.block = None;
        self.last_block = Some(ctx);

        tracing::info!(
            height = ctx.height,
            events = events.len(),
            trades = trades.len(),
            refunded = sweep.refunded.len(),
            escalated = sweep.escalated.len(),
            %trade_root,
            "block finalized"
        );
        Ok(BlockResult {
            height: ctx.height,
            time: ctx.time,
            events,
            trades,
            trade_root,
            sweep,
        })
    }

    fn context(&self) -> Result<BlockContext> {
        self.block.ok_or_else(|| PostmatchError::Storage {
            reason: "no block is open".into(),
        })
    }

    /// Run `op` as one all-or-nothing unit.
    fn journaled<T>(&mut self, op: impl FnOnce(&mut Self, &BlockContext) -> Result<T>) -> Result<T> {
        let ctx = self.context()?;
        self.store.begin()?;
        if let Err(err) = self.bank.begin() {
            self.store.rollback()?;
            return Err(err);
        }
        let marks = (self.events.len(), self.trades.len());

        match op(self, &ctx) {
            Ok(value) => {
                self.store.commit()?;
                self.bank.commit()?;
                for (amount, source) in std::mem::take(&mut self.fees) {
                    self.hooks
                        .on_trading_fee_collected(&self.config.asset, amount, source);
                }
                Ok(value)
            }
            Err(err) => {
                self.store.rollback()?;
                self.bank.rollback()?;
                self.book.rebuild(&self.store)?;
                self.events.truncate(marks.0);
                self.trades.truncate(marks.1);
                self.fees.clear();
                tracing::debug!(error = %err, "command rolled back");
                Err(err)
            }
        }
    }

    /// Execute a serialized command; returns the events it emitted.
    pub fn execute(&mut self, command: Command) -> Result<Vec<Event>> {
        let mark = self.events.len();
        let kind = command.kind();
        let actor = command.actor();
        let result = match command {
            Command::CreateOrder { creator, order } => self.create_order(creator, order).map(drop),
            Command::DepositToEscrow {
                order_id,
                depositor,
                amount,
            } => self.deposit_to_escrow(order_id, depositor, amount).map(drop),
            Command::CancelOrder {
                order_id,
                by,
                reason,
            } => self.cancel_order(order_id, by, &reason),
            Command::MarkPaymentSent { trade_id, by } => self.mark_payment_sent(trade_id, by),
            Command::CompleteTrade {
                trade_id,
                confirmed_by,
            } => self.complete_trade(trade_id, confirmed_by),
            Command::RefundOrder { order_id, by } => self.refund_order(order_id, by),
            Command::CreateDispute {
                trade_id,
                raised_by,
                reason,
            } => self.create_dispute(trade_id, raised_by, &reason).map(drop),
            Command::ResolveDispute {
                dispute_id,
                resolution,
                resolved_by,
            } => self.resolve_dispute(dispute_id, resolution, resolved_by),
            Command::BanUser {
                user,
                until,
                reason,
                by,
            } => self.ban_user(user, until, &reason, by),
            Command::UnbanUser { user, by } => self.unban_user(user, by),
            Command::SetKycStatus { user, verified, by } => self.set_kyc_status(user, verified, by),
        };
        if let Err(err) = &result {
            tracing::warn!(command = kind, actor = %actor, error = %err, "command rejected");
        }
        result.map(|()| self.events[mark..].to_vec())
    }

    // =================================================================
    // Orders
    // =================================================================

    /// Validate and store a `PENDING` order.
    pub fn create_order(&mut self, creator: Address, request: OrderRequest) -> Result<OrderId> {
        self.journaled(|engine, ctx| engine.apply_create_order(ctx, creator, &request))
    }

    fn apply_create_order(
        &mut self,
        ctx: &BlockContext,
        creator: Address,
        request: &OrderRequest,
    ) -> Result<OrderId> {
        self.ensure_not_banned(&creator, ctx.time)?;
        let location = self.validator.validate(request)?;
        let id = sequence::next_order_id(&mut self.store, ctx.height)?;
        let ttl = seconds(self.config.order_ttl_secs)?;

        let mut order = Order {
            id,
            creator,
            side: request.side,
            amount: request.amount,
            min_amount: request.min_amount,
            max_amount: request.max_amount,
            fiat_amount: request.fiat_amount,
            fiat_currency: request.fiat_currency.clone(),
            location,
            payment_methods: request.payment_methods.clone(),
            preferred_languages: request.preferred_languages.clone(),
            max_distance_km: request.max_distance_km,
            min_trust_score: request.min_trust_score,
            require_kyc: request.require_kyc,
            status: OrderStatus::Pending,
            created_at: ctx.time,
            expires_at: later(ctx.time, ttl)?,
            escrow_address: Address::custody_for_order(id),
            escrow_amount: Decimal::ZERO,
        };
        order.escrow_amount = self.escrow_amount_for(&order);

        self.book.put(&mut self.store, &order)?;
        accounts::update_stats(&mut self.store, &creator, ctx.time, |s| s.touch(ctx.time))?;

        tracing::info!(
            order = %id,
            creator = %creator,
            side = %order.side,
            amount = %order.amount,
            postal = %order.location.postal_code,
            "order created"
        );
        self.events.push(Event::OrderCreated {
            order_id: id,
            creator,
            side: order.side,
            amount: order.amount,
            fiat_amount: order.fiat_amount,
            fiat_currency: order.fiat_currency.clone(),
            postal_code: order.location.postal_code.clone(),
        });
        Ok(id)
    }

    /// Sellers pledge their full ceiling; buyers a commitment of the
    /// platform fee on theirs.
    fn escrow_amount_for(&self, order: &Order) -> Decimal {
        let ceiling = order.effective_range().max;
        match order.side {
            OrderSide::Sell => ceiling,
            OrderSide::Buy => (ceiling * self.config.platform_fee_rate)
                .round_dp_with_strategy(FEE_DECIMALS, RoundingStrategy::ToZero),
        }
    }

    /// Fund a `PENDING` order, activate it and try to match it at once.
    /// Returns the trade if one was created.
    pub fn deposit_to_escrow(
        &mut self,
        order_id: OrderId,
        depositor: Address,
        amount: Decimal,
    ) -> Result<Option<TradeId>> {
        self.journaled(|engine, ctx| engine.apply_deposit(ctx, order_id, depositor, amount))
    }

    fn apply_deposit(
        &mut self,
        ctx: &BlockContext,
        order_id: OrderId,
        depositor: Address,
        amount: Decimal,
    ) -> Result<Option<TradeId>> {
        let mut order = self.book.get(&self.store, &order_id)?;
        if depositor != order.creator {
            return Err(PostmatchError::Unauthorized {
                actor: depositor,
                action: "fund another user's order",
            });
        }
        self.ensure_not_banned(&depositor, ctx.time)?;
        if order.status != OrderStatus::Pending {
            return Err(PostmatchError::invalid_status(
                "order",
                order.id,
                order.status,
                OrderStatus::Active,
            ));
        }
        if order.is_expired_at(ctx.time) {
            return Err(PostmatchError::Expired {
                entity: "order",
                id: order.id.to_string(),
                expires_at: order.expires_at,
            });
        }
        if amount != order.escrow_amount {
            return Err(PostmatchError::AmountMismatch {
                expected: order.escrow_amount,
                got: amount,
            });
        }

        if !amount.is_zero() {
            let fee_discount = match order.side {
                // The commitment is itself the fee.
                OrderSide::Buy => Decimal::ONE,
                OrderSide::Sell if self.config.apply_trust_discount => {
                    self.reputation(ctx.time).level(&depositor)?.fee_discount()
                }
                OrderSide::Sell => Decimal::ZERO,
            };
            let escrow = self.ledger.create(
                &mut self.store,
                &mut self.bank,
                ctx,
                EscrowRequest {
                    subject: EscrowSubject::Order(order.id),
                    depositor,
                    principal: amount,
                    fee_discount,
                    expires_at: Some(order.expires_at),
                },
            )?;
            self.events.push(Event::EscrowFunded {
                order_id: order.id,
                escrow_id: escrow.id,
                depositor,
                principal: escrow.principal,
                fee: escrow.fee,
            });
        }

        order.transition_to(OrderStatus::Active)?;
        self.book.put(&mut self.store, &order)?;
        tracing::info!(order = %order.id, escrowed = %amount, "order activated");

        self.try_match(ctx, &order)
    }

    /// Creator withdraws an order that was never funded.
    pub fn cancel_order(&mut self, order_id: OrderId, by: Address, reason: &str) -> Result<()> {
        self.journaled(|engine, ctx| {
            let order = engine.book.get(&engine.store, &order_id)?;
            if by != order.creator {
                return Err(PostmatchError::Unauthorized {
                    actor: by,
                    action: "cancel another user's order",
                });
            }
            validate_reason(reason, engine.config.max_reason_len)?;
            engine.cancel_pending(ctx, order, reason)?;
            accounts::update_stats(&mut engine.store, &by, ctx.time, |s| {
                s.record_cancellation(reason, ctx.time);
            })
        })
    }

    fn cancel_pending(&mut self, ctx: &BlockContext, mut order: Order, reason: &str) -> Result<()> {
        if order.status != OrderStatus::Pending {
            return Err(PostmatchError::invalid_status(
                "order",
                order.id,
                order.status,
                OrderStatus::Cancelled,
            ));
        }
        order.transition_to(OrderStatus::Cancelled)?;
        self.book.put(&mut self.store, &order)?;
        tracing::info!(order = %order.id, reason, height = ctx.height, "order cancelled");
        self.events.push(Event::OrderCancelled {
            order_id: order.id,
            creator: order.creator,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Return an expired, unmatched order's escrow in full.
    pub fn refund_order(&mut self, order_id: OrderId, by: Address) -> Result<()> {
        self.journaled(|engine, ctx| {
            let order = engine.book.get(&engine.store, &order_id)?;
            if order.status != OrderStatus::Active {
                return Err(PostmatchError::invalid_status(
                    "order",
                    order.id,
                    order.status,
                    OrderStatus::Refunded,
                ));
            }
            if !order.is_expired_at(ctx.time) {
                return Err(PostmatchError::NotExpired {
                    entity: "order",
                    id: order.id.to_string(),
                    expires_at: order.expires_at,
                });
            }
            tracing::debug!(order = %order_id, by = %by, "refund requested");
            engine.refund_expired_order(ctx, order)
        })
    }

    /// Refund whatever escrow the order holds and mark it `REFUNDED`.
    fn refund_expired_order(&mut self, ctx: &BlockContext, mut order: Order) -> Result<()> {
        let escrow = escrows::for_order(&self.store, &order.id)?;
        match escrow {
            Some(escrow) => self.refund_escrow(ctx, &escrow)?,
            None if order.escrow_amount.is_zero() => {}
            None => return Err(PostmatchError::NoEscrowForOrder(order.id)),
        }
        order.transition_to(OrderStatus::Refunded)?;
        self.book.put(&mut self.store, &order)
    }

    fn refund_escrow(&mut self, ctx: &BlockContext, escrow: &Escrow) -> Result<()> {
        let payout = self.ledger.refund(
            &mut self.store,
            &mut self.bank,
            &escrow.id,
            REFUND_REASON_EXPIRED,
            ctx.time,
        )?;
        if let Some(order_id) = escrow.order_id() {
            self.events.push(Event::OrderRefunded {
                order_id,
                escrow_id: escrow.id,
                depositor: escrow.depositor,
                amount: payout.amount_to(&escrow.refund_to),
                reason: REFUND_REASON_EXPIRED.to_string(),
            });
        }
        Ok(())
    }

    // =================================================================
    // Matching
    // =================================================================

    fn try_match(&mut self, ctx: &BlockContext, order: &Order) -> Result<Option<TradeId>> {
        let plan = {
            let reputation = self.reputation(ctx.time);
            self.matcher
                .find_match(self.book.live(), order, &reputation, ctx.time)
        };
        let Some(plan) = plan else {
            tracing::debug!(order = %order.id, "no match, order stays queued");
            return Ok(None);
        };

        let id = sequence::next_trade_id(&mut self.store, ctx.height)?;
        let window = seconds(self.config.settlement_window_secs)?;

        for order_id in [plan.buy_order_id, plan.sell_order_id] {
            let mut matched = self.book.get(&self.store, &order_id)?;
            matched.transition_to(OrderStatus::Matched)?;
            self.book.put(&mut self.store, &matched)?;
            // Matched escrows leave the expiry queue; only settlement or a
            // resolution closes them now.
            if let Some(mut escrow) = escrows::for_order(&self.store, &order_id)? {
                escrow.expires_at = None;
                escrows::put(&mut self.store, &escrow)?;
            }
        }

        let trade = Trade {
            id,
            buy_order_id: plan.buy_order_id,
            sell_order_id: plan.sell_order_id,
            buyer: plan.buyer,
            seller: plan.seller,
            amount: plan.amount,
            fiat_amount: plan.fiat_amount,
            fiat_currency: plan.fiat_currency,
            payment_method: plan.payment_method,
            escrow_address: plan.escrow_address,
            status: TradeStatus::Matched,
            created_at: ctx.time,
            expires_at: later(ctx.time, window)?,
            payment_sent_at: None,
            closed_at: None,
        };
        trades::put(&mut self.store, &trade)?;
        for party in [trade.buyer, trade.seller] {
            accounts::update_stats(&mut self.store, &party, ctx.time, |s| {
                s.record_trade_start(ctx.time);
            })?;
        }

        tracing::info!(
            trade = %id,
            buy_order = %trade.buy_order_id,
            sell_order = %trade.sell_order_id,
            amount = %trade.amount,
            fiat = %trade.fiat_amount,
            score = %plan.score,
            "order matched"
        );
        self.events.push(Event::TradeMatched {
            trade_id: id,
            buy_order_id: trade.buy_order_id,
            sell_order_id: trade.sell_order_id,
            buyer: trade.buyer,
            seller: trade.seller,
            amount: trade.amount,
            fiat_amount: trade.fiat_amount,
            payment_method: trade.payment_method.method_type,
        });
        self.trades.push(trade);
        Ok(Some(id))
    }

    // =================================================================
    // Trades
    // =================================================================

    /// Buyer reports the fiat payment as sent.
    pub fn mark_payment_sent(&mut self, trade_id: TradeId, by: Address) -> Result<()> {
        self.journaled(|engine, ctx| {
            let mut trade = trades::get(&engine.store, &trade_id)?;
            if by != trade.buyer {
                return Err(PostmatchError::Unauthorized {
                    actor: by,
                    action: "mark payment sent on a trade it is not buying",
                });
            }
            trade.transition_to(TradeStatus::PaymentPending)?;
            trade.payment_sent_at = Some(ctx.time);
            trades::put(&mut engine.store, &trade)?;
            tracing::info!(trade = %trade_id, "payment marked sent");
            engine.events.push(Event::PaymentMarkedSent {
                trade_id,
                buyer: by,
            });
            Ok(())
        })
    }

    /// Seller confirms fiat receipt: the settled amount goes to the buyer.
    pub fn complete_trade(&mut self, trade_id: TradeId, confirmed_by: Address) -> Result<()> {
        self.journaled(|engine, ctx| engine.apply_complete(ctx, trade_id, confirmed_by))
    }

    fn apply_complete(&mut self, ctx: &BlockContext, trade_id: TradeId, confirmed_by: Address) -> Result<()> {
        let mut trade = trades::get(&self.store, &trade_id)?;
        if confirmed_by != trade.seller {
            return Err(PostmatchError::Unauthorized {
                actor: confirmed_by,
                action: "confirm payment on a trade it is not selling",
            });
        }
        trade.transition_to(TradeStatus::Completed)?;

        let escrow = seller_escrow(&self.store, &trade)?;
        let payout = self.ledger.settle(
            &mut self.store,
            &mut self.bank,
            &escrow.id,
            trade.buyer,
            trade.amount,
            Authorizer::from_config(confirmed_by, &self.config),
            "trade_completed",
            ctx.time,
        )?;
        self.refund_commitment(ctx, &trade)?;
        self.complete_orders(&trade)?;

        trade.closed_at = Some(ctx.time);
        trades::put(&mut self.store, &trade)?;

        let response_secs = u64::try_from((ctx.time - trade.created_at).num_seconds()).unwrap_or(0);
        accounts::update_stats(&mut self.store, &trade.seller, ctx.time, |s| {
            s.record_trade_completion(trade.amount, Some(response_secs), ctx.time);
        })?;
        accounts::update_stats(&mut self.store, &trade.buyer, ctx.time, |s| {
            s.record_trade_completion(trade.amount, None, ctx.time);
        })?;

        let fee = payout.amount_to(&self.ledger.fee_collector());
        self.note_fee(fee, "trade_completed");
        tracing::info!(
            trade = %trade_id,
            buyer = %trade.buyer,
            amount = %trade.amount,
            %fee,
            "trade completed"
        );
        self.events.push(Event::TradeCompleted {
            trade_id,
            buyer: trade.buyer,
            seller: trade.seller,
            amount: trade.amount,
            fee,
        });
        Ok(())
    }

    /// Return the buyer's commitment escrow once its trade has closed.
    fn refund_commitment(&mut self, ctx: &BlockContext, trade: &Trade) -> Result<()> {
        let Some(escrow) = escrows::for_order(&self.store, &trade.buy_order_id)? else {
            return Ok(());
        };
        if escrow.holds_funds() {
            self.ledger.refund(
                &mut self.store,
                &mut self.bank,
                &escrow.id,
                REFUND_REASON_TRADE_CLOSED,
                ctx.time,
            )?;
        }
        Ok(())
    }

    fn complete_orders(&mut self, trade: &Trade) -> Result<()> {
        for order_id in [trade.buy_order_id, trade.sell_order_id] {
            let mut order = self.book.get(&self.store, &order_id)?;
            order.transition_to(OrderStatus::Completed)?;
            self.book.put(&mut self.store, &order)?;
        }
        Ok(())
    }

    fn note_fee(&mut self, amount: Decimal, source: &'static str) {
        if amount > Decimal::ZERO {
            self.fees.push((amount, source));
        }
    }

    // =================================================================
    // Disputes
    // =================================================================

    pub fn create_dispute(
        &mut self,
        trade_id: TradeId,
        raised_by: Address,
        reason: &str,
    ) -> Result<DisputeId> {
        self.journaled(|engine, ctx| {
            let dispute = DisputeResolver::new(&engine.config, &engine.ledger).raise(
                &mut engine.store,
                ctx,
                &trade_id,
                raised_by,
                reason,
            )?;
            engine.push_dispute_raised(&dispute);
            Ok(dispute.id)
        })
    }

    fn push_dispute_raised(&mut self, dispute: &Dispute) {
        self.events.push(Event::DisputeRaised {
            dispute_id: dispute.id,
            trade_id: dispute.trade_id,
            escrow_id: dispute.escrow_id,
            raised_by: dispute.raised_by,
            raised_against: dispute.raised_against,
            reason: dispute.reason.clone(),
        });
    }

    pub fn resolve_dispute(
        &mut self,
        dispute_id: DisputeId,
        resolution: Resolution,
        resolved_by: Address,
    ) -> Result<()> {
        self.journaled(|engine, ctx| {
            let resolved = DisputeResolver::new(&engine.config, &engine.ledger).resolve(
                &mut engine.store,
                &mut engine.bank,
                ctx,
                &dispute_id,
                resolution,
                resolved_by,
            )?;
            engine.refund_commitment(ctx, &resolved.trade)?;
            engine.complete_orders(&resolved.trade)?;
            engine.note_fee(resolved.fee, "dispute_resolved");
            engine.events.push(Event::DisputeResolved {
                dispute_id,
                trade_id: resolved.trade.id,
                resolution,
                resolver: resolved_by,
                buyer_amount: resolved.buyer_amount,
                seller_amount: resolved.seller_amount,
            });
            Ok(())
        })
    }

    // =================================================================
    // Administration
    // =================================================================

    /// Ban `user` until `until` and cancel their unfunded orders.
    pub fn ban_user(&mut self, user: Address, until: DateTime<Utc>, reason: &str, by: Address) -> Result<()> {
        self.journaled(|engine, ctx| {
            engine.ensure_admin(&by, "ban users")?;
            validate_reason(reason, engine.config.max_reason_len)?;
            if until <= ctx.time {
                return Err(PostmatchError::validation(format!(
                    "ban end {until} is not after block time {}",
                    ctx.time
                )));
            }
            accounts::update_stats(&mut engine.store, &user, ctx.time, |s| s.ban(until, reason))?;

            let pending: Vec<Order> = engine
                .book
                .query_by_user(&engine.store, &user)?
                .into_iter()
                .filter(|order| order.status == OrderStatus::Pending)
                .collect();
            for order in pending {
                engine.cancel_pending(ctx, order, CANCEL_REASON_BANNED)?;
            }

            tracing::info!(user = %user, %until, by = %by, "user banned");
            engine.events.push(Event::UserBanned {
                user,
                until,
                reason: reason.to_string(),
            });
            Ok(())
        })
    }

    pub fn unban_user(&mut self, user: Address, by: Address) -> Result<()> {
        self.journaled(|engine, ctx| {
            engine.ensure_admin(&by, "unban users")?;
            accounts::update_stats(&mut engine.store, &user, ctx.time, UserStats::unban)?;
            tracing::info!(user = %user, by = %by, "user unbanned");
            engine.events.push(Event::UserUnbanned { user });
            Ok(())
        })
    }

    pub fn set_kyc_status(&mut self, user: Address, verified: bool, by: Address) -> Result<()> {
        self.journaled(|engine, _| {
            engine.ensure_admin(&by, "set KYC status")?;
            accounts::set_kyc(&mut engine.store, &user, verified);
            tracing::info!(user = %user, verified, "kyc status set");
            Ok(())
        })
    }

    fn ensure_admin(&self, who: &Address, action: &'static str) -> Result<()> {
        if self.config.is_admin(who) {
            Ok(())
        } else {
            Err(PostmatchError::Unauthorized { actor: *who, action })
        }
    }

    fn ensure_not_banned(&self, who: &Address, now: DateTime<Utc>) -> Result<()> {
        match accounts::find_stats(&self.store, who)?.and_then(|s| s.banned_until) {
            Some(until) if now < until => Err(PostmatchError::UserBanned { user: *who, until }),
            _ => Ok(()),
        }
    }

    // =================================================================
    // Expiry sweep
    // =================================================================

    fn sweep(&mut self, ctx: &BlockContext) -> Result<SweepReport> {
        let plan = self.scheduler.plan(&self.store, &self.book, ctx.time)?;
        let mut report = SweepReport::default();

        for entry in plan.escrows {
            let escrow_id = entry.escrow_id;
            match self.journaled(|engine, ctx| engine.expire_escrow(ctx, &escrow_id)) {
                Ok(()) => report.refunded.push(escrow_id),
                Err(err) => {
                    tracing::warn!(escrow = %escrow_id, error = %err, "expiry refund failed");
                    report.failed += 1;
                }
            }
            // Dequeue regardless so a bad entry is never retried forever.
            self.store.delete(&entry.key);
        }

        for order_id in plan.orders {
            match self.journaled(|engine, ctx| engine.expire_order(ctx, &order_id)) {
                Ok(Some(OrderStatus::Cancelled)) => report.cancelled.push(order_id),
                Ok(Some(_)) => report.lapsed.push(order_id),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(order = %order_id, error = %err, "expiry cancel failed");
                    report.failed += 1;
                }
            }
        }

        for trade_id in plan.trades {
            match self.journaled(|engine, ctx| engine.escalate_trade(ctx, &trade_id)) {
                Ok(()) => report.escalated.push(trade_id),
                Err(err) => {
                    tracing::warn!(trade = %trade_id, error = %err, "escalation failed");
                    report.failed += 1;
                    if let Ok(trade) = trades::get(&self.store, &trade_id) {
                        trades::dequeue(&mut self.store, &trade);
                    }
                }
            }
        }

        if !report.is_empty() {
            tracing::info!(
                height = ctx.height,
                refunded = report.refunded.len(),
                cancelled = report.cancelled.len(),
                lapsed = report.lapsed.len(),
                escalated = report.escalated.len(),
                failed = report.failed,
                "expiry sweep"
            );
        }
        Ok(report)
    }

    /// Close a lapsed order; `None` if an earlier step already closed it.
    fn expire_order(&mut self, ctx: &BlockContext, order_id: &OrderId) -> Result<Option<OrderStatus>> {
        let order = self.book.get(&self.store, order_id)?;
        match order.status {
            OrderStatus::Pending => {
                self.cancel_pending(ctx, order, CANCEL_REASON_EXPIRED)?;
                Ok(Some(OrderStatus::Cancelled))
            }
            OrderStatus::Active => {
                self.refund_expired_order(ctx, order)?;
                Ok(Some(OrderStatus::Refunded))
            }
            _ => Ok(None),
        }
    }

    fn expire_escrow(&mut self, ctx: &BlockContext, escrow_id: &EscrowId) -> Result<()> {
        let escrow = escrows::get(&self.store, escrow_id)?;
        let order = match escrow.order_id() {
            Some(order_id) => Some(self.book.get(&self.store, &order_id)?),
            None => None,
        };
        match order {
            Some(order) if order.status == OrderStatus::Active => {
                self.refund_expired_order(ctx, order)
            }
            _ => self.refund_escrow(ctx, &escrow),
        }
    }

    /// An open trade outlived its window: dispute it against whoever stalled.
    fn escalate_trade(&mut self, ctx: &BlockContext, trade_id: &TradeId) -> Result<()> {
        let trade = trades::get(&self.store, trade_id)?;
        let against = match trade.status {
            TradeStatus::Matched => trade.buyer,
            _ => trade.seller,
        };
        let dispute = DisputeResolver::new(&self.config, &self.ledger).escalate(
            &mut self.store,
            ctx,
            trade_id,
            Address::module(SWEEPER_MODULE),
            against,
            ESCALATION_REASON,
        )?;
        self.push_dispute_raised(&dispute);
        Ok(())
    }

    // =================================================================
    // Queries
    // =================================================================

    fn reputation(&self, now: DateTime<Utc>) -> StoreReputation<'_, S> {
        StoreReputation::new(&self.store, &self.trust, now)
    }

    pub fn order(&self, id: &OrderId) -> Result<Order> {
        self.book.get(&self.store, id)
    }

    pub fn trade(&self, id: &TradeId) -> Result<Trade> {
        trades::get(&self.store, id)
    }

    pub fn escrow(&self, id: &EscrowId) -> Result<Escrow> {
        escrows::get(&self.store, id)
    }

    pub fn escrow_for_order(&self, order_id: &OrderId) -> Result<Option<Escrow>> {
        escrows::for_order(&self.store, order_id)
    }

    pub fn dispute(&self, id: &DisputeId) -> Result<Dispute> {
        disputes::get(&self.store, id)
    }

    pub fn orders_by_user(&self, user: &Address) -> Result<Vec<Order>> {
        self.book.query_by_user(&self.store, user)
    }

    pub fn trades_by_user(&self, user: &Address) -> Result<Vec<Trade>> {
        trades::by_user(&self.store, user)
    }

    pub fn user_stats(&self, user: &Address) -> Result<Option<UserStats>> {
        accounts::find_stats(&self.store, user)
    }

    pub fn trust_score(&self, user: &Address) -> Result<u8> {
        self.reputation(self.now()).score(user)
    }

    pub fn trust_level(&self, user: &Address) -> Result<TrustLevel> {
        self.reputation(self.now()).level(user)
    }

    pub fn fee_discount(&self, user: &Address) -> Result<Decimal> {
        self.trust_level(user).map(TrustLevel::fee_discount)
    }

    #[must_use]
    pub fn book_stats(&self) -> BookStats {
        self.book.live().stats()
    }

    #[must_use]
    pub fn market_depth(&self, currency: &str) -> MarketDepth {
        self.book.live().depth(currency)
    }

    /// Settlement-token balance of `account`.
    #[must_use]
    pub fn balance(&self, account: &Address) -> Decimal {
        self.bank.balance(account, &self.config.asset)
    }

    pub fn audit(&self) -> Result<AuditReport> {
        CustodyAudit::verify(&self.store, &self.bank)
    }
}

fn seconds(secs: u64) -> Result<Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| PostmatchError::Config {
            reason: format!("duration of {secs}s is out of range"),
        })
}

fn later(at: DateTime<Utc>, by: Duration) -> Result<DateTime<Utc>> {
    at.checked_add_signed(by).ok_or_else(|| PostmatchError::Config {
        reason: format!("{at} + {by} overflows"),
    })
}
