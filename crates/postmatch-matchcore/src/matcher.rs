//! Deterministic order matcher.
//!
//! Given a freshly funded order, [`MatchingEngine::find_match`] pulls
//! opposite-side candidates from the [`LiveBook`], filters them through the
//! compatibility predicate, ranks the survivors by score and plans a trade
//! with the best one that shares a payment rail. It reads the book and the
//! reputation view and never mutates anything.
//!
//! ## Candidate widening
//!
//! ```text
//! postal code ──(< district threshold)──▶ + district
//!             ──(< state threshold)────▶ + state, bounded by max distance
//! ```
//!
//! ## Tie-breaking
//!
//! Ranking uses a stable sort on the total score, so equal scores keep the
//! candidate retrieval order: postal bucket first, then district, then state,
//! each in order id order. That order is a pure function of the book.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use postmatch_types::{
    Address, AmountRange, MatchingConfig, Order, OrderId, OrderSide, PaymentMethod, UserStats,
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::LiveBook;
use crate::scoring::{
    COMPLETION_WEIGHT, DISTANCE_WEIGHT, LOW_DISPUTE_BONUS, LOW_DISPUTE_MIN_TRADES, PRICE_WEIGHT,
    ScoreBreakdown, TRUST_WEIGHT, age_bonus, distance_score, payment_overlap_ratio,
    price_match_score, select_payment_method, shares_language, volume_bonus,
};

/// Decimal places kept on fiat amounts.
pub const FIAT_DECIMALS: u32 = 2;

/// Read-only reputation data the matcher needs about a counterparty.
pub trait Reputation {
    /// Current trust score in `[0, 100]`.
    fn trust_score(&self, who: &Address) -> u8;
    fn stats(&self, who: &Address) -> Option<UserStats>;
    fn is_kyc_verified(&self, who: &Address) -> bool;
    fn is_banned(&self, who: &Address) -> bool;
}

/// Why a candidate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Incompatibility {
    SameSide,
    SelfTrade,
    NotActive,
    CurrencyMismatch,
    Expired,
    NoAmountOverlap,
    /// `who` scores below the other side's minimum.
    TrustTooLow { who: Address, score: u8, required: u8 },
    /// `who` is not KYC verified but the other side requires it.
    KycRequired { who: Address },
    Banned { who: Address },
}

/// A compatible candidate and its score.
#[derive(Debug, Clone)]
pub struct RankedCandidate<'b> {
    pub order: &'b Order,
    pub distance_km: u32,
    pub score: ScoreBreakdown,
}

/// The trade the matcher wants to create.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradePlan {
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer: Address,
    pub seller: Address,
    pub amount: Decimal,
    pub fiat_amount: Decimal,
    pub fiat_currency: String,
    pub payment_method: PaymentMethod,
    /// The seller's escrow custody address.
    pub escrow_address: Address,
    pub score: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct MatchingEngine {
    config: MatchingConfig,
}

impl MatchingEngine {
    #[must_use]
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Radius for `order`, falling back to the configured default.
    #[must_use]
    pub fn max_distance_km(&self, order: &Order) -> u32 {
        if order.max_distance_km == 0 {
            self.config.max_distance_km
        } else {
            order.max_distance_km
        }
    }

    // =================================================================
    // Candidate retrieval
    // =================================================================

    /// Opposite-side live orders near `order`, widening from postal code to
    /// district to state while the pool is small. No duplicates, never
    /// `order` itself.
    #[must_use]
    pub fn candidates<'b>(&self, book: &'b LiveBook, order: &Order) -> Vec<&'b Order> {
        let side = order.side.opposite();
        let location = &order.location;
        let mut seen: BTreeSet<OrderId> = BTreeSet::new();
        seen.insert(order.id);
        let mut pool: Vec<&'b Order> = Vec::new();

        let mut take = |candidate: &'b Order, pool: &mut Vec<&'b Order>| {
            if seen.insert(candidate.id) {
                pool.push(candidate);
            }
        };

        for candidate in book.by_postal_code(side, &location.postal_code) {
            take(candidate, &mut pool);
        }

        if pool.len() < self.config.district_widen_threshold {
            for candidate in book.by_district(side, &location.district) {
                take(candidate, &mut pool);
            }
        }

        if pool.len() < self.config.state_widen_threshold {
            let max_km = self.max_distance_km(order);
            for candidate in book.by_state(side, &location.state) {
                if location.distance_km(&candidate.location) <= max_km {
                    take(candidate, &mut pool);
                }
            }
        }

        tracing::debug!(
            order = %order.id,
            candidates = pool.len(),
            "candidate pool assembled"
        );
        pool
    }

    // =================================================================
    // Compatibility
    // =================================================================

    /// Every condition must hold for `order` and `candidate` to trade.
    pub fn check_compatible(
        &self,
        order: &Order,
        candidate: &Order,
        reputation: &impl Reputation,
        now: DateTime<Utc>,
    ) -> Result<(), Incompatibility> {
        if order.side == candidate.side {
            return Err(Incompatibility::SameSide);
        }
        if order.creator == candidate.creator {
            return Err(Incompatibility::SelfTrade);
        }
        if !order.is_active() || !candidate.is_active() {
            return Err(Incompatibility::NotActive);
        }
        if order.fiat_currency != candidate.fiat_currency {
            return Err(Incompatibility::CurrencyMismatch);
        }
        if order.is_expired_at(now) || candidate.is_expired_at(now) {
            return Err(Incompatibility::Expired);
        }
        if order
            .effective_range()
            .overlap(&candidate.effective_range())
            .is_none()
        {
            return Err(Incompatibility::NoAmountOverlap);
        }
        for (party, other) in [(order, candidate), (candidate, order)] {
            if reputation.is_banned(&party.creator) {
                return Err(Incompatibility::Banned { who: party.creator });
            }
            let required = other.min_trust_score;
            let score = reputation.trust_score(&party.creator);
            if score < required {
                return Err(Incompatibility::TrustTooLow {
                    who: party.creator,
                    score,
                    required,
                });
            }
            if other.require_kyc && !reputation.is_kyc_verified(&party.creator) {
                return Err(Incompatibility::KycRequired { who: party.creator });
            }
        }
        Ok(())
    }

    // =================================================================
    // Scoring
    // =================================================================

    #[must_use]
    pub fn score(
        &self,
        order: &Order,
        candidate: &Order,
        reputation: &impl Reputation,
        now: DateTime<Utc>,
    ) -> ScoreBreakdown {
        let distance_km = order.location.distance_km(&candidate.location);
        let trust_sum = u32::from(reputation.trust_score(&order.creator))
            + u32::from(reputation.trust_score(&candidate.creator));
        let trust_avg = Decimal::from(trust_sum) / Decimal::TWO;

        let (completion, low_dispute) = reputation
            .stats(&candidate.creator)
            .map_or((Decimal::ZERO, Decimal::ZERO), |stats| {
                let completion = stats.success_rate() * Decimal::from(COMPLETION_WEIGHT);
                let low_dispute = if stats.disputed_trades == 0
                    && stats.total_trades > LOW_DISPUTE_MIN_TRADES
                {
                    Decimal::from(LOW_DISPUTE_BONUS)
                } else {
                    Decimal::ZERO
                };
                (completion, low_dispute)
            });

        ScoreBreakdown {
            distance: distance_score(distance_km, self.max_distance_km(order))
                * Decimal::from(DISTANCE_WEIGHT),
            price: price_match_score(
                order.rate(),
                candidate.rate(),
                self.config.max_price_deviation,
            ) * Decimal::from(PRICE_WEIGHT),
            trust: trust_avg / Decimal::ONE_HUNDRED * Decimal::from(TRUST_WEIGHT),
            payment: payment_overlap_ratio(&order.payment_methods, &candidate.payment_methods)
                * self.config.payment_method_weight,
            language: if shares_language(
                &order.preferred_languages,
                &candidate.preferred_languages,
            ) {
                self.config.language_bonus
            } else {
                Decimal::ZERO
            },
            age: age_bonus(candidate.created_at, now),
            volume: volume_bonus(order.amount, candidate.amount),
            completion,
            low_dispute,
        }
    }

    /// Compatible candidates, best first.
    #[must_use]
    pub fn rank<'b>(
        &self,
        book: &'b LiveBook,
        order: &Order,
        reputation: &impl Reputation,
        now: DateTime<Utc>,
    ) -> Vec<RankedCandidate<'b>> {
        let mut ranked: Vec<RankedCandidate<'b>> = self
            .candidates(book, order)
            .into_iter()
            .filter(|candidate| {
                match self.check_compatible(order, candidate, reputation, now) {
                    Ok(()) => true,
                    Err(reason) => {
                        tracing::debug!(
                            order = %order.id,
                            candidate = %candidate.id,
                            ?reason,
                            "candidate rejected"
                        );
                        false
                    }
                }
            })
            .map(|candidate| RankedCandidate {
                order: candidate,
                distance_km: order.location.distance_km(&candidate.location),
                score: self.score(order, candidate, reputation, now),
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total().cmp(&a.score.total()));
        ranked
    }

    /// Best tradeable counterparty for `order`, or `None` to leave it queued.
    #[must_use]
    pub fn find_match(
        &self,
        book: &LiveBook,
        order: &Order,
        reputation: &impl Reputation,
        now: DateTime<Utc>,
    ) -> Option<TradePlan> {
        self.rank(book, order, reputation, now)
            .into_iter()
            .find_map(|candidate| {
                let plan = plan_trade(order, candidate.order, candidate.score.total());
                if plan.is_none() {
                    tracing::debug!(
                        order = %order.id,
                        candidate = %candidate.order.id,
                        "no common payment rail"
                    );
                }
                plan
            })
    }
}

/// Settle at the top of the amount overlap, priced at the buy order's rate.
/// `None` if the amounts do not overlap or no payment rail is shared.
#[must_use]
pub fn plan_trade(a: &Order, b: &Order, score: Decimal) -> Option<TradePlan> {
    let (buy, sell) = match a.side {
        OrderSide::Buy => (a, b),
        OrderSide::Sell => (b, a),
    };
    let overlap: AmountRange = buy.effective_range().overlap(&sell.effective_range())?;
    let amount = overlap.max;
    let payment_method = select_payment_method(&buy.payment_methods, &sell.payment_methods)?;
    let fiat_amount = (amount * buy.rate())
        .round_dp_with_strategy(FIAT_DECIMALS, RoundingStrategy::ToZero);

    Some(TradePlan {
        buy_order_id: buy.id,
        sell_order_id: sell.id,
        buyer: buy.creator,
        seller: sell.creator,
        amount,
        fiat_amount,
        fiat_currency: buy.fiat_currency.clone(),
        payment_method,
        escrow_address: sell.escrow_address,
        score,
    })
}

// =====================================================================
// Tests
// =====================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use postmatch_types::{OrderStatus, PaymentMethodType};

    #[derive(Default)]
    struct FakeReputation {
        scores: BTreeMap<Address, u8>,
        kyc: BTreeSet<Address>,
        banned: BTreeSet<Address>,
    }

    impl Reputation for FakeReputation {
        fn trust_score(&self, who: &Address) -> u8 {
            self.scores.get(who).copied().unwrap_or(50)
        }
        fn stats(&self, _who: &Address) -> Option<UserStats> {
            None
        }
        fn is_kyc_verified(&self, who: &Address) -> bool {
            self.kyc.contains(who)
        }
        fn is_banned(&self, who: &Address) -> bool {
            self.banned.contains(who)
        }
    }

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn seller() -> Address {
        Address::dummy(1)
    }

    fn buyer() -> Address {
        Address::dummy(2)
    }

    #[test]
    fn scenario_same_postal_code_match() {
        let mut book = LiveBook::new();
        let sell = Order::dummy_sell(0, seller(), "110001", dec(1000));
        book.upsert(sell.clone());
        let buy = Order::dummy(1, buyer(), OrderSide::Buy, "110001", dec(1000), dec(80));

        let engine = MatchingEngine::default();
        let plan = engine
            .find_match(&book, &buy, &FakeReputation::default(), now())
            .unwrap();

        assert_eq!(plan.sell_order_id, sell.id);
        assert_eq!(plan.buyer, buyer());
        assert_eq!(plan.seller, seller());
        assert_eq!(plan.amount, dec(1000));
        assert_eq!(plan.fiat_amount, dec(80_000));
        assert_eq!(plan.payment_method.method_type, PaymentMethodType::Upi);
        assert_eq!(plan.escrow_address, sell.escrow_address);
    }

    #[test]
    fn trust_minimum_rejects_pair() {
        let sell = Order::dummy_sell(0, seller(), "110001", dec(1000));
        let mut buy = Order::dummy_buy(1, buyer(), "110001", dec(1000));
        buy.min_trust_score = 80;

        let mut rep = FakeReputation::default();
        rep.scores.insert(seller(), 70);

        let engine = MatchingEngine::default();
        assert_eq!(
            engine.check_compatible(&buy, &sell, &rep, now()),
            Err(Incompatibility::TrustTooLow {
                who: seller(),
                score: 70,
                required: 80,
            })
        );

        let mut book = LiveBook::new();
        book.upsert(sell);
        assert!(engine.find_match(&book, &buy, &rep, now()).is_none());
    }

    #[test]
    fn low_trust_matches_when_counterparty_asks_nothing() {
        let sell = Order::dummy_sell(0, seller(), "110001", dec(1000));
        let buy = Order::dummy_buy(1, buyer(), "110001", dec(1000));
        assert_eq!(buy.min_trust_score, 0);

        let mut rep = FakeReputation::default();
        rep.scores.insert(seller(), 12);
        rep.scores.insert(buyer(), 0);

        let engine = MatchingEngine::default();
        assert_eq!(engine.check_compatible(&buy, &sell, &rep, now()), Ok(()));
    }

    #[test]
    fn kyc_requirement_checked_both_ways() {
        let mut sell = Order::dummy_sell(0, seller(), "110001", dec(1000));
        sell.require_kyc = true;
        let buy = Order::dummy_buy(1, buyer(), "110001", dec(1000));

        let mut rep = FakeReputation::default();
        let engine = MatchingEngine::default();
        assert_eq!(
            engine.check_compatible(&buy, &sell, &rep, now()),
            Err(Incompatibility::KycRequired { who: buyer() })
        );
        rep.kyc.insert(buyer());
        assert_eq!(engine.check_compatible(&buy, &sell, &rep, now()), Ok(()));
    }

    #[test]
    fn basic_predicates() {
        let engine = MatchingEngine::default();
        let rep = FakeReputation::default();
        let sell = Order::dummy_sell(0, seller(), "110001", dec(1000));

        let same_side = Order::dummy_sell(1, buyer(), "110001", dec(1000));
        assert_eq!(
            engine.check_compatible(&same_side, &sell, &rep, now()),
            Err(Incompatibility::SameSide)
        );

        let own = Order::dummy_buy(2, seller(), "110001", dec(1000));
        assert_eq!(
            engine.check_compatible(&own, &sell, &rep, now()),
            Err(Incompatibility::SelfTrade)
        );

        let mut usd = Order::dummy_buy(3, buyer(), "110001", dec(1000));
        usd.fiat_currency = "USD".into();
        assert_eq!(
            engine.check_compatible(&usd, &sell, &rep, now()),
            Err(Incompatibility::CurrencyMismatch)
        );

        let small = Order::dummy_buy(4, buyer(), "110001", dec(10));
        assert_eq!(
            engine.check_compatible(&small, &sell, &rep, now()),
            Err(Incompatibility::NoAmountOverlap)
        );

        let mut pending = Order::dummy_buy(5, buyer(), "110001", dec(1000));
        pending.status = OrderStatus::Pending;
        assert_eq!(
            engine.check_compatible(&pending, &sell, &rep, now()),
            Err(Incompatibility::NotActive)
        );

        let buy = Order::dummy_buy(6, buyer(), "110001", dec(1000));
        let later = now() + chrono::Duration::hours(25);
        assert_eq!(
            engine.check_compatible(&buy, &sell, &rep, later),
            Err(Incompatibility::Expired)
        );
    }

    #[test]
    fn banned_counterparty_rejected() {
        let engine = MatchingEngine::default();
        let mut rep = FakeReputation::default();
        rep.banned.insert(seller());
        let sell = Order::dummy_sell(0, seller(), "110001", dec(1000));
        let buy = Order::dummy_buy(1, buyer(), "110001", dec(1000));
        assert_eq!(
            engine.check_compatible(&buy, &sell, &rep, now()),
            Err(Incompatibility::Banned { who: seller() })
        );
    }

    #[test]
    fn settled_amount_is_top_of_overlap() {
        let mut sell = Order::dummy_sell(0, seller(), "110001", dec(1000));
        sell.min_amount = Some(dec(200));
        let mut buy = Order::dummy_buy(1, buyer(), "110001", dec(600));
        buy.min_amount = Some(dec(100));

        let plan = plan_trade(&buy, &sell, Decimal::ZERO).unwrap();
        assert_eq!(plan.amount, dec(600));
        assert!(sell.effective_range().contains(plan.amount));
        assert!(buy.effective_range().contains(plan.amount));
        assert_eq!(plan.fiat_amount, dec(48_000));
    }

    #[test]
    fn fiat_uses_buy_side_rate_truncated() {
        let sell = Order::dummy(0, seller(), OrderSide::Sell, "110001", dec(3), dec(80));
        let mut buy = Order::dummy(1, buyer(), OrderSide::Buy, "110001", dec(3), dec(80));
        buy.fiat_amount = Decimal::new(24_375, 2);
        let plan = plan_trade(&sell, &buy, Decimal::ZERO).unwrap();
        assert_eq!(plan.fiat_amount, Decimal::new(24_375, 2));

        // 100 / 3 per token does not come back to 100 exactly.
        buy.fiat_amount = dec(100);
        let plan = plan_trade(&sell, &buy, Decimal::ZERO).unwrap();
        assert_eq!(plan.fiat_amount, Decimal::new(9_999, 2));
    }

    #[test]
    fn no_common_rail_falls_through_to_next() {
        let mut book = LiveBook::new();
        let mut cash_only = Order::dummy_sell(0, seller(), "110001", dec(1000));
        cash_only.payment_methods = vec![PaymentMethod::new(PaymentMethodType::Cash, "")];
        book.upsert(cash_only);
        let upi = Order::dummy_sell(1, Address::dummy(3), "110045", dec(1000));
        book.upsert(upi.clone());

        let buy = Order::dummy_buy(2, buyer(), "110001", dec(1000));
        let plan = MatchingEngine::default()
            .find_match(&book, &buy, &FakeReputation::default(), now())
            .unwrap();
        assert_eq!(plan.sell_order_id, upi.id);
    }

    #[test]
    fn closer_candidate_wins() {
        let mut book = LiveBook::new();
        let near = Order::dummy_sell(0, Address::dummy(3), "110001", dec(1000));
        let far = Order::dummy_sell(1, Address::dummy(4), "110045", dec(1000));
        book.upsert(far);
        book.upsert(near.clone());

        let buy = Order::dummy_buy(2, buyer(), "110001", dec(1000));
        let ranked =
            MatchingEngine::default().rank(&book, &buy, &FakeReputation::default(), now());
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].order.id, near.id);
        assert_eq!(ranked[0].distance_km, 0);
        assert!(ranked[0].score.total() > ranked[1].score.total());
    }

    #[test]
    fn widening_respects_thresholds_and_distance() {
        let mut book = LiveBook::new();
        book.upsert(Order::dummy_sell(0, Address::dummy(3), "110001", dec(10)));
        book.upsert(Order::dummy_sell(1, Address::dummy(4), "110045", dec(10)));
        // Same state, 25 km away: outside a 20 km radius.
        book.upsert(Order::dummy_sell(2, Address::dummy(5), "112001", dec(10)));

        let mut buy = Order::dummy_buy(3, buyer(), "110001", dec(10));
        buy.max_distance_km = 20;
        let engine = MatchingEngine::default();
        assert_eq!(engine.candidates(&book, &buy).len(), 2);

        buy.max_distance_km = 30;
        assert_eq!(engine.candidates(&book, &buy).len(), 3);

        let narrow = MatchingEngine::new(MatchingConfig {
            district_widen_threshold: 1,
            state_widen_threshold: 1,
            ..MatchingConfig::default()
        });
        assert_eq!(narrow.candidates(&book, &buy).len(), 1);
    }

    #[test]
    fn repeated_evaluation_is_stable() {
        let mut book = LiveBook::new();
        for i in 0..12 {
            let creator = Address::dummy(10 + u8::try_from(i).unwrap());
            book.upsert(Order::dummy_sell(i, creator, "110001", dec(1000)));
        }
        let buy = Order::dummy_buy(100, buyer(), "110001", dec(1000));
        let engine = MatchingEngine::default();
        let rep = FakeReputation::default();
        let first = engine.find_match(&book, &buy, &rep, now()).unwrap();
        for _ in 0..10 {
            assert_eq!(engine.find_match(&book, &buy, &rep, now()).unwrap(), first);
        }
        let rebuilt = LiveBook::rebuild(book.iter().cloned().collect::<Vec<_>>());
        assert_eq!(engine.find_match(&rebuilt, &buy, &rep, now()).unwrap(), first);
    }
}
