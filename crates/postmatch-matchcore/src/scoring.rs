//! Candidate scoring components.
//!
//! Scores rank compatible candidates; they never gate a match. Every
//! component is a `Decimal` so rankings are identical on every node.

use chrono::{DateTime, Utc};
use postmatch_types::{PAYMENT_PREFERENCE, PaymentMethod};
use rust_decimal::{Decimal, MathematicalOps};
use serde::Serialize;

/// Base score every compatible candidate starts from.
pub const BASE_SCORE: i64 = 100;
pub const DISTANCE_WEIGHT: i64 = 30;
pub const PRICE_WEIGHT: i64 = 25;
pub const TRUST_WEIGHT: i64 = 20;
pub const MAX_AGE_BONUS: i64 = 10;
pub const MAX_VOLUME_BONUS: i64 = 10;
pub const COMPLETION_WEIGHT: i64 = 5;
pub const LOW_DISPUTE_BONUS: i64 = 5;
/// Trades a candidate needs before the low-dispute bonus applies.
pub const LOW_DISPUTE_MIN_TRADES: u64 = 10;

/// Per-component scores of one candidate, kept for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub distance: Decimal,
    pub price: Decimal,
    pub trust: Decimal,
    pub payment: Decimal,
    pub language: Decimal,
    pub age: Decimal,
    pub volume: Decimal,
    pub completion: Decimal,
    pub low_dispute: Decimal,
}

impl ScoreBreakdown {
    #[must_use]
    pub fn total(&self) -> Decimal {
        Decimal::from(BASE_SCORE)
            + self.distance
            + self.price
            + self.trust
            + self.payment
            + self.language
            + self.age
            + self.volume
            + self.completion
            + self.low_dispute
    }
}

/// `1` at distance zero, falling linearly to `0` at `max_km`.
#[must_use]
pub fn distance_score(distance_km: u32, max_km: u32) -> Decimal {
    if distance_km == 0 {
        return Decimal::ONE;
    }
    if max_km == 0 || distance_km > max_km {
        return Decimal::ZERO;
    }
    Decimal::ONE - Decimal::from(distance_km) / Decimal::from(max_km)
}

/// `1 − deviation / max_deviation`, floored at `0`, where deviation is
/// `|reference − other| / reference`.
#[must_use]
pub fn price_match_score(reference: Decimal, other: Decimal, max_deviation: Decimal) -> Decimal {
    if reference <= Decimal::ZERO || max_deviation <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let deviation = (reference - other).abs() / reference;
    if deviation > max_deviation {
        return Decimal::ZERO;
    }
    (max_deviation - deviation) / max_deviation
}

/// Share of both method lists that have a compatible partner on the other side.
#[must_use]
pub fn payment_overlap_ratio(a: &[PaymentMethod], b: &[PaymentMethod]) -> Decimal {
    let total = a.len() + b.len();
    if total == 0 {
        return Decimal::ZERO;
    }
    let covered = |xs: &[PaymentMethod], ys: &[PaymentMethod]| {
        xs.iter()
            .filter(|x| ys.iter().any(|y| x.is_compatible_with(y)))
            .count()
    };
    let common = covered(a, b) + covered(b, a);
    Decimal::from(common) / Decimal::from(total)
}

/// An empty list means "no preference" and matches anything.
#[must_use]
pub fn shares_language(a: &[String], b: &[String]) -> bool {
    if a.is_empty() || b.is_empty() {
        return true;
    }
    a.iter()
        .any(|x| b.iter().any(|y| x.trim().eq_ignore_ascii_case(y.trim())))
}

/// Half a point per full hour the candidate has waited, capped.
#[must_use]
pub fn age_bonus(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Decimal {
    let hours = (now - created_at).num_hours().max(0);
    (Decimal::from(hours) / Decimal::TWO).min(Decimal::from(MAX_AGE_BONUS))
}

/// `2 × log10(mean amount)` for means above one token, capped.
#[must_use]
pub fn volume_bonus(a: Decimal, b: Decimal) -> Decimal {
    let mean = (a + b) / Decimal::TWO;
    if mean <= Decimal::ONE {
        return Decimal::ZERO;
    }
    mean.checked_log10()
        .map_or(Decimal::ZERO, |l| l * Decimal::TWO)
        .min(Decimal::from(MAX_VOLUME_BONUS))
}

/// First rail in preference order that both sides accept, returned as the
/// buyer's entry. Unranked rails (wallets, generic bank transfer) are only
/// chosen when no ranked rail is shared, in the buyer's listing order.
#[must_use]
pub fn select_payment_method(
    buyer: &[PaymentMethod],
    seller: &[PaymentMethod],
) -> Option<PaymentMethod> {
    let accepted = |m: &&PaymentMethod| seller.iter().any(|s| m.is_compatible_with(s));
    PAYMENT_PREFERENCE
        .iter()
        .find_map(|rail| {
            buyer
                .iter()
                .filter(|m| m.method_type == *rail)
                .find(accepted)
        })
        .or_else(|| {
            buyer
                .iter()
                .filter(|m| m.method_type.preference_rank().is_none())
                .find(accepted)
        })
        .cloned()
}
