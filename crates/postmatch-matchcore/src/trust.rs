//! Trust score derived from [`UserStats`].
//!
//! The score is a pure function of the stats record, the block time and
//! the user's KYC flag. It is never stored; every reader recomputes it
//! through [`TrustScoreEngine::score`], the single authoritative accessor.
//!
//! All arithmetic is done in `Decimal` so every replica computes the same
//! score bit for bit.

use chrono::{DateTime, Utc};
use postmatch_types::UserStats;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

/// Score of a user with no trade history.
pub const NEUTRAL_SCORE: u8 = 50;

/// Reputation tier with its fee discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum TrustLevel {
    New,
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl TrustLevel {
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            0..40 => Self::New,
            40..60 => Self::Bronze,
            60..75 => Self::Silver,
            75..90 => Self::Gold,
            _ => Self::Diamond,
        }
    }

    /// Fraction of the platform fee waived at this level.
    #[must_use]
    pub fn fee_discount(self) -> Decimal {
        match self {
            Self::New => Decimal::ZERO,
            Self::Bronze => Decimal::new(10, 2),
            Self::Silver => Decimal::new(20, 2),
            Self::Gold => Decimal::new(30, 2),
            Self::Diamond => Decimal::new(50, 2),
        }
    }
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Bronze => write!(f, "BRONZE"),
            Self::Silver => write!(f, "SILVER"),
            Self::Gold => write!(f, "GOLD"),
            Self::Diamond => write!(f, "DIAMOND"),
        }
    }
}

/// Computes trust scores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustScoreEngine {
    /// Cumulative volume at which the volume component saturates.
    pub volume_saturation: Decimal,
}

impl Default for TrustScoreEngine {
    fn default() -> Self {
        Self {
            volume_saturation: Decimal::from(1_000_000),
        }
    }
}

impl TrustScoreEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust score in `[0, 100]`.
    ///
    /// ```text
    /// 50 + success×30 + volume×20 + age×10
    ///    + (win×10 − disputeRate×20, only with disputes)
    ///    + activity×10 + response×5 + 5 if KYC
    /// ```
    #[must_use]
    pub fn score(&self, stats: &UserStats, now: DateTime<Utc>, kyc_verified: bool) -> u8 {
        if stats.total_trades == 0 {
            return NEUTRAL_SCORE;
        }

        let mut score = Decimal::from(NEUTRAL_SCORE);
        score += stats.success_rate() * Decimal::from(30);
        score += self.volume_component(stats.total_volume) * Decimal::from(20);
        score += age_component(stats.created_at, now) * Decimal::from(10);

        if stats.disputed_trades > 0 {
            score += stats.dispute_win_rate() * Decimal::from(10);
            score -= stats.dispute_rate() * Decimal::from(20);
        }

        score += activity_component(stats, now) * Decimal::from(10);

        if stats.response_samples > 0 {
            score += response_component(stats.average_response_secs) * Decimal::from(5);
        }
        if kyc_verified {
            score += Decimal::from(5);
        }

        score
            .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
            .trunc()
            .to_u8()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn level(&self, stats: &UserStats, now: DateTime<Utc>, kyc_verified: bool) -> TrustLevel {
        TrustLevel::from_score(self.score(stats, now, kyc_verified))
    }

    /// `log10(volume) / log10(saturation)`, clamped to `[0, 1]`.
    fn volume_component(&self, volume: Decimal) -> Decimal {
        if volume <= Decimal::ONE {
            return Decimal::ZERO;
        }
        let (Some(v), Some(sat)) = (
            volume.checked_log10(),
            self.volume_saturation.checked_log10(),
        ) else {
            return Decimal::ZERO;
        };
        v.checked_div(sat)
            .unwrap_or(Decimal::ZERO)
            .clamp(Decimal::ZERO, Decimal::ONE)
    }
}

/// Linear to one year.
fn age_component(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Decimal {
    let days = (now - created_at).num_days().max(0);
    (Decimal::from(days) / Decimal::from(365)).min(Decimal::ONE)
}

/// Mean of a recency step function and trade frequency. Recency counts
/// from the last trade; other activity does not refresh it.
fn activity_component(stats: &UserStats, now: DateTime<Utc>) -> Decimal {
    let idle_days = stats
        .last_trade_at
        .map(|last| (now - last).num_days().max(0));
    let recency = match idle_days {
        Some(0..=7) => Decimal::ONE,
        Some(8..=30) => Decimal::new(7, 1),
        Some(31..=90) => Decimal::new(5, 1),
        Some(91..=180) => Decimal::new(3, 1),
        _ => Decimal::ZERO,
    };
    let frequency = (Decimal::from(stats.total_trades) / Decimal::ONE_HUNDRED).min(Decimal::ONE);
    (recency + frequency) / Decimal::TWO
}

fn response_component(average_secs: u64) -> Decimal {
    match average_secs {
        0..=300 => Decimal::ONE,
        301..=900 => Decimal::new(8, 1),
        901..=1800 => Decimal::new(6, 1),
        1801..=3600 => Decimal::new(4, 1),
        _ => Decimal::new(2, 1),
    }
}

// =====================================================================
// Tests
// =====================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use postmatch_types::Address;
    use rand::Rng;

    fn t(days: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + days * 86_400, 0).unwrap()
    }

    fn fresh() -> UserStats {
        UserStats::new(Address::dummy(1), t(0))
    }

    #[test]
    fn zero_trades_is_neutral() {
        let engine = TrustScoreEngine::new();
        assert_eq!(engine.score(&fresh(), t(400), false), 50);
        assert_eq!(engine.score(&fresh(), t(400), true), 50);
    }

    #[test]
    fn perfect_record_hits_ceiling() {
        let engine = TrustScoreEngine::new();
        let mut s = fresh();
        s.total_trades = 200;
        s.successful_trades = 200;
        s.total_volume = Decimal::from(5_000_000);
        s.response_samples = 200;
        s.average_response_secs = 120;
        s.last_trade_at = Some(t(400));
        assert_eq!(engine.score(&s, t(400), true), 100);
    }

    #[test]
    fn recency_follows_trades_not_activity() {
        let engine = TrustScoreEngine::new();
        let mut s = fresh();
        s.total_trades = 4;
        s.successful_trades = 4;
        s.last_trade_at = Some(t(0));
        let idle = engine.score(&s, t(200), false);

        // Order churn keeps last_activity fresh but earns nothing.
        s.touch(t(200));
        assert_eq!(engine.score(&s, t(200), false), idle);

        s.record_trade_start(t(200));
        s.total_trades = 4;
        assert!(engine.score(&s, t(200), false) > idle);
    }

    #[test]
    fn all_disputes_lost_stays_in_range() {
        let engine = TrustScoreEngine::new();
        let mut s = fresh();
        s.total_trades = 10;
        s.disputed_trades = 10;
        s.disputes_lost = 10;
        let score = engine.score(&s, t(1), false);
        assert!(score <= 100);

        let mut clean = s.clone();
        clean.disputed_trades = 0;
        clean.disputes_lost = 0;
        assert!(score < engine.score(&clean, t(1), false));
    }

    #[test]
    fn dispute_wins_beat_losses() {
        let engine = TrustScoreEngine::new();
        let mut s = fresh();
        s.total_trades = 10;
        s.successful_trades = 8;
        s.disputed_trades = 2;
        let mut won = s.clone();
        won.disputes_won = 2;
        let mut lost = s;
        lost.disputes_lost = 2;
        assert!(engine.score(&won, t(1), false) > engine.score(&lost, t(1), false));
    }

    #[test]
    fn kyc_adds_bonus() {
        let engine = TrustScoreEngine::new();
        let mut s = fresh();
        s.total_trades = 4;
        s.successful_trades = 2;
        let without = engine.score(&s, t(1), false);
        let with = engine.score(&s, t(1), true);
        assert_eq!(with, without + 5);
    }

    #[test]
    fn random_stats_always_in_range() {
        let engine = TrustScoreEngine::new();
        let mut rng = rand::thread_rng();
        for _ in 0..1_000 {
            let mut s = fresh();
            s.total_trades = rng.gen_range(0..500);
            s.successful_trades = rng.gen_range(0..=s.total_trades);
            s.disputed_trades = rng.gen_range(0..=s.total_trades);
            s.disputes_won = rng.gen_range(0..=s.disputed_trades);
            s.disputes_lost = s.disputed_trades - s.disputes_won;
            s.total_volume = Decimal::from(rng.gen_range(0u64..10_000_000_000));
            s.response_samples = rng.gen_range(0..5);
            s.average_response_secs = rng.gen_range(0..10_000);
            let now = t(rng.gen_range(0..2_000));
            let score = engine.score(&s, now, rng.gen_bool(0.5));
            assert!(score <= 100);
        }
    }

    #[test]
    fn levels_and_discounts() {
        assert_eq!(TrustLevel::from_score(0), TrustLevel::New);
        assert_eq!(TrustLevel::from_score(39), TrustLevel::New);
        assert_eq!(TrustLevel::from_score(40), TrustLevel::Bronze);
        assert_eq!(TrustLevel::from_score(50), TrustLevel::Bronze);
        assert_eq!(TrustLevel::from_score(74), TrustLevel::Silver);
        assert_eq!(TrustLevel::from_score(89), TrustLevel::Gold);
        assert_eq!(TrustLevel::from_score(90), TrustLevel::Diamond);
        assert_eq!(TrustLevel::Diamond.fee_discount(), Decimal::new(5, 1));
        assert_eq!(TrustLevel::New.fee_discount(), Decimal::ZERO);
    }

    #[test]
    fn volume_saturates() {
        let engine = TrustScoreEngine::new();
        assert_eq!(engine.volume_component(Decimal::ONE), Decimal::ZERO);
        assert_eq!(engine.volume_component(Decimal::from(10_000_000)), Decimal::ONE);
        let mid = engine.volume_component(Decimal::from(1_000));
        assert!(mid > Decimal::new(49, 2) && mid < Decimal::new(51, 2));
    }
}
