//! Per-user trading statistics.
//!
//! [`UserStats`] is the authoritative input to the trust score. Outcomes
//! (completions, cancellations, dispute wins and losses) are recorded here;
//! the score itself is always recomputed from this record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Address;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub address: Address,
    /// Trades the user has been matched into.
    pub total_trades: u64,
    pub successful_trades: u64,
    pub cancelled_orders: u64,
    pub disputed_trades: u64,
    pub disputes_won: u64,
    pub disputes_lost: u64,
    pub total_volume: Decimal,
    pub average_trade_size: Decimal,
    /// Running mean of seconds from match to seller confirmation.
    pub average_response_secs: u64,
    pub response_samples: u64,
    pub cancellation_reasons: BTreeMap<String, u64>,
    /// First time the user was seen.
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Last match or settlement; drives the recency part of the score.
    #[serde(default)]
    pub last_trade_at: Option<DateTime<Utc>>,
    pub banned_until: Option<DateTime<Utc>>,
    pub ban_reason: Option<String>,
}

impl UserStats {
    #[must_use]
    pub fn new(address: Address, now: DateTime<Utc>) -> Self {
        Self {
            address,
            total_trades: 0,
            successful_trades: 0,
            cancelled_orders: 0,
            disputed_trades: 0,
            disputes_won: 0,
            disputes_lost: 0,
            total_volume: Decimal::ZERO,
            average_trade_size: Decimal::ZERO,
            average_response_secs: 0,
            response_samples: 0,
            cancellation_reasons: BTreeMap::new(),
            created_at: now,
            last_activity: now,
            last_trade_at: None,
            banned_until: None,
            ban_reason: None,
        }
    }

    /// Successful share of all trades, `0` with no history.
    #[must_use]
    pub fn success_rate(&self) -> Decimal {
        ratio(self.successful_trades, self.total_trades)
    }

    #[must_use]
    pub fn dispute_rate(&self) -> Decimal {
        ratio(self.disputed_trades, self.total_trades)
    }

    /// Won share of all disputes, open ones included.
    #[must_use]
    pub fn dispute_win_rate(&self) -> Decimal {
        ratio(self.disputes_won, self.disputed_trades)
    }

    #[must_use]
    pub fn is_banned_at(&self, now: DateTime<Utc>) -> bool {
        self.banned_until.is_some_and(|until| now < until)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    pub fn record_trade_start(&mut self, now: DateTime<Utc>) {
        self.total_trades += 1;
        self.note_trade(now);
    }

    fn note_trade(&mut self, now: DateTime<Utc>) {
        if self.last_trade_at.is_none_or(|last| now > last) {
            self.last_trade_at = Some(now);
        }
        self.touch(now);
    }

    /// A trade settled for `volume` tokens. `response_secs` is the seller's
    /// confirmation latency, when this user was the confirming party.
    pub fn record_trade_completion(
        &mut self,
        volume: Decimal,
        response_secs: Option<u64>,
        now: DateTime<Utc>,
    ) {
        self.successful_trades += 1;
        self.add_volume(volume);
        if let Some(secs) = response_secs {
            let total = u128::from(self.average_response_secs) * u128::from(self.response_samples)
                + u128::from(secs);
            self.response_samples += 1;
            self.average_response_secs =
                u64::try_from(total / u128::from(self.response_samples)).unwrap_or(u64::MAX);
        }
        self.note_trade(now);
    }

    pub fn add_volume(&mut self, volume: Decimal) {
        self.total_volume += volume;
        if self.successful_trades > 0 {
            self.average_trade_size = self.total_volume / Decimal::from(self.successful_trades);
        }
    }

    pub fn record_cancellation(&mut self, reason: &str, now: DateTime<Utc>) {
        self.cancelled_orders += 1;
        *self
            .cancellation_reasons
            .entry(reason.to_string())
            .or_insert(0) += 1;
        self.touch(now);
    }

    pub fn record_dispute_opened(&mut self, now: DateTime<Utc>) {
        self.disputed_trades += 1;
        self.touch(now);
    }

    pub fn record_dispute_outcome(&mut self, won: bool) {
        if won {
            self.disputes_won += 1;
        } else {
            self.disputes_lost += 1;
        }
    }

    pub fn ban(&mut self, until: DateTime<Utc>, reason: impl Into<String>) {
        self.banned_until = Some(until);
        self.ban_reason = Some(reason.into());
    }

    pub fn unban(&mut self) {
        self.banned_until = None;
        self.ban_reason = None;
    }
}

fn ratio(part: u64, whole: u64) -> Decimal {
    if whole == 0 {
        Decimal::ZERO
    } else {
        Decimal::from(part) / Decimal::from(whole)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn rates_with_no_history_are_zero() {
        let s = UserStats::new(Address::dummy(1), t(0));
        assert_eq!(s.success_rate(), Decimal::ZERO);
        assert_eq!(s.dispute_rate(), Decimal::ZERO);
        assert_eq!(s.dispute_win_rate(), Decimal::ZERO);
    }

    #[test]
    fn completion_updates_volume_and_response() {
        let mut s = UserStats::new(Address::dummy(1), t(0));
        s.record_trade_start(t(10));
        s.record_trade_completion(Decimal::new(1000, 0), Some(600), t(20));
        s.record_trade_start(t(30));
        s.record_trade_completion(Decimal::new(500, 0), Some(300), t(40));

        assert_eq!(s.success_rate(), Decimal::ONE);
        assert_eq!(s.total_volume, Decimal::new(1500, 0));
        assert_eq!(s.average_trade_size, Decimal::new(750, 0));
        assert_eq!(s.average_response_secs, 450);
        assert_eq!(s.last_activity, t(40));
        assert_eq!(s.last_trade_at, Some(t(40)));
    }

    #[test]
    fn open_disputes_count_against_win_rate() {
        let mut s = UserStats::new(Address::dummy(1), t(0));
        s.record_dispute_opened(t(1));
        s.record_dispute_opened(t(2));
        s.record_dispute_outcome(true);
        assert_eq!(s.dispute_win_rate(), Decimal::new(5, 1));

        s.record_dispute_outcome(false);
        assert_eq!(s.dispute_win_rate(), Decimal::new(5, 1));
    }

    #[test]
    fn only_trades_set_last_trade() {
        let mut s = UserStats::new(Address::dummy(1), t(0));
        s.record_cancellation("changed mind", t(5));
        s.record_dispute_opened(t(6));
        assert_eq!(s.last_trade_at, None);
        assert_eq!(s.last_activity, t(6));

        s.record_trade_start(t(10));
        s.touch(t(20));
        assert_eq!(s.last_trade_at, Some(t(10)));
    }

    #[test]
    fn cancellation_reasons_tallied() {
        let mut s = UserStats::new(Address::dummy(1), t(0));
        s.record_cancellation("changed mind", t(1));
        s.record_cancellation("changed mind", t(2));
        assert_eq!(s.cancelled_orders, 2);
        assert_eq!(s.cancellation_reasons["changed mind"], 2);
    }

    #[test]
    fn bans_lapse() {
        let mut s = UserStats::new(Address::dummy(1), t(0));
        s.ban(t(100), "fraud");
        assert!(s.is_banned_at(t(50)));
        assert!(!s.is_banned_at(t(100)));
        s.ban(t(100), "fraud");
        s.unban();
        assert!(!s.is_banned_at(t(50)));
    }

    #[test]
    fn activity_never_moves_backwards() {
        let mut s = UserStats::new(Address::dummy(1), t(100));
        s.touch(t(50));
        assert_eq!(s.last_activity, t(100));
    }
}
