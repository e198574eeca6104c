//! Store-backed [`Reputation`] for the matcher.

use chrono::{DateTime, Utc};
use postmatch_matchcore::{Reputation, TrustLevel, TrustScoreEngine};
use postmatch_store::{KvStore, accounts};
use postmatch_types::{Address, Result, UserStats};

/// Reads stats and KYC flags from the store and scores them at `now`.
pub struct StoreReputation<'a, S> {
    store: &'a S,
    trust: &'a TrustScoreEngine,
    now: DateTime<Utc>,
}

impl<'a, S: KvStore> StoreReputation<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, trust: &'a TrustScoreEngine, now: DateTime<Utc>) -> Self {
        Self { store, trust, now }
    }

    /// The one trust accessor every caller goes through. Users with no
    /// stats record score as a fresh account.
    pub fn score(&self, who: &Address) -> Result<u8> {
        let stats = accounts::stats_or_new(self.store, who, self.now)?;
        let kyc = accounts::is_kyc_verified(self.store, who);
        Ok(self.trust.score(&stats, self.now, kyc))
    }

    pub fn level(&self, who: &Address) -> Result<TrustLevel> {
        self.score(who).map(TrustLevel::from_score)
    }
}

impl<S: KvStore> Reputation for StoreReputation<'_, S> {
    fn trust_score(&self, who: &Address) -> u8 {
        // Unreadable stats score zero so the pair is rejected.
        self.score(who).unwrap_or_else(|err| {
            tracing::warn!(user = %who, error = %err, "trust score unavailable");
            0
        })
    }

    fn stats(&self, who: &Address) -> Option<UserStats> {
        accounts::find_stats(self.store, who).ok().flatten()
    }

    fn is_kyc_verified(&self, who: &Address) -> bool {
        accounts::is_kyc_verified(self.store, who)
    }

    fn is_banned(&self, who: &Address) -> bool {
        match accounts::find_stats(self.store, who) {
            Ok(stats) => stats.is_some_and(|s| s.is_banned_at(self.now)),
            Err(_) => true,
        }
    }
}
