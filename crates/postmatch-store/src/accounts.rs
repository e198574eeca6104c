//! Per-user statistics and KYC flags.

use chrono::{DateTime, Utc};
use postmatch_types::{Address, Result, UserStats};

use crate::keys::{self, MARKER};
use crate::kv::{KvStore, get_json, put_json};

pub fn find_stats(store: &impl KvStore, who: &Address) -> Result<Option<UserStats>> {
    get_json(store, &keys::stats(who))
}

/// Stored stats, or a fresh record first seen at `now`.
pub fn stats_or_new(store: &impl KvStore, who: &Address, now: DateTime<Utc>) -> Result<UserStats> {
    Ok(find_stats(store, who)?.unwrap_or_else(|| UserStats::new(*who, now)))
}

pub fn put_stats(store: &mut impl KvStore, stats: &UserStats) -> Result<()> {
    put_json(store, &keys::stats(&stats.address), stats)
}

/// Load, apply `f`, store.
pub fn update_stats<T>(
    store: &mut impl KvStore,
    who: &Address,
    now: DateTime<Utc>,
    f: impl FnOnce(&mut UserStats) -> T,
) -> Result<T> {
    let mut stats = stats_or_new(store, who, now)?;
    let out = f(&mut stats);
    put_stats(store, &stats)?;
    Ok(out)
}

pub fn set_kyc(store: &mut impl KvStore, who: &Address, verified: bool) {
    let key = keys::kyc(who);
    if verified {
        store.set(&key, MARKER);
    } else {
        store.delete(&key);
    }
}

#[must_use]
pub fn is_kyc_verified(store: &impl KvStore, who: &Address) -> bool {
    store.has(&keys::kyc(who))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemStore;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn first_update_creates_record() {
        let mut store = MemStore::new();
        let who = Address::dummy(1);
        assert!(find_stats(&store, &who).unwrap().is_none());
        update_stats(&mut store, &who, t(100), |s| s.record_trade_start(t(100))).unwrap();
        let stats = find_stats(&store, &who).unwrap().unwrap();
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.created_at, t(100));

        update_stats(&mut store, &who, t(200), |s| s.record_trade_start(t(200))).unwrap();
        let stats = find_stats(&store, &who).unwrap().unwrap();
        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.created_at, t(100));
    }

    #[test]
    fn kyc_flag_toggles() {
        let mut store = MemStore::new();
        let who = Address::dummy(1);
        assert!(!is_kyc_verified(&store, &who));
        set_kyc(&mut store, &who, true);
        assert!(is_kyc_verified(&store, &who));
        set_kyc(&mut store, &who, false);
        assert!(!is_kyc_verified(&store, &who));
        assert!(store.is_empty());
    }
}
