//! Token balances behind escrow custody.
//!
//! [`FundsTransfer`] is the narrow interface the escrow ledger moves money
//! through. [`BalanceManager`] is the in-memory implementation: per
//! (account, asset) balances plus minted supply, journaled the same way as
//! the store so a failed command leaves every balance untouched.

use std::collections::BTreeMap;

use postmatch_types::{Address, PostmatchError, Result};
use rust_decimal::Decimal;

/// Moves tokens between accounts.
pub trait FundsTransfer {
    fn balance(&self, account: &Address, asset: &str) -> Decimal;

    /// Move `amount` from `from` to `to`. Fails without effect if `from`
    /// cannot cover it.
    fn transfer(&mut self, from: &Address, to: &Address, asset: &str, amount: Decimal) -> Result<()>;

    /// Pay every leg from one account, all or nothing. Zero legs are skipped.
    fn transfer_batch(&mut self, from: &Address, legs: &[(Address, Decimal)], asset: &str) -> Result<()> {
        let mut needed = Decimal::ZERO;
        for (_, amount) in legs {
            if amount.is_sign_negative() {
                return Err(PostmatchError::validation("transfer amount must not be negative"));
            }
            needed += *amount;
        }
        let available = self.balance(from, asset);
        if available < needed {
            return Err(PostmatchError::InsufficientFunds {
                account: *from,
                asset: asset.to_string(),
                needed,
                available,
            });
        }
        for (to, amount) in legs.iter().filter(|(_, amount)| !amount.is_zero()) {
            self.transfer(from, to, asset, *amount)?;
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}

type BalanceKey = (Address, String);

#[derive(Debug, Clone)]
enum Undo {
    Balance(BalanceKey, Option<Decimal>),
    Minted(String, Option<Decimal>),
}

/// In-memory balances keyed by (account, asset).
#[derive(Debug, Clone, Default)]
pub struct BalanceManager {
    balances: BTreeMap<BalanceKey, Decimal>,
    minted: BTreeMap<String, Decimal>,
    journal: Option<Vec<Undo>>,
}

impl BalanceManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `amount` new tokens in `account`.
    pub fn mint(&mut self, account: &Address, asset: &str, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(PostmatchError::validation("mint amount must be positive"));
        }
        let key = (*account, asset.to_string());
        let balance = self.balance(account, asset);
        self.write_balance(key, balance + amount);

        let minted = self.minted(asset);
        if let Some(journal) = self.journal.as_mut() {
            journal.push(Undo::Minted(asset.to_string(), self.minted.get(asset).copied()));
        }
        self.minted.insert(asset.to_string(), minted + amount);
        tracing::debug!(account = %account, asset, %amount, "minted");
        Ok(())
    }

    /// Tokens of `asset` ever minted.
    #[must_use]
    pub fn minted(&self, asset: &str) -> Decimal {
        self.minted.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// Sum of every account's balance of `asset`.
    #[must_use]
    pub fn total_supply(&self, asset: &str) -> Decimal {
        self.balances
            .iter()
            .filter(|((_, a), _)| a == asset)
            .map(|(_, amount)| *amount)
            .sum()
    }

    /// Assets that have been minted, in name order.
    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.minted.keys().map(String::as_str)
    }

    fn write_balance(&mut self, key: BalanceKey, value: Decimal) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(Undo::Balance(key.clone(), self.balances.get(&key).copied()));
        }
        if value.is_zero() {
            self.balances.remove(&key);
        } else {
            self.balances.insert(key, value);
        }
    }
}

impl FundsTransfer for BalanceManager {
    fn balance(&self, account: &Address, asset: &str) -> Decimal {
        self.balances
            .get(&(*account, asset.to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn transfer(&mut self, from: &Address, to: &Address, asset: &str, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(PostmatchError::validation("transfer amount must be positive"));
        }
        let available = self.balance(from, asset);
        if available < amount {
            return Err(PostmatchError::InsufficientFunds {
                account: *from,
                asset: asset.to_string(),
                needed: amount,
                available,
            });
        }
        if from == to {
            return Ok(());
        }
        let received = self.balance(to, asset);
        self.write_balance((*from, asset.to_string()), available - amount);
        self.write_balance((*to, asset.to_string()), received + amount);
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        if self.journal.is_some() {
            return Err(PostmatchError::Storage {
                reason: "balance journal already open".into(),
            });
        }
        self.journal = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.journal
            .take()
            .map(drop)
            .ok_or_else(|| PostmatchError::Storage {
                reason: "balance commit without open journal".into(),
            })
    }

    fn rollback(&mut self) -> Result<()> {
        let journal = self.journal.take().ok_or_else(|| PostmatchError::Storage {
            reason: "balance rollback without open journal".into(),
        })?;
        for undo in journal.into_iter().rev() {
            match undo {
                Undo::Balance(key, Some(value)) => {
                    self.balances.insert(key, value);
                }
                Undo::Balance(key, None) => {
                    self.balances.remove(&key);
                }
                Undo::Minted(asset, Some(value)) => {
                    self.minted.insert(asset, value);
                }
                Undo::Minted(asset, None) => {
                    self.minted.remove(&asset);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RMT: &str = "RMT";

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn mint_credits_and_tracks_supply() {
        let mut bank = BalanceManager::new();
        let alice = Address::dummy(1);
        bank.mint(&alice, RMT, dec(1000)).unwrap();
        assert_eq!(bank.balance(&alice, RMT), dec(1000));
        assert_eq!(bank.minted(RMT), dec(1000));
        assert_eq!(bank.total_supply(RMT), dec(1000));
        assert!(bank.mint(&alice, RMT, Decimal::ZERO).is_err());
    }

    #[test]
    fn transfer_moves_funds() {
        let mut bank = BalanceManager::new();
        let (alice, bob) = (Address::dummy(1), Address::dummy(2));
        bank.mint(&alice, RMT, dec(1000)).unwrap();
        bank.transfer(&alice, &bob, RMT, dec(400)).unwrap();
        assert_eq!(bank.balance(&alice, RMT), dec(600));
        assert_eq!(bank.balance(&bob, RMT), dec(400));
        assert_eq!(bank.total_supply(RMT), dec(1000));
    }

    #[test]
    fn transfer_insufficient_fails_cleanly() {
        let mut bank = BalanceManager::new();
        let (alice, bob) = (Address::dummy(1), Address::dummy(2));
        bank.mint(&alice, RMT, dec(100)).unwrap();
        let err = bank.transfer(&alice, &bob, RMT, dec(200)).unwrap_err();
        assert!(matches!(err, PostmatchError::InsufficientFunds { .. }));
        assert_eq!(bank.balance(&alice, RMT), dec(100));
        assert_eq!(bank.balance(&bob, RMT), Decimal::ZERO);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let mut bank = BalanceManager::new();
        let (custody, a, b) = (Address::dummy(9), Address::dummy(1), Address::dummy(2));
        bank.mint(&custody, RMT, dec(100)).unwrap();

        let err = bank
            .transfer_batch(&custody, &[(a, dec(60)), (b, dec(50))], RMT)
            .unwrap_err();
        assert!(err.is_insufficient_funds());
        assert_eq!(bank.balance(&custody, RMT), dec(100));

        bank.transfer_batch(&custody, &[(a, dec(60)), (b, Decimal::ZERO), (b, dec(40))], RMT)
            .unwrap();
        assert_eq!(bank.balance(&custody, RMT), Decimal::ZERO);
        assert_eq!(bank.balance(&a, RMT), dec(60));
        assert_eq!(bank.balance(&b, RMT), dec(40));
    }

    #[test]
    fn rollback_restores_balances_and_supply() {
        let mut bank = BalanceManager::new();
        let (alice, bob) = (Address::dummy(1), Address::dummy(2));
        bank.mint(&alice, RMT, dec(500)).unwrap();

        bank.begin().unwrap();
        bank.transfer(&alice, &bob, RMT, dec(500)).unwrap();
        bank.mint(&bob, "USD", dec(10)).unwrap();
        bank.rollback().unwrap();

        assert_eq!(bank.balance(&alice, RMT), dec(500));
        assert_eq!(bank.balance(&bob, RMT), Decimal::ZERO);
        assert_eq!(bank.minted("USD"), Decimal::ZERO);
        assert_eq!(bank.assets().collect::<Vec<_>>(), vec![RMT]);
    }
}
