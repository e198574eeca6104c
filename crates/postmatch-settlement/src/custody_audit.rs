//! Custody and supply invariant checker.
//!
//! ```text
//! ∀ escrow ACTIVE | DISPUTED: balance(custody) == principal + fee
//! ∀ escrow RELEASED | REFUNDED: balance(custody) == 0
//! ∀ asset: Σ balances == Σ minted
//! ```
//!
//! A failure here means money was created, destroyed or left stranded by
//! some code path; the caller should stop processing blocks.

use postmatch_ingress::{BalanceManager, FundsTransfer};
use postmatch_store::{KvStore, escrows};
use postmatch_types::{PostmatchError, Result};
use rust_decimal::Decimal;
use serde::Serialize;

/// What a successful audit covered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub escrows_checked: usize,
    /// Escrows still holding funds.
    pub escrows_holding: usize,
    pub assets_checked: usize,
}

pub struct CustodyAudit;

impl CustodyAudit {
    /// Walk every escrow record and every minted asset.
    pub fn verify(store: &impl KvStore, bank: &BalanceManager) -> Result<AuditReport> {
        let mut report = AuditReport::default();

        for escrow in escrows::all(store)? {
            let held = bank.balance(&escrow.custody, &escrow.asset);
            let expected = if escrow.holds_funds() {
                report.escrows_holding += 1;
                escrow.total()
            } else {
                Decimal::ZERO
            };
            if held != expected {
                tracing::error!(
                    escrow = %escrow.id,
                    status = %escrow.status,
                    %expected,
                    %held,
                    "custody mismatch"
                );
                return Err(PostmatchError::CustodyMismatch {
                    escrow: escrow.id,
                    expected,
                    actual: held,
                });
            }
            report.escrows_checked += 1;
        }

        for asset in bank.assets() {
            let expected = bank.minted(asset);
            let actual = bank.total_supply(asset);
            if actual != expected {
                tracing::error!(asset, %expected, %actual, "supply mismatch");
                return Err(PostmatchError::SupplyMismatch {
                    asset: asset.to_string(),
                    expected,
                    actual,
                });
            }
            report.assets_checked += 1;
        }

        tracing::debug!(
            escrows = report.escrows_checked,
            holding = report.escrows_holding,
            assets = report.assets_checked,
            "custody audit passed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use postmatch_ingress::{EscrowLedger, EscrowRequest};
    use postmatch_store::MemStore;
    use postmatch_types::{Address, BlockContext, EscrowSubject, OrderId};

    const RMT: &str = "RMT";

    fn setup() -> (MemStore, BalanceManager, EscrowLedger, BlockContext) {
        let mut bank = BalanceManager::new();
        bank.mint(&Address::dummy(1), RMT, Decimal::new(5000, 0)).unwrap();
        let ledger = EscrowLedger::new(RMT, Decimal::new(5, 3), Address::module("fee_collector"));
        let ctx = BlockContext::new(1, DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap());
        (MemStore::new(), bank, ledger, ctx)
    }

    fn fund(
        store: &mut MemStore,
        bank: &mut BalanceManager,
        ledger: &EscrowLedger,
        ctx: &BlockContext,
        seq: u32,
    ) -> postmatch_types::Escrow {
        let request = EscrowRequest {
            subject: EscrowSubject::Order(OrderId::deterministic(1, seq)),
            depositor: Address::dummy(1),
            principal: Decimal::new(1000, 0),
            fee_discount: Decimal::ZERO,
            expires_at: None,
        };
        ledger.create(store, bank, ctx, request).unwrap()
    }

    #[test]
    fn clean_ledger_passes() {
        let (mut store, mut bank, ledger, ctx) = setup();
        let a = fund(&mut store, &mut bank, &ledger, &ctx, 10);
        fund(&mut store, &mut bank, &ledger, &ctx, 11);
        ledger.refund(&mut store, &mut bank, &a.id, "expired", ctx.time).unwrap();

        let report = CustodyAudit::verify(&store, &bank).unwrap();
        assert_eq!(report.escrows_checked, 2);
        assert_eq!(report.escrows_holding, 1);
        assert_eq!(report.assets_checked, 1);
    }

    #[test]
    fn drained_custody_detected() {
        let (mut store, mut bank, ledger, ctx) = setup();
        let escrow = fund(&mut store, &mut bank, &ledger, &ctx, 10);
        bank.transfer(&escrow.custody, &Address::dummy(7), RMT, Decimal::ONE)
            .unwrap();
        let err = CustodyAudit::verify(&store, &bank).unwrap_err();
        assert!(matches!(err, PostmatchError::CustodyMismatch { .. }));
    }

    #[test]
    fn empty_state_passes() {
        let report = CustodyAudit::verify(&MemStore::new(), &BalanceManager::new()).unwrap();
        assert_eq!(report, AuditReport::default());
    }
}
