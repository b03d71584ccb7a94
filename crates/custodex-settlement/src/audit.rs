//! Supply audit.
//!
//! Per asset, value is neither created nor destroyed by trading:
//! ```text
//! Σ(available) + Σ(open order commitments) + Σ(trade fees)
//!     == Σ(credited deposits) - Σ(outstanding withdrawals)
//! ```
//!
//! A mismatch means the ledger is corrupt; callers treat
//! [`CustodexError::SupplyInvariantViolation`] as a critical alert.

use std::collections::HashMap;

use custodex_ledger::LedgerStore;
use custodex_types::{
    Asset, CustodexError, Result, TxDirection, TxFilter, TxStatus, committed_symbol,
};
use rust_decimal::Decimal;

use crate::settler::unused_commitment;

/// Per-asset deposit and withdrawal totals.
#[derive(Debug, Default)]
pub struct SupplyAudit {
    deposits: HashMap<Asset, Decimal>,
    withdrawals: HashMap<Asset, Decimal>,
}

impl SupplyAudit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals from the transaction table: credited deposits and every
    /// withdrawal whose value has left the user's balance.
    pub async fn from_store(store: &dyn LedgerStore) -> Result<Self> {
        let mut audit = Self::new();
        for tx in store
            .transactions(TxFilter {
                direction: TxDirection::Deposit,
                status: TxStatus::Filled,
            })
            .await?
        {
            audit.record_deposit(&tx.symbol, tx.value);
        }
        for status in [
            TxStatus::Pending,
            TxStatus::Processing,
            TxStatus::Filled,
            TxStatus::Failed,
        ] {
            for tx in store
                .transactions(TxFilter {
                    direction: TxDirection::Withdraw,
                    status,
                })
                .await?
            {
                audit.record_withdrawal(&tx.symbol, tx.value);
            }
        }
        Ok(audit)
    }

    pub fn record_deposit(&mut self, asset: &str, amount: Decimal) {
        *self
            .deposits
            .entry(asset.to_string())
            .or_insert(Decimal::ZERO) += amount;
    }

    pub fn record_withdrawal(&mut self, asset: &str, amount: Decimal) {
        *self
            .withdrawals
            .entry(asset.to_string())
            .or_insert(Decimal::ZERO) += amount;
    }

    #[must_use]
    pub fn total_deposits(&self, asset: &str) -> Decimal {
        self.deposits.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    #[must_use]
    pub fn total_withdrawals(&self, asset: &str) -> Decimal {
        self.withdrawals.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// Deposits minus withdrawals.
    #[must_use]
    pub fn expected_supply(&self, asset: &str) -> Decimal {
        self.total_deposits(asset) - self.total_withdrawals(asset)
    }

    pub fn verify(&self, asset: &str, actual_supply: Decimal) -> Result<()> {
        let expected = self.expected_supply(asset);
        if actual_supply != expected {
            return Err(CustodexError::SupplyInvariantViolation {
                reason: format!(
                    "Asset {asset}: actual supply {actual_supply} != expected {expected} \
                     (deposits={}, withdrawals={})",
                    self.total_deposits(asset),
                    self.total_withdrawals(asset),
                ),
            });
        }
        Ok(())
    }
}

/// Value of `symbol` the ledger accounts for: balances, funds committed to
/// open orders, and trade fees collected.
pub async fn ledger_supply(store: &dyn LedgerStore, symbol: &str) -> Result<Decimal> {
    let balances: Decimal = store
        .balances_for_symbol(symbol)
        .await?
        .iter()
        .map(|b| b.available)
        .sum();

    let mut committed = Decimal::ZERO;
    for pair in store.pairs().await? {
        if pair.market.base != symbol && pair.market.quote != symbol {
            continue;
        }
        committed += store
            .pending_orders(&pair.market)
            .await?
            .iter()
            .filter(|o| committed_symbol(&o.market, o.side) == symbol)
            .map(unused_commitment)
            .sum::<Decimal>();
    }

    let fees: Decimal = store
        .transfers_for_symbol(symbol)
        .await?
        .iter()
        .map(|t| t.fee)
        .sum();

    Ok(balances + committed + fees)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_supply_is_zero() {
        let audit = SupplyAudit::new();
        assert_eq!(audit.expected_supply("ETH"), Decimal::ZERO);
        assert!(audit.verify("ETH", Decimal::ZERO).is_ok());
    }

    #[test]
    fn withdrawals_decrease_expected() {
        let mut audit = SupplyAudit::new();
        audit.record_deposit("USD", Decimal::new(1000, 0));
        audit.record_withdrawal("USD", Decimal::new(300, 0));
        assert_eq!(audit.expected_supply("USD"), Decimal::new(700, 0));
    }

    #[test]
    fn imbalance_is_a_violation() {
        let mut audit = SupplyAudit::new();
        audit.record_deposit("ETH", Decimal::TEN);
        let err = audit.verify("ETH", Decimal::new(11, 0)).unwrap_err();
        assert!(matches!(err, CustodexError::SupplyInvariantViolation { .. }));
    }
}
