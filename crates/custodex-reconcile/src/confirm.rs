//! Deposit confirmation sweep.
//!
//! Crediting a deposit is one store call: the status flip, the balance
//! credit and the reserve credit land together or not at all, so a failed
//! call leaves the row `pending` for the next pass.

use std::collections::HashMap;
use std::sync::Arc;

use custodex_ledger::LedgerStore;
use custodex_types::{
    Chain, ChainId, CustodexError, Event, Notifier, Result, Transaction, TxFilter,
};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub credited: usize,
    /// Confirmed but below the currency's minimum deposit.
    pub held: usize,
    pub waiting: usize,
}

/// Credits pending deposits once their chain is deep enough past them.
pub struct ConfirmationSweep {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
}

impl ConfirmationSweep {
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// One pass over every pending deposit. A row that fails is logged and
    /// retried on the next pass.
    pub async fn tick(&self) -> Result<SweepReport> {
        let mut chains: HashMap<ChainId, Chain> = HashMap::new();
        let mut report = SweepReport::default();
        for tx in self.store.transactions(TxFilter::pending_deposits()).await? {
            if !chains.contains_key(&tx.chain_id) {
                let chain = self
                    .store
                    .chain(tx.chain_id)
                    .await?
                    .ok_or(CustodexError::ChainNotFound(tx.chain_id))?;
                chains.insert(chain.id, chain);
            }
            let Some(chain) = chains.get(&tx.chain_id) else {
                continue;
            };
            match self.confirm(chain, &tx).await {
                Ok(Confirmed::Credited) => report.credited += 1,
                Ok(Confirmed::Held) => report.held += 1,
                Ok(Confirmed::Waiting) => report.waiting += 1,
                Ok(Confirmed::Lost) => {}
                Err(e) => {
                    tracing::warn!(tx = %tx.id, error = %e, "deposit confirmation failed");
                }
            }
        }
        Ok(report)
    }

    async fn confirm(&self, chain: &Chain, tx: &Transaction) -> Result<Confirmed> {
        // The cursor is the next block to scan, so the deposit's own block
        // already counts once the cursor has moved past it.
        let confirmations = chain.block.saturating_sub(tx.block);
        if confirmations < chain.confirmations {
            if confirmations != tx.confirmations {
                self.store.set_confirmations(tx.id, confirmations).await?;
            }
            return Ok(Confirmed::Waiting);
        }

        let currency = self
            .store
            .currency(&tx.symbol)
            .await?
            .ok_or_else(|| CustodexError::CurrencyNotFound(tx.symbol.clone()))?;

        if tx.value < currency.min_deposit {
            let Some(held) = self.store.hold_deposit(tx.id, confirmations).await? else {
                return Ok(Confirmed::Lost);
            };
            tracing::info!(
                tx = %tx.id,
                symbol = %tx.symbol,
                value = %tx.value,
                min_deposit = %currency.min_deposit,
                "deposit below minimum, held in reserve status"
            );
            self.publish(held);
            return Ok(Confirmed::Held);
        }

        let Some(credited) = self.store.confirm_deposit(tx.id, confirmations).await? else {
            return Ok(Confirmed::Lost);
        };
        tracing::info!(
            tx = %tx.id,
            user = %tx.user_id,
            symbol = %tx.symbol,
            value = %tx.value,
            address = %tx.address,
            confirmations,
            "deposit credited"
        );
        self.publish(credited);
        Ok(Confirmed::Credited)
    }

    fn publish(&self, transaction: Transaction) {
        self.notifier.publish(Event::TransactionStatus { transaction });
    }
}

enum Confirmed {
    Credited,
    Held,
    Waiting,
    /// Another sweep moved the row first.
    Lost,
}
