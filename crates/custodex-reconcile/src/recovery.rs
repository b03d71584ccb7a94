//! Recovery of withdrawals stuck in `processing`.
//!
//! A dispatch that crashed, timed out or lost its node leaves the row in
//! `processing`. Once the row is older than the processing timeout:
//!
//! - no hash recorded: nothing was signed, so the row goes back to
//!   `pending` and its reserves are released
//! - hash recorded: the chain decides. Success finalizes the withdrawal,
//!   failure requeues it, and an unknown outcome waits for the next sweep.
//!   A transfer still unknown past the unknown-outcome timeout is marked
//!   `failed` and left for an operator; the amount is not refunded because
//!   the signed transfer could still land.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use custodex_chain::TxOutcome;
use custodex_types::{Chain, CustodexError, Event, ReserveKey, Result, Transaction};

use crate::dispatcher::WithdrawalDispatcher;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub requeued: usize,
    pub finalized: usize,
    pub waiting: usize,
    pub failed: usize,
}

enum Recovered {
    Requeued,
    Finalized,
    Waiting,
    Failed,
    Lost,
}

/// `now - timeout`, or `None` when that is not representable.
fn cutoff(timeout: Duration) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(timeout)
        .ok()
        .and_then(|timeout| Utc::now().checked_sub_signed(timeout))
}

impl WithdrawalDispatcher {
    /// One recovery pass over stale `processing` withdrawals.
    pub async fn recover_stale(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let Some(cutoff) = cutoff(self.processing_timeout) else {
            return Ok(report);
        };

        for tx in self.store.stale_processing(cutoff).await? {
            match self.recover(&tx).await {
                Ok(Recovered::Requeued) => report.requeued += 1,
                Ok(Recovered::Finalized) => report.finalized += 1,
                Ok(Recovered::Waiting) => report.waiting += 1,
                Ok(Recovered::Failed) => report.failed += 1,
                Ok(Recovered::Lost) => {}
                Err(e) => {
                    tracing::warn!(tx = %tx.id, error = %e, "withdrawal recovery failed");
                }
            }
        }
        Ok(report)
    }

    async fn recover(&self, tx: &Transaction) -> Result<Recovered> {
        let chain = self
            .store
            .chain(tx.chain_id)
            .await?
            .ok_or(CustodexError::ChainNotFound(tx.chain_id))?;
        let Some(hash) = tx.hash.as_deref() else {
            return self.requeue(tx, &chain, "never signed").await;
        };

        let gateway = self.gateways.get(&chain).await?;
        match gateway.transaction_status(hash).await? {
            TxOutcome::Success => {
                let reserve = tx.reserve.clone().ok_or_else(|| {
                    CustodexError::Internal(format!("{} is processing without a reserve", tx.id))
                })?;
                let finalized = self.finalize(tx, &reserve, &chain, hash, tx.fee).await?;
                self.release_all(&locked_keys(tx, &chain)).await;
                Ok(if finalized {
                    Recovered::Finalized
                } else {
                    Recovered::Lost
                })
            }
            TxOutcome::Failure => self.requeue(tx, &chain, "failed on chain").await,
            TxOutcome::Unknown => {
                let expired = cutoff(self.unknown_outcome_timeout)
                    .is_some_and(|cutoff| tx.updated_at <= cutoff);
                if !expired {
                    tracing::debug!(tx = %tx.id, %hash, "withdrawal outcome unknown, waiting");
                    return Ok(Recovered::Waiting);
                }
                self.fail(tx, &chain, hash).await
            }
        }
    }

    async fn fail(&self, tx: &Transaction, chain: &Chain, hash: &str) -> Result<Recovered> {
        if !self.store.fail_withdrawal(tx.id, hash).await? {
            return Ok(Recovered::Lost);
        }
        self.release_all(&locked_keys(tx, chain)).await;
        tracing::error!(
            tx = %tx.id,
            user = %tx.user_id,
            symbol = %tx.symbol,
            value = %tx.value,
            %hash,
            "withdrawal outcome unknown past timeout, marked failed for review"
        );
        if let Some(transaction) = self.store.transaction(tx.id).await? {
            self.notifier
                .publish(Event::WithdrawalStatus { transaction });
        }
        Ok(Recovered::Failed)
    }

    async fn requeue(&self, tx: &Transaction, chain: &Chain, reason: &str) -> Result<Recovered> {
        if !self.store.requeue_withdrawal(tx.id).await? {
            return Ok(Recovered::Lost);
        }
        self.release_all(&locked_keys(tx, chain)).await;
        tracing::info!(tx = %tx.id, hash = ?tx.hash, reason, "withdrawal requeued");
        if let Some(transaction) = self.store.transaction(tx.id).await? {
            self.notifier
                .publish(Event::WithdrawalStatus { transaction });
        }
        Ok(Recovered::Requeued)
    }
}

/// Reserves a dispatch of `tx` would have locked.
fn locked_keys(tx: &Transaction, chain: &Chain) -> Vec<ReserveKey> {
    let Some(reserve) = &tx.reserve else {
        return Vec::new();
    };
    let mut keys = vec![reserve.clone()];
    if !tx.protocol.is_mainnet() {
        keys.push(reserve.gas_key(&chain.symbol));
    }
    keys
}
