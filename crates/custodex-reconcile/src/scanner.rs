//! Deposit detection.
//!
//! Each enabled chain is walked one block per tick, strictly in cursor
//! order. A chain whose previous scan is still running is skipped, so a
//! slow node never makes two scans of the same chain overlap.

use std::sync::Arc;

use custodex_chain::{ChainGateway, decode_transfer_log, scale_amount};
use custodex_ledger::LedgerStore;
use custodex_types::{
    Chain, ChainId, Contract, CustodexError, Event, Notifier, Protocol, Result, Transaction,
};
use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::gateways::GatewayPool;
use crate::scan_state::ScanState;

/// What one block scan found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub block: u64,
    /// Candidate transfers to enrolled wallets.
    pub candidates: usize,
    /// Rows actually inserted (the rest were already known).
    pub inserted: usize,
}

/// A transfer into custody that has not been matched to a row yet.
/// `amount` stays in the smallest unit until the recipient is known.
struct Candidate {
    hash: String,
    to: String,
    symbol: String,
    protocol: Protocol,
    amount: u128,
    decimals: u32,
}

pub struct DepositScanner {
    store: Arc<dyn LedgerStore>,
    gateways: Arc<GatewayPool>,
    notifier: Arc<dyn Notifier>,
    states: DashMap<ChainId, Arc<ScanState>>,
}

impl DepositScanner {
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateways: Arc<GatewayPool>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            gateways,
            notifier,
            states: DashMap::new(),
        }
    }

    /// Scan state of `chain`, created on first use.
    #[must_use]
    pub fn state(&self, chain: ChainId) -> Arc<ScanState> {
        Arc::clone(self.states.entry(chain).or_insert_with(ScanState::new).value())
    }

    /// Start a scan of every enabled chain that is not already being
    /// scanned. Returns the handles of the scans started.
    pub async fn tick(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>> {
        let chains = self.store.enabled_chains().await?;
        let mut started = Vec::with_capacity(chains.len());
        for chain in chains {
            let Some(guard) = self.state(chain.id).try_begin() else {
                tracing::debug!(chain = %chain.id, "scan still in flight, skipping");
                continue;
            };
            let scanner = Arc::clone(self);
            started.push(tokio::spawn(async move {
                let _guard = guard;
                match scanner.scan_block(&chain).await {
                    Ok(outcome) if outcome.inserted > 0 => {
                        tracing::info!(
                            chain = %chain.id,
                            block = outcome.block,
                            deposits = outcome.inserted,
                            "deposits detected"
                        );
                    }
                    Ok(_) => {}
                    Err(CustodexError::BlockNotAvailable(block)) => {
                        tracing::trace!(chain = %chain.id, block, "chain head reached");
                    }
                    Err(e) => {
                        scanner.gateways.evict(chain.id);
                        tracing::warn!(chain = %chain.id, block = chain.block, error = %e, "block scan failed");
                    }
                }
            }));
        }
        Ok(started)
    }

    /// Scan the block at `chain.block` and advance the cursor past it.
    ///
    /// A failed fetch returns the error and leaves the cursor where it was.
    pub async fn scan_block(&self, chain: &Chain) -> Result<ScanOutcome> {
        let gateway = self.gateways.get(chain).await?;
        let block = gateway.block_by_number(chain.block).await?;
        let contracts = self.store.contracts_for_chain(chain.id).await?;

        let mut candidates = Vec::new();
        for tx in &block.transactions {
            let Some(to) = tx.to.as_deref() else {
                continue;
            };
            if let Some(contract) = contracts
                .iter()
                .find(|c| chain.platform.same_address(&c.address, to))
            {
                self.token_candidates(gateway.as_ref(), &tx.hash, contract, &mut candidates)
                    .await?;
            } else if tx.value > 0 {
                candidates.push(Candidate {
                    hash: tx.hash.clone(),
                    to: to.to_string(),
                    symbol: chain.symbol.clone(),
                    protocol: Protocol::Mainnet,
                    amount: tx.value,
                    decimals: chain.decimals,
                });
            }
        }

        let mut outcome = ScanOutcome {
            block: block.number,
            ..ScanOutcome::default()
        };
        for candidate in candidates {
            match self.record(chain, block.number, candidate).await? {
                Some(true) => {
                    outcome.candidates += 1;
                    outcome.inserted += 1;
                }
                Some(false) => outcome.candidates += 1,
                None => {}
            }
        }

        if !self.store.advance_cursor(chain.id, chain.block).await? {
            tracing::warn!(chain = %chain.id, block = chain.block, "cursor moved by another scanner");
        }
        Ok(outcome)
    }

    async fn token_candidates(
        &self,
        gateway: &dyn ChainGateway,
        hash: &str,
        contract: &Contract,
        out: &mut Vec<Candidate>,
    ) -> Result<()> {
        for log in gateway.logs_by_transaction(hash).await? {
            let transfer = match decode_transfer_log(&log, contract) {
                Ok(Some(transfer)) => transfer,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(%hash, contract = %contract.address, error = %e, "undecodable transfer log");
                    continue;
                }
            };
            out.push(Candidate {
                hash: hash.to_string(),
                to: transfer.to,
                symbol: contract.symbol.clone(),
                protocol: contract.protocol,
                amount: transfer.amount,
                decimals: contract.decimals,
            });
        }
        Ok(())
    }

    /// Insert the deposit row if `candidate` pays an enrolled wallet.
    ///
    /// `None` when it does not, or when its amount cannot be represented;
    /// `Some(false)` when the hash is already recorded.
    async fn record(&self, chain: &Chain, block: u64, candidate: Candidate) -> Result<Option<bool>> {
        if candidate.amount == 0 {
            return Ok(None);
        }
        let Some(wallet) = self
            .store
            .wallet_by_address(chain.platform, &candidate.to)
            .await?
        else {
            return Ok(None);
        };
        let value = match scale_amount(candidate.amount, candidate.decimals) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    chain = %chain.id,
                    hash = %candidate.hash,
                    symbol = %candidate.symbol,
                    error = %e,
                    "deposit amount out of range, skipped"
                );
                return Ok(None);
            }
        };
        let deposit = Transaction::deposit(
            wallet.user_id,
            candidate.symbol,
            candidate.hash,
            value,
            block,
            wallet.address,
            chain.id,
            chain.platform,
            candidate.protocol,
        );
        let Some(inserted) = self.store.insert_transaction(deposit).await? else {
            return Ok(Some(false));
        };
        tracing::debug!(
            tx = %inserted.id,
            user = %inserted.user_id,
            symbol = %inserted.symbol,
            value = %inserted.value,
            "deposit recorded"
        );
        self.notifier.publish(Event::DepositDetected {
            transaction: inserted,
        });
        Ok(Some(true))
    }
}
