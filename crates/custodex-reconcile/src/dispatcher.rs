//! Withdrawal dispatch.
//!
//! A pending withdrawal is paid from one custodial reserve that can cover
//! it. The reserve is acquired (selected and locked in one statement), the
//! row moves to `processing`, and the transfer runs in its own task:
//!
//! ```text
//! derive key ─► estimate fee ─► sign ─► record hash ─► broadcast ─► finalize
//! ```
//!
//! The hash is written before the broadcast so a crash in between leaves
//! something the recovery sweep can look up. Writing it is conditional on
//! the attempt still owning the row: an attempt that recovery already
//! requeued, or that a newer attempt beat to it, stops there and never
//! broadcasts. A transfer the node refuses goes straight back to
//! `pending`. Whatever else happens inside the task, including a panic,
//! the locked reserves are released afterwards.
//!
//! Token withdrawals also need parent-asset gas at the same address. When
//! that is short, the dispatcher tops it up once per withdrawal from an
//! insurance reserve, provided the token's fee revenue can pay for it.

use std::sync::Arc;
use std::time::Duration;

use custodex_chain::{DerivedKey, Keypair, Mailer, TransferIntent};
use custodex_ledger::{LedgerStore, ReserveManager};
use custodex_types::{
    Chain, Contract, Currency, CustodexError, Event, Notifier, Protocol, Reserve,
    ReserveDirection, ReserveKey, Result, Transaction, TxFilter, constants,
};
use rust_decimal::Decimal;
use tokio::task::JoinHandle;

use crate::gateways::GatewayPool;

/// A withdrawal that owns its locked reserves and is ready to send.
#[derive(Debug, Clone)]
struct Dispatch {
    tx: Transaction,
    chain: Chain,
    reserve: ReserveKey,
    /// Gas reserve locked next to a token reserve.
    gas: Option<ReserveKey>,
}

impl Dispatch {
    fn locked(&self) -> Vec<ReserveKey> {
        std::iter::once(self.reserve.clone())
            .chain(self.gas.clone())
            .collect()
    }
}

enum Gas {
    Locked,
    /// Enough gas, but another dispatch is spending it.
    Busy,
    Short,
}

pub struct WithdrawalDispatcher {
    pub(crate) store: Arc<dyn LedgerStore>,
    pub(crate) reserves: ReserveManager,
    pub(crate) gateways: Arc<GatewayPool>,
    keypair: Arc<dyn Keypair>,
    mailer: Arc<dyn Mailer>,
    pub(crate) notifier: Arc<dyn Notifier>,
    passphrase: String,
    pub(crate) processing_timeout: Duration,
    pub(crate) unknown_outcome_timeout: Duration,
}

impl WithdrawalDispatcher {
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateways: Arc<GatewayPool>,
        keypair: Arc<dyn Keypair>,
        mailer: Arc<dyn Mailer>,
        notifier: Arc<dyn Notifier>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            reserves: ReserveManager::new(Arc::clone(&store)),
            store,
            gateways,
            keypair,
            mailer,
            notifier,
            passphrase: passphrase.into(),
            processing_timeout: Duration::from_secs(constants::DEFAULT_PROCESSING_TIMEOUT_SECS),
            unknown_outcome_timeout: Duration::from_secs(
                constants::DEFAULT_UNKNOWN_OUTCOME_TIMEOUT_SECS,
            ),
        }
    }

    /// How long a withdrawal may sit in `processing` before recovery
    /// inspects it.
    #[must_use]
    pub fn with_processing_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout = timeout;
        self
    }

    /// How long a broadcast transfer may stay unknown to the node before
    /// the withdrawal is marked `failed`.
    #[must_use]
    pub fn with_unknown_outcome_timeout(mut self, timeout: Duration) -> Self {
        self.unknown_outcome_timeout = timeout;
        self
    }

    /// Claim every pending withdrawal that a reserve can cover and start
    /// its dispatch. Returns the handles of the dispatches started.
    pub async fn tick(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>> {
        let mut started = Vec::new();
        for tx in self.store.transactions(TxFilter::pending_withdrawals()).await? {
            match self.claim(&tx).await {
                Ok(Some(dispatch)) => started.push(self.spawn_dispatch(dispatch)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(tx = %tx.id, symbol = %tx.symbol, error = %e, "withdrawal claim failed");
                }
            }
        }
        Ok(started)
    }

    async fn claim(&self, tx: &Transaction) -> Result<Option<Dispatch>> {
        let chain = self
            .store
            .chain(tx.chain_id)
            .await?
            .ok_or(CustodexError::ChainNotFound(tx.chain_id))?;

        if tx.protocol.is_mainnet() {
            let Some(reserve) = self
                .reserves
                .acquire(&tx.symbol, tx.platform, Protocol::Mainnet, tx.value)
                .await?
            else {
                tracing::debug!(tx = %tx.id, symbol = %tx.symbol, value = %tx.value, "no reserve covers withdrawal yet");
                return Ok(None);
            };
            return self
                .begin(Dispatch {
                    tx: tx.clone(),
                    chain,
                    reserve: reserve.key,
                    gas: None,
                })
                .await;
        }

        let contract = self
            .store
            .contract_by_symbol(&tx.symbol)
            .await?
            .ok_or_else(|| CustodexError::RouteNotFound(tx.symbol.clone()))?;
        let currency = self.currency(&tx.symbol).await?;
        let Some(reserve) = self
            .reserves
            .acquire(&tx.symbol, tx.platform, tx.protocol, tx.value)
            .await?
        else {
            tracing::debug!(tx = %tx.id, symbol = %tx.symbol, value = %tx.value, "no token reserve covers withdrawal yet");
            return Ok(None);
        };

        let gas = reserve.key.gas_key(&chain.symbol);
        let state = match self.lock_gas(&gas, contract.fees_gas).await {
            Ok(state) => state,
            Err(e) => {
                self.release(&reserve.key).await;
                return Err(e);
            }
        };
        match state {
            Gas::Locked => {
                self.begin(Dispatch {
                    tx: tx.clone(),
                    chain,
                    reserve: reserve.key,
                    gas: Some(gas),
                })
                .await
            }
            Gas::Busy => {
                self.release(&reserve.key).await;
                tracing::debug!(tx = %tx.id, gas = %gas, "gas reserve busy, retrying later");
                Ok(None)
            }
            Gas::Short => {
                self.release(&reserve.key).await;
                self.top_up(tx, &chain, &contract, &currency, &gas).await?;
                Ok(None)
            }
        }
    }

    async fn lock_gas(&self, gas: &ReserveKey, fee: Decimal) -> Result<Gas> {
        match self.reserves.get(gas).await? {
            Some(reserve) if reserve.value >= fee => {
                if reserve.locked {
                    return Ok(Gas::Busy);
                }
                match self.reserves.lock(gas).await {
                    Ok(()) => Ok(Gas::Locked),
                    Err(CustodexError::ReserveLocked(_)) => Ok(Gas::Busy),
                    Err(e) => Err(e),
                }
            }
            _ => Ok(Gas::Short),
        }
    }

    /// Move the row to `processing`; on losing that race, give the
    /// reserves back.
    async fn begin(&self, dispatch: Dispatch) -> Result<Option<Dispatch>> {
        match self
            .store
            .begin_dispatch(dispatch.tx.id, &dispatch.reserve)
            .await
        {
            Ok(true) => {
                tracing::debug!(tx = %dispatch.tx.id, reserve = %dispatch.reserve, "withdrawal claimed");
                Ok(Some(dispatch))
            }
            Ok(false) => {
                self.release_all(&dispatch.locked()).await;
                Ok(None)
            }
            Err(e) => {
                self.release_all(&dispatch.locked()).await;
                Err(e)
            }
        }
    }

    fn spawn_dispatch(self: &Arc<Self>, dispatch: Dispatch) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let id = dispatch.tx.id;
            let locked = dispatch.locked();
            let worker = Arc::clone(&this);
            // The inner task is the panic boundary.
            let outcome = tokio::spawn(async move { worker.dispatch(&dispatch).await }).await;
            match outcome {
                Ok(Ok(Some(hash))) => {
                    tracing::info!(tx = %id, %hash, "withdrawal dispatched");
                }
                Ok(Ok(None)) => {
                    // The reserves now belong to recovery or a newer attempt.
                    tracing::warn!(tx = %id, "withdrawal attempt superseded, not broadcast");
                    return;
                }
                Ok(Err(e)) => {
                    tracing::warn!(tx = %id, error = %e, "withdrawal dispatch failed");
                }
                Err(join) if join.is_panic() => {
                    tracing::error!(tx = %id, "withdrawal dispatch panicked, left for recovery");
                }
                Err(_) => {
                    tracing::warn!(tx = %id, "withdrawal dispatch cancelled");
                }
            }
            this.release_all(&locked).await;
        })
    }

    /// `None` when the attempt lost the row before broadcasting.
    async fn dispatch(&self, d: &Dispatch) -> Result<Option<String>> {
        let tx = &d.tx;
        let key = self.signing_key(&d.reserve).await?;
        let gateway = self.gateways.get(&d.chain).await?;

        let token = match &d.gas {
            Some(_) => Some((
                self.store
                    .contract_by_symbol(&tx.symbol)
                    .await?
                    .ok_or_else(|| CustodexError::RouteNotFound(tx.symbol.clone()))?,
                self.currency(&tx.symbol).await?,
            )),
            None => None,
        };

        let mut intent = TransferIntent {
            platform: tx.platform,
            from: key.address,
            to: tx.address.clone(),
            value: tx.value,
            decimals: d.chain.decimals,
            contract: None,
        };
        if let Some((contract, currency)) = &token {
            intent.value = tx.value - currency.fees_withdraw;
            intent.decimals = contract.decimals;
            intent.contract = Some(contract.address.clone());
        }
        let network_fee = gateway.estimate_fee(&intent).await?;
        if token.is_none() {
            // Mainnet is the last leg: the network fee comes out of the amount.
            intent.value = tx.value - network_fee;
        }
        if intent.value <= Decimal::ZERO {
            return Err(CustodexError::InvalidWithdrawal {
                reason: format!("{} {} does not cover its fees", tx.value, tx.symbol),
            });
        }

        let signed = gateway.sign_transfer(&key.private_key, &intent).await?;
        if !self
            .store
            .record_signed(tx.id, &d.reserve, &signed.hash, network_fee)
            .await?
        {
            return Ok(None);
        }
        match gateway.broadcast(&signed).await {
            Ok(()) => {}
            Err(CustodexError::Broadcast { reason }) => {
                // Refused outright, so nothing can land: free the row.
                if self.store.release_signed(tx.id, &signed.hash).await? {
                    tracing::warn!(tx = %tx.id, hash = %signed.hash, %reason, "broadcast refused, withdrawal requeued");
                    if let Some(transaction) = self.store.transaction(tx.id).await? {
                        self.notifier
                            .publish(Event::WithdrawalStatus { transaction });
                    }
                }
                return Err(CustodexError::Broadcast { reason });
            }
            // Timeouts and transport errors are ambiguous; recovery asks the chain.
            Err(e) => return Err(e),
        }

        self.finalize(tx, &d.reserve, &d.chain, &signed.hash, network_fee)
            .await?;
        Ok(Some(signed.hash))
    }

    /// Settle a withdrawal whose transfer went out: mark it `filled`, take
    /// what left custody off the reserves, book the withheld token fee and
    /// tell the owner. Returns `false` when the row was already settled.
    pub(crate) async fn finalize(
        &self,
        tx: &Transaction,
        reserve: &ReserveKey,
        chain: &Chain,
        hash: &str,
        network_fee: Decimal,
    ) -> Result<bool> {
        if !self
            .store
            .complete_withdrawal(tx.id, hash, network_fee)
            .await?
        {
            return Ok(false);
        }

        if tx.protocol.is_mainnet() {
            self.reserves
                .adjust_key(reserve, tx.value, ReserveDirection::Debit)
                .await?;
        } else {
            let currency = self.currency(&tx.symbol).await?;
            self.reserves
                .adjust_key(reserve, tx.value - currency.fees_withdraw, ReserveDirection::Debit)
                .await?;
            self.reserves
                .adjust_key(&reserve.gas_key(&chain.symbol), network_fee, ReserveDirection::Debit)
                .await?;
            if !currency.fees_withdraw.is_zero() {
                self.store
                    .add_fee_charges(&tx.symbol, currency.fees_withdraw)
                    .await?;
            }
        }

        tracing::info!(
            tx = %tx.id,
            user = %tx.user_id,
            symbol = %tx.symbol,
            value = %tx.value,
            %hash,
            %network_fee,
            "withdrawal filled"
        );
        if let Some(transaction) = self.store.transaction(tx.id).await? {
            self.notifier
                .publish(Event::WithdrawalStatus { transaction });
        }
        self.mail_confirmation(tx, hash).await;
        Ok(true)
    }

    async fn mail_confirmation(&self, tx: &Transaction, hash: &str) {
        let email = match self.store.account(tx.user_id).await {
            Ok(Some(account)) => account.email,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(tx = %tx.id, error = %e, "account lookup for confirmation mail failed");
                return;
            }
        };
        if let Err(e) = self
            .mailer
            .send_withdrawal_confirmation(&email, &tx.symbol, tx.value, hash)
            .await
        {
            tracing::warn!(tx = %tx.id, error = %e, "withdrawal confirmation mail failed");
        }
    }

    /// Reverse top-up: pay the token reserve's address exactly the expected
    /// gas from an insurance reserve of the parent asset.
    async fn top_up(
        &self,
        tx: &Transaction,
        chain: &Chain,
        contract: &Contract,
        currency: &Currency,
        gas: &ReserveKey,
    ) -> Result<()> {
        if tx.claim {
            tracing::debug!(tx = %tx.id, "gas top-up already sent, waiting");
            return Ok(());
        }
        let fee = contract.fees_gas;
        let floor = fee * Decimal::from(constants::INSURANCE_FEE_MULTIPLIER);
        if currency.fees_charges < floor {
            tracing::info!(
                tx = %tx.id,
                symbol = %currency.symbol,
                fees_charges = %currency.fees_charges,
                %floor,
                "fee revenue too small for a gas top-up"
            );
            return Ok(());
        }
        let Some(insurance) = self
            .reserves
            .acquire(&chain.symbol, chain.platform, Protocol::Mainnet, fee)
            .await?
        else {
            tracing::warn!(tx = %tx.id, symbol = %chain.symbol, %fee, "no insurance reserve can fund a gas top-up");
            return Ok(());
        };
        let sent = self.send_top_up(tx, chain, fee, gas, &insurance).await;
        self.release(&insurance.key).await;
        sent
    }

    async fn send_top_up(
        &self,
        tx: &Transaction,
        chain: &Chain,
        fee: Decimal,
        gas: &ReserveKey,
        insurance: &Reserve,
    ) -> Result<()> {
        let key = self.signing_key(&insurance.key).await?;
        let gateway = self.gateways.get(chain).await?;
        let intent = TransferIntent {
            platform: chain.platform,
            from: key.address,
            to: gas.address.clone(),
            value: fee,
            decimals: chain.decimals,
            contract: None,
        };
        let network_fee = gateway.estimate_fee(&intent).await?;
        if insurance.value < fee + network_fee {
            tracing::warn!(
                tx = %tx.id,
                insurance = %insurance.key,
                value = %insurance.value,
                needed = %(fee + network_fee),
                "insurance reserve cannot pay the top-up and its fee"
            );
            return Ok(());
        }

        let signed = gateway.sign_transfer(&key.private_key, &intent).await?;
        gateway.broadcast(&signed).await?;
        self.store.set_claim(tx.id).await?;
        self.reserves
            .adjust_key(gas, fee, ReserveDirection::Credit)
            .await?;
        self.reserves
            .adjust_key(&insurance.key, fee + network_fee, ReserveDirection::Debit)
            .await?;
        tracing::info!(
            tx = %tx.id,
            from = %insurance.key,
            to = %gas,
            %fee,
            %network_fee,
            hash = %signed.hash,
            "gas top-up sent"
        );
        Ok(())
    }

    /// Key of the custodial address holding `reserve`.
    async fn signing_key(&self, reserve: &ReserveKey) -> Result<DerivedKey> {
        let wallet = self
            .store
            .wallet(reserve.user_id, reserve.platform)
            .await?
            .ok_or(CustodexError::WalletNotFound {
                user: reserve.user_id,
                platform: reserve.platform,
            })?;
        let key = self
            .keypair
            .derive(&self.passphrase, &wallet.entropy, reserve.platform)?;
        if !reserve.platform.same_address(&key.address, &reserve.address) {
            return Err(CustodexError::Signing {
                reason: format!("derived key does not control {}", reserve.address),
            });
        }
        Ok(key)
    }

    async fn currency(&self, symbol: &str) -> Result<Currency> {
        self.store
            .currency(symbol)
            .await?
            .ok_or_else(|| CustodexError::CurrencyNotFound(symbol.to_string()))
    }

    pub(crate) async fn release(&self, key: &ReserveKey) {
        if let Err(e) = self.reserves.unlock(key).await {
            tracing::error!(reserve = %key, error = %e, "reserve unlock failed");
        }
    }

    pub(crate) async fn release_all(&self, keys: &[ReserveKey]) {
        for key in keys {
            self.release(key).await;
        }
    }
}
