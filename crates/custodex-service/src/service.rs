//! Caller-facing operations.
//!
//! Every method validates first and mutates last, so a rejected request
//! leaves the ledger untouched. Errors carry their `CX_ERR_` code for the
//! transport layer to hand back.

use std::sync::Arc;

use custodex_chain::{Keypair, Mailer};
use custodex_ledger::LedgerStore;
use custodex_matchcore::MatchingEngine;
use custodex_settlement::{SupplyAudit, ledger_supply};
use custodex_types::{
    Account, ChainId, CustodexError, Event, ExchangeConfig, MarketPair, NewOrder, Notifier, Order,
    OrderId, Platform, Protocol, Result, Trade, Transaction, TransactionId, Transfer, TxStatus,
    UserId, Wallet,
};
use rand::RngCore;
use rust_decimal::Decimal;

use crate::codes::SecurityCodes;
use crate::graph::{Candle, candles};
use crate::runtime::Collaborators;

/// A withdrawal as the account holder asks for it.
#[derive(Debug, Clone)]
pub struct WithdrawalRequest {
    pub user_id: UserId,
    pub symbol: String,
    pub value: Decimal,
    /// External destination address.
    pub address: String,
    /// The mailed security code.
    pub code: String,
}

/// Where a withdrawal of some symbol is paid out.
struct Route {
    chain_id: ChainId,
    platform: Platform,
    protocol: Protocol,
}

pub struct ExchangeService {
    store: Arc<dyn LedgerStore>,
    engine: MatchingEngine,
    keypair: Arc<dyn Keypair>,
    mailer: Arc<dyn Mailer>,
    notifier: Arc<dyn Notifier>,
    codes: SecurityCodes,
    passphrase: String,
}

impl ExchangeService {
    #[must_use]
    pub fn new(deps: &Collaborators, config: &ExchangeConfig) -> Self {
        Self {
            store: Arc::clone(&deps.store),
            engine: MatchingEngine::new(Arc::clone(&deps.store), Arc::clone(&deps.notifier)),
            keypair: Arc::clone(&deps.keypair),
            mailer: Arc::clone(&deps.mailer),
            notifier: Arc::clone(&deps.notifier),
            codes: SecurityCodes::new(config.security.code_ttl()),
            passphrase: config.withdraw.passphrase.clone(),
        }
    }

    // ── Trading ─────────────────────────────────────────────────────

    pub async fn place_order(&self, req: NewOrder) -> Result<Order> {
        self.engine.place_order(req).await
    }

    pub async fn cancel_order(&self, user: UserId, id: OrderId) -> Result<Order> {
        self.engine.cancel_order(user, id).await
    }

    pub async fn orders(&self, user: UserId, market: Option<&MarketPair>) -> Result<Vec<Order>> {
        self.store.orders_for_user(user, market).await
    }

    pub async fn trades(&self, market: &MarketPair) -> Result<Vec<Trade>> {
        self.store.trades(market).await
    }

    pub async fn transfers(&self, user: UserId) -> Result<Vec<Transfer>> {
        self.store.transfers_for_user(user).await
    }

    /// OHLC candles for `market` at `resolution_secs`.
    pub async fn graph(&self, market: &MarketPair, resolution_secs: i64) -> Result<Vec<Candle>> {
        let pair = self
            .store
            .pair(market)
            .await?
            .ok_or_else(|| CustodexError::PairNotFound(market.to_string()))?;
        let trades = self.store.trades(&pair.market).await?;
        Ok(candles(&trades, resolution_secs))
    }

    // ── Deposit addresses ───────────────────────────────────────────

    /// The enrolled deposit address of `user` on `platform`, if any.
    pub async fn asset_address(&self, user: UserId, platform: Platform) -> Result<Option<String>> {
        Ok(self
            .store
            .wallet(user, platform)
            .await?
            .map(|w| w.address))
    }

    /// Enroll a deposit address for `user` on `platform`, deriving it from
    /// fresh entropy. An already enrolled address is returned unchanged:
    /// reserves at that address stay spendable only while its entropy is
    /// kept.
    pub async fn set_asset_address(&self, user: UserId, platform: Platform) -> Result<String> {
        self.active_account(user).await?;
        if let Some(wallet) = self.store.wallet(user, platform).await? {
            return Ok(wallet.address);
        }
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        let entropy = hex::encode(seed);
        let key = self.keypair.derive(&self.passphrase, &entropy, platform)?;
        self.store
            .upsert_wallet(Wallet {
                user_id: user,
                platform,
                address: key.address.clone(),
                entropy,
            })
            .await?;
        tracing::info!(%user, %platform, address = %key.address, "deposit address enrolled");
        Ok(key.address)
    }

    // ── Withdrawals ─────────────────────────────────────────────────

    /// Mail a fresh one-time code to the account holder.
    pub async fn issue_security_code(&self, user: UserId) -> Result<()> {
        let account = self.active_account(user).await?;
        let code = self.codes.issue(user);
        self.mailer.send_security_code(&account.email, &code).await?;
        tracing::debug!(%user, "security code issued");
        Ok(())
    }

    /// Validate and record a withdrawal, debiting the balance up front.
    /// The dispatch loop pays it out later.
    pub async fn request_withdrawal(&self, req: WithdrawalRequest) -> Result<Transaction> {
        self.active_account(req.user_id).await?;
        let currency = self
            .store
            .currency(&req.symbol)
            .await?
            .ok_or_else(|| CustodexError::CurrencyNotFound(req.symbol.clone()))?;
        if !currency.enabled {
            return Err(CustodexError::CurrencyDisabled(req.symbol));
        }
        if req.value < currency.min_withdraw {
            return Err(CustodexError::InvalidWithdrawal {
                reason: format!(
                    "{} {} is below the minimum of {}",
                    req.value, req.symbol, currency.min_withdraw
                ),
            });
        }

        let route = self.route(&req.symbol).await?;
        if !route.protocol.is_mainnet() && req.value <= currency.fees_withdraw {
            return Err(CustodexError::InvalidWithdrawal {
                reason: format!(
                    "{} {} does not cover the withdrawal fee of {}",
                    req.value, req.symbol, currency.fees_withdraw
                ),
            });
        }
        if !self.keypair.is_valid_address(route.platform, &req.address) {
            return Err(CustodexError::InvalidAddress {
                platform: route.platform,
                address: req.address,
            });
        }
        if !self.codes.consume(req.user_id, &req.code) {
            return Err(CustodexError::InvalidSecurityCode);
        }

        if !self
            .store
            .debit_balance(req.user_id, &req.symbol, req.value)
            .await?
        {
            let available = self.store.balance(req.user_id, &req.symbol).await?;
            return Err(CustodexError::InsufficientBalance {
                needed: req.value,
                available,
            });
        }

        let withdrawal = Transaction::withdrawal(
            req.user_id,
            &req.symbol,
            req.value,
            route.platform.normalize_address(&req.address),
            route.chain_id,
            route.platform,
            route.protocol,
        );
        let Some(tx) = self.store.insert_transaction(withdrawal).await? else {
            self.store
                .credit_balance(req.user_id, &req.symbol, req.value)
                .await?;
            return Err(CustodexError::Internal(
                "withdrawal row was not inserted".to_string(),
            ));
        };
        tracing::info!(
            tx = %tx.id,
            user = %tx.user_id,
            symbol = %tx.symbol,
            value = %tx.value,
            protocol = %tx.protocol,
            "withdrawal requested"
        );
        self.notifier.publish(Event::WithdrawalStatus {
            transaction: tx.clone(),
        });
        Ok(tx)
    }

    /// Cancel a withdrawal that has not been picked up yet and return the
    /// amount to the balance.
    pub async fn cancel_withdrawal(&self, user: UserId, id: TransactionId) -> Result<Transaction> {
        let tx = self
            .store
            .transaction(id)
            .await?
            .ok_or(CustodexError::TransactionNotFound(id))?;
        if tx.user_id != user || tx.is_deposit() {
            return Err(CustodexError::TransactionNotCancellable(id));
        }
        if !self
            .store
            .transition_transaction(id, TxStatus::Pending, TxStatus::Cancelled)
            .await?
        {
            return Err(CustodexError::TransactionNotCancellable(id));
        }
        self.store.credit_balance(user, &tx.symbol, tx.value).await?;
        let cancelled = self
            .store
            .transaction(id)
            .await?
            .ok_or(CustodexError::TransactionNotFound(id))?;
        tracing::info!(tx = %id, %user, symbol = %tx.symbol, value = %tx.value, "withdrawal cancelled");
        self.notifier.publish(Event::WithdrawalStatus {
            transaction: cancelled.clone(),
        });
        Ok(cancelled)
    }

    pub async fn transactions(&self, user: UserId) -> Result<Vec<Transaction>> {
        self.store.transactions_for_user(user).await
    }

    // ── Audit ───────────────────────────────────────────────────────

    /// Check supply conservation for every currency. Fails on the first
    /// asset whose ledger supply differs from deposits minus withdrawals.
    pub async fn audit_supply(&self) -> Result<()> {
        let audit = SupplyAudit::from_store(self.store.as_ref()).await?;
        for currency in self.store.currencies().await? {
            let supply = ledger_supply(self.store.as_ref(), &currency.symbol).await?;
            audit.verify(&currency.symbol, supply).inspect_err(|e| {
                tracing::error!(symbol = %currency.symbol, error = %e, "supply audit failed");
            })?;
        }
        Ok(())
    }

    async fn active_account(&self, user: UserId) -> Result<Account> {
        let account = self
            .store
            .account(user)
            .await?
            .ok_or(CustodexError::AccountNotFound(user))?;
        if account.suspended {
            return Err(CustodexError::AccountSuspended(user));
        }
        Ok(account)
    }

    /// Mainnet when a chain's parent asset is `symbol`, otherwise the
    /// token contract carrying it.
    async fn route(&self, symbol: &str) -> Result<Route> {
        if let Some(chain) = self.store.chain_by_symbol(symbol).await? {
            return Ok(Route {
                chain_id: chain.id,
                platform: chain.platform,
                protocol: Protocol::Mainnet,
            });
        }
        let contract = self
            .store
            .contract_by_symbol(symbol)
            .await?
            .ok_or_else(|| CustodexError::RouteNotFound(symbol.to_string()))?;
        Ok(Route {
            chain_id: contract.chain_id,
            platform: contract.platform,
            protocol: contract.protocol,
        })
    }
}
