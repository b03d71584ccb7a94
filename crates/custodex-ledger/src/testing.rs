//! A ledger double that fails chosen calls.
//!
//! [`FailingLedger`] wraps a [`MemoryLedger`] and delegates every method.
//! A call armed with [`FailingLedger::fail_next`] returns a storage error
//! instead of running, once per arming, so callers can be checked for what
//! they leave behind when the store goes away mid-operation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use custodex_types::{
    Account, Balance, Chain, ChainId, Contract, Currency, CustodexError, MarketPair, Order,
    OrderId, OrderSide, Pair, Platform, Protocol, Reserve, ReserveKey, Result, Trade, Transaction,
    TransactionId, Transfer, TxFilter, TxStatus, UserId, Wallet,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::MemoryLedger;
use crate::store::{BalanceStore, OrderStore, ReferenceStore, ReserveStore, TransactionStore};

/// [`MemoryLedger`] with armed failures, keyed by method name.
#[derive(Default)]
pub struct FailingLedger {
    inner: MemoryLedger,
    armed: Mutex<HashMap<&'static str, usize>>,
}

impl FailingLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call to `method`. Arming twice fails two calls.
    pub fn fail_next(&self, method: &'static str) {
        *self.armed.lock().entry(method).or_default() += 1;
    }

    /// The wrapped ledger, for assertions that must not trip an armed call.
    #[must_use]
    pub fn inner(&self) -> &MemoryLedger {
        &self.inner
    }

    fn trip(&self, method: &'static str) -> Result<()> {
        let mut armed = self.armed.lock();
        match armed.get_mut(method) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(CustodexError::Storage(format!("{method}: injected failure")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ReferenceStore for FailingLedger {
    async fn account(&self, user: UserId) -> Result<Option<Account>> {
        self.trip("account")?;
        self.inner.account(user).await
    }

    async fn upsert_account(&self, account: Account) -> Result<()> {
        self.trip("upsert_account")?;
        self.inner.upsert_account(account).await
    }

    async fn currency(&self, symbol: &str) -> Result<Option<Currency>> {
        self.trip("currency")?;
        self.inner.currency(symbol).await
    }

    async fn currencies(&self) -> Result<Vec<Currency>> {
        self.trip("currencies")?;
        self.inner.currencies().await
    }

    async fn upsert_currency(&self, currency: Currency) -> Result<()> {
        self.trip("upsert_currency")?;
        self.inner.upsert_currency(currency).await
    }

    async fn add_fee_charges(&self, symbol: &str, delta: Decimal) -> Result<()> {
        self.trip("add_fee_charges")?;
        self.inner.add_fee_charges(symbol, delta).await
    }

    async fn pair(&self, market: &MarketPair) -> Result<Option<Pair>> {
        self.trip("pair")?;
        self.inner.pair(market).await
    }

    async fn pairs(&self) -> Result<Vec<Pair>> {
        self.trip("pairs")?;
        self.inner.pairs().await
    }

    async fn upsert_pair(&self, pair: Pair) -> Result<()> {
        self.trip("upsert_pair")?;
        self.inner.upsert_pair(pair).await
    }

    async fn set_last_price(&self, market: &MarketPair, price: Decimal) -> Result<()> {
        self.trip("set_last_price")?;
        self.inner.set_last_price(market, price).await
    }

    async fn insert_chain(&self, chain: Chain) -> Result<Chain> {
        self.trip("insert_chain")?;
        self.inner.insert_chain(chain).await
    }

    async fn chain(&self, id: ChainId) -> Result<Option<Chain>> {
        self.trip("chain")?;
        self.inner.chain(id).await
    }

    async fn enabled_chains(&self) -> Result<Vec<Chain>> {
        self.trip("enabled_chains")?;
        self.inner.enabled_chains().await
    }

    async fn chain_by_symbol(&self, symbol: &str) -> Result<Option<Chain>> {
        self.trip("chain_by_symbol")?;
        self.inner.chain_by_symbol(symbol).await
    }

    async fn advance_cursor(&self, id: ChainId, expected: u64) -> Result<bool> {
        self.trip("advance_cursor")?;
        self.inner.advance_cursor(id, expected).await
    }

    async fn insert_contract(&self, contract: Contract) -> Result<()> {
        self.trip("insert_contract")?;
        self.inner.insert_contract(contract).await
    }

    async fn contracts_for_chain(&self, chain: ChainId) -> Result<Vec<Contract>> {
        self.trip("contracts_for_chain")?;
        self.inner.contracts_for_chain(chain).await
    }

    async fn contract_by_symbol(&self, symbol: &str) -> Result<Option<Contract>> {
        self.trip("contract_by_symbol")?;
        self.inner.contract_by_symbol(symbol).await
    }

    async fn upsert_wallet(&self, wallet: Wallet) -> Result<()> {
        self.trip("upsert_wallet")?;
        self.inner.upsert_wallet(wallet).await
    }

    async fn wallet(&self, user: UserId, platform: Platform) -> Result<Option<Wallet>> {
        self.trip("wallet")?;
        self.inner.wallet(user, platform).await
    }

    async fn wallet_by_address(&self, platform: Platform, address: &str) -> Result<Option<Wallet>> {
        self.trip("wallet_by_address")?;
        self.inner.wallet_by_address(platform, address).await
    }
}

#[async_trait]
impl BalanceStore for FailingLedger {
    async fn balance(&self, user: UserId, symbol: &str) -> Result<Decimal> {
        self.trip("balance")?;
        self.inner.balance(user, symbol).await
    }

    async fn credit_balance(&self, user: UserId, symbol: &str, amount: Decimal) -> Result<()> {
        self.trip("credit_balance")?;
        self.inner.credit_balance(user, symbol, amount).await
    }

    async fn debit_balance(&self, user: UserId, symbol: &str, amount: Decimal) -> Result<bool> {
        self.trip("debit_balance")?;
        self.inner.debit_balance(user, symbol, amount).await
    }

    async fn balances_for_symbol(&self, symbol: &str) -> Result<Vec<Balance>> {
        self.trip("balances_for_symbol")?;
        self.inner.balances_for_symbol(symbol).await
    }
}

#[async_trait]
impl OrderStore for FailingLedger {
    async fn insert_order(&self, order: Order) -> Result<Order> {
        self.trip("insert_order")?;
        self.inner.insert_order(order).await
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        self.trip("order")?;
        self.inner.order(id).await
    }

    async fn resting_orders(
        &self,
        market: &MarketPair,
        side: OrderSide,
        exclude: UserId,
    ) -> Result<Vec<Order>> {
        self.trip("resting_orders")?;
        self.inner.resting_orders(market, side, exclude).await
    }

    async fn best_resting_price(
        &self,
        market: &MarketPair,
        side: OrderSide,
    ) -> Result<Option<Decimal>> {
        self.trip("best_resting_price")?;
        self.inner.best_resting_price(market, side).await
    }

    async fn fill_order(&self, id: OrderId, delta: Decimal) -> Result<Option<Order>> {
        self.trip("fill_order")?;
        self.inner.fill_order(id, delta).await
    }

    async fn restore_order(&self, id: OrderId, delta: Decimal) -> Result<()> {
        self.trip("restore_order")?;
        self.inner.restore_order(id, delta).await
    }

    async fn cancel_order(&self, id: OrderId, user: UserId) -> Result<Option<Order>> {
        self.trip("cancel_order")?;
        self.inner.cancel_order(id, user).await
    }

    async fn orders_for_user(
        &self,
        user: UserId,
        market: Option<&MarketPair>,
    ) -> Result<Vec<Order>> {
        self.trip("orders_for_user")?;
        self.inner.orders_for_user(user, market).await
    }

    async fn pending_orders(&self, market: &MarketPair) -> Result<Vec<Order>> {
        self.trip("pending_orders")?;
        self.inner.pending_orders(market).await
    }

    async fn insert_trade(&self, trade: Trade) -> Result<Trade> {
        self.trip("insert_trade")?;
        self.inner.insert_trade(trade).await
    }

    async fn trades(&self, market: &MarketPair) -> Result<Vec<Trade>> {
        self.trip("trades")?;
        self.inner.trades(market).await
    }

    async fn insert_transfer(&self, transfer: Transfer) -> Result<Transfer> {
        self.trip("insert_transfer")?;
        self.inner.insert_transfer(transfer).await
    }

    async fn transfers_for_user(&self, user: UserId) -> Result<Vec<Transfer>> {
        self.trip("transfers_for_user")?;
        self.inner.transfers_for_user(user).await
    }

    async fn transfers_for_symbol(&self, symbol: &str) -> Result<Vec<Transfer>> {
        self.trip("transfers_for_symbol")?;
        self.inner.transfers_for_symbol(symbol).await
    }
}

#[async_trait]
impl ReserveStore for FailingLedger {
    async fn reserve(&self, key: &ReserveKey) -> Result<Option<Reserve>> {
        self.trip("reserve")?;
        self.inner.reserve(key).await
    }

    async fn adjust_reserve(&self, key: &ReserveKey, delta: Decimal) -> Result<Reserve> {
        self.trip("adjust_reserve")?;
        self.inner.adjust_reserve(key, delta).await
    }

    async fn lock_reserve(&self, key: &ReserveKey) -> Result<bool> {
        self.trip("lock_reserve")?;
        self.inner.lock_reserve(key).await
    }

    async fn unlock_reserve(&self, key: &ReserveKey) -> Result<()> {
        self.trip("unlock_reserve")?;
        self.inner.unlock_reserve(key).await
    }

    async fn acquire_reserve(
        &self,
        symbol: &str,
        platform: Platform,
        protocol: Protocol,
        min_value: Decimal,
    ) -> Result<Option<Reserve>> {
        self.trip("acquire_reserve")?;
        self.inner
            .acquire_reserve(symbol, platform, protocol, min_value)
            .await
    }

    async fn reserves_for_symbol(&self, symbol: &str) -> Result<Vec<Reserve>> {
        self.trip("reserves_for_symbol")?;
        self.inner.reserves_for_symbol(symbol).await
    }
}

#[async_trait]
impl TransactionStore for FailingLedger {
    async fn insert_transaction(&self, tx: Transaction) -> Result<Option<Transaction>> {
        self.trip("insert_transaction")?;
        self.inner.insert_transaction(tx).await
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.trip("transaction")?;
        self.inner.transaction(id).await
    }

    async fn transactions(&self, filter: TxFilter) -> Result<Vec<Transaction>> {
        self.trip("transactions")?;
        self.inner.transactions(filter).await
    }

    async fn transactions_for_user(&self, user: UserId) -> Result<Vec<Transaction>> {
        self.trip("transactions_for_user")?;
        self.inner.transactions_for_user(user).await
    }

    async fn transition_transaction(
        &self,
        id: TransactionId,
        from: TxStatus,
        to: TxStatus,
    ) -> Result<bool> {
        self.trip("transition_transaction")?;
        self.inner.transition_transaction(id, from, to).await
    }

    async fn set_confirmations(&self, id: TransactionId, confirmations: u64) -> Result<()> {
        self.trip("set_confirmations")?;
        self.inner.set_confirmations(id, confirmations).await
    }

    async fn confirm_deposit(
        &self,
        id: TransactionId,
        confirmations: u64,
    ) -> Result<Option<Transaction>> {
        self.trip("confirm_deposit")?;
        self.inner.confirm_deposit(id, confirmations).await
    }

    async fn hold_deposit(
        &self,
        id: TransactionId,
        confirmations: u64,
    ) -> Result<Option<Transaction>> {
        self.trip("hold_deposit")?;
        self.inner.hold_deposit(id, confirmations).await
    }

    async fn begin_dispatch(&self, id: TransactionId, reserve: &ReserveKey) -> Result<bool> {
        self.trip("begin_dispatch")?;
        self.inner.begin_dispatch(id, reserve).await
    }

    async fn record_signed(
        &self,
        id: TransactionId,
        reserve: &ReserveKey,
        hash: &str,
        fee: Decimal,
    ) -> Result<bool> {
        self.trip("record_signed")?;
        self.inner.record_signed(id, reserve, hash, fee).await
    }

    async fn complete_withdrawal(
        &self,
        id: TransactionId,
        hash: &str,
        fee: Decimal,
    ) -> Result<bool> {
        self.trip("complete_withdrawal")?;
        self.inner.complete_withdrawal(id, hash, fee).await
    }

    async fn requeue_withdrawal(&self, id: TransactionId) -> Result<bool> {
        self.trip("requeue_withdrawal")?;
        self.inner.requeue_withdrawal(id).await
    }

    async fn release_signed(&self, id: TransactionId, hash: &str) -> Result<bool> {
        self.trip("release_signed")?;
        self.inner.release_signed(id, hash).await
    }

    async fn fail_withdrawal(&self, id: TransactionId, hash: &str) -> Result<bool> {
        self.trip("fail_withdrawal")?;
        self.inner.fail_withdrawal(id, hash).await
    }

    async fn set_claim(&self, id: TransactionId) -> Result<()> {
        self.trip("set_claim")?;
        self.inner.set_claim(id).await
    }

    async fn stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<Transaction>> {
        self.trip("stale_processing")?;
        self.inner.stale_processing(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn armed_call_fails_once_and_touches_nothing() {
        let ledger = FailingLedger::new();
        let user = UserId::new();
        ledger.fail_next("credit_balance");

        let err = ledger
            .credit_balance(user, "ETH", Decimal::ONE)
            .await
            .unwrap_err();
        assert!(matches!(err, CustodexError::Storage(_)));
        assert_eq!(ledger.balance(user, "ETH").await.unwrap(), Decimal::ZERO);

        ledger.credit_balance(user, "ETH", Decimal::ONE).await.unwrap();
        assert_eq!(ledger.inner().balance(user, "ETH").await.unwrap(), Decimal::ONE);
    }
}
