//! In-memory [`LedgerStore`](crate::LedgerStore).
//!
//! All tables sit behind one mutex and every trait method takes it exactly
//! once, so each method is atomic in the same way a single SQL statement
//! is. The lock is never held across an await.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use custodex_types::{
    Account, Balance, Chain, ChainId, Contract, CustodexError, Currency, MarketPair, Order,
    OrderId, OrderSide, OrderStatus, Pair, Platform, Protocol, Reserve, ReserveKey, Result, Trade,
    TradeId, Transaction, TransactionId, Transfer, TransferId, TxDirection, TxFilter, TxStatus,
    UserId, Wallet,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::store::{BalanceStore, OrderStore, ReferenceStore, ReserveStore, TransactionStore};

/// Next-id counters, one per sequenced table.
#[derive(Default)]
struct Sequences {
    order: u64,
    trade: u64,
    transfer: u64,
    transaction: u64,
    chain: u64,
}

fn next(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

#[derive(Default)]
struct Tables {
    accounts: HashMap<UserId, Account>,
    currencies: HashMap<String, Currency>,
    pairs: HashMap<MarketPair, Pair>,
    chains: BTreeMap<ChainId, Chain>,
    contracts: Vec<Contract>,
    wallets: HashMap<(UserId, Platform), Wallet>,
    balances: HashMap<(UserId, String), Decimal>,
    orders: BTreeMap<OrderId, Order>,
    trades: BTreeMap<TradeId, Trade>,
    transfers: BTreeMap<TransferId, Transfer>,
    reserves: BTreeMap<ReserveKey, Reserve>,
    transactions: BTreeMap<TransactionId, Transaction>,
    /// Unique index on `transactions.hash`.
    hashes: HashMap<String, TransactionId>,
    seq: Sequences,
}

/// Ledger tables held in process memory.
#[derive(Default)]
pub struct MemoryLedger {
    tables: Mutex<Tables>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReferenceStore for MemoryLedger {
    async fn account(&self, user: UserId) -> Result<Option<Account>> {
        Ok(self.tables.lock().accounts.get(&user).cloned())
    }

    async fn upsert_account(&self, account: Account) -> Result<()> {
        self.tables.lock().accounts.insert(account.user_id, account);
        Ok(())
    }

    async fn currency(&self, symbol: &str) -> Result<Option<Currency>> {
        Ok(self.tables.lock().currencies.get(symbol).cloned())
    }

    async fn currencies(&self) -> Result<Vec<Currency>> {
        let mut all: Vec<Currency> = self.tables.lock().currencies.values().cloned().collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(all)
    }

    async fn upsert_currency(&self, currency: Currency) -> Result<()> {
        self.tables
            .lock()
            .currencies
            .insert(currency.symbol.clone(), currency);
        Ok(())
    }

    async fn add_fee_charges(&self, symbol: &str, delta: Decimal) -> Result<()> {
        let mut t = self.tables.lock();
        let currency = t
            .currencies
            .get_mut(symbol)
            .ok_or_else(|| CustodexError::CurrencyNotFound(symbol.to_string()))?;
        currency.fees_charges += delta;
        Ok(())
    }

    async fn pair(&self, market: &MarketPair) -> Result<Option<Pair>> {
        Ok(self.tables.lock().pairs.get(market).cloned())
    }

    async fn pairs(&self) -> Result<Vec<Pair>> {
        let mut all: Vec<Pair> = self.tables.lock().pairs.values().cloned().collect();
        all.sort_by(|a, b| a.market.cmp(&b.market));
        Ok(all)
    }

    async fn upsert_pair(&self, pair: Pair) -> Result<()> {
        self.tables.lock().pairs.insert(pair.market.clone(), pair);
        Ok(())
    }

    async fn set_last_price(&self, market: &MarketPair, price: Decimal) -> Result<()> {
        let mut t = self.tables.lock();
        let pair = t
            .pairs
            .get_mut(market)
            .ok_or_else(|| CustodexError::PairNotFound(market.symbol()))?;
        pair.last_price = Some(price);
        Ok(())
    }

    async fn insert_chain(&self, mut chain: Chain) -> Result<Chain> {
        let mut t = self.tables.lock();
        chain.id = ChainId(next(&mut t.seq.chain));
        t.chains.insert(chain.id, chain.clone());
        Ok(chain)
    }

    async fn chain(&self, id: ChainId) -> Result<Option<Chain>> {
        Ok(self.tables.lock().chains.get(&id).cloned())
    }

    async fn enabled_chains(&self) -> Result<Vec<Chain>> {
        Ok(self
            .tables
            .lock()
            .chains
            .values()
            .filter(|c| c.enabled)
            .cloned()
            .collect())
    }

    async fn chain_by_symbol(&self, symbol: &str) -> Result<Option<Chain>> {
        Ok(self
            .tables
            .lock()
            .chains
            .values()
            .find(|c| c.symbol == symbol)
            .cloned())
    }

    async fn advance_cursor(&self, id: ChainId, expected: u64) -> Result<bool> {
        let mut t = self.tables.lock();
        match t.chains.get_mut(&id) {
            Some(chain) if chain.block == expected => {
                chain.block += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_contract(&self, contract: Contract) -> Result<()> {
        self.tables.lock().contracts.push(contract);
        Ok(())
    }

    async fn contracts_for_chain(&self, chain: ChainId) -> Result<Vec<Contract>> {
        Ok(self
            .tables
            .lock()
            .contracts
            .iter()
            .filter(|c| c.chain_id == chain)
            .cloned()
            .collect())
    }

    async fn contract_by_symbol(&self, symbol: &str) -> Result<Option<Contract>> {
        Ok(self
            .tables
            .lock()
            .contracts
            .iter()
            .find(|c| c.symbol == symbol)
            .cloned())
    }

    async fn upsert_wallet(&self, wallet: Wallet) -> Result<()> {
        self.tables
            .lock()
            .wallets
            .insert((wallet.user_id, wallet.platform), wallet);
        Ok(())
    }

    async fn wallet(&self, user: UserId, platform: Platform) -> Result<Option<Wallet>> {
        Ok(self.tables.lock().wallets.get(&(user, platform)).cloned())
    }

    async fn wallet_by_address(&self, platform: Platform, address: &str) -> Result<Option<Wallet>> {
        Ok(self
            .tables
            .lock()
            .wallets
            .values()
            .find(|w| w.platform == platform && platform.same_address(&w.address, address))
            .cloned())
    }
}

#[async_trait]
impl BalanceStore for MemoryLedger {
    async fn balance(&self, user: UserId, symbol: &str) -> Result<Decimal> {
        Ok(self
            .tables
            .lock()
            .balances
            .get(&(user, symbol.to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn credit_balance(&self, user: UserId, symbol: &str, amount: Decimal) -> Result<()> {
        *self
            .tables
            .lock()
            .balances
            .entry((user, symbol.to_string()))
            .or_insert(Decimal::ZERO) += amount;
        Ok(())
    }

    async fn debit_balance(&self, user: UserId, symbol: &str, amount: Decimal) -> Result<bool> {
        let mut t = self.tables.lock();
        match t.balances.get_mut(&(user, symbol.to_string())) {
            Some(available) if *available >= amount => {
                *available -= amount;
                Ok(true)
            }
            None if amount.is_zero() => Ok(true),
            _ => Ok(false),
        }
    }

    async fn balances_for_symbol(&self, symbol: &str) -> Result<Vec<Balance>> {
        Ok(self
            .tables
            .lock()
            .balances
            .iter()
            .filter(|((_, s), _)| s == symbol)
            .map(|((user, s), available)| Balance {
                user_id: *user,
                symbol: s.clone(),
                available: *available,
            })
            .collect())
    }
}

#[async_trait]
impl OrderStore for MemoryLedger {
    async fn insert_order(&self, mut order: Order) -> Result<Order> {
        let mut t = self.tables.lock();
        order.id = OrderId(next(&mut t.seq.order));
        t.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.lock().orders.get(&id).cloned())
    }

    async fn resting_orders(
        &self,
        market: &MarketPair,
        side: OrderSide,
        exclude: UserId,
    ) -> Result<Vec<Order>> {
        // BTreeMap iteration is ascending id == insertion order.
        Ok(self
            .tables
            .lock()
            .orders
            .values()
            .filter(|o| {
                o.is_pending() && o.side == side && o.user_id != exclude && &o.market == market
            })
            .cloned()
            .collect())
    }

    async fn best_resting_price(
        &self,
        market: &MarketPair,
        side: OrderSide,
    ) -> Result<Option<Decimal>> {
        let t = self.tables.lock();
        let prices = t
            .orders
            .values()
            .filter(|o| o.is_pending() && o.side == side && &o.market == market)
            .map(|o| o.price);
        Ok(match side {
            OrderSide::Sell => prices.min(),
            OrderSide::Buy => prices.max(),
        })
    }

    async fn fill_order(&self, id: OrderId, delta: Decimal) -> Result<Option<Order>> {
        let mut t = self.tables.lock();
        let Some(order) = t.orders.get_mut(&id) else {
            return Ok(None);
        };
        if !order.is_pending() || order.remaining < delta {
            return Ok(None);
        }
        order.remaining -= delta;
        if order.is_filled() {
            order.status = OrderStatus::Filled;
        }
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn restore_order(&self, id: OrderId, delta: Decimal) -> Result<()> {
        let mut t = self.tables.lock();
        let order = t.orders.get_mut(&id).ok_or(CustodexError::OrderNotFound(id))?;
        order.remaining += delta;
        if order.status == OrderStatus::Filled && !order.remaining.is_zero() {
            order.status = OrderStatus::Pending;
        }
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn cancel_order(&self, id: OrderId, user: UserId) -> Result<Option<Order>> {
        let mut t = self.tables.lock();
        match t.orders.get_mut(&id) {
            Some(order) if order.user_id == user && order.is_pending() => {
                order.status = OrderStatus::Cancelled;
                order.updated_at = Utc::now();
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn orders_for_user(
        &self,
        user: UserId,
        market: Option<&MarketPair>,
    ) -> Result<Vec<Order>> {
        Ok(self
            .tables
            .lock()
            .orders
            .values()
            .filter(|o| o.user_id == user && market.is_none_or(|m| &o.market == m))
            .cloned()
            .collect())
    }

    async fn pending_orders(&self, market: &MarketPair) -> Result<Vec<Order>> {
        Ok(self
            .tables
            .lock()
            .orders
            .values()
            .filter(|o| o.is_pending() && &o.market == market)
            .cloned()
            .collect())
    }

    async fn insert_trade(&self, mut trade: Trade) -> Result<Trade> {
        let mut t = self.tables.lock();
        trade.id = TradeId(next(&mut t.seq.trade));
        t.trades.insert(trade.id, trade.clone());
        Ok(trade)
    }

    async fn trades(&self, market: &MarketPair) -> Result<Vec<Trade>> {
        Ok(self
            .tables
            .lock()
            .trades
            .values()
            .filter(|tr| &tr.market == market)
            .cloned()
            .collect())
    }

    async fn insert_transfer(&self, mut transfer: Transfer) -> Result<Transfer> {
        let mut t = self.tables.lock();
        transfer.id = TransferId(next(&mut t.seq.transfer));
        t.transfers.insert(transfer.id, transfer.clone());
        Ok(transfer)
    }

    async fn transfers_for_user(&self, user: UserId) -> Result<Vec<Transfer>> {
        Ok(self
            .tables
            .lock()
            .transfers
            .values()
            .filter(|tr| tr.user_id == user)
            .cloned()
            .collect())
    }

    async fn transfers_for_symbol(&self, symbol: &str) -> Result<Vec<Transfer>> {
        Ok(self
            .tables
            .lock()
            .transfers
            .values()
            .filter(|tr| tr.symbol == symbol)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReserveStore for MemoryLedger {
    async fn reserve(&self, key: &ReserveKey) -> Result<Option<Reserve>> {
        Ok(self.tables.lock().reserves.get(key).cloned())
    }

    async fn adjust_reserve(&self, key: &ReserveKey, delta: Decimal) -> Result<Reserve> {
        let mut t = self.tables.lock();
        let current = t.reserves.get(key).map_or(Decimal::ZERO, |r| r.value);
        let value = current + delta;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(CustodexError::BalanceUnderflow);
        }
        let reserve = t
            .reserves
            .entry(key.clone())
            .or_insert_with(|| Reserve::new(key.clone(), Decimal::ZERO));
        reserve.value = value;
        Ok(reserve.clone())
    }

    async fn lock_reserve(&self, key: &ReserveKey) -> Result<bool> {
        let mut t = self.tables.lock();
        match t.reserves.get_mut(key) {
            Some(reserve) if !reserve.locked => {
                reserve.locked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn unlock_reserve(&self, key: &ReserveKey) -> Result<()> {
        if let Some(reserve) = self.tables.lock().reserves.get_mut(key) {
            reserve.locked = false;
        }
        Ok(())
    }

    async fn acquire_reserve(
        &self,
        symbol: &str,
        platform: Platform,
        protocol: Protocol,
        min_value: Decimal,
    ) -> Result<Option<Reserve>> {
        let mut t = self.tables.lock();
        let candidate = t.reserves.values_mut().find(|r| {
            r.key.symbol == symbol
                && r.key.platform == platform
                && r.key.protocol == protocol
                && r.can_cover(min_value)
        });
        Ok(candidate.map(|reserve| {
            reserve.locked = true;
            reserve.clone()
        }))
    }

    async fn reserves_for_symbol(&self, symbol: &str) -> Result<Vec<Reserve>> {
        Ok(self
            .tables
            .lock()
            .reserves
            .values()
            .filter(|r| r.key.symbol == symbol)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TransactionStore for MemoryLedger {
    async fn insert_transaction(&self, mut tx: Transaction) -> Result<Option<Transaction>> {
        let mut t = self.tables.lock();
        if let Some(hash) = &tx.hash {
            if t.hashes.contains_key(hash) {
                return Ok(None);
            }
        }
        tx.id = TransactionId(next(&mut t.seq.transaction));
        if let Some(hash) = &tx.hash {
            t.hashes.insert(hash.clone(), tx.id);
        }
        t.transactions.insert(tx.id, tx.clone());
        Ok(Some(tx))
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.tables.lock().transactions.get(&id).cloned())
    }

    async fn transactions(&self, filter: TxFilter) -> Result<Vec<Transaction>> {
        Ok(self
            .tables
            .lock()
            .transactions
            .values()
            .filter(|tx| filter.matches(tx))
            .cloned()
            .collect())
    }

    async fn transactions_for_user(&self, user: UserId) -> Result<Vec<Transaction>> {
        Ok(self
            .tables
            .lock()
            .transactions
            .values()
            .filter(|tx| tx.user_id == user)
            .cloned()
            .collect())
    }

    async fn transition_transaction(
        &self,
        id: TransactionId,
        from: TxStatus,
        to: TxStatus,
    ) -> Result<bool> {
        let mut t = self.tables.lock();
        match t.transactions.get_mut(&id) {
            Some(tx) if tx.status == from => {
                tx.status = to;
                tx.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_confirmations(&self, id: TransactionId, confirmations: u64) -> Result<()> {
        let mut t = self.tables.lock();
        let tx = t
            .transactions
            .get_mut(&id)
            .ok_or(CustodexError::TransactionNotFound(id))?;
        tx.confirmations = confirmations;
        tx.updated_at = Utc::now();
        Ok(())
    }

    async fn confirm_deposit(
        &self,
        id: TransactionId,
        confirmations: u64,
    ) -> Result<Option<Transaction>> {
        let mut guard = self.tables.lock();
        let t = &mut *guard;
        let Some(tx) = t.transactions.get_mut(&id) else {
            return Ok(None);
        };
        if tx.status != TxStatus::Pending || tx.direction != TxDirection::Deposit {
            return Ok(None);
        }
        let key = ReserveKey::new(tx.user_id, &tx.symbol, tx.platform, tx.protocol, &tx.address);
        tx.status = TxStatus::Filled;
        tx.confirmations = confirmations;
        tx.updated_at = Utc::now();
        *t.balances
            .entry((tx.user_id, tx.symbol.clone()))
            .or_insert(Decimal::ZERO) += tx.value;
        t.reserves
            .entry(key.clone())
            .or_insert_with(|| Reserve::new(key, Decimal::ZERO))
            .value += tx.value;
        Ok(Some(tx.clone()))
    }

    async fn hold_deposit(
        &self,
        id: TransactionId,
        confirmations: u64,
    ) -> Result<Option<Transaction>> {
        let mut t = self.tables.lock();
        match t.transactions.get_mut(&id) {
            Some(tx) if tx.status == TxStatus::Pending && tx.direction == TxDirection::Deposit => {
                tx.status = TxStatus::Reserve;
                tx.confirmations = confirmations;
                tx.updated_at = Utc::now();
                Ok(Some(tx.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn begin_dispatch(&self, id: TransactionId, reserve: &ReserveKey) -> Result<bool> {
        let mut t = self.tables.lock();
        match t.transactions.get_mut(&id) {
            Some(tx) if tx.status == TxStatus::Pending => {
                tx.status = TxStatus::Processing;
                tx.reserve = Some(reserve.clone());
                tx.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_signed(
        &self,
        id: TransactionId,
        reserve: &ReserveKey,
        hash: &str,
        fee: Decimal,
    ) -> Result<bool> {
        let mut t = self.tables.lock();
        if t.hashes.get(hash).is_some_and(|owner| *owner != id) {
            return Err(CustodexError::Storage(format!(
                "hash {hash} already recorded on another transaction"
            )));
        }
        let tx = t
            .transactions
            .get_mut(&id)
            .ok_or(CustodexError::TransactionNotFound(id))?;
        if tx.status != TxStatus::Processing
            || tx.reserve.as_ref() != Some(reserve)
            || tx.hash.is_some()
        {
            return Ok(false);
        }
        tx.hash = Some(hash.to_string());
        tx.fee = fee;
        tx.updated_at = Utc::now();
        t.hashes.insert(hash.to_string(), id);
        Ok(true)
    }

    async fn complete_withdrawal(
        &self,
        id: TransactionId,
        hash: &str,
        fee: Decimal,
    ) -> Result<bool> {
        let mut t = self.tables.lock();
        match t.transactions.get_mut(&id) {
            Some(tx) if tx.status == TxStatus::Processing && tx.hash.as_deref() == Some(hash) => {
                tx.status = TxStatus::Filled;
                tx.fee = fee;
                tx.reserve = None;
                tx.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn requeue_withdrawal(&self, id: TransactionId) -> Result<bool> {
        let mut t = self.tables.lock();
        let cleared = match t.transactions.get_mut(&id) {
            Some(tx) if tx.status == TxStatus::Processing => {
                tx.status = TxStatus::Pending;
                tx.reserve = None;
                tx.fee = Decimal::ZERO;
                tx.updated_at = Utc::now();
                Some(tx.hash.take())
            }
            _ => None,
        };
        match cleared {
            Some(hash) => {
                if let Some(hash) = hash {
                    t.hashes.remove(&hash);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release_signed(&self, id: TransactionId, hash: &str) -> Result<bool> {
        let mut t = self.tables.lock();
        let released = match t.transactions.get_mut(&id) {
            Some(tx) if tx.status == TxStatus::Processing && tx.hash.as_deref() == Some(hash) => {
                tx.status = TxStatus::Pending;
                tx.hash = None;
                tx.reserve = None;
                tx.fee = Decimal::ZERO;
                tx.updated_at = Utc::now();
                true
            }
            _ => false,
        };
        if released {
            t.hashes.remove(hash);
        }
        Ok(released)
    }

    async fn fail_withdrawal(&self, id: TransactionId, hash: &str) -> Result<bool> {
        let mut t = self.tables.lock();
        match t.transactions.get_mut(&id) {
            Some(tx) if tx.status == TxStatus::Processing && tx.hash.as_deref() == Some(hash) => {
                tx.status = TxStatus::Failed;
                tx.reserve = None;
                tx.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_claim(&self, id: TransactionId) -> Result<()> {
        let mut t = self.tables.lock();
        let tx = t
            .transactions
            .get_mut(&id)
            .ok_or(CustodexError::TransactionNotFound(id))?;
        tx.claim = true;
        tx.updated_at = Utc::now();
        Ok(())
    }

    async fn stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<Transaction>> {
        Ok(self
            .tables
            .lock()
            .transactions
            .values()
            .filter(|tx| {
                tx.direction == TxDirection::Withdraw
                    && tx.status == TxStatus::Processing
                    && tx.updated_at <= cutoff
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth_key(user: UserId, address: &str) -> ReserveKey {
        ReserveKey::new(user, "ETH", Platform::Ethereum, Protocol::Mainnet, address)
    }

    #[tokio::test]
    async fn debit_is_conditional() {
        let ledger = MemoryLedger::new();
        let user = UserId::new();
        ledger.credit_balance(user, "USD", Decimal::new(100, 0)).await.unwrap();

        assert!(!ledger.debit_balance(user, "USD", Decimal::new(101, 0)).await.unwrap());
        assert_eq!(ledger.balance(user, "USD").await.unwrap(), Decimal::new(100, 0));

        assert!(ledger.debit_balance(user, "USD", Decimal::new(100, 0)).await.unwrap());
        assert_eq!(ledger.balance(user, "USD").await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn order_ids_ascend_and_fill_is_guarded() {
        let ledger = MemoryLedger::new();
        let a = ledger
            .insert_order(Order::dummy_limit(OrderSide::Sell, Decimal::ONE, Decimal::new(4, 0)))
            .await
            .unwrap();
        let b = ledger
            .insert_order(Order::dummy_limit(OrderSide::Sell, Decimal::ONE, Decimal::new(4, 0)))
            .await
            .unwrap();
        assert!(a.id < b.id);

        assert!(ledger.fill_order(a.id, Decimal::new(5, 0)).await.unwrap().is_none());
        let filled = ledger.fill_order(a.id, Decimal::new(4, 0)).await.unwrap().unwrap();
        assert_eq!(filled.status, OrderStatus::Filled);
        assert!(ledger.fill_order(a.id, Decimal::ZERO).await.unwrap().is_none());

        ledger.restore_order(a.id, Decimal::ONE).await.unwrap();
        let restored = ledger.order(a.id).await.unwrap().unwrap();
        assert_eq!(restored.status, OrderStatus::Pending);
        assert_eq!(restored.remaining, Decimal::ONE);
    }

    #[tokio::test]
    async fn duplicate_hash_is_a_no_op() {
        let ledger = MemoryLedger::new();
        let tx = Transaction::deposit(
            UserId::new(),
            "ETH",
            "0xhash",
            Decimal::ONE,
            5,
            "0xabc",
            ChainId(1),
            Platform::Ethereum,
            Protocol::Mainnet,
        );
        assert!(ledger.insert_transaction(tx.clone()).await.unwrap().is_some());
        assert!(ledger.insert_transaction(tx).await.unwrap().is_none());
        assert_eq!(
            ledger
                .transactions(TxFilter::pending_deposits())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn confirmed_deposit_credits_balance_and_reserve_once() {
        let ledger = MemoryLedger::new();
        let user = UserId::new();
        let deposit = ledger
            .insert_transaction(Transaction::deposit(
                user,
                "ETH",
                "0xdeposit",
                Decimal::new(15, 1),
                5,
                "0xAbC",
                ChainId(1),
                Platform::Ethereum,
                Protocol::Mainnet,
            ))
            .await
            .unwrap()
            .unwrap();

        let row = ledger.confirm_deposit(deposit.id, 3).await.unwrap().unwrap();
        assert_eq!(row.status, TxStatus::Filled);
        assert_eq!(row.confirmations, 3);
        assert_eq!(ledger.balance(user, "ETH").await.unwrap(), Decimal::new(15, 1));
        let reserve = ledger.reserve(&eth_key(user, "0xabc")).await.unwrap().unwrap();
        assert_eq!(reserve.value, Decimal::new(15, 1));

        assert!(ledger.confirm_deposit(deposit.id, 4).await.unwrap().is_none());
        assert!(ledger.hold_deposit(deposit.id, 4).await.unwrap().is_none());
        assert_eq!(ledger.balance(user, "ETH").await.unwrap(), Decimal::new(15, 1));

        // Withdrawals are never credited this way.
        let id = withdrawal(&ledger).await;
        assert!(ledger.confirm_deposit(id, 3).await.unwrap().is_none());
        assert_eq!(ledger.transaction(id).await.unwrap().unwrap().status, TxStatus::Pending);
    }

    async fn withdrawal(ledger: &MemoryLedger) -> TransactionId {
        ledger
            .insert_transaction(Transaction::withdrawal(
                UserId::new(),
                "ETH",
                Decimal::ONE,
                "0xdef",
                ChainId(1),
                Platform::Ethereum,
                Protocol::Mainnet,
            ))
            .await
            .unwrap()
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn signed_hash_is_recorded_only_by_the_owning_attempt() {
        let ledger = MemoryLedger::new();
        let key = eth_key(UserId::new(), "0xabc");
        let id = withdrawal(&ledger).await;

        // Not claimed yet.
        assert!(!ledger.record_signed(id, &key, "0xearly", Decimal::ONE).await.unwrap());

        // Claimed, then requeued by recovery before the attempt signed.
        assert!(ledger.begin_dispatch(id, &key).await.unwrap());
        assert!(ledger.requeue_withdrawal(id).await.unwrap());
        assert!(!ledger.record_signed(id, &key, "0xstale", Decimal::ONE).await.unwrap());
        let row = ledger.transaction(id).await.unwrap().unwrap();
        assert_eq!(row.status, TxStatus::Pending);
        assert!(row.hash.is_none());

        // Reclaimed: the first attempt to record wins, any later one is refused.
        assert!(ledger.begin_dispatch(id, &key).await.unwrap());
        assert!(ledger.record_signed(id, &key, "0xfresh", Decimal::ONE).await.unwrap());
        assert!(!ledger.record_signed(id, &key, "0xstale", Decimal::ONE).await.unwrap());
        let other = eth_key(UserId::new(), "0x123");
        assert!(!ledger.record_signed(id, &other, "0xother", Decimal::ONE).await.unwrap());

        assert!(!ledger.complete_withdrawal(id, "0xstale", Decimal::ONE).await.unwrap());
        assert!(ledger.complete_withdrawal(id, "0xfresh", Decimal::ONE).await.unwrap());
        let row = ledger.transaction(id).await.unwrap().unwrap();
        assert_eq!(row.status, TxStatus::Filled);
        assert_eq!(row.hash.as_deref(), Some("0xfresh"));
    }

    #[tokio::test]
    async fn refused_transfer_is_released_and_unknown_one_can_fail() {
        let ledger = MemoryLedger::new();
        let key = eth_key(UserId::new(), "0xabc");

        let refused = withdrawal(&ledger).await;
        assert!(ledger.begin_dispatch(refused, &key).await.unwrap());
        assert!(ledger.record_signed(refused, &key, "0xr1", Decimal::ONE).await.unwrap());
        assert!(!ledger.release_signed(refused, "0xother").await.unwrap());
        assert!(ledger.release_signed(refused, "0xr1").await.unwrap());
        let row = ledger.transaction(refused).await.unwrap().unwrap();
        assert_eq!(row.status, TxStatus::Pending);
        assert!(row.hash.is_none() && row.reserve.is_none());
        // The hash is free again.
        assert!(ledger.begin_dispatch(refused, &key).await.unwrap());
        assert!(ledger.record_signed(refused, &key, "0xr1", Decimal::ONE).await.unwrap());

        let lost = withdrawal(&ledger).await;
        assert!(ledger.begin_dispatch(lost, &key).await.unwrap());
        assert!(ledger.record_signed(lost, &key, "0xl1", Decimal::ONE).await.unwrap());
        assert!(ledger.fail_withdrawal(lost, "0xl1").await.unwrap());
        assert!(!ledger.fail_withdrawal(lost, "0xl1").await.unwrap());
        let row = ledger.transaction(lost).await.unwrap().unwrap();
        assert_eq!(row.status, TxStatus::Failed);
        assert_eq!(row.hash.as_deref(), Some("0xl1"));
    }

    #[tokio::test]
    async fn reserve_lock_is_exclusive_per_full_key() {
        let ledger = MemoryLedger::new();
        let user = UserId::new();
        let first = eth_key(user, "0xaaa");
        let second = eth_key(user, "0xbbb");
        ledger.adjust_reserve(&first, Decimal::TEN).await.unwrap();
        ledger.adjust_reserve(&second, Decimal::TEN).await.unwrap();

        assert!(ledger.lock_reserve(&first).await.unwrap());
        assert!(!ledger.lock_reserve(&first).await.unwrap());
        // Same user/symbol/platform/protocol, different address: independent lock.
        assert!(ledger.lock_reserve(&second).await.unwrap());

        ledger.unlock_reserve(&first).await.unwrap();
        assert!(ledger.lock_reserve(&first).await.unwrap());
    }

    #[tokio::test]
    async fn acquire_skips_locked_and_small_reserves() {
        let ledger = MemoryLedger::new();
        let small = eth_key(UserId::new(), "0x01");
        let big = eth_key(UserId::new(), "0x02");
        ledger.adjust_reserve(&small, Decimal::ONE).await.unwrap();
        ledger.adjust_reserve(&big, Decimal::TEN).await.unwrap();

        let got = ledger
            .acquire_reserve("ETH", Platform::Ethereum, Protocol::Mainnet, Decimal::new(5, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.key, big);
        assert!(got.locked);
        assert!(
            ledger
                .acquire_reserve("ETH", Platform::Ethereum, Protocol::Mainnet, Decimal::new(5, 0))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn reserve_cannot_go_negative() {
        let ledger = MemoryLedger::new();
        let key = eth_key(UserId::new(), "0x01");
        ledger.adjust_reserve(&key, Decimal::ONE).await.unwrap();
        let err = ledger.adjust_reserve(&key, -Decimal::TEN).await.unwrap_err();
        assert!(matches!(err, CustodexError::BalanceUnderflow));
        assert_eq!(ledger.reserve(&key).await.unwrap().unwrap().value, Decimal::ONE);
    }

    #[tokio::test]
    async fn cursor_advances_only_from_expected_height() {
        let ledger = MemoryLedger::new();
        let chain = ledger
            .insert_chain(Chain::new("ETH", Platform::Ethereum, 100))
            .await
            .unwrap();
        assert!(ledger.advance_cursor(chain.id, 100).await.unwrap());
        assert!(!ledger.advance_cursor(chain.id, 100).await.unwrap());
        assert_eq!(ledger.chain(chain.id).await.unwrap().unwrap().block, 101);
    }
}
