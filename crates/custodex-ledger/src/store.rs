//! Data-access seams over the ledger tables.
//!
//! Every mutating method is one conditional statement against one row: a
//! SQL backend implements each as a single `UPDATE ... WHERE ... RETURNING`
//! (or an `INSERT ... ON CONFLICT DO NOTHING`). The exception is
//! [`TransactionStore::confirm_deposit`], which touches three tables and
//! runs as one database transaction. Callers never hold a transaction open
//! across awaits, so every method here must be atomic on its own.
//!
//! The seams are split by table group; [`LedgerStore`] is the union that
//! components take as `Arc<dyn LedgerStore>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use custodex_types::{
    Account, Balance, Chain, ChainId, Contract, Currency, MarketPair, Order, OrderId, OrderSide,
    Pair, Platform, Protocol, Reserve, ReserveKey, Result, Trade, Transaction, TransactionId,
    Transfer, TxFilter, TxStatus, UserId, Wallet,
};
use rust_decimal::Decimal;

/// `accounts`, `currencies`, `pairs`, `chains`, `contracts`, wallets.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn account(&self, user: UserId) -> Result<Option<Account>>;
    async fn upsert_account(&self, account: Account) -> Result<()>;

    async fn currency(&self, symbol: &str) -> Result<Option<Currency>>;
    async fn currencies(&self) -> Result<Vec<Currency>>;
    async fn upsert_currency(&self, currency: Currency) -> Result<()>;
    /// `fees_charges += delta`.
    async fn add_fee_charges(&self, symbol: &str, delta: Decimal) -> Result<()>;

    async fn pair(&self, market: &MarketPair) -> Result<Option<Pair>>;
    async fn pairs(&self) -> Result<Vec<Pair>>;
    async fn upsert_pair(&self, pair: Pair) -> Result<()>;
    async fn set_last_price(&self, market: &MarketPair, price: Decimal) -> Result<()>;

    /// Inserts a chain and returns it with its assigned id.
    async fn insert_chain(&self, chain: Chain) -> Result<Chain>;
    async fn chain(&self, id: ChainId) -> Result<Option<Chain>>;
    async fn enabled_chains(&self) -> Result<Vec<Chain>>;
    /// Chain whose parent asset is `symbol`.
    async fn chain_by_symbol(&self, symbol: &str) -> Result<Option<Chain>>;
    /// `block = block + 1 where id = ? and block = expected`.
    async fn advance_cursor(&self, id: ChainId, expected: u64) -> Result<bool>;

    async fn insert_contract(&self, contract: Contract) -> Result<()>;
    async fn contracts_for_chain(&self, chain: ChainId) -> Result<Vec<Contract>>;
    async fn contract_by_symbol(&self, symbol: &str) -> Result<Option<Contract>>;

    async fn upsert_wallet(&self, wallet: Wallet) -> Result<()>;
    async fn wallet(&self, user: UserId, platform: Platform) -> Result<Option<Wallet>>;
    async fn wallet_by_address(&self, platform: Platform, address: &str) -> Result<Option<Wallet>>;
}

/// `assets` (user-visible balances).
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn balance(&self, user: UserId, symbol: &str) -> Result<Decimal>;
    /// `available += amount`, creating the row when missing.
    async fn credit_balance(&self, user: UserId, symbol: &str, amount: Decimal) -> Result<()>;
    /// `available -= amount where available >= amount`. `false` when short.
    async fn debit_balance(&self, user: UserId, symbol: &str, amount: Decimal) -> Result<bool>;
    async fn balances_for_symbol(&self, symbol: &str) -> Result<Vec<Balance>>;
}

/// `orders`, `trades`, `transfers`.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts an order and returns it with its assigned insertion id.
    async fn insert_order(&self, order: Order) -> Result<Order>;
    async fn order(&self, id: OrderId) -> Result<Option<Order>>;
    /// Pending `side` orders on `market`, excluding `exclude`'s, ascending id.
    async fn resting_orders(
        &self,
        market: &MarketPair,
        side: OrderSide,
        exclude: UserId,
    ) -> Result<Vec<Order>>;
    /// Lowest pending sell (`side = Sell`) or highest pending buy price.
    async fn best_resting_price(&self, market: &MarketPair, side: OrderSide)
    -> Result<Option<Decimal>>;
    /// `remaining -= delta where status = pending and remaining >= delta`;
    /// flips to `filled` at zero. `None` when the condition fails.
    async fn fill_order(&self, id: OrderId, delta: Decimal) -> Result<Option<Order>>;
    /// Compensates a [`fill_order`](Self::fill_order) whose counterpart
    /// decrement lost a race.
    async fn restore_order(&self, id: OrderId, delta: Decimal) -> Result<()>;
    /// `status = cancelled where id = ? and user = ? and status = pending`.
    async fn cancel_order(&self, id: OrderId, user: UserId) -> Result<Option<Order>>;
    async fn orders_for_user(&self, user: UserId, market: Option<&MarketPair>)
    -> Result<Vec<Order>>;
    async fn pending_orders(&self, market: &MarketPair) -> Result<Vec<Order>>;

    async fn insert_trade(&self, trade: Trade) -> Result<Trade>;
    async fn trades(&self, market: &MarketPair) -> Result<Vec<Trade>>;
    async fn insert_transfer(&self, transfer: Transfer) -> Result<Transfer>;
    async fn transfers_for_user(&self, user: UserId) -> Result<Vec<Transfer>>;
    /// Transfers crediting `symbol`.
    async fn transfers_for_symbol(&self, symbol: &str) -> Result<Vec<Transfer>>;
}

/// `reserves`.
#[async_trait]
pub trait ReserveStore: Send + Sync {
    async fn reserve(&self, key: &ReserveKey) -> Result<Option<Reserve>>;
    /// Upsert by full key and apply the signed `delta`; fails with
    /// `BalanceUnderflow` if the result would be negative.
    async fn adjust_reserve(&self, key: &ReserveKey, delta: Decimal) -> Result<Reserve>;
    /// `locked = true where key = ? and locked = false`.
    async fn lock_reserve(&self, key: &ReserveKey) -> Result<bool>;
    async fn unlock_reserve(&self, key: &ReserveKey) -> Result<()>;
    /// Selects one unlocked reserve with `value >= min_value` and locks it
    /// in the same statement.
    async fn acquire_reserve(
        &self,
        symbol: &str,
        platform: Platform,
        protocol: Protocol,
        min_value: Decimal,
    ) -> Result<Option<Reserve>>;
    async fn reserves_for_symbol(&self, symbol: &str) -> Result<Vec<Reserve>>;
}

/// `transactions` (deposits and withdrawals).
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Idempotent on `hash`: `None` when a row with the same hash exists.
    async fn insert_transaction(&self, tx: Transaction) -> Result<Option<Transaction>>;
    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>>;
    async fn transactions(&self, filter: TxFilter) -> Result<Vec<Transaction>>;
    async fn transactions_for_user(&self, user: UserId) -> Result<Vec<Transaction>>;
    /// `status = to where id = ? and status = from`.
    async fn transition_transaction(
        &self,
        id: TransactionId,
        from: TxStatus,
        to: TxStatus,
    ) -> Result<bool>;
    async fn set_confirmations(&self, id: TransactionId, confirmations: u64) -> Result<()>;
    /// Deposit `pending → filled` at `confirmations`, crediting the owner's
    /// balance and the receiving reserve with the row's value. All or
    /// nothing; `None` when the row is no longer a pending deposit.
    async fn confirm_deposit(
        &self,
        id: TransactionId,
        confirmations: u64,
    ) -> Result<Option<Transaction>>;
    /// Deposit `pending → reserve` at `confirmations`. Nothing is credited.
    async fn hold_deposit(&self, id: TransactionId, confirmations: u64)
    -> Result<Option<Transaction>>;
    /// `pending → processing`, recording the locked reserve.
    async fn begin_dispatch(&self, id: TransactionId, reserve: &ReserveKey) -> Result<bool>;
    /// Persists the signed hash and estimated fee before broadcast:
    /// `where status = processing and reserve = ? and hash is null`.
    /// `false` means this attempt no longer owns the row and must not
    /// broadcast.
    async fn record_signed(
        &self,
        id: TransactionId,
        reserve: &ReserveKey,
        hash: &str,
        fee: Decimal,
    ) -> Result<bool>;
    /// `processing → filled` with the realized fee, `where hash = ?`.
    async fn complete_withdrawal(&self, id: TransactionId, hash: &str, fee: Decimal)
    -> Result<bool>;
    /// `processing → pending`, clearing hash and reserve.
    async fn requeue_withdrawal(&self, id: TransactionId) -> Result<bool>;
    /// `processing → pending` for a transfer the node refused,
    /// `where hash = ?`. Clears hash and reserve.
    async fn release_signed(&self, id: TransactionId, hash: &str) -> Result<bool>;
    /// `processing → failed`, `where hash = ?`. The hash is kept.
    async fn fail_withdrawal(&self, id: TransactionId, hash: &str) -> Result<bool>;
    async fn set_claim(&self, id: TransactionId) -> Result<()>;
    /// Processing withdrawals last touched before `cutoff`.
    async fn stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<Transaction>>;
}

/// The full ledger.
pub trait LedgerStore:
    ReferenceStore + BalanceStore + OrderStore + ReserveStore + TransactionStore
{
}

impl<T> LedgerStore for T where
    T: ReferenceStore + BalanceStore + OrderStore + ReserveStore + TransactionStore
{
}
