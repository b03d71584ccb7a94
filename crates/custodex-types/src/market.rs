//! Reference data: currencies, pairs, chains, token contracts, deposit
//! wallets and accounts.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ChainId, MarketPair, UserId, constants};

/// A blockchain network family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Platform {
    /// EVM-style chains (hex addresses, case-insensitive).
    Ethereum,
    /// Tron-style chains (base58 addresses, case-sensitive).
    Tron,
}

impl Platform {
    /// Canonical form used when comparing addresses on this platform.
    #[must_use]
    pub fn normalize_address(self, address: &str) -> String {
        match self {
            Self::Ethereum => address.trim().to_ascii_lowercase(),
            Self::Tron => address.trim().to_string(),
        }
    }

    /// Whether two addresses denote the same account on this platform.
    #[must_use]
    pub fn same_address(self, a: &str, b: &str) -> bool {
        self.normalize_address(a) == self.normalize_address(b)
    }

    /// The token protocol native to this platform.
    #[must_use]
    pub fn token_protocol(self) -> Protocol {
        match self {
            Self::Ethereum => Protocol::Erc20,
            Self::Tron => Protocol::Trc20,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ethereum => write!(f, "ETHEREUM"),
            Self::Tron => write!(f, "TRON"),
        }
    }
}

/// Mainnet (the chain's own coin) vs. a token-contract protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Protocol {
    Mainnet,
    Erc20,
    Trc20,
}

impl Protocol {
    #[must_use]
    pub fn is_mainnet(self) -> bool {
        self == Self::Mainnet
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mainnet => write!(f, "MAINNET"),
            Self::Erc20 => write!(f, "ERC20"),
            Self::Trc20 => write!(f, "TRC20"),
        }
    }
}

/// Per-currency trading, deposit and fee configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Currency {
    pub symbol: String,
    pub enabled: bool,
    /// Lower bound of an order's committed notional in this currency.
    pub min_trade: Decimal,
    /// Upper bound of an order's committed notional in this currency.
    pub max_trade: Decimal,
    /// Deposits below this are held in custody but never credited.
    pub min_deposit: Decimal,
    pub min_withdraw: Decimal,
    /// Trade fee in percent of the credited amount.
    pub fees_trade: Decimal,
    /// Maker discount in percent, subtracted from `fees_trade`.
    pub fees_discount: Decimal,
    /// Flat fee withheld from token withdrawals.
    pub fees_withdraw: Decimal,
    /// Accumulated fee revenue.
    pub fees_charges: Decimal,
    /// Parent chain symbol for token currencies.
    pub marker: Option<String>,
}

impl Currency {
    /// An enabled currency with no fees and an unbounded trading range.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            enabled: true,
            min_trade: Decimal::ZERO,
            max_trade: Decimal::MAX,
            min_deposit: Decimal::ZERO,
            min_withdraw: Decimal::ZERO,
            fees_trade: Decimal::ZERO,
            fees_discount: Decimal::ZERO,
            fees_withdraw: Decimal::ZERO,
            fees_charges: Decimal::ZERO,
            marker: None,
        }
    }

    #[must_use]
    pub fn with_trade_fees(mut self, fees_trade: Decimal, fees_discount: Decimal) -> Self {
        self.fees_trade = fees_trade;
        self.fees_discount = fees_discount;
        self
    }

    #[must_use]
    pub fn with_trade_range(mut self, min: Decimal, max: Decimal) -> Self {
        self.min_trade = min;
        self.max_trade = max;
        self
    }

    #[must_use]
    pub fn with_min_deposit(mut self, min_deposit: Decimal) -> Self {
        self.min_deposit = min_deposit;
        self
    }

    #[must_use]
    pub fn with_withdraw(mut self, min_withdraw: Decimal, fees_withdraw: Decimal) -> Self {
        self.min_withdraw = min_withdraw;
        self.fees_withdraw = fees_withdraw;
        self
    }

    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    /// Whether `value` lies inside `[min_trade, max_trade]`.
    #[must_use]
    pub fn in_trade_range(&self, value: Decimal) -> bool {
        value >= self.min_trade && value <= self.max_trade
    }
}

/// A tradable pair and its last traded price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pair {
    pub market: MarketPair,
    pub enabled: bool,
    pub last_price: Option<Decimal>,
}

impl Pair {
    #[must_use]
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            market: MarketPair::new(base, quote),
            enabled: true,
            last_price: None,
        }
    }
}

/// A scanned chain. `block` is the next height to scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    pub id: ChainId,
    /// Parent (gas) asset symbol.
    pub symbol: String,
    pub platform: Platform,
    pub rpc: String,
    pub block: u64,
    /// Confirmations required before a deposit is credited.
    pub confirmations: u64,
    /// Decimals of the parent asset's smallest unit.
    pub decimals: u32,
    pub enabled: bool,
}

impl Chain {
    #[must_use]
    pub fn new(symbol: impl Into<String>, platform: Platform, block: u64) -> Self {
        Self {
            id: ChainId::UNASSIGNED,
            symbol: symbol.into(),
            platform,
            rpc: String::new(),
            block,
            confirmations: constants::DEFAULT_REQUIRED_CONFIRMATIONS,
            decimals: constants::DEFAULT_NATIVE_DECIMALS,
            enabled: true,
        }
    }
}

/// A token contract deployed on a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub symbol: String,
    pub chain_id: ChainId,
    pub platform: Platform,
    pub protocol: Protocol,
    /// Contract address emitting transfer events.
    pub address: String,
    pub decimals: u32,
    /// Parent-asset gas a transfer of this token is expected to cost.
    pub fees_gas: Decimal,
}

/// A custodial address enrolled as a user's deposit wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallet {
    pub user_id: UserId,
    pub platform: Platform,
    pub address: String,
    /// Key-derivation entropy (hex). Never leaves the ledger store.
    pub entropy: String,
}

/// A trading account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub email: String,
    pub suspended: bool,
}
