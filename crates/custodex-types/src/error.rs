//! Error types for the Custodex settlement core.
//!
//! All errors use the `CX_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order errors
//! - 2xx: Balance errors
//! - 3xx: Market / account errors
//! - 4xx: Transaction / chain errors
//! - 5xx: Reserve errors
//! - 6xx: Settlement errors
//! - 7xx: Chain gateway errors
//! - 9xx: General / internal errors
//!
//! [`CustodexError::code`] exposes the numeric identifier that RPC-facing
//! layers hand back to callers alongside the message.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{ChainId, OrderId, Platform, TransactionId, UserId};

/// Central error enum for all Custodex operations.
#[derive(Debug, Error)]
pub enum CustodexError {
    // =================================================================
    // Order Errors (1xx)
    // =================================================================
    /// The requested order was not found.
    #[error("CX_ERR_100: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order failed validation (missing fields, bad values, etc.).
    #[error("CX_ERR_101: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// The order is not pending or belongs to another user.
    #[error("CX_ERR_102: Order cannot be cancelled: {0}")]
    OrderNotCancellable(OrderId),

    /// A market order found neither a last price nor a resting order.
    #[error("CX_ERR_103: No market price available for {market}")]
    NoMarketPrice { market: String },

    // =================================================================
    // Balance Errors (2xx)
    // =================================================================
    /// Not enough available balance to perform the operation.
    #[error("CX_ERR_200: Insufficient available balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// A balance or reserve operation would produce a negative value.
    #[error("CX_ERR_201: Balance underflow")]
    BalanceUnderflow,

    /// The notional value falls outside the currency's trading range.
    #[error("CX_ERR_202: Value {value} {symbol} outside trading range [{min}, {max}]")]
    OutOfRange {
        symbol: String,
        value: Decimal,
        min: Decimal,
        max: Decimal,
    },

    // =================================================================
    // Market / Account Errors (3xx)
    // =================================================================
    /// Unknown currency symbol.
    #[error("CX_ERR_300: Currency not found: {0}")]
    CurrencyNotFound(String),

    /// The currency exists but is disabled.
    #[error("CX_ERR_301: Currency disabled: {0}")]
    CurrencyDisabled(String),

    /// Unknown trading pair.
    #[error("CX_ERR_302: Pair not found: {0}")]
    PairNotFound(String),

    /// The trading pair exists but is disabled.
    #[error("CX_ERR_303: Pair disabled: {0}")]
    PairDisabled(String),

    /// Unknown account.
    #[error("CX_ERR_304: Account not found: {0}")]
    AccountNotFound(UserId),

    /// The account is suspended and may not trade or withdraw.
    #[error("CX_ERR_305: Account suspended: {0}")]
    AccountSuspended(UserId),

    // =================================================================
    // Transaction / Chain Errors (4xx)
    // =================================================================
    /// Unknown deposit / withdrawal transaction.
    #[error("CX_ERR_400: Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// The transaction is no longer pending or belongs to another user.
    #[error("CX_ERR_401: Transaction cannot be cancelled: {0}")]
    TransactionNotCancellable(TransactionId),

    /// Unknown chain.
    #[error("CX_ERR_402: Chain not found: {0}")]
    ChainNotFound(ChainId),

    /// No chain or contract carries this symbol.
    #[error("CX_ERR_403: No chain or contract for symbol {0}")]
    RouteNotFound(String),

    /// The destination address is malformed for the platform.
    #[error("CX_ERR_404: Invalid {platform} address: {address}")]
    InvalidAddress { platform: Platform, address: String },

    /// The user has no enrolled wallet on this platform.
    #[error("CX_ERR_405: No wallet for user {user} on {platform}")]
    WalletNotFound { user: UserId, platform: Platform },

    /// The one-time security code is missing, wrong or expired.
    #[error("CX_ERR_406: Invalid or expired security code")]
    InvalidSecurityCode,

    /// An on-chain amount could not be decoded into a ledger value.
    #[error("CX_ERR_407: Amount decode failed: {reason}")]
    AmountDecode { reason: String },

    /// The withdrawal amount is below the minimum or does not cover the fee.
    #[error("CX_ERR_408: Invalid withdrawal amount: {reason}")]
    InvalidWithdrawal { reason: String },

    // =================================================================
    // Reserve Errors (5xx)
    // =================================================================
    /// No reserve row exists for the key.
    #[error("CX_ERR_500: Reserve not found: {0}")]
    ReserveNotFound(String),

    /// The reserve is already locked by another dispatch.
    #[error("CX_ERR_501: Reserve locked: {0}")]
    ReserveLocked(String),

    // =================================================================
    // Settlement Errors (6xx)
    // =================================================================
    /// Settlement of a trade failed.
    #[error("CX_ERR_600: Settlement failed: {reason}")]
    SettlementFailed { reason: String },

    /// Supply conservation invariant violated; critical safety alert.
    #[error("CX_ERR_601: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // Chain Gateway Errors (7xx)
    // =================================================================
    /// The RPC node could not be reached or returned an error.
    #[error("CX_ERR_700: Gateway error: {reason}")]
    Gateway { reason: String },

    /// The requested block does not exist yet.
    #[error("CX_ERR_701: Block {0} not available yet")]
    BlockNotAvailable(u64),

    /// Building or signing the transfer failed.
    #[error("CX_ERR_702: Signing failed: {reason}")]
    Signing { reason: String },

    /// The node rejected the signed transfer.
    #[error("CX_ERR_703: Broadcast failed: {reason}")]
    Broadcast { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("CX_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("CX_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("CX_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("CX_ERR_903: I/O error: {0}")]
    Io(String),

    /// The ledger store rejected or failed a statement.
    #[error("CX_ERR_904: Storage error: {0}")]
    Storage(String),
}

impl CustodexError {
    /// Numeric identifier surfaced to RPC callers.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::OrderNotFound(_) => 100,
            Self::InvalidOrder { .. } => 101,
            Self::OrderNotCancellable(_) => 102,
            Self::NoMarketPrice { .. } => 103,
            Self::InsufficientBalance { .. } => 200,
            Self::BalanceUnderflow => 201,
            Self::OutOfRange { .. } => 202,
            Self::CurrencyNotFound(_) => 300,
            Self::CurrencyDisabled(_) => 301,
            Self::PairNotFound(_) => 302,
            Self::PairDisabled(_) => 303,
            Self::AccountNotFound(_) => 304,
            Self::AccountSuspended(_) => 305,
            Self::TransactionNotFound(_) => 400,
            Self::TransactionNotCancellable(_) => 401,
            Self::ChainNotFound(_) => 402,
            Self::RouteNotFound(_) => 403,
            Self::InvalidAddress { .. } => 404,
            Self::WalletNotFound { .. } => 405,
            Self::InvalidSecurityCode => 406,
            Self::AmountDecode { .. } => 407,
            Self::InvalidWithdrawal { .. } => 408,
            Self::ReserveNotFound(_) => 500,
            Self::ReserveLocked(_) => 501,
            Self::SettlementFailed { .. } => 600,
            Self::SupplyInvariantViolation { .. } => 601,
            Self::Gateway { .. } => 700,
            Self::BlockNotAvailable(_) => 701,
            Self::Signing { .. } => 702,
            Self::Broadcast { .. } => 703,
            Self::Internal(_) => 900,
            Self::Serialization(_) => 901,
            Self::Configuration(_) => 902,
            Self::Io(_) => 903,
            Self::Storage(_) => 904,
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, CustodexError>;

impl From<std::io::Error> for CustodexError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CustodexError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
