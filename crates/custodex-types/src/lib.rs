//! # custodex-types
//!
//! Shared types, errors, and configuration for the **Custodex** settlement
//! core.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`TradeId`], [`TransferId`], [`TransactionId`], [`ChainId`], [`UserId`], [`MarketPair`]
//! - **Order model**: [`Order`], [`NewOrder`], [`OrderSide`], [`OrderType`], [`OrderStatus`]
//! - **Trade model**: [`Trade`], [`Transfer`]
//! - **Ledger model**: [`Balance`], [`Reserve`], [`ReserveKey`], [`ReserveDirection`]
//! - **Chain model**: [`Transaction`], [`TxDirection`], [`TxStatus`]
//! - **Market model**: [`Currency`], [`Pair`], [`Chain`], [`Contract`], [`Wallet`], [`Account`], [`Platform`], [`Protocol`]
//! - **Configuration**: [`ExchangeConfig`], [`DepositConfig`], [`WithdrawConfig`], [`LoggingConfig`]
//! - **Notifications**: [`Event`], [`Notifier`]
//! - **Errors**: [`CustodexError`] with `CX_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod balance;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod market;
pub mod order;
pub mod trade;
pub mod transaction;

// Re-export all primary types at crate root for ergonomic imports:
//   use custodex_types::{Order, OrderSide, Trade, Reserve, ...};

pub use balance::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use market::*;
pub use order::*;
pub use trade::*;
pub use transaction::*;

// Constants are accessed via `custodex_types::constants::FOO`
// (not re-exported to avoid name collisions).
