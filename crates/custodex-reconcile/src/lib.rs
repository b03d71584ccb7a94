//! # custodex-reconcile
//!
//! Background loops that keep the ledger in step with the chains:
//!
//! - [`DepositScanner`]: walks each enabled chain one block per tick and
//!   records deposits to enrolled wallets
//! - [`ConfirmationSweep`]: credits deposits once they are deep enough
//! - [`WithdrawalDispatcher`]: pays out pending withdrawals from custodial
//!   reserves, tops up token gas from fee revenue, and recovers
//!   dispatches stuck in `processing`
//! - [`Ticker`] / [`spawn_periodic`]: jittered scheduling with graceful
//!   shutdown
//!
//! Every loop is safe to run next to a second copy of itself: the store's
//! conditional statements decide who wins.

pub mod confirm;
pub mod dispatcher;
pub mod gateways;
pub mod recovery;
pub mod scan_state;
pub mod scanner;
pub mod ticker;

pub use confirm::{ConfirmationSweep, SweepReport};
pub use dispatcher::WithdrawalDispatcher;
pub use gateways::GatewayPool;
pub use recovery::RecoveryReport;
pub use scan_state::{ScanGuard, ScanState};
pub use scanner::{DepositScanner, ScanOutcome};
pub use ticker::{Ticker, spawn_periodic};
