//! # custodex-service
//!
//! The caller-facing surface of the settlement core and the process
//! wiring around it.
//!
//! - [`ExchangeService`]: order placement and queries, OHLC graphs,
//!   deposit addresses, security codes, withdrawal requests and the
//!   supply audit
//! - [`Runtime`]: starts the four reconciliation loops and stops them on
//!   [`RuntimeHandle::shutdown`]
//! - [`init_logging`]: `tracing-subscriber` setup from [`LoggingConfig`]
//!
//! [`LoggingConfig`]: custodex_types::LoggingConfig

pub mod codes;
pub mod graph;
pub mod logging;
pub mod runtime;
pub mod service;

pub use codes::SecurityCodes;
pub use graph::{Candle, candles};
pub use logging::init_logging;
pub use runtime::{Collaborators, Runtime, RuntimeHandle};
pub use service::{ExchangeService, WithdrawalRequest};
