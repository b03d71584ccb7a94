//! # custodex-chain
//!
//! Seams to everything outside the ledger: chain RPC nodes, key
//! derivation, outbound mail and client notifications.
//!
//! - [`gateway`]: typed [`ChainGateway`] / [`GatewayDialer`], plus the
//!   [`Keypair`] and [`Mailer`] collaborators
//! - [`decode`]: `Transfer` log decoding and smallest-unit scaling
//! - [`notify`]: [`BroadcastNotifier`], a tokio broadcast fan-out
//! - `testing` (feature `test-helpers`): scripted doubles

pub mod decode;
pub mod gateway;
pub mod notify;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use decode::{TokenTransfer, decode_amount, decode_transfer_log, scale_amount, topic_address};
pub use gateway::{
    Block, ChainGateway, ChainTransaction, DerivedKey, GatewayDialer, Keypair, Log, Mailer,
    SignedTransfer, TransferIntent, TxOutcome,
};
pub use notify::BroadcastNotifier;
