//! # custodex-matchcore
//!
//! **Matching plane**: order placement, FIFO matching and cancellation over
//! the ledger store.
//!
//! ```text
//! place_order(NewOrder) -> Order
//!   validate → debit commitment → persist → FIFO walk → settle per cross
//! ```
//!
//! Market orders are priced at placement by [`pricing::discover_price`] and
//! then behave exactly like limit orders at that price.

pub mod engine;
pub mod pricing;

pub use engine::MatchingEngine;
pub use pricing::discover_price;
