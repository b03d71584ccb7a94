//! # custodex-settlement
//!
//! **Settlement plane**: turns one crossing pair of orders into balance
//! movements, fee revenue and an immutable trade record.
//!
//! ## Architecture
//!
//! The matching engine hands [`Settler::settle`] an incoming and a resting
//! order. The settler:
//! 1. Computes the fill from both orders' live remainders
//! 2. Decrements both atomically (with compensation on a lost race)
//! 3. Prices the fill with the pure [`fees`] calculator
//! 4. Credits buyer and seller, refunds price improvement, accrues fees
//! 5. Writes the trade and its two transfer legs
//!
//! [`SupplyAudit`] and [`ledger_supply`] check that none of this creates or
//! destroys value.

pub mod audit;
pub mod fees;
pub mod settler;

pub use audit::{SupplyAudit, ledger_supply};
pub use fees::{FillBreakdown, Leg, fee_amount, fee_rate, fill_quantity, price_fill};
pub use settler::{Settlement, Settler, unused_commitment};
