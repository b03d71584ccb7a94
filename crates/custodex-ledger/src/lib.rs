//! # custodex-ledger
//!
//! **Ledger plane**: the relational state every other component reads and
//! mutates, plus the reserve/lock manager built on top of it.
//!
//! ## Architecture
//!
//! - [`store`]: async seams split by table group ([`ReferenceStore`],
//!   [`BalanceStore`], [`OrderStore`], [`ReserveStore`],
//!   [`TransactionStore`]) and their union [`LedgerStore`]. Each mutating
//!   method is a single conditional statement, so correctness never depends
//!   on a transaction spanning an await.
//! - [`memory`]: [`MemoryLedger`], an in-process implementation with the
//!   same per-statement atomicity a SQL backend provides.
//! - [`reserve`]: [`ReserveManager`] for reserve adjustment, full-key
//!   locking and atomic acquisition.
//! - `testing` (feature `test-helpers`): `FailingLedger`, a store double
//!   that fails armed calls.

pub mod memory;
pub mod reserve;
pub mod store;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use memory::MemoryLedger;
pub use reserve::ReserveManager;
pub use store::{
    BalanceStore, LedgerStore, OrderStore, ReferenceStore, ReserveStore, TransactionStore,
};
