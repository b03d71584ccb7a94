//! Deposit and withdrawal records.
//!
//! ```text
//! pending ──► processing ──► filled
//!    │            │  ▲
//!    │            ▼  └── (recovery sweep requeues to pending)
//!    │          failed
//!    ├──► reserve     (sub-minimum deposit, held but never credited)
//!    └──► cancelled   (withdrawal cancelled by its owner)
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ChainId, Platform, Protocol, ReserveKey, TransactionId, UserId};

/// Whether value enters or leaves custody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxDirection {
    Deposit,
    Withdraw,
}

impl std::fmt::Display for TxDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deposit => write!(f, "DEPOSIT"),
            Self::Withdraw => write!(f, "WITHDRAW"),
        }
    }
}

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Processing,
    Filled,
    Reserve,
    Cancelled,
    Failed,
}

impl TxStatus {
    /// No further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Reserve | Self::Cancelled | Self::Failed
        )
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Filled => write!(f, "FILLED"),
            Self::Reserve => write!(f, "RESERVE"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A deposit or withdrawal row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub symbol: String,
    /// On-chain hash. Always set for deposits; set for withdrawals once
    /// the transfer is signed. Unique across all rows.
    pub hash: Option<String>,
    pub value: Decimal,
    /// Realized network fee (withdrawals).
    pub fee: Decimal,
    pub confirmations: u64,
    /// Block the deposit was observed in.
    pub block: u64,
    /// Destination address (custodial for deposits, external for withdrawals).
    pub address: String,
    pub chain_id: ChainId,
    pub platform: Platform,
    pub protocol: Protocol,
    pub direction: TxDirection,
    pub status: TxStatus,
    /// A reverse gas top-up was already performed for this withdrawal.
    pub claim: bool,
    /// Reserve locked for the in-flight dispatch, if any.
    pub reserve: Option<ReserveKey>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A freshly observed deposit awaiting confirmations.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn deposit(
        user_id: UserId,
        symbol: impl Into<String>,
        hash: impl Into<String>,
        value: Decimal,
        block: u64,
        address: impl Into<String>,
        chain_id: ChainId,
        platform: Platform,
        protocol: Protocol,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::UNASSIGNED,
            user_id,
            symbol: symbol.into(),
            hash: Some(hash.into()),
            value,
            fee: Decimal::ZERO,
            confirmations: 0,
            block,
            address: address.into(),
            chain_id,
            platform,
            protocol,
            direction: TxDirection::Deposit,
            status: TxStatus::Pending,
            claim: false,
            reserve: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A withdrawal request awaiting dispatch.
    #[must_use]
    pub fn withdrawal(
        user_id: UserId,
        symbol: impl Into<String>,
        value: Decimal,
        address: impl Into<String>,
        chain_id: ChainId,
        platform: Platform,
        protocol: Protocol,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::UNASSIGNED,
            user_id,
            symbol: symbol.into(),
            hash: None,
            value,
            fee: Decimal::ZERO,
            confirmations: 0,
            block: 0,
            address: address.into(),
            chain_id,
            platform,
            protocol,
            direction: TxDirection::Withdraw,
            status: TxStatus::Pending,
            claim: false,
            reserve: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_deposit(&self) -> bool {
        self.direction == TxDirection::Deposit
    }
}

/// Filter for transaction listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxFilter {
    pub direction: TxDirection,
    pub status: TxStatus,
}

impl TxFilter {
    #[must_use]
    pub fn pending_deposits() -> Self {
        Self {
            direction: TxDirection::Deposit,
            status: TxStatus::Pending,
        }
    }

    #[must_use]
    pub fn pending_withdrawals() -> Self {
        Self {
            direction: TxDirection::Withdraw,
            status: TxStatus::Pending,
        }
    }

    #[must_use]
    pub fn processing_withdrawals() -> Self {
        Self {
            direction: TxDirection::Withdraw,
            status: TxStatus::Processing,
        }
    }

    #[must_use]
    pub fn matches(&self, tx: &Transaction) -> bool {
        tx.direction == self.direction && tx.status == self.status
    }
}
