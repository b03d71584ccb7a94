//! Ledger balances and custodial reserves.
//!
//! A [`Balance`] is what a user sees and trades with. A [`Reserve`] is what
//! actually sits in one of the exchange's hot wallets. The two are
//! reconciled by the deposit and withdrawal loops, never by trading.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Platform, Protocol, UserId};

/// Type alias for asset identifiers (e.g., "ETH", "USDT", "TRX").
pub type Asset = String;

/// Available quantity for a (user, symbol) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Balance {
    pub user_id: UserId,
    pub symbol: Asset,
    pub available: Decimal,
}

impl Balance {
    /// Create a zero balance.
    #[must_use]
    pub fn zero(user_id: UserId, symbol: impl Into<Asset>) -> Self {
        Self {
            user_id,
            symbol: symbol.into(),
            available: Decimal::ZERO,
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.available.is_zero()
    }
}

/// Full key of a custodial reserve row.
///
/// Locks are scoped to this full tuple, so two addresses of one user never
/// share a lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ReserveKey {
    pub user_id: UserId,
    pub symbol: Asset,
    pub platform: Platform,
    pub protocol: Protocol,
    /// Normalized custodial address.
    pub address: String,
}

impl ReserveKey {
    #[must_use]
    pub fn new(
        user_id: UserId,
        symbol: impl Into<Asset>,
        platform: Platform,
        protocol: Protocol,
        address: &str,
    ) -> Self {
        Self {
            user_id,
            symbol: symbol.into(),
            platform,
            protocol,
            address: platform.normalize_address(address),
        }
    }

    /// The mainnet reserve of `parent_symbol` at the same custodial address.
    #[must_use]
    pub fn gas_key(&self, parent_symbol: impl Into<Asset>) -> Self {
        Self {
            user_id: self.user_id,
            symbol: parent_symbol.into(),
            platform: self.platform,
            protocol: Protocol::Mainnet,
            address: self.address.clone(),
        }
    }
}

impl fmt::Display for ReserveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}@{}",
            self.user_id, self.symbol, self.platform, self.protocol, self.address
        )
    }
}

/// Custodial balance held in one hot-wallet address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reserve {
    pub key: ReserveKey,
    pub value: Decimal,
    /// Set while a withdrawal dispatch is consuming this reserve.
    pub locked: bool,
}

impl Reserve {
    #[must_use]
    pub fn new(key: ReserveKey, value: Decimal) -> Self {
        Self {
            key,
            value,
            locked: false,
        }
    }

    /// Whether a dispatch needing `amount` may take this reserve.
    #[must_use]
    pub fn can_cover(&self, amount: Decimal) -> bool {
        !self.locked && self.value >= amount
    }
}

/// Direction of a reserve adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReserveDirection {
    Credit,
    Debit,
}

impl ReserveDirection {
    /// Signed delta for an absolute `amount`.
    #[must_use]
    pub fn signed(self, amount: Decimal) -> Decimal {
        match self {
            Self::Credit => amount,
            Self::Debit => -amount,
        }
    }
}
