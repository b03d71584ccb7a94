//! Reserve accounting and dispatch locks.
//!
//! A reserve is locked while a withdrawal dispatch (or an insurance top-up)
//! is spending from it. Locks are keyed by the full [`ReserveKey`], so two
//! custodial addresses of the same user never block each other, and
//! [`ReserveManager::acquire`] selects and locks in one store statement so
//! two dispatchers can never pick the same row.

use std::sync::Arc;

use custodex_types::{
    CustodexError, Platform, Protocol, Reserve, ReserveDirection, ReserveKey, Result, UserId,
};
use rust_decimal::Decimal;

use crate::store::LedgerStore;

/// Adjusts, locks and acquires custodial reserves.
#[derive(Clone)]
pub struct ReserveManager {
    store: Arc<dyn LedgerStore>,
}

impl ReserveManager {
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Upsert the reserve at `(user, symbol, platform, protocol, address)`
    /// and apply `amount` in `direction`. A debit below zero fails with
    /// [`CustodexError::BalanceUnderflow`] and changes nothing.
    #[allow(clippy::too_many_arguments)]
    pub async fn adjust(
        &self,
        user: UserId,
        address: &str,
        symbol: &str,
        amount: Decimal,
        platform: Platform,
        protocol: Protocol,
        direction: ReserveDirection,
    ) -> Result<Reserve> {
        let key = ReserveKey::new(user, symbol, platform, protocol, address);
        self.adjust_key(&key, amount, direction).await
    }

    /// [`adjust`](Self::adjust) for an already-built key.
    pub async fn adjust_key(
        &self,
        key: &ReserveKey,
        amount: Decimal,
        direction: ReserveDirection,
    ) -> Result<Reserve> {
        let reserve = self
            .store
            .adjust_reserve(key, direction.signed(amount))
            .await
            .inspect_err(|e| {
                tracing::warn!(reserve = %key, %amount, ?direction, error = %e, "reserve adjustment rejected");
            })?;
        tracing::debug!(reserve = %key, %amount, ?direction, value = %reserve.value, "reserve adjusted");
        Ok(reserve)
    }

    /// Lock `key`, failing with [`CustodexError::ReserveLocked`] when it is
    /// already held.
    pub async fn lock(&self, key: &ReserveKey) -> Result<()> {
        if self.store.lock_reserve(key).await? {
            tracing::debug!(reserve = %key, "reserve locked");
            Ok(())
        } else {
            Err(CustodexError::ReserveLocked(key.to_string()))
        }
    }

    pub async fn unlock(&self, key: &ReserveKey) -> Result<()> {
        self.store.unlock_reserve(key).await?;
        tracing::debug!(reserve = %key, "reserve unlocked");
        Ok(())
    }

    /// Select one unlocked `symbol/platform/protocol` reserve holding at
    /// least `min_value` and lock it atomically.
    pub async fn acquire(
        &self,
        symbol: &str,
        platform: Platform,
        protocol: Protocol,
        min_value: Decimal,
    ) -> Result<Option<Reserve>> {
        let acquired = self
            .store
            .acquire_reserve(symbol, platform, protocol, min_value)
            .await?;
        if let Some(reserve) = &acquired {
            tracing::debug!(reserve = %reserve.key, value = %reserve.value, %min_value, "reserve acquired");
        }
        Ok(acquired)
    }

    pub async fn get(&self, key: &ReserveKey) -> Result<Option<Reserve>> {
        self.store.reserve(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryLedger;

    fn manager() -> ReserveManager {
        ReserveManager::new(Arc::new(MemoryLedger::new()))
    }

    #[tokio::test]
    async fn adjust_credits_then_debits() {
        let reserves = manager();
        let user = UserId::new();
        reserves
            .adjust(user, "0xABC", "ETH", Decimal::TEN, Platform::Ethereum, Protocol::Mainnet, ReserveDirection::Credit)
            .await
            .unwrap();
        let after = reserves
            .adjust(user, "0xabc", "ETH", Decimal::new(4, 0), Platform::Ethereum, Protocol::Mainnet, ReserveDirection::Debit)
            .await
            .unwrap();
        // Address case differences land on the same row.
        assert_eq!(after.value, Decimal::new(6, 0));
    }

    #[tokio::test]
    async fn overdraw_is_rejected() {
        let reserves = manager();
        let err = reserves
            .adjust(UserId::new(), "0x01", "ETH", Decimal::ONE, Platform::Ethereum, Protocol::Mainnet, ReserveDirection::Debit)
            .await
            .unwrap_err();
        assert!(matches!(err, CustodexError::BalanceUnderflow));
    }

    #[tokio::test]
    async fn second_lock_reports_reserve_locked() {
        let reserves = manager();
        let key = ReserveKey::new(UserId::new(), "ETH", Platform::Ethereum, Protocol::Mainnet, "0x01");
        reserves.adjust_key(&key, Decimal::ONE, ReserveDirection::Credit).await.unwrap();

        reserves.lock(&key).await.unwrap();
        let err = reserves.lock(&key).await.unwrap_err();
        assert!(matches!(err, CustodexError::ReserveLocked(_)));

        reserves.unlock(&key).await.unwrap();
        reserves.lock(&key).await.unwrap();
    }
}
