//! Concurrency tests for reserve locking and balance debits.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use custodex_ledger::{BalanceStore, LedgerStore, MemoryLedger, ReserveManager};
use custodex_types::{Platform, Protocol, ReserveDirection, ReserveKey, UserId};
use rust_decimal::Decimal;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn only_one_contender_wins_a_lock() {
    let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new());
    let reserves = ReserveManager::new(store);
    let key = ReserveKey::new(UserId::new(), "ETH", Platform::Ethereum, Protocol::Mainnet, "0xaa");
    reserves
        .adjust_key(&key, Decimal::TEN, ReserveDirection::Credit)
        .await
        .unwrap();

    let winners = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..32 {
        let reserves = reserves.clone();
        let key = key.clone();
        let winners = Arc::clone(&winners);
        handles.push(tokio::spawn(async move {
            if reserves.lock(&key).await.is_ok() {
                winners.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(winners.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquire_never_hands_out_the_same_reserve() {
    let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new());
    let reserves = ReserveManager::new(store);
    for i in 0..4 {
        reserves
            .adjust(
                UserId::new(),
                &format!("0x{i:02}"),
                "ETH",
                Decimal::TEN,
                Platform::Ethereum,
                Protocol::Mainnet,
                ReserveDirection::Credit,
            )
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..16 {
        let reserves = reserves.clone();
        handles.push(tokio::spawn(async move {
            reserves
                .acquire("ETH", Platform::Ethereum, Protocol::Mainnet, Decimal::ONE)
                .await
                .unwrap()
        }));
    }
    let mut acquired = Vec::new();
    for h in handles {
        if let Some(r) = h.await.unwrap() {
            acquired.push(r.key);
        }
    }
    assert_eq!(acquired.len(), 4);
    acquired.sort();
    acquired.dedup();
    assert_eq!(acquired.len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_debits_never_overdraw() {
    let ledger = Arc::new(MemoryLedger::new());
    let user = UserId::new();
    ledger.credit_balance(user, "USD", Decimal::new(100, 0)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..50 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            ledger.debit_balance(user, "USD", Decimal::new(7, 0)).await.unwrap()
        }));
    }
    let mut successes = 0;
    for h in handles {
        if h.await.unwrap() {
            successes += 1;
        }
    }
    assert_eq!(successes, 14);
    assert_eq!(ledger.balance(user, "USD").await.unwrap(), Decimal::new(2, 0));
}
