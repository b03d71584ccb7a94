//! Service operations and the full runtime over in-memory collaborators.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use custodex_chain::testing::{HashKeypair, Mail, RecordingMailer, ScriptedDialer, ScriptedGateway};
use custodex_chain::{Block, BroadcastNotifier, ChainTransaction, Keypair};
use custodex_ledger::{
    BalanceStore, LedgerStore, MemoryLedger, ReferenceStore, ReserveStore, TransactionStore,
};
use custodex_service::{Collaborators, ExchangeService, Runtime, WithdrawalRequest};
use custodex_types::{
    Account, Chain, Contract, Currency, CustodexError, ExchangeConfig, MarketPair, NewOrder,
    OrderSide, Pair, Platform, Protocol, ReserveKey, Transaction, TransactionId, TxStatus, UserId,
};
use rust_decimal::Decimal;

const RPC: &str = "mem://eth";
const DEST: &str = "0xABABABABABABABABABABABABABABABABABABABAB";

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn eth_usd() -> MarketPair {
    MarketPair::new("ETH", "USD")
}

struct Harness {
    store: Arc<MemoryLedger>,
    gateway: Arc<ScriptedGateway>,
    mailer: Arc<RecordingMailer>,
    deps: Collaborators,
    config: ExchangeConfig,
    service: ExchangeService,
    chain: Chain,
    alice: UserId,
    bob: UserId,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(MemoryLedger::new());
        let mut chain = Chain::new("ETH", Platform::Ethereum, 100);
        chain.rpc = RPC.to_string();
        chain.confirmations = 1;
        let chain = store.insert_chain(chain).await.unwrap();
        store
            .upsert_currency(Currency::new("ETH").with_withdraw(d("0.01"), Decimal::ZERO))
            .await
            .unwrap();
        store.upsert_currency(Currency::new("USD")).await.unwrap();
        store
            .upsert_currency(
                Currency::new("USDT")
                    .with_withdraw(d("0.5"), d("1"))
                    .with_marker("ETH"),
            )
            .await
            .unwrap();
        store
            .insert_contract(Contract {
                symbol: "USDT".into(),
                chain_id: chain.id,
                platform: Platform::Ethereum,
                protocol: Protocol::Erc20,
                address: "0xdac17f958d2ee523a2206206994597c13d831ec7".into(),
                decimals: 6,
                fees_gas: d("0.002"),
            })
            .await
            .unwrap();
        store.upsert_pair(Pair::new("ETH", "USD")).await.unwrap();

        let (alice, bob) = (UserId::new(), UserId::new());
        for (user, email) in [(alice, "alice@example.com"), (bob, "bob@example.com")] {
            store
                .upsert_account(Account {
                    user_id: user,
                    email: email.into(),
                    suspended: false,
                })
                .await
                .unwrap();
        }

        let gateway = Arc::new(ScriptedGateway::new().with_fee(d("0.001")));
        let dialer = ScriptedDialer::new();
        dialer.register(RPC, Arc::clone(&gateway));
        let mailer = Arc::new(RecordingMailer::default());
        let ledger: Arc<dyn LedgerStore> = store.clone();
        let deps = Collaborators {
            store: ledger,
            dialer: Arc::new(dialer),
            keypair: Arc::new(HashKeypair),
            mailer: mailer.clone(),
            notifier: Arc::new(BroadcastNotifier::with_capacity(256)),
        };

        let mut config = ExchangeConfig::default();
        config.withdraw.passphrase = "pass".into();
        config.deposit.scan_interval_ms = 10;
        config.deposit.sweep_interval_ms = 10;
        config.deposit.jitter_ms = 0;
        config.withdraw.interval_ms = 10;
        config.withdraw.recovery_interval_ms = 50;
        config.withdraw.jitter_ms = 0;

        let service = ExchangeService::new(&deps, &config);
        Self {
            store,
            gateway,
            mailer,
            deps,
            config,
            service,
            chain,
            alice,
            bob,
        }
    }

    /// Book a confirmed deposit the way the confirmation sweep would.
    async fn fund(&self, user: UserId, symbol: &str, value: &str) -> TransactionId {
        let tx = self
            .store
            .insert_transaction(Transaction::deposit(
                user,
                symbol,
                format!("0xfund-{user}-{symbol}-{value}"),
                d(value),
                1,
                "0x0000000000000000000000000000000000000001",
                self.chain.id,
                Platform::Ethereum,
                Protocol::Mainnet,
            ))
            .await
            .unwrap()
            .unwrap();
        self.store
            .transition_transaction(tx.id, TxStatus::Pending, TxStatus::Filled)
            .await
            .unwrap();
        self.store.credit_balance(user, symbol, d(value)).await.unwrap();
        tx.id
    }

    async fn balance(&self, user: UserId, symbol: &str) -> Decimal {
        self.store.balance(user, symbol).await.unwrap()
    }

    /// Issue a code and read it back out of the mailbox.
    async fn code(&self, user: UserId) -> String {
        self.service.issue_security_code(user).await.unwrap();
        match self.mailer.sent().last() {
            Some(Mail::SecurityCode { code, .. }) => code.clone(),
            other => panic!("expected a security code mail, got {other:?}"),
        }
    }

    fn withdrawal(&self, user: UserId, symbol: &str, value: &str, code: &str) -> WithdrawalRequest {
        WithdrawalRequest {
            user_id: user,
            symbol: symbol.into(),
            value: d(value),
            address: DEST.into(),
            code: code.into(),
        }
    }
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn withdrawal_needs_a_fresh_single_use_code() {
    let h = Harness::new().await;
    h.fund(h.alice, "ETH", "5").await;

    let code = h.code(h.alice).await;
    assert_eq!(code.len(), 6);
    let wrong = if code == "123456" { "654321" } else { "123456" };
    let err = h
        .service
        .request_withdrawal(h.withdrawal(h.alice, "ETH", "2", wrong))
        .await
        .unwrap_err();
    assert!(matches!(err, CustodexError::InvalidSecurityCode));
    assert_eq!(h.balance(h.alice, "ETH").await, d("5"));

    let code = h.code(h.alice).await;
    let tx = h
        .service
        .request_withdrawal(h.withdrawal(h.alice, "ETH", "2", &code))
        .await
        .unwrap();
    assert_eq!(tx.status, TxStatus::Pending);
    assert_eq!(tx.protocol, Protocol::Mainnet);
    assert_eq!(tx.address, DEST.to_ascii_lowercase());
    assert!(tx.hash.is_none());
    assert_eq!(h.balance(h.alice, "ETH").await, d("3"));

    let err = h
        .service
        .request_withdrawal(h.withdrawal(h.alice, "ETH", "1", &code))
        .await
        .unwrap_err();
    assert!(matches!(err, CustodexError::InvalidSecurityCode));
    assert_eq!(h.balance(h.alice, "ETH").await, d("3"));
}

#[tokio::test]
async fn invalid_withdrawals_change_nothing() {
    let h = Harness::new().await;
    h.fund(h.alice, "ETH", "5").await;
    h.fund(h.alice, "USDT", "100").await;

    let cases: Vec<(WithdrawalRequest, u16)> = vec![
        (h.withdrawal(h.alice, "ETH", "0.001", "000000"), 408),
        (h.withdrawal(h.alice, "USDT", "1", "000000"), 408),
        (h.withdrawal(h.alice, "DOGE", "1", "000000"), 300),
        (h.withdrawal(h.alice, "USD", "1", "000000"), 403),
        (
            WithdrawalRequest {
                address: "0xnope".into(),
                ..h.withdrawal(h.alice, "ETH", "1", "000000")
            },
            404,
        ),
    ];
    for (req, code) in cases {
        let err = h.service.request_withdrawal(req).await.unwrap_err();
        assert_eq!(err.code(), code, "{err}");
    }

    let code = h.code(h.alice).await;
    let err = h
        .service
        .request_withdrawal(h.withdrawal(h.alice, "ETH", "50", &code))
        .await
        .unwrap_err();
    match err {
        CustodexError::InsufficientBalance { needed, available } => {
            assert_eq!(needed, d("50"));
            assert_eq!(available, d("5"));
        }
        other => panic!("unexpected {other}"),
    }

    assert_eq!(h.balance(h.alice, "ETH").await, d("5"));
    assert_eq!(h.balance(h.alice, "USDT").await, d("100"));
    let withdrawals = h
        .service
        .transactions(h.alice)
        .await
        .unwrap()
        .into_iter()
        .filter(|t| !t.is_deposit())
        .count();
    assert_eq!(withdrawals, 0);
    h.service.audit_supply().await.unwrap();
}

#[tokio::test]
async fn token_withdrawal_routes_through_its_contract() {
    let h = Harness::new().await;
    h.fund(h.alice, "USDT", "100").await;
    let code = h.code(h.alice).await;
    let tx = h
        .service
        .request_withdrawal(h.withdrawal(h.alice, "USDT", "25", &code))
        .await
        .unwrap();
    assert_eq!(tx.protocol, Protocol::Erc20);
    assert_eq!(tx.chain_id, h.chain.id);
    assert_eq!(h.balance(h.alice, "USDT").await, d("75"));
}

#[tokio::test]
async fn pending_withdrawal_can_be_cancelled_once_by_its_owner() {
    let h = Harness::new().await;
    let deposit = h.fund(h.alice, "ETH", "5").await;
    let code = h.code(h.alice).await;
    let tx = h
        .service
        .request_withdrawal(h.withdrawal(h.alice, "ETH", "2", &code))
        .await
        .unwrap();

    let err = h.service.cancel_withdrawal(h.bob, tx.id).await.unwrap_err();
    assert!(matches!(err, CustodexError::TransactionNotCancellable(_)));

    let cancelled = h.service.cancel_withdrawal(h.alice, tx.id).await.unwrap();
    assert_eq!(cancelled.status, TxStatus::Cancelled);
    assert_eq!(h.balance(h.alice, "ETH").await, d("5"));

    let err = h.service.cancel_withdrawal(h.alice, tx.id).await.unwrap_err();
    assert!(matches!(err, CustodexError::TransactionNotCancellable(_)));
    let err = h.service.cancel_withdrawal(h.alice, deposit).await.unwrap_err();
    assert!(matches!(err, CustodexError::TransactionNotCancellable(_)));
    let err = h
        .service
        .cancel_withdrawal(h.alice, TransactionId(9_999))
        .await
        .unwrap_err();
    assert!(matches!(err, CustodexError::TransactionNotFound(_)));

    h.service.audit_supply().await.unwrap();
}

#[tokio::test]
async fn asset_address_is_enrolled_once() {
    let h = Harness::new().await;
    assert!(h
        .service
        .asset_address(h.alice, Platform::Ethereum)
        .await
        .unwrap()
        .is_none());

    let address = h
        .service
        .set_asset_address(h.alice, Platform::Ethereum)
        .await
        .unwrap();
    assert!(HashKeypair.is_valid_address(Platform::Ethereum, &address));
    assert_eq!(
        h.service
            .set_asset_address(h.alice, Platform::Ethereum)
            .await
            .unwrap(),
        address
    );
    assert_eq!(
        h.service
            .asset_address(h.alice, Platform::Ethereum)
            .await
            .unwrap(),
        Some(address)
    );

    let bobs = h
        .service
        .set_asset_address(h.bob, Platform::Ethereum)
        .await
        .unwrap();
    assert_ne!(
        h.service
            .asset_address(h.alice, Platform::Ethereum)
            .await
            .unwrap()
            .unwrap(),
        bobs
    );

    h.store
        .upsert_account(Account {
            user_id: h.bob,
            email: "bob@example.com".into(),
            suspended: true,
        })
        .await
        .unwrap();
    let err = h
        .service
        .set_asset_address(h.bob, Platform::Tron)
        .await
        .unwrap_err();
    assert!(matches!(err, CustodexError::AccountSuspended(_)));
}

#[tokio::test]
async fn trading_queries_and_graph() {
    let h = Harness::new().await;
    h.fund(h.alice, "USD", "1000").await;
    h.fund(h.bob, "ETH", "5").await;

    h.service
        .place_order(NewOrder::limit(h.bob, eth_usd(), OrderSide::Sell, d("100"), d("1")))
        .await
        .unwrap();
    h.service
        .place_order(NewOrder::limit(h.alice, eth_usd(), OrderSide::Buy, d("100"), d("1")))
        .await
        .unwrap();
    let resting = h
        .service
        .place_order(NewOrder::limit(h.alice, eth_usd(), OrderSide::Buy, d("90"), d("2")))
        .await
        .unwrap();

    assert_eq!(h.service.orders(h.alice, Some(&eth_usd())).await.unwrap().len(), 2);
    assert_eq!(h.service.trades(&eth_usd()).await.unwrap().len(), 1);
    assert!(!h.service.transfers(h.alice).await.unwrap().is_empty());

    let graph = h.service.graph(&eth_usd(), 60).await.unwrap();
    assert_eq!(graph.len(), 1);
    assert_eq!(graph[0].close, d("100"));
    assert_eq!(graph[0].volume, d("1"));
    let err = h
        .service
        .graph(&MarketPair::new("BTC", "USD"), 60)
        .await
        .unwrap_err();
    assert!(matches!(err, CustodexError::PairNotFound(_)));

    h.service.audit_supply().await.unwrap();
    h.service.cancel_order(h.alice, resting.id).await.unwrap();
    h.service.audit_supply().await.unwrap();
}

#[tokio::test]
async fn audit_catches_value_created_out_of_thin_air() {
    let h = Harness::new().await;
    h.fund(h.alice, "ETH", "5").await;
    h.service.audit_supply().await.unwrap();

    h.store.credit_balance(h.bob, "ETH", d("0.1")).await.unwrap();
    let err = h.service.audit_supply().await.unwrap_err();
    assert!(matches!(err, CustodexError::SupplyInvariantViolation { .. }));
}

#[tokio::test]
async fn runtime_credits_a_deposit_and_pays_a_withdrawal() {
    let h = Harness::new().await;
    let address = h
        .service
        .set_asset_address(h.alice, Platform::Ethereum)
        .await
        .unwrap();
    h.gateway.push_block(Block {
        number: 100,
        transactions: vec![ChainTransaction {
            hash: "0xdeposit".into(),
            from: "0x0000000000000000000000000000000000000009".into(),
            to: Some(address.clone()),
            value: 2_000_000_000_000_000_000,
        }],
    });

    let runtime = Runtime::start(&h.config, &h.deps);

    let store = Arc::clone(&h.store);
    let alice = h.alice;
    eventually("deposit credit", || {
        let store = Arc::clone(&store);
        async move { store.balance(alice, "ETH").await.unwrap() == d("2") }
    })
    .await;

    let code = h.code(h.alice).await;
    let tx = h
        .service
        .request_withdrawal(h.withdrawal(h.alice, "ETH", "1.5", &code))
        .await
        .unwrap();
    let id = tx.id;
    eventually("withdrawal fill", || {
        let store = Arc::clone(&store);
        async move {
            store.transaction(id).await.unwrap().unwrap().status == TxStatus::Filled
        }
    })
    .await;

    runtime.shutdown().await;

    let key = ReserveKey::new(h.alice, "ETH", Platform::Ethereum, Protocol::Mainnet, &address);
    let reserve = h.store.reserve(&key).await.unwrap().unwrap();
    assert_eq!(reserve.value, d("0.5"));
    assert!(!reserve.locked);
    assert_eq!(h.balance(h.alice, "ETH").await, d("0.5"));
    assert_eq!(h.gateway.broadcasts().len(), 1);
    assert!(h.mailer.sent().iter().any(|m| matches!(
        m,
        Mail::WithdrawalConfirmation { email, .. } if email == "alice@example.com"
    )));
    h.service.audit_supply().await.unwrap();
}
