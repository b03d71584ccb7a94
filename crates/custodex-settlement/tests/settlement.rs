//! Settlement against the in-memory ledger.

use std::sync::Arc;

use custodex_ledger::{BalanceStore, MemoryLedger, OrderStore, ReferenceStore};
use custodex_settlement::{SupplyAudit, Settler, ledger_supply};
use custodex_types::{
    Currency, Event, MarketPair, Notifier, Order, OrderSide, OrderStatus, Pair, UserId,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;

#[derive(Default)]
struct Recorder(Mutex<Vec<Event>>);

impl Notifier for Recorder {
    fn publish(&self, event: Event) {
        self.0.lock().push(event);
    }
}

impl Recorder {
    fn topics(&self) -> Vec<&'static str> {
        self.0.lock().iter().map(Event::topic).collect()
    }
}

fn d(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

struct Harness {
    store: Arc<MemoryLedger>,
    events: Arc<Recorder>,
    settler: Settler,
    audit: SupplyAudit,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(MemoryLedger::new());
        store
            .upsert_currency(Currency::new("ETH").with_trade_fees(Decimal::new(2, 1), Decimal::new(1, 1)))
            .await
            .unwrap();
        store
            .upsert_currency(Currency::new("USD").with_trade_fees(Decimal::new(2, 1), Decimal::new(1, 1)))
            .await
            .unwrap();
        store.upsert_pair(Pair::new("ETH", "USD")).await.unwrap();
        let events = Arc::new(Recorder::default());
        let settler = Settler::new(store.clone(), events.clone());
        Self {
            store,
            events,
            settler,
            audit: SupplyAudit::new(),
        }
    }

    /// Deposit exactly what the order commits, then rest it on the book.
    async fn place(&mut self, user: UserId, side: OrderSide, price: i64, qty: i64) -> Order {
        let order = Order::dummy_limit_for_user(user, side, d(price), d(qty));
        let symbol = order.committed_symbol().to_string();
        self.audit.record_deposit(&symbol, order.committed_value(d(qty)));
        self.store.insert_order(order).await.unwrap()
    }

    async fn balance(&self, user: UserId, symbol: &str) -> Decimal {
        self.store.balance(user, symbol).await.unwrap()
    }

    async fn assert_conserved(&self) {
        for symbol in ["ETH", "USD"] {
            let actual = ledger_supply(self.store.as_ref(), symbol).await.unwrap();
            self.audit.verify(symbol, actual).unwrap();
        }
    }
}

#[tokio::test]
async fn incoming_buy_settles_at_resting_price_with_refund() {
    let mut h = Harness::new().await;
    let (seller, buyer) = (UserId::new(), UserId::new());
    let resting = h.place(seller, OrderSide::Sell, 100, 1).await;
    let incoming = h.place(buyer, OrderSide::Buy, 105, 1).await;

    let s = h.settler.settle(&incoming, &resting).await.unwrap().unwrap();

    assert_eq!(s.trade.price, d(100));
    assert_eq!(s.trade.ask_price, d(100));
    assert_eq!(s.trade.bid_price, d(105));
    assert_eq!(s.trade.maker_order_id, resting.id);
    assert_eq!(s.trade.taker_order_id, incoming.id);

    // Taker buyer pays the full 0.2% in ETH; maker seller pays 0.1% in USD.
    assert_eq!(h.balance(buyer, "ETH").await, Decimal::new(998, 3));
    assert_eq!(h.balance(buyer, "USD").await, d(5));
    assert_eq!(h.balance(seller, "USD").await, Decimal::new(999, 1));
    assert!(!s.taker_transfer.is_maker);
    assert!(s.maker_transfer.is_maker);

    assert_eq!(s.taker.status, OrderStatus::Filled);
    assert_eq!(s.maker.status, OrderStatus::Filled);

    let eth = h.store.currency("ETH").await.unwrap().unwrap();
    let usd = h.store.currency("USD").await.unwrap().unwrap();
    assert_eq!(eth.fees_charges, Decimal::new(2, 3));
    assert_eq!(usd.fees_charges, Decimal::new(1, 1));

    let pair = h.store.pair(&MarketPair::new("ETH", "USD")).await.unwrap().unwrap();
    assert_eq!(pair.last_price, Some(d(100)));

    h.assert_conserved().await;
}

#[tokio::test]
async fn incoming_sell_settles_at_resting_bid() {
    let mut h = Harness::new().await;
    let (buyer, seller) = (UserId::new(), UserId::new());
    let resting = h.place(buyer, OrderSide::Buy, 105, 2).await;
    let incoming = h.place(seller, OrderSide::Sell, 100, 2).await;

    let s = h.settler.settle(&incoming, &resting).await.unwrap().unwrap();
    assert_eq!(s.trade.price, d(105));
    // Maker buyer: 0.1% of 2 ETH; taker seller: 0.2% of 210 USD.
    assert_eq!(h.balance(buyer, "ETH").await, Decimal::new(1998, 3));
    assert_eq!(h.balance(buyer, "USD").await, Decimal::ZERO);
    assert_eq!(h.balance(seller, "USD").await, Decimal::new(20958, 2));
    h.assert_conserved().await;
}

#[tokio::test]
async fn partial_fill_leaves_remainder_pending() {
    let mut h = Harness::new().await;
    let buyer = UserId::new();
    let resting = h.place(buyer, OrderSide::Buy, 100, 10).await;
    let first = h.place(UserId::new(), OrderSide::Sell, 100, 4).await;

    let s = h.settler.settle(&first, &resting).await.unwrap().unwrap();
    assert_eq!(s.trade.quantity, d(4));
    assert_eq!(s.maker.remaining, d(6));
    assert_eq!(s.maker.status, OrderStatus::Pending);
    assert_eq!(s.taker.status, OrderStatus::Filled);

    let topics = h.events.topics();
    assert!(topics.contains(&"trade"));
    assert!(topics.contains(&"order/filled"));
    assert!(topics.contains(&"order/status"));
    h.assert_conserved().await;
}

#[tokio::test]
async fn settling_a_filled_order_is_a_no_op() {
    let mut h = Harness::new().await;
    let resting = h.place(UserId::new(), OrderSide::Sell, 100, 1).await;
    let incoming = h.place(UserId::new(), OrderSide::Buy, 100, 1).await;
    h.settler.settle(&incoming, &resting).await.unwrap().unwrap();

    let again = h.settler.settle(&incoming, &resting).await.unwrap();
    assert!(again.is_none());
    assert_eq!(h.store.trades(&MarketPair::new("ETH", "USD")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn same_side_orders_are_rejected() {
    let mut h = Harness::new().await;
    let a = h.place(UserId::new(), OrderSide::Buy, 100, 1).await;
    let b = h.place(UserId::new(), OrderSide::Buy, 100, 1).await;
    assert!(h.settler.settle(&a, &b).await.is_err());
}
