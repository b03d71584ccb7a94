//! Order types for the Custodex matching engine.
//!
//! Orders live in the ledger store; there is no in-process book. An order's
//! `remaining` is expressed in base units and only ever shrinks.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MarketPair, OrderId, UserId};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// The type of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    /// Priced at placement time by market price discovery.
    Market,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limit => write!(f, "LIMIT"),
            Self::Market => write!(f, "MARKET"),
        }
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A placement request, before pricing and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub market: MarketPair,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Required for limit orders, ignored for market orders.
    pub price: Option<Decimal>,
    pub quantity: Decimal,
}

impl NewOrder {
    #[must_use]
    pub fn limit(
        user_id: UserId,
        market: MarketPair,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            user_id,
            market,
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            quantity,
        }
    }

    #[must_use]
    pub fn market(user_id: UserId, market: MarketPair, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            user_id,
            market,
            side,
            order_type: OrderType::Market,
            price: None,
            quantity,
        }
    }
}

/// Persisted order row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub market: MarketPair,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub price: Decimal,
    pub quantity: Decimal,
    /// Unfilled quantity in base units.
    pub remaining: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether this (incoming) order crosses `resting`.
    #[must_use]
    pub fn crosses(&self, resting: &Order) -> bool {
        match self.side {
            OrderSide::Buy => self.price >= resting.price,
            OrderSide::Sell => self.price <= resting.price,
        }
    }

    /// Symbol debited at placement: quote for buys, base for sells.
    #[must_use]
    pub fn committed_symbol(&self) -> &str {
        committed_symbol(&self.market, self.side)
    }

    /// Amount committed for `quantity` base units at this order's price.
    #[must_use]
    pub fn committed_value(&self, quantity: Decimal) -> Decimal {
        committed_value(self.side, self.price, quantity)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.remaining.is_zero()
    }
}

/// Symbol a `side` order commits funds in.
#[must_use]
pub fn committed_symbol(market: &MarketPair, side: OrderSide) -> &str {
    match side {
        OrderSide::Buy => &market.quote,
        OrderSide::Sell => &market.base,
    }
}

/// Notional committed by a `side` order: `quantity × price` in quote for
/// buys, raw `quantity` in base for sells.
#[must_use]
pub fn committed_value(side: OrderSide, price: Decimal, quantity: Decimal) -> Decimal {
    match side {
        OrderSide::Buy => quantity * price,
        OrderSide::Sell => quantity,
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy_limit(side: OrderSide, price: Decimal, qty: Decimal) -> Self {
        Self::dummy_limit_for_user(UserId::new(), side, price, qty)
    }

    pub fn dummy_limit_for_user(
        user_id: UserId,
        side: OrderSide,
        price: Decimal,
        qty: Decimal,
    ) -> Self {
        Self {
            id: OrderId::UNASSIGNED,
            user_id,
            market: MarketPair::new("ETH", "USD"),
            side,
            order_type: OrderType::Limit,
            status: OrderStatus::Pending,
            price,
            quantity: qty,
            remaining: qty,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_side_display_and_opposite() {
        assert_eq!(format!("{}", OrderSide::Buy), "BUY");
        assert_eq!(format!("{}", OrderSide::Sell), "SELL");
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
    }

    #[test]
    fn buy_crosses_cheaper_sell() {
        let buy = Order::dummy_limit(OrderSide::Buy, Decimal::new(105, 0), Decimal::ONE);
        let cheap = Order::dummy_limit(OrderSide::Sell, Decimal::new(100, 0), Decimal::ONE);
        let dear = Order::dummy_limit(OrderSide::Sell, Decimal::new(106, 0), Decimal::ONE);
        assert!(buy.crosses(&cheap));
        assert!(!buy.crosses(&dear));
    }

    #[test]
    fn sell_crosses_higher_buy() {
        let sell = Order::dummy_limit(OrderSide::Sell, Decimal::new(1990, 0), Decimal::ONE);
        let bid = Order::dummy_limit(OrderSide::Buy, Decimal::new(2000, 0), Decimal::ONE);
        let low = Order::dummy_limit(OrderSide::Buy, Decimal::new(1980, 0), Decimal::ONE);
        assert!(sell.crosses(&bid));
        assert!(!sell.crosses(&low));
    }

    #[test]
    fn committed_value_per_side() {
        let buy = Order::dummy_limit(OrderSide::Buy, Decimal::new(2000, 0), Decimal::TEN);
        assert_eq!(buy.committed_symbol(), "USD");
        assert_eq!(buy.committed_value(Decimal::TEN), Decimal::new(20_000, 0));

        let sell = Order::dummy_limit(OrderSide::Sell, Decimal::new(2000, 0), Decimal::TEN);
        assert_eq!(sell.committed_symbol(), "ETH");
        assert_eq!(sell.committed_value(Decimal::TEN), Decimal::TEN);
    }

    #[test]
    fn fill_tracking() {
        let mut order = Order::dummy_limit(OrderSide::Buy, Decimal::new(100, 0), Decimal::new(10, 0));
        assert!(!order.is_filled());
        order.remaining = Decimal::new(4, 0);
        assert!(!order.is_filled());
        order.remaining = Decimal::ZERO;
        assert!(order.is_filled());
    }
}
