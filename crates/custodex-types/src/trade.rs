//! Trade and transfer records written by settlement.
//!
//! A [`Trade`] is the immutable record of one matching event between an
//! incoming (taker) order and a resting (maker) order. Each trade produces
//! two [`Transfer`] legs, one per participant, carrying the fee charged and
//! the net quantity credited.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MarketPair, OrderId, OrderSide, TradeId, TransferId, UserId};

/// One settlement between two orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub market: MarketPair,
    /// Execution price: the resting order's price.
    pub price: Decimal,
    /// Executed quantity in base units.
    pub quantity: Decimal,
    /// Resting order's price.
    pub ask_price: Decimal,
    /// Incoming order's price.
    pub bid_price: Decimal,
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    /// Side of the incoming order.
    pub taker_side: OrderSide,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    /// Quote amount = price × quantity.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }

    #[must_use]
    pub fn taker_is_buyer(&self) -> bool {
        self.taker_side == OrderSide::Buy
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade[{}] {} {} {} @ {}",
            self.id, self.market, self.taker_side, self.quantity, self.price,
        )
    }
}

/// Per-order leg of a trade, used for auditing and statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub trade_id: TradeId,
    pub order_id: OrderId,
    pub user_id: UserId,
    /// Symbol credited to the participant.
    pub symbol: String,
    /// Net quantity credited (gross − fee).
    pub quantity: Decimal,
    /// Fee charged, in `symbol` units.
    pub fee: Decimal,
    pub is_maker: bool,
    pub created_at: DateTime<Utc>,
}

impl Transfer {
    /// Gross amount before the fee was withheld.
    #[must_use]
    pub fn gross(&self) -> Decimal {
        self.quantity + self.fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_trade() -> Trade {
        Trade {
            id: TradeId(1),
            market: MarketPair::new("ETH", "USD"),
            price: Decimal::new(2000, 0),
            quantity: Decimal::new(10, 0),
            ask_price: Decimal::new(2000, 0),
            bid_price: Decimal::new(1990, 0),
            maker_order_id: OrderId(1),
            taker_order_id: OrderId(2),
            taker_side: OrderSide::Sell,
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn trade_notional() {
        assert_eq!(make_trade().notional(), Decimal::new(20_000, 0));
    }

    #[test]
    fn trade_display() {
        let s = format!("{}", make_trade());
        assert!(s.contains("ETH/USD"));
        assert!(s.contains("2000"));
        assert!(!make_trade().taker_is_buyer());
    }

    #[test]
    fn transfer_gross_adds_fee_back() {
        let leg = Transfer {
            id: TransferId(1),
            trade_id: TradeId(1),
            order_id: OrderId(1),
            user_id: UserId::new(),
            symbol: "USD".into(),
            quantity: Decimal::new(19_960, 0),
            fee: Decimal::new(40, 0),
            is_maker: false,
            created_at: Utc::now(),
        };
        assert_eq!(leg.gross(), Decimal::new(20_000, 0));
    }
}
