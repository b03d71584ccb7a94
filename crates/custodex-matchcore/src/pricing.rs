//! Market-order price discovery.

use custodex_types::OrderSide;
use rust_decimal::Decimal;

/// Price a market order.
///
/// Starts from the pair's last traded price and tightens it to the best
/// resting opposite price when that is better for the placer: the lowest
/// resting sell for a buy, the highest resting buy for a sell. With no last
/// price the best resting price is used as-is. `None` when neither exists.
#[must_use]
pub fn discover_price(
    side: OrderSide,
    last_price: Option<Decimal>,
    best_opposite: Option<Decimal>,
) -> Option<Decimal> {
    match (last_price, best_opposite) {
        (Some(last), Some(best)) => Some(match side {
            OrderSide::Buy => last.min(best),
            OrderSide::Sell => last.max(best),
        }),
        (Some(price), None) | (None, Some(price)) => Some(price),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn buy_takes_the_cheaper_of_last_and_best_ask() {
        assert_eq!(discover_price(OrderSide::Buy, Some(d(100)), Some(d(98))), Some(d(98)));
        assert_eq!(discover_price(OrderSide::Buy, Some(d(100)), Some(d(103))), Some(d(100)));
    }

    #[test]
    fn sell_takes_the_higher_of_last_and_best_bid() {
        assert_eq!(discover_price(OrderSide::Sell, Some(d(100)), Some(d(102))), Some(d(102)));
        assert_eq!(discover_price(OrderSide::Sell, Some(d(100)), Some(d(97))), Some(d(100)));
    }

    #[test]
    fn falls_back_to_whatever_exists() {
        assert_eq!(discover_price(OrderSide::Buy, None, Some(d(99))), Some(d(99)));
        assert_eq!(discover_price(OrderSide::Sell, Some(d(101)), None), Some(d(101)));
        assert_eq!(discover_price(OrderSide::Buy, None, None), None);
    }
}
