//! OHLC buckets over executed trades.

use chrono::{DateTime, TimeZone, Utc};
use custodex_types::{Trade, constants};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One price bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Start of the bucket.
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Base quantity traded in the bucket.
    pub volume: Decimal,
}

/// Bucket `trades` into `resolution_secs`-wide candles, oldest first.
/// A non-positive resolution falls back to the default width.
///
/// Within a bucket, trades count in execution order (ties broken by id).
#[must_use]
pub fn candles(trades: &[Trade], resolution_secs: i64) -> Vec<Candle> {
    let width = if resolution_secs > 0 {
        resolution_secs
    } else {
        constants::DEFAULT_GRAPH_RESOLUTION_SECS
    };
    let mut ordered: Vec<&Trade> = trades.iter().collect();
    ordered.sort_by_key(|t| (t.executed_at, t.id));

    let mut out: Vec<Candle> = Vec::new();
    for trade in ordered {
        let start = trade.executed_at.timestamp().div_euclid(width) * width;
        let Some(time) = Utc.timestamp_opt(start, 0).single() else {
            continue;
        };
        match out.last_mut() {
            Some(candle) if candle.time == time => {
                candle.high = candle.high.max(trade.price);
                candle.low = candle.low.min(trade.price);
                candle.close = trade.price;
                candle.volume += trade.quantity;
            }
            _ => out.push(Candle {
                time,
                open: trade.price,
                high: trade.price,
                low: trade.price,
                close: trade.price,
                volume: trade.quantity,
            }),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use custodex_types::{MarketPair, OrderId, OrderSide, TradeId};

    use super::*;

    fn trade(id: u64, secs: i64, price: i64, qty: i64) -> Trade {
        Trade {
            id: TradeId(id),
            market: MarketPair::new("ETH", "USD"),
            price: Decimal::from(price),
            quantity: Decimal::from(qty),
            ask_price: Decimal::from(price),
            bid_price: Decimal::from(price),
            maker_order_id: OrderId(1),
            taker_order_id: OrderId(2),
            taker_side: OrderSide::Buy,
            executed_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn buckets_by_resolution() {
        let trades = vec![
            trade(1, 600, 100, 1),
            trade(2, 610, 104, 2),
            trade(3, 650, 98, 1),
            trade(4, 659, 101, 1),
            trade(5, 720, 110, 3),
        ];
        let got = candles(&trades, 60);
        assert_eq!(got.len(), 2);

        let first = &got[0];
        assert_eq!(first.time.timestamp(), 600);
        assert_eq!(first.open, Decimal::from(100));
        assert_eq!(first.high, Decimal::from(104));
        assert_eq!(first.low, Decimal::from(98));
        assert_eq!(first.close, Decimal::from(101));
        assert_eq!(first.volume, Decimal::from(5));

        assert_eq!(got[1].time.timestamp(), 720);
        assert_eq!(got[1].volume, Decimal::from(3));
    }

    #[test]
    fn unordered_input_is_sorted_and_empty_gives_nothing() {
        let trades = vec![trade(2, 70, 5, 1), trade(1, 10, 3, 1)];
        let got = candles(&trades, 60);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].open, Decimal::from(3));
        assert!(candles(&[], 60).is_empty());
    }

    #[test]
    fn non_positive_resolution_uses_default() {
        let trades = vec![trade(1, 0, 1, 1), trade(2, 59, 2, 1)];
        assert_eq!(candles(&trades, 0).len(), 1);
    }

    #[test]
    fn candle_serializes_prices_as_strings() {
        let got = candles(&[trade(1, 60, 100, 2)], 60);
        let json = serde_json::to_value(&got[0]).unwrap();
        assert_eq!(json["open"], "100");
        assert_eq!(json["volume"], "2");
        assert_eq!(json["time"], "1970-01-01T00:01:00Z");
    }
}
