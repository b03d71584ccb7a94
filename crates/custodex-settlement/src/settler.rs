//! Trade settlement.
//!
//! Settles one incoming (taker) order against one resting (maker) order:
//! 1. Re-read both orders and compute the fill from their live remainders
//! 2. Decrement both remainders with conditional updates, compensating the
//!    first if the second loses a race
//! 3. Credit the buyer (base, net of fee), the seller (quote, net of fee)
//!    and refund an incoming buyer's price improvement
//! 4. Accrue fees into `fees_charges`
//! 5. Append one trade row and two transfer rows, move the last price
//! 6. Publish trade and order notifications

use std::sync::Arc;

use chrono::Utc;
use custodex_ledger::LedgerStore;
use custodex_types::{
    CustodexError, Event, Notifier, Order, OrderSide, Result, Trade, TradeId, Transfer,
    TransferId,
};
use rust_decimal::Decimal;

use crate::fees::{self, FillBreakdown};

/// Everything one settlement wrote.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub trade: Trade,
    pub taker_transfer: Transfer,
    pub maker_transfer: Transfer,
    /// Incoming order after the fill.
    pub taker: Order,
    /// Resting order after the fill.
    pub maker: Order,
}

/// Applies fills to the ledger.
pub struct Settler {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
}

impl Settler {
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Settle `incoming` against `resting`.
    ///
    /// Returns `Ok(None)` when there is nothing to settle: either order is
    /// no longer pending, the fill is zero, or a concurrent settlement took
    /// the remainder first.
    pub async fn settle(&self, incoming: &Order, resting: &Order) -> Result<Option<Settlement>> {
        if incoming.market != resting.market || incoming.side == resting.side {
            return Err(CustodexError::SettlementFailed {
                reason: format!("{} and {} are not counterparties", incoming.id, resting.id),
            });
        }

        let (Some(taker), Some(maker)) = (
            self.store.order(incoming.id).await?,
            self.store.order(resting.id).await?,
        ) else {
            return Ok(None);
        };
        if !taker.is_pending() || !maker.is_pending() {
            return Ok(None);
        }

        let fill = fees::fill_quantity(taker.remaining, maker.remaining);
        if fill.is_zero() {
            return Ok(None);
        }

        let Some(taker) = self.store.fill_order(taker.id, fill).await? else {
            tracing::debug!(order = %incoming.id, %fill, "incoming order changed underneath settlement");
            return Ok(None);
        };
        let Some(maker) = self.store.fill_order(maker.id, fill).await? else {
            self.store.restore_order(taker.id, fill).await?;
            tracing::debug!(order = %resting.id, %fill, "resting order taken by a concurrent settlement");
            return Ok(None);
        };

        let market = &taker.market;
        let base = self
            .store
            .currency(&market.base)
            .await?
            .ok_or_else(|| CustodexError::CurrencyNotFound(market.base.clone()))?;
        let quote = self
            .store
            .currency(&market.quote)
            .await?
            .ok_or_else(|| CustodexError::CurrencyNotFound(market.quote.clone()))?;

        let buyer_is_incoming = taker.side == OrderSide::Buy;
        let breakdown = fees::price_fill(fill, maker.price, taker.price, buyer_is_incoming, &base, &quote);
        let (buyer, seller) = if buyer_is_incoming {
            (&taker, &maker)
        } else {
            (&maker, &taker)
        };

        self.apply_credits(buyer, seller, &breakdown).await?;

        let trade = self
            .store
            .insert_trade(Trade {
                id: TradeId::UNASSIGNED,
                market: market.clone(),
                price: maker.price,
                quantity: fill,
                ask_price: maker.price,
                bid_price: taker.price,
                maker_order_id: maker.id,
                taker_order_id: taker.id,
                taker_side: taker.side,
                executed_at: Utc::now(),
            })
            .await?;

        let leg_for = |order: &Order| {
            if order.side == OrderSide::Buy {
                &breakdown.buyer
            } else {
                &breakdown.seller
            }
        };
        let taker_transfer = self.record_transfer(&trade, &taker, leg_for(&taker)).await?;
        let maker_transfer = self.record_transfer(&trade, &maker, leg_for(&maker)).await?;

        self.store.set_last_price(market, trade.price).await?;

        tracing::info!(
            trade = %trade.id,
            market = %market,
            price = %trade.price,
            quantity = %fill,
            taker = %taker.id,
            maker = %maker.id,
            "trade settled"
        );

        self.notifier.publish(Event::TradeExecuted {
            trade: trade.clone(),
        });
        for order in [&taker, &maker] {
            let event = if order.is_pending() {
                Event::OrderStatus {
                    order: order.clone(),
                }
            } else {
                Event::OrderFilled {
                    order: order.clone(),
                }
            };
            self.notifier.publish(event);
        }

        Ok(Some(Settlement {
            trade,
            taker_transfer,
            maker_transfer,
            taker,
            maker,
        }))
    }

    async fn apply_credits(&self, buyer: &Order, seller: &Order, b: &FillBreakdown) -> Result<()> {
        self.store
            .credit_balance(buyer.user_id, &b.buyer.symbol, b.buyer.net())
            .await?;
        self.store
            .credit_balance(seller.user_id, &b.seller.symbol, b.seller.net())
            .await?;
        if !b.refund.is_zero() {
            self.store
                .credit_balance(buyer.user_id, &b.seller.symbol, b.refund)
                .await?;
        }
        for leg in [&b.buyer, &b.seller] {
            if !leg.fee.is_zero() {
                self.store.add_fee_charges(&leg.symbol, leg.fee).await?;
            }
        }
        Ok(())
    }

    async fn record_transfer(&self, trade: &Trade, order: &Order, leg: &fees::Leg) -> Result<Transfer> {
        self.store
            .insert_transfer(Transfer {
                id: TransferId::UNASSIGNED,
                trade_id: trade.id,
                order_id: order.id,
                user_id: order.user_id,
                symbol: leg.symbol.clone(),
                quantity: leg.net(),
                fee: leg.fee,
                is_maker: leg.is_maker,
                created_at: trade.executed_at,
            })
            .await
    }
}

/// Funds still held by `order`'s unfilled remainder: quote at the order's
/// own price for buys, base for sells. Returned to the owner on cancel.
#[must_use]
pub fn unused_commitment(order: &Order) -> Decimal {
    order.committed_value(order.remaining)
}
