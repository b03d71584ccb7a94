//! FIFO matching engine.
//!
//! Orders rest in the ledger store, not in memory. Placement debits the
//! committed funds, persists the order, then walks the opposite side of the
//! pair in ascending insertion id (time priority, not price priority),
//! settling against every resting order the incoming price crosses.
//!
//! ## Self-Trade Prevention
//!
//! The placer's own resting orders are excluded from the candidate scan.

use std::sync::Arc;

use chrono::Utc;
use custodex_ledger::LedgerStore;
use custodex_settlement::{Settler, unused_commitment};
use custodex_types::{
    Currency, CustodexError, Event, NewOrder, Notifier, Order, OrderId, OrderStatus, OrderType,
    Pair, Result, UserId, committed_symbol, committed_value,
};
use rust_decimal::Decimal;

use crate::pricing::discover_price;

/// Places, matches and cancels orders.
pub struct MatchingEngine {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
    settler: Settler,
}

impl MatchingEngine {
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn Notifier>) -> Self {
        let settler = Settler::new(Arc::clone(&store), Arc::clone(&notifier));
        Self {
            store,
            notifier,
            settler,
        }
    }

    /// Validate, debit, persist and match a new order.
    ///
    /// Every validation failure is returned before any state changes. Once
    /// the order is persisted, a failure inside the matching walk is logged
    /// and the order is returned as it stands: it rests on the book and
    /// later counter-orders will find it.
    pub async fn place_order(&self, req: NewOrder) -> Result<Order> {
        if req.quantity <= Decimal::ZERO {
            return Err(CustodexError::InvalidOrder {
                reason: format!("quantity must be positive, got {}", req.quantity),
            });
        }

        let pair = self.tradable_pair(&req).await?;
        let base = self.enabled_currency(&req.market.base).await?;
        let quote = self.enabled_currency(&req.market.quote).await?;
        self.active_account(req.user_id).await?;

        let price = match req.order_type {
            OrderType::Limit => match req.price {
                Some(p) if p > Decimal::ZERO => p,
                other => {
                    return Err(CustodexError::InvalidOrder {
                        reason: format!("limit order needs a positive price, got {other:?}"),
                    });
                }
            },
            OrderType::Market => self.market_price(&pair, &req).await?,
        };

        let symbol = committed_symbol(&req.market, req.side).to_string();
        let value = committed_value(req.side, price, req.quantity);
        let currency = if symbol == base.symbol { &base } else { &quote };
        if !currency.in_trade_range(value) {
            return Err(CustodexError::OutOfRange {
                symbol,
                value,
                min: currency.min_trade,
                max: currency.max_trade,
            });
        }

        if !self.store.debit_balance(req.user_id, &symbol, value).await? {
            let available = self.store.balance(req.user_id, &symbol).await?;
            return Err(CustodexError::InsufficientBalance {
                needed: value,
                available,
            });
        }

        let now = Utc::now();
        let order = Order {
            id: OrderId::UNASSIGNED,
            user_id: req.user_id,
            market: req.market,
            side: req.side,
            order_type: req.order_type,
            status: OrderStatus::Pending,
            price,
            quantity: req.quantity,
            remaining: req.quantity,
            created_at: now,
            updated_at: now,
        };
        let order = match self.store.insert_order(order).await {
            Ok(order) => order,
            Err(e) => {
                self.store.credit_balance(req.user_id, &symbol, value).await?;
                return Err(e);
            }
        };

        tracing::info!(
            order = %order.id,
            user = %order.user_id,
            market = %order.market,
            side = %order.side,
            order_type = %order.order_type,
            price = %order.price,
            quantity = %order.quantity,
            "order placed"
        );
        self.notifier.publish(Event::OrderStatus {
            order: order.clone(),
        });

        match self.match_order(&order).await {
            Ok(live) => Ok(live),
            Err(e) => {
                tracing::error!(order = %order.id, error = %e, "matching walk aborted");
                Ok(self.store.order(order.id).await?.unwrap_or(order))
            }
        }
    }

    /// Walk resting opposite-side orders in FIFO order until `incoming` is
    /// filled or the candidates run out.
    async fn match_order(&self, incoming: &Order) -> Result<Order> {
        let candidates = self
            .store
            .resting_orders(&incoming.market, incoming.side.opposite(), incoming.user_id)
            .await?;

        let mut live = incoming.clone();
        for resting in &candidates {
            if !live.crosses(resting) {
                continue;
            }
            live = match self.settler.settle(&live, resting).await? {
                Some(settlement) => settlement.taker,
                None => self
                    .store
                    .order(live.id)
                    .await?
                    .ok_or(CustodexError::OrderNotFound(live.id))?,
            };
            if !live.is_pending() {
                break;
            }
        }
        Ok(live)
    }

    /// Cancel `user`'s pending order and return its unfilled commitment.
    pub async fn cancel_order(&self, user: UserId, id: OrderId) -> Result<Order> {
        let Some(order) = self.store.cancel_order(id, user).await? else {
            return Err(match self.store.order(id).await? {
                Some(_) => CustodexError::OrderNotCancellable(id),
                None => CustodexError::OrderNotFound(id),
            });
        };

        let refund = unused_commitment(&order);
        if !refund.is_zero() {
            self.store
                .credit_balance(user, order.committed_symbol(), refund)
                .await?;
        }

        tracing::info!(order = %order.id, user = %user, %refund, "order cancelled");
        self.notifier.publish(Event::OrderStatus {
            order: order.clone(),
        });
        Ok(order)
    }

    async fn market_price(&self, pair: &Pair, req: &NewOrder) -> Result<Decimal> {
        let best = self
            .store
            .best_resting_price(&req.market, req.side.opposite())
            .await?;
        discover_price(req.side, pair.last_price, best).ok_or_else(|| {
            CustodexError::NoMarketPrice {
                market: req.market.symbol(),
            }
        })
    }

    async fn tradable_pair(&self, req: &NewOrder) -> Result<Pair> {
        let pair = self
            .store
            .pair(&req.market)
            .await?
            .ok_or_else(|| CustodexError::PairNotFound(req.market.symbol()))?;
        if !pair.enabled {
            return Err(CustodexError::PairDisabled(req.market.symbol()));
        }
        Ok(pair)
    }

    async fn enabled_currency(&self, symbol: &str) -> Result<Currency> {
        let currency = self
            .store
            .currency(symbol)
            .await?
            .ok_or_else(|| CustodexError::CurrencyNotFound(symbol.to_string()))?;
        if !currency.enabled {
            return Err(CustodexError::CurrencyDisabled(symbol.to_string()));
        }
        Ok(currency)
    }

    async fn active_account(&self, user: UserId) -> Result<()> {
        match self.store.account(user).await? {
            Some(account) if account.suspended => Err(CustodexError::AccountSuspended(user)),
            Some(_) => Ok(()),
            None => Err(CustodexError::AccountNotFound(user)),
        }
    }
}
