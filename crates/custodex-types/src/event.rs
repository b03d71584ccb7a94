//! Notification events fanned out to connected clients.
//!
//! Publishing is fire-and-forget: a [`Notifier`] never blocks the caller and
//! never fails it. Delivery is best-effort.

use serde::{Deserialize, Serialize};

use crate::{Order, Trade, Transaction, UserId};

/// A typed notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An order reached `remaining == 0`.
    OrderFilled { order: Order },
    /// An order was placed, partially filled or cancelled.
    OrderStatus { order: Order },
    TradeExecuted { trade: Trade },
    /// A deposit row was created for a freshly observed transfer.
    DepositDetected { transaction: Transaction },
    /// A deposit changed status or confirmation count.
    TransactionStatus { transaction: Transaction },
    /// A withdrawal changed status.
    WithdrawalStatus { transaction: Transaction },
}

impl Event {
    /// Routing topic, one per variant.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::OrderFilled { .. } => "order/filled",
            Self::OrderStatus { .. } => "order/status",
            Self::TradeExecuted { .. } => "trade",
            Self::DepositDetected { .. } => "deposit/detected",
            Self::TransactionStatus { .. } => "transaction/status",
            Self::WithdrawalStatus { .. } => "withdrawal/status",
        }
    }

    /// The user this event is addressed to; `None` for public market data.
    #[must_use]
    pub fn user(&self) -> Option<UserId> {
        match self {
            Self::OrderFilled { order } | Self::OrderStatus { order } => Some(order.user_id),
            Self::TradeExecuted { .. } => None,
            Self::DepositDetected { transaction }
            | Self::TransactionStatus { transaction }
            | Self::WithdrawalStatus { transaction } => Some(transaction.user_id),
        }
    }
}

/// Sink for [`Event`]s.
pub trait Notifier: Send + Sync {
    fn publish(&self, event: Event);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn publish(&self, _event: Event) {}
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::OrderSide;

    #[test]
    fn order_events_are_addressed_to_the_owner() {
        let order = Order::dummy_limit(OrderSide::Buy, Decimal::ONE, Decimal::ONE);
        let user = order.user_id;
        let event = Event::OrderFilled { order };
        assert_eq!(event.topic(), "order/filled");
        assert_eq!(event.user(), Some(user));
    }

    #[test]
    fn events_serialize_with_a_type_tag() {
        let order = Order::dummy_limit(OrderSide::Sell, Decimal::ONE, Decimal::ONE);
        let json = serde_json::to_value(Event::OrderStatus { order }).unwrap();
        assert_eq!(json["type"], "order_status");
    }
}
