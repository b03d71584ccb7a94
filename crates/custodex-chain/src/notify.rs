//! In-process notification fan-out over a tokio broadcast channel.

use custodex_types::{Event, Notifier, constants};
use tokio::sync::broadcast;

/// Publishes [`Event`]s to every current subscriber.
///
/// Slow subscribers lag and lose the oldest events; publishers never block.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Event>,
}

impl BroadcastNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(constants::NOTIFICATION_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, event: Event) {
        let topic = event.topic();
        // No subscribers is not an error.
        if self.tx.send(event).is_err() {
            tracing::trace!(topic, "notification dropped, no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use custodex_types::{Order, OrderSide};
    use rust_decimal::Decimal;

    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let notifier = BroadcastNotifier::with_capacity(8);
        let mut rx = notifier.subscribe();
        let order = Order::dummy_limit(OrderSide::Buy, Decimal::ONE, Decimal::ONE);
        notifier.publish(Event::OrderFilled { order });
        let got = rx.recv().await.unwrap();
        assert_eq!(got.topic(), "order/filled");
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        BroadcastNotifier::with_capacity(1).publish(Event::OrderStatus {
            order: Order::dummy_limit(OrderSide::Sell, Decimal::ONE, Decimal::ONE),
        });
    }
}
