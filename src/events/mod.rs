use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events published by the services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Account events
    UserRegistered(Uuid),

    // Catalog events
    ProductCreated(Uuid),

    // Cart events
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, product_id: Uuid },
    CartItemUpdated { cart_id: Uuid, product_id: Uuid },
    CartItemRemoved { cart_id: Uuid, product_id: Uuid },
    CartCleared(Uuid),

    // Checkout / order events
    CheckoutCompleted { cart_id: Uuid, order_id: Uuid },
    OrderCreated(Uuid),
    OrderCancelled(Uuid),

    // Payment reconciliation events
    PaymentInitiated { order_id: Uuid, reference: String },
    PaymentVerified { order_id: Uuid, reference: String },
    PaymentFailed { order_id: Uuid, reference: String },
    PaymentExpired { order_id: Uuid, reference: String },
    /// A replayed or late gateway callback hit an order already in a
    /// terminal state. Not an error; recorded for audit.
    DuplicateCallbackIgnored { order_id: Uuid, reference: String },
}

/// Cloneable handle for publishing events onto the in-process channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing channel failure to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {e}"))
    }

    /// Sends an event; a full or closed channel is logged rather than
    /// failing the surrounding business operation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("event dropped: {e}");
        }
    }
}

/// Drains the event channel. Projections that need to react to events
/// (e.g. notifications) hang off this loop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PaymentVerified { order_id, reference } => {
                info!(%order_id, %reference, "payment verified");
            }
            Event::PaymentFailed { order_id, reference } => {
                info!(%order_id, %reference, "payment failed");
            }
            Event::PaymentExpired { order_id, reference } => {
                info!(%order_id, %reference, "payment attempt expired");
            }
            Event::DuplicateCallbackIgnored { order_id, reference } => {
                info!(%order_id, %reference, "duplicate payment callback ignored");
            }
            other => {
                info!(event = ?other, "event processed");
            }
        }
    }

    info!("event channel closed; processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender
            .send(Event::OrderCreated(Uuid::new_v4()))
            .await
            .expect("send should succeed");
        assert!(matches!(rx.recv().await, Some(Event::OrderCreated(_))));
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        // Must not panic or error out.
        sender.send_or_log(Event::CartCreated(Uuid::new_v4())).await;
    }
}
