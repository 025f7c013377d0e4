use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Events emitted by the checkout pipeline. Consumers are decoupled from the
/// request path: emission failures are logged by callers and never abort the
/// operation that produced the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Checkout session events
    CheckoutSessionCreated {
        session_id: String,
        user_id: Uuid,
    },
    CheckoutSessionReused {
        session_id: String,
        user_id: Uuid,
    },
    CheckoutSessionEvicted {
        session_id: String,
        user_id: Uuid,
    },

    // Payment events
    PaymentIntentCreated {
        session_id: String,
        intent_id: String,
    },

    // Order events
    OrderCreated(Uuid),
    OrderMaterialized {
        session_id: String,
        order_ids: Vec<Uuid>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Background consumer for pipeline events. Runs for the lifetime of the
/// server task; today it surfaces events to the log, which is where external
/// integrations would hook in.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("Event processor started");
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderMaterialized {
                session_id,
                order_ids,
            } => {
                info!(
                    session_id = %session_id,
                    order_count = order_ids.len(),
                    "Order set materialized"
                );
            }
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "Order created");
            }
            other => {
                debug!(event = ?other, "Pipeline event");
            }
        }
    }
    info!("Event processor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_sender_delivers_to_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::OrderCreated(Uuid::new_v4()))
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(Event::OrderCreated(_))));
    }

    #[tokio::test]
    async fn event_sender_errors_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        let result = sender.send(Event::OrderCreated(Uuid::new_v4())).await;
        assert!(result.is_err());
    }
}
