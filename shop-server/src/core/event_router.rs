//! Event Router - routes and fans out order events
//!
//! Decouples the `OrdersManager` from the consumers of its notifications.
//!
//! ```text
//! OrdersManager (broadcast)
//!        │
//!        └── EventRouter
//!               ├── mpsc ──► HistoryWorker (all events) [CRITICAL]
//!               └── mpsc ──► outbound notifications, email/SMS (all events) [best-effort]
//! ```
//!
//! History uses a blocking send so no status change is lost; the outbound
//! channel uses `try_send` and drops when full.

use shared::order::OrderEvent;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Receiving ends handed to the consumers
pub struct EventChannels {
    pub history_rx: mpsc::Receiver<Arc<OrderEvent>>,
    pub notify_rx: mpsc::Receiver<Arc<OrderEvent>>,
}

pub struct EventRouter {
    history_tx: mpsc::Sender<Arc<OrderEvent>>,
    notify_tx: mpsc::Sender<Arc<OrderEvent>>,
}

impl EventRouter {
    /// `history_buffer` should be generous; `notify_buffer` bounds what a
    /// slow notification consumer can queue before events are dropped
    pub fn new(history_buffer: usize, notify_buffer: usize) -> (Self, EventChannels) {
        let (history_tx, history_rx) = mpsc::channel(history_buffer);
        let (notify_tx, notify_rx) = mpsc::channel(notify_buffer);
        (
            Self {
                history_tx,
                notify_tx,
            },
            EventChannels {
                history_rx,
                notify_rx,
            },
        )
    }

    /// Run until the source channel closes
    pub async fn run(self, mut source: broadcast::Receiver<OrderEvent>) {
        tracing::info!("Event router started");

        loop {
            match source.recv().await {
                Ok(event) => self.dispatch(event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::error!(
                        skipped = n,
                        "Event router lagged! Events skipped - order history may be incomplete"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Source channel closed, event router stopping");
                    break;
                }
            }
        }
    }

    async fn dispatch(&self, event: OrderEvent) {
        let event = Arc::new(event);

        if self.history_tx.send(Arc::clone(&event)).await.is_err() {
            tracing::error!(order_id = event.order_id, "History channel closed - status change not recorded");
        }

        match self.notify_tx.try_send(Arc::clone(&event)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    order_id = event.order_id,
                    event_type = ?event.event_type,
                    "Notification channel full, event dropped"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Notification channel closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::order::{EventPayload, OrderStatus};

    fn changed(order_id: i64) -> OrderEvent {
        OrderEvent::new(
            order_id,
            0,
            shared::util::now_millis(),
            EventPayload::OrderChanged {
                old_status: OrderStatus::PendingPayment,
                new_status: OrderStatus::Canceled,
                note: "cancel order".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_event_routing() {
        let (router, mut channels) = EventRouter::new(16, 16);
        let (tx, rx) = broadcast::channel(16);
        tokio::spawn(router.run(rx));

        tx.send(changed(1)).unwrap();

        assert_eq!(channels.history_rx.recv().await.unwrap().order_id, 1);
        assert_eq!(channels.notify_rx.recv().await.unwrap().order_id, 1);
    }

    #[tokio::test]
    async fn test_history_survives_slow_notifications() {
        let (router, mut channels) = EventRouter::new(16, 1);
        let (tx, rx) = broadcast::channel(16);
        let handle = tokio::spawn(router.run(rx));

        for id in 1..=3 {
            tx.send(changed(id)).unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        for id in 1..=3 {
            assert_eq!(channels.history_rx.recv().await.unwrap().order_id, id);
        }
        // only the first fit
        assert_eq!(channels.notify_rx.recv().await.unwrap().order_id, 1);
        assert!(channels.notify_rx.recv().await.is_none());
    }
}
