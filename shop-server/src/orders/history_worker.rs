//! History Worker - order status change log
//!
//! Consumes notifications routed by the `EventRouter` and appends one
//! `OrderHistoryEntry` per status change. The workflow itself never writes
//! history; a failure here is logged and the notification is skipped.

use std::sync::Arc;

use shared::order::{EventPayload, OrderEvent, OrderHistoryEntry, OrderStatus};
use tokio::sync::mpsc;

use super::storage::{OrderStorage, StorageResult};

pub struct HistoryWorker {
    storage: OrderStorage,
}

/// History row for a notification (`sequence` is assigned by storage)
fn history_entry(event: &OrderEvent) -> OrderHistoryEntry {
    let (old_status, new_status, note) = match &event.payload {
        EventPayload::OrderCreated { note, .. } => (
            None,
            OrderStatus::PendingPayment,
            note.clone().unwrap_or_else(|| "create order".to_string()),
        ),
        EventPayload::OrderChanged {
            old_status,
            new_status,
            note,
        } => (Some(*old_status), *new_status, note.clone()),
    };
    OrderHistoryEntry {
        order_id: event.order_id,
        sequence: 0,
        old_status,
        new_status,
        note,
        operator_id: event.operator_id,
        created_at: event.timestamp,
    }
}

impl HistoryWorker {
    pub fn new(storage: OrderStorage) -> Self {
        Self { storage }
    }

    /// Record one notification
    pub fn record(&self, event: &OrderEvent) -> StorageResult<()> {
        let mut entry = history_entry(event);
        self.storage.append_order_history(&mut entry)
    }

    /// Run until the channel closes
    pub async fn run(self, mut event_rx: mpsc::Receiver<Arc<OrderEvent>>) {
        tracing::info!("History worker started");
        while let Some(event) = event_rx.recv().await {
            if let Err(e) = self.record(&event) {
                tracing::error!(
                    order_id = event.order_id,
                    event_id = %event.event_id,
                    error = %e,
                    "Failed to record order history"
                );
            }
        }
        tracing::info!("History channel closed, history worker stopping");
    }
}
