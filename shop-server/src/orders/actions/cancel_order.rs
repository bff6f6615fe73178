//! CancelOrder command handler
//!
//! Cancels an unpaid order and puts its stock back. Cancelling an order that
//! is already cancelled succeeds without doing anything, so the auto-cancel
//! job and a customer can race safely.

use shared::order::{EventPayload, Order, OrderEvent, OrderStatus};

use crate::orders::traits::{CommandContext, CommandHandler, CommandMetadata, OrderError};

/// CancelOrder action
#[derive(Debug, Clone)]
pub struct CancelOrderAction {
    pub order_id: i64,
    pub reason: Option<String>,
}

impl CommandHandler for CancelOrderAction {
    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Order, OrderError> {
        let mut order = ctx.load_order(self.order_id)?;
        if !metadata.actor.can_access(&order) {
            return Err(OrderError::OrderNotFound(self.order_id.to_string()));
        }

        if order.status == OrderStatus::Canceled {
            tracing::debug!(order_id = self.order_id, "Order already cancelled");
            return Ok(order);
        }
        if !order.status.is_cancellable() {
            return Err(OrderError::illegal(order.status, "cancel"));
        }

        let now = metadata.timestamp;
        let actor = metadata.actor.id();

        ctx.ensure_locked(&order)?;
        // Restore against the status the stock was taken under
        for item in order.active_items() {
            ctx.adjust_stock(item.into(), item.quantity, &order, "Cancel order", actor, now)?;
        }

        let old_status = order.status;
        order.status = OrderStatus::Canceled;
        order.cancel_reason = self.reason.clone();
        order.canceled_at = Some(now);
        order.touch(actor, now);

        ctx.emit(OrderEvent::new(
            order.order_id,
            actor,
            now,
            EventPayload::OrderChanged {
                old_status,
                new_status: OrderStatus::Canceled,
                note: "cancel order".to_string(),
            },
        ));
        ctx.save_order(order.clone());

        tracing::info!(order_id = self.order_id, reason = ?self.reason, "Order cancelled");
        Ok(order)
    }
}
