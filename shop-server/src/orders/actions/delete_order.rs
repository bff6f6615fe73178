//! DeleteOrder command handler
//!
//! Soft-deletes a finished order together with its items and addresses.
//! Stock history is never touched.

use shared::order::Order;

use crate::orders::traits::{CommandContext, CommandHandler, CommandMetadata, OrderError};

#[derive(Debug, Clone)]
pub struct DeleteOrderAction {
    pub order_id: i64,
}

impl CommandHandler for DeleteOrderAction {
    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Order, OrderError> {
        let mut order = ctx.load_order(self.order_id)?;
        if !metadata.actor.can_access(&order) {
            return Err(OrderError::OrderNotFound(self.order_id.to_string()));
        }
        if !order.status.is_terminal() {
            return Err(OrderError::illegal(order.status, "delete"));
        }

        let now = metadata.timestamp;
        order.deleted = true;
        for item in &mut order.items {
            item.deleted = true;
            item.updated_at = now;
        }
        if let Some(address) = order.shipping_address.as_mut() {
            address.deleted = true;
        }
        if let Some(address) = order.billing_address.as_mut() {
            address.deleted = true;
        }
        order.touch(metadata.actor.id(), now);
        ctx.save_order(order.clone());

        tracing::info!(order_id = self.order_id, "Order deleted");
        Ok(order)
    }
}
