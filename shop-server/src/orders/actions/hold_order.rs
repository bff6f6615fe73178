//! HoldOrder command handler

use shared::order::{EventPayload, Order, OrderEvent, OrderStatus};

use crate::orders::traits::{CommandContext, CommandHandler, CommandMetadata, OrderError};

/// Suspend an order with a reason
#[derive(Debug, Clone)]
pub struct HoldOrderAction {
    pub order_id: i64,
    pub reason: Option<String>,
}

impl CommandHandler for HoldOrderAction {
    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Order, OrderError> {
        let mut order = ctx.load_order(self.order_id)?;
        if order.status == OrderStatus::OnHold || order.status.is_terminal() {
            return Err(OrderError::illegal(order.status, "hold"));
        }

        let now = metadata.timestamp;
        let actor = metadata.actor.id();
        let old_status = order.status;
        order.status = OrderStatus::OnHold;
        order.on_hold_reason = self.reason.clone();
        order.touch(actor, now);

        ctx.emit(OrderEvent::new(
            order.order_id,
            actor,
            now,
            EventPayload::OrderChanged {
                old_status,
                new_status: OrderStatus::OnHold,
                note: "Pending Orders".to_string(),
            },
        ));
        ctx.save_order(order.clone());
        Ok(order)
    }
}
