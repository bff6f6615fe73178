//! DelayConfirmReceipt command handler
//!
//! Pushes the auto-complete deadline out by one auto-complete window. The
//! pending AutoComplete job is left in place and re-queues itself when it
//! finds the later deadline.

use shared::order::Order;
use shared::util::{DAY_MS, add_minutes};

use crate::orders::traits::{CommandContext, CommandHandler, CommandMetadata, OrderError};

/// Orders can never be extended past this many days after creation
pub const MAX_RECEIPT_DAYS: i64 = 60;

#[derive(Debug, Clone)]
pub struct DelayReceiptAction {
    pub order_id: i64,
}

impl CommandHandler for DelayReceiptAction {
    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Order, OrderError> {
        let mut order = ctx.load_order(self.order_id)?;
        if !metadata.actor.can_access(&order) {
            return Err(OrderError::OrderNotFound(self.order_id.to_string()));
        }
        if !order.status.is_awaiting_receipt() {
            return Err(OrderError::illegal(order.status, "delay receipt of"));
        }

        let now = metadata.timestamp;
        let base = order.delivered_end_on.unwrap_or(now);
        let extended = add_minutes(base, ctx.timings().auto_complete_minutes);
        let limit = order.created_at + MAX_RECEIPT_DAYS * DAY_MS;
        if extended > limit {
            return Err(OrderError::ReceiptExtensionExceeded { limit });
        }

        order.delivered_end_on = Some(extended);
        order.touch(metadata.actor.id(), now);
        ctx.save_order(order.clone());

        tracing::info!(order_id = self.order_id, deadline = extended, "Receipt deadline extended");
        Ok(order)
    }
}
