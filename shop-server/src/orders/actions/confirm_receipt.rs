//! ConfirmReceipt and AutoComplete command handlers
//!
//! Completing an order schedules one auto-review job per active item.
//! AutoComplete is the deferred variant fired by the job worker: it only
//! completes a `Shipped` order whose deadline has passed, and re-queues
//! itself when the customer pushed the deadline out in the meantime.

use shared::order::{EventPayload, Order, OrderEvent, OrderStatus, ShippingStatus};
use shared::util::add_minutes;

use crate::orders::traits::{CommandContext, CommandHandler, CommandMetadata, OrderError};
use crate::scheduler::{ScheduledAction, ScheduledJob};

fn complete(ctx: &mut CommandContext<'_>, mut order: Order, metadata: &CommandMetadata, note: &str) -> Order {
    let now = metadata.timestamp;
    let actor = metadata.actor.id();
    let old_status = order.status;

    order.status = OrderStatus::Complete;
    order.shipping_status = Some(ShippingStatus::Delivered);
    order.delivered_at = Some(now);
    order.touch(actor, now);

    let review_at = add_minutes(now, ctx.timings().auto_review_minutes);
    let product_ids: Vec<i64> = order.active_items().map(|i| i.product_id).collect();
    for product_id in product_ids {
        ctx.schedule(ScheduledJob::new(
            ScheduledAction::AutoReview {
                order_id: order.order_id,
                product_id,
            },
            review_at,
            now,
        ));
    }

    ctx.emit(OrderEvent::new(
        order.order_id,
        actor,
        now,
        EventPayload::OrderChanged {
            old_status,
            new_status: OrderStatus::Complete,
            note: note.to_string(),
        },
    ));
    ctx.save_order(order.clone());
    tracing::info!(order_id = order.order_id, "Order completed");
    order
}

/// Customer confirms the goods arrived
#[derive(Debug, Clone)]
pub struct ConfirmReceiptAction {
    pub order_id: i64,
}

impl CommandHandler for ConfirmReceiptAction {
    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Order, OrderError> {
        let order = ctx.load_order(self.order_id)?;
        if !metadata.actor.can_access(&order) {
            return Err(OrderError::OrderNotFound(self.order_id.to_string()));
        }
        if !order.status.is_awaiting_receipt() {
            return Err(OrderError::illegal(order.status, "confirm receipt of"));
        }
        Ok(complete(ctx, order, metadata, "confirm receipt"))
    }
}

/// Deferred completion of a shipped order
#[derive(Debug, Clone)]
pub struct AutoCompleteAction {
    pub order_id: i64,
}

impl CommandHandler for AutoCompleteAction {
    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Order, OrderError> {
        let order = ctx.load_order(self.order_id)?;
        if order.status != OrderStatus::Shipped {
            return Err(OrderError::illegal(order.status, "auto-complete"));
        }

        let now = metadata.timestamp;
        match order.delivered_end_on {
            Some(deadline) if deadline > now => {
                tracing::debug!(order_id = self.order_id, deadline, "Receipt deadline extended, re-queueing");
                ctx.schedule(ScheduledJob::new(
                    ScheduledAction::AutoComplete {
                        order_id: self.order_id,
                    },
                    deadline,
                    now,
                ));
                Ok(order)
            }
            _ => Ok(complete(ctx, order, metadata, "auto confirm receipt")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::actions::test_support::*;
    use crate::orders::storage::OrderStorage;
    use crate::orders::traits::Actor;
    use rust_decimal_macros::dec;

    #[test]
    fn test_confirm_schedules_reviews() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let a = product(1, dec!(1.00));
        let b = product(2, dec!(1.00));
        seed_order(&storage, 1, OrderStatus::Shipped, &[(&a, 1), (&b, 2)]);
        let products = catalog(vec![]);

        let (order, outcome) =
            run(&storage, &products, &ConfirmReceiptAction { order_id: 1 }, Actor::Customer(42))
                .unwrap();

        assert_eq!(order.status, OrderStatus::Complete);
        assert_eq!(order.shipping_status, Some(ShippingStatus::Delivered));
        assert_eq!(order.delivered_at, Some(NOW));
        assert_eq!(outcome.jobs_scheduled, 2);

        let jobs = storage.get_pending_jobs().unwrap();
        assert!(jobs.iter().all(|j| j.due_at == NOW + 120 * 60_000));
        let mut reviewed: Vec<ScheduledAction> = jobs.iter().map(|j| j.action).collect();
        reviewed.sort_by_key(|a| match a {
            ScheduledAction::AutoReview { product_id, .. } => *product_id,
            _ => 0,
        });
        assert_eq!(
            reviewed,
            vec![
                ScheduledAction::AutoReview { order_id: 1, product_id: 1 },
                ScheduledAction::AutoReview { order_id: 1, product_id: 2 },
            ]
        );
    }

    #[test]
    fn test_confirm_from_pending_rejected() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let a = product(1, dec!(1.00));
        seed_order(&storage, 1, OrderStatus::PendingPayment, &[(&a, 1)]);
        let products = catalog(vec![]);

        let err = run(&storage, &products, &ConfirmReceiptAction { order_id: 1 }, Actor::Customer(42))
            .unwrap_err();
        assert!(matches!(err, OrderError::IllegalStateTransition { .. }));
    }

    #[test]
    fn test_auto_complete_after_deadline() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let a = product(1, dec!(1.00));
        let mut order = seed_order(&storage, 1, OrderStatus::Shipped, &[(&a, 1)]);
        order.delivered_end_on = Some(NOW - 1);
        let txn = storage.begin_write().unwrap();
        storage.store_order(&txn, &order).unwrap();
        txn.commit().unwrap();
        let products = catalog(vec![]);

        let (order, _) =
            run(&storage, &products, &AutoCompleteAction { order_id: 1 }, Actor::System).unwrap();
        assert_eq!(order.status, OrderStatus::Complete);
    }

    #[test]
    fn test_auto_complete_requeues_when_extended() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let a = product(1, dec!(1.00));
        let mut order = seed_order(&storage, 1, OrderStatus::Shipped, &[(&a, 1)]);
        order.delivered_end_on = Some(NOW + 5_000);
        let txn = storage.begin_write().unwrap();
        storage.store_order(&txn, &order).unwrap();
        txn.commit().unwrap();
        let products = catalog(vec![]);

        let (order, outcome) =
            run(&storage, &products, &AutoCompleteAction { order_id: 1 }, Actor::System).unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert!(outcome.events.is_empty());
        let jobs = storage.get_pending_jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].due_at, NOW + 5_000);
    }

    #[test]
    fn test_auto_complete_skips_completed_order() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let a = product(1, dec!(1.00));
        seed_order(&storage, 1, OrderStatus::Complete, &[(&a, 1)]);
        let products = catalog(vec![]);

        let err = run(&storage, &products, &AutoCompleteAction { order_id: 1 }, Actor::System)
            .unwrap_err();
        assert!(matches!(err, OrderError::IllegalStateTransition { .. }));
    }
}
