//! CreateOrder command handler
//!
//! Turns a validated request into a `PendingPayment` order: resolves the
//! orderable products, takes their stock, snapshots names/prices/images and
//! addresses, and schedules the auto-cancel job at the payment deadline.

use rust_decimal::Decimal;
use shared::models::OrderAddress;
use shared::order::{
    EventPayload, Order, OrderEvent, OrderItem, OrderStatus, PaymentType, ShippingMethod,
    ShippingStatus,
};
use shared::util::add_minutes;

use crate::orders::money;
use crate::orders::traits::{CommandContext, CommandHandler, CommandMetadata, OrderError};
use crate::scheduler::{ScheduledAction, ScheduledJob};

/// One requested product line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: i64,
    pub quantity: i32,
}

/// Sum quantities of repeated products, keeping first-seen order
pub fn merge_lines(lines: &[OrderLine]) -> Vec<OrderLine> {
    let mut merged: Vec<OrderLine> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
            None => merged.push(*line),
        }
    }
    merged
}

/// CreateOrder action
#[derive(Debug, Clone)]
pub struct CreateOrderAction {
    pub customer_id: i64,
    pub lines: Vec<OrderLine>,
    pub shipping_address: OrderAddress,
    pub billing_address: Option<OrderAddress>,
    pub shipping_method: ShippingMethod,
    pub payment_type: PaymentType,
    pub shipping_fee: Decimal,
    pub discount: Decimal,
    pub order_note: Option<String>,
    pub admin_note: Option<String>,
}

impl CommandHandler for CreateOrderAction {
    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Order, OrderError> {
        if self.lines.is_empty() {
            return Err(OrderError::Validation("Please add a product".to_string()));
        }
        // every requested line must be positive on its own, before merging
        for line in &self.lines {
            money::require_quantity(line.quantity, line.product_id)?;
        }
        let lines = merge_lines(&self.lines);
        for line in &lines {
            money::require_quantity(line.quantity, line.product_id)?;
        }
        money::require_amount(self.shipping_fee, "shipping_fee")?;
        money::require_amount(self.discount, "discount")?;

        let mut resolved = Vec::with_capacity(lines.len());
        for line in &lines {
            match ctx.product(line.product_id) {
                Some(product) if product.is_orderable() => resolved.push((product, line.quantity)),
                _ => {
                    tracing::debug!(product_id = line.product_id, "Skipping unorderable product");
                }
            }
        }
        if resolved.is_empty() {
            return Err(OrderError::ProductUnavailable(
                "None of the requested products can be ordered".to_string(),
            ));
        }

        let now = metadata.timestamp;
        let actor = metadata.actor.id();
        let order_id = ctx.next_order_id()?;
        let order_no = ctx.allocate_order_no()?;

        let mut order = Order::new(order_id, order_no, self.customer_id, actor, now);
        order.status = OrderStatus::PendingPayment;
        order.shipping_status = Some(ShippingStatus::NotYetShipped);
        order.shipping_method = self.shipping_method;
        order.payment_type = self.payment_type;
        order.shipping_fee = self.shipping_fee;
        order.discount = self.discount;
        order.order_note = self.order_note.clone();
        order.admin_note = self.admin_note.clone();
        order.shipping_address = Some(self.shipping_address.clone());
        order.billing_address = self.billing_address.clone();
        order.payment_end_on = Some(add_minutes(now, ctx.timings().auto_cancel_minutes));

        for (product, quantity) in resolved {
            ctx.adjust_stock(product.into(), -quantity, &order, "Create order", actor, now)?;
            order.items.push(OrderItem {
                id: ctx.next_item_id()?,
                product_id: product.id,
                product_name: product.name.clone(),
                product_price: product.price,
                product_image: product.thumbnail_url.clone(),
                quantity,
                stock_tracking_enabled: product.stock_tracking_enabled,
                stock_reduce_strategy: product.stock_reduce_strategy,
                shipped_quantity: 0,
                discount_amount: Decimal::ZERO,
                item_amount: Decimal::ZERO,
                deleted: false,
                created_at: now,
                updated_at: now,
            });
        }
        order.recalculate_totals();

        if let Some(deadline) = order.payment_end_on {
            ctx.schedule(ScheduledJob::new(
                ScheduledAction::AutoCancel { order_id },
                deadline,
                now,
            ));
        }
        ctx.emit(OrderEvent::new(
            order_id,
            actor,
            now,
            EventPayload::OrderCreated {
                order_no,
                customer_id: self.customer_id,
                note: self.order_note.clone(),
            },
        ));
        ctx.save_order(order.clone());

        tracing::info!(order_id, order_no, total = %order.order_total, "Order created");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::actions::test_support::*;
    use crate::orders::storage::OrderStorage;
    use crate::orders::traits::Actor;
    use rust_decimal_macros::dec;
    use shared::order::{OrderEventType, StockReduceStrategy};

    fn action(lines: Vec<(i64, i32)>) -> CreateOrderAction {
        CreateOrderAction {
            customer_id: 42,
            lines: lines
                .into_iter()
                .map(|(product_id, quantity)| OrderLine { product_id, quantity })
                .collect(),
            shipping_address: address(),
            billing_address: None,
            shipping_method: ShippingMethod::Free,
            payment_type: PaymentType::OnlinePayment,
            shipping_fee: Decimal::ZERO,
            discount: Decimal::ZERO,
            order_note: Some("leave at door".to_string()),
            admin_note: None,
        }
    }

    #[test]
    fn test_merge_lines() {
        let merged = merge_lines(&[
            OrderLine { product_id: 2, quantity: 1 },
            OrderLine { product_id: 1, quantity: 2 },
            OrderLine { product_id: 2, quantity: 3 },
        ]);
        assert_eq!(
            merged,
            vec![
                OrderLine { product_id: 2, quantity: 4 },
                OrderLine { product_id: 1, quantity: 2 },
            ]
        );
    }

    #[test]
    fn test_create_order_takes_stock_and_prices() {
        let storage = OrderStorage::open_in_memory().unwrap();
        stock(&storage, 1, 10);
        stock(&storage, 2, 10);
        let products = catalog(vec![product(1, dec!(10.00)), product(2, dec!(5.00))]);

        let (order, outcome) =
            run(&storage, &products, &action(vec![(1, 2), (2, 1)]), Actor::Customer(42)).unwrap();

        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert_eq!(order.shipping_status, Some(ShippingStatus::NotYetShipped));
        assert_eq!(order.subtotal, dec!(25.00));
        assert_eq!(order.order_total, dec!(25.00));
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].product_image.as_deref(), Some("/img/1.png"));
        assert_eq!(order.payment_end_on, Some(NOW + 30 * 60_000));
        assert_eq!(total_stock(&storage, 1), 8);
        assert_eq!(total_stock(&storage, 2), 9);

        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].event_type, OrderEventType::OrderCreated);
        assert_eq!(outcome.jobs_scheduled, 1);

        let jobs = storage.get_pending_jobs().unwrap();
        assert_eq!(jobs[0].action, ScheduledAction::AutoCancel { order_id: order.order_id });
        assert_eq!(jobs[0].due_at, NOW + 30 * 60_000);

        let stored = storage.get_order(order.order_id).unwrap().unwrap();
        assert_eq!(stored, order);
        assert_eq!(storage.get_order_by_no(order.order_no).unwrap().unwrap().order_id, order.order_id);
    }

    #[test]
    fn test_duplicate_products_merged() {
        let storage = OrderStorage::open_in_memory().unwrap();
        stock(&storage, 1, 10);
        let products = catalog(vec![product(1, dec!(3.00))]);

        let (order, _) =
            run(&storage, &products, &action(vec![(1, 2), (1, 3)]), Actor::Customer(42)).unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].quantity, 5);
        assert_eq!(total_stock(&storage, 1), 5);
    }

    #[test]
    fn test_unorderable_products_skipped() {
        let storage = OrderStorage::open_in_memory().unwrap();
        stock(&storage, 1, 10);
        stock(&storage, 2, 10);
        let mut hidden = product(2, dec!(5.00));
        hidden.is_published = false;
        let products = catalog(vec![product(1, dec!(10.00)), hidden]);

        let (order, _) =
            run(&storage, &products, &action(vec![(1, 1), (2, 1), (3, 1)]), Actor::Customer(42))
                .unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].product_id, 1);
        assert_eq!(total_stock(&storage, 2), 10);
    }

    #[test]
    fn test_no_orderable_products() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let mut closed = product(1, dec!(10.00));
        closed.is_allow_to_order = false;
        let products = catalog(vec![closed]);

        let err = run(&storage, &products, &action(vec![(1, 1)]), Actor::Customer(42)).unwrap_err();
        assert!(matches!(err, OrderError::ProductUnavailable(_)));
    }

    #[test]
    fn test_insufficient_stock_rolls_back_everything() {
        let storage = OrderStorage::open_in_memory().unwrap();
        stock(&storage, 1, 10);
        stock(&storage, 2, 1);
        let products = catalog(vec![product(1, dec!(10.00)), product(2, dec!(5.00))]);

        let err =
            run(&storage, &products, &action(vec![(1, 3), (2, 2)]), Actor::Customer(42)).unwrap_err();
        assert!(matches!(err, OrderError::InsufficientStock { available: 1, requested: 2, .. }));

        // product 1 was decremented inside the aborted transaction only
        assert_eq!(total_stock(&storage, 1), 10);
        assert!(storage.get_stock_history(1).unwrap().is_empty());
        assert!(storage.get_pending_jobs().unwrap().is_empty());
        assert!(storage.list_customer_orders(42).unwrap().is_empty());
    }

    #[test]
    fn test_deduct_on_payment_products_untouched() {
        let storage = OrderStorage::open_in_memory().unwrap();
        stock(&storage, 1, 2);
        let mut deferred = product(1, dec!(10.00));
        deferred.stock_reduce_strategy = StockReduceStrategy::PaymentSuccessDeduct;
        let products = catalog(vec![deferred]);

        // more than available: the ledger does not run before payment
        let (order, _) = run(&storage, &products, &action(vec![(1, 5)]), Actor::Customer(42)).unwrap();
        assert_eq!(order.items[0].quantity, 5);
        assert_eq!(
            order.items[0].stock_reduce_strategy,
            StockReduceStrategy::PaymentSuccessDeduct
        );
        assert_eq!(total_stock(&storage, 1), 2);
    }

    #[test]
    fn test_invalid_quantity() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let products = catalog(vec![product(1, dec!(10.00))]);
        let err = run(&storage, &products, &action(vec![(1, 0)]), Actor::Customer(42)).unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));
        let err = run(&storage, &products, &action(vec![]), Actor::Customer(42)).unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));
    }

    #[test]
    fn test_negative_duplicate_line_rejected() {
        let storage = OrderStorage::open_in_memory().unwrap();
        stock(&storage, 1, 10);
        let products = catalog(vec![product(1, dec!(10.00))]);

        // would merge to a positive 2
        let err =
            run(&storage, &products, &action(vec![(1, 5), (1, -3)]), Actor::Customer(42)).unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));
        assert_eq!(total_stock(&storage, 1), 10);
        assert!(storage.list_customer_orders(42).unwrap().is_empty());
    }
}
