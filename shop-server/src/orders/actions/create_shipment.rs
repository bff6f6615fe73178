//! CreateShipment command handler
//!
//! Allocates shipped quantity against order items. The order moves to
//! `Shipping` on the first shipment and to `Shipped` once every active item
//! is fully shipped, at which point the auto-complete deadline starts.

use std::collections::HashSet;

use rust_decimal::Decimal;
use shared::order::{
    EventPayload, Order, OrderEvent, OrderStatus, Shipment, ShipmentItem, ShippingStatus,
};
use shared::util::add_minutes;

use crate::orders::traits::{CommandContext, CommandHandler, CommandMetadata, OrderError};
use crate::scheduler::{ScheduledAction, ScheduledJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipmentLine {
    pub order_item_id: i64,
    pub quantity: i32,
}

/// CreateShipment action
#[derive(Debug, Clone)]
pub struct CreateShipmentAction {
    pub order_id: i64,
    pub tracking_number: Option<String>,
    pub admin_comment: Option<String>,
    pub total_weight: Option<Decimal>,
    pub lines: Vec<ShipmentLine>,
}

impl CreateShipmentAction {
    fn validate_lines(&self) -> Result<(), OrderError> {
        if self.lines.is_empty() {
            return Err(OrderError::Validation("Please select items to ship".to_string()));
        }
        let mut seen = HashSet::new();
        for line in &self.lines {
            if line.quantity <= 0 {
                return Err(OrderError::Validation(format!(
                    "Shipment quantity for item {} must be greater than 0",
                    line.order_item_id
                )));
            }
            if !seen.insert(line.order_item_id) {
                return Err(OrderError::Validation(format!(
                    "Item {} appears more than once",
                    line.order_item_id
                )));
            }
        }
        Ok(())
    }
}

/// Mark the order shipped and start the auto-complete countdown
fn mark_shipped(ctx: &mut CommandContext<'_>, order: &mut Order, now: i64) {
    order.status = OrderStatus::Shipped;
    order.shipped_at = Some(now);
    let deadline = add_minutes(now, ctx.timings().auto_complete_minutes);
    order.delivered_end_on = Some(deadline);
    ctx.schedule(ScheduledJob::new(
        ScheduledAction::AutoComplete {
            order_id: order.order_id,
        },
        deadline,
        now,
    ));
}

impl CommandHandler for CreateShipmentAction {
    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Order, OrderError> {
        let mut order = ctx.load_order(self.order_id)?;
        if !order.status.is_shippable() {
            return Err(OrderError::illegal(order.status, "ship"));
        }

        let now = metadata.timestamp;
        let actor = metadata.actor.id();
        let old_status = order.status;

        match order.shipping_status {
            Some(ShippingStatus::NoShipping) => {
                mark_shipped(ctx, &mut order, now);
            }
            Some(ShippingStatus::Shipped) | Some(ShippingStatus::Delivered) => {
                return Err(OrderError::illegal(order.status, "ship an already shipped"));
            }
            None | Some(ShippingStatus::NotYetShipped) | Some(ShippingStatus::PartiallyShipped) => {
                self.validate_lines()?;
                order.shipping_status = Some(ShippingStatus::PartiallyShipped);
                if order.status == OrderStatus::PaymentReceived {
                    order.status = OrderStatus::Shipping;
                }

                let mut shipment_items = Vec::with_capacity(self.lines.len());
                for line in &self.lines {
                    let Some(item) = order
                        .active_items_mut()
                        .find(|i| i.id == line.order_item_id)
                    else {
                        return Err(OrderError::ItemNotFound(line.order_item_id));
                    };
                    if item.shipped_quantity + line.quantity > item.quantity {
                        return Err(OrderError::OverShipment {
                            item_id: item.id,
                            ordered: item.quantity,
                            shipped: item.shipped_quantity,
                            requested: line.quantity,
                        });
                    }
                    item.shipped_quantity += line.quantity;
                    item.updated_at = now;
                    shipment_items.push(ShipmentItem {
                        order_item_id: item.id,
                        product_id: item.product_id,
                        quantity: line.quantity,
                    });
                }

                let mut shipment = Shipment {
                    id: 0,
                    order_id: order.order_id,
                    tracking_number: self.tracking_number.clone(),
                    admin_comment: self.admin_comment.clone(),
                    total_weight: self.total_weight,
                    items: shipment_items,
                    shipped_at: now,
                    created_by: actor,
                };
                ctx.store_shipment(&mut shipment)?;

                if order.all_items_shipped() {
                    order.shipping_status = Some(ShippingStatus::Shipped);
                    mark_shipped(ctx, &mut order, now);
                }
            }
        }

        order.touch(actor, now);
        if order.status != old_status {
            ctx.emit(OrderEvent::new(
                order.order_id,
                actor,
                now,
                EventPayload::OrderChanged {
                    old_status,
                    new_status: order.status,
                    note: "shipment".to_string(),
                },
            ));
        }
        ctx.save_order(order.clone());

        tracing::info!(order_id = self.order_id, status = %order.status, "Shipment recorded");
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

    fn ship(lines: &[(i64, i32)]) -> CreateShipmentAction {
        CreateShipmentAction {
            order_id: 1,
            tracking_number: Some("TRK-1".to_string()),
            admin_comment: None,
            total_weight: None,
            lines: lines
                .iter()
                .map(|&(order_item_id, quantity)| ShipmentLine { order_item_id, quantity })
                .collect(),
        }
    }

    fn paid_order(storage: &OrderStorage) -> Order {
        let a = product(1, dec!(1.00));
        let b = product(2, dec!(2.00));
        let mut order = seed_order(storage, 1, OrderStatus::PaymentReceived, &[(&a, 5), (&b, 1)]);
        order.shipping_status = Some(ShippingStatus::NotYetShipped);
        let txn = storage.begin_write().unwrap();
        storage.store_order(&txn, &order).unwrap();
        txn.commit().unwrap();
        order
    }

    #[test]
    fn test_partial_then_full_shipment() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let order = paid_order(&storage);
        let (a, b) = (order.items[0].id, order.items[1].id);
        let products = catalog(vec![]);

        let (order, outcome) = run(&storage, &products, &ship(&[(a, 3)]), Actor::Admin(1)).unwrap();
        assert_eq!(order.status, OrderStatus::Shipping);
        assert_eq!(order.shipping_status, Some(ShippingStatus::PartiallyShipped));
        assert_eq!(order.items[0].shipped_quantity, 3);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.jobs_scheduled, 0);

        let (order, outcome) =
            run(&storage, &products, &ship(&[(a, 2), (b, 1)]), Actor::Admin(1)).unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.shipping_status, Some(ShippingStatus::Shipped));
        assert_eq!(order.shipped_at, Some(NOW));
        assert_eq!(order.delivered_end_on, Some(NOW + 60 * 60_000));
        assert_eq!(outcome.jobs_scheduled, 1);
        assert_eq!(storage.get_shipments(1).unwrap().len(), 2);
    }

    #[test]
    fn test_over_shipment_rejected() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let order = paid_order(&storage);
        let a = order.items[0].id;
        let products = catalog(vec![]);

        let err = run(&storage, &products, &ship(&[(a, 6)]), Actor::Admin(1)).unwrap_err();
        assert!(matches!(err, OrderError::OverShipment { ordered: 5, shipped: 0, requested: 6, .. }));
        assert_eq!(storage.get_order(1).unwrap().unwrap().items[0].shipped_quantity, 0);
    }

    #[test]
    fn test_fully_shipped_item_rejected() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let order = paid_order(&storage);
        let a = order.items[0].id;
        let products = catalog(vec![]);

        run(&storage, &products, &ship(&[(a, 5)]), Actor::Admin(1)).unwrap();
        let err = run(&storage, &products, &ship(&[(a, 1)]), Actor::Admin(1)).unwrap_err();
        assert!(matches!(err, OrderError::OverShipment { ordered: 5, shipped: 5, requested: 1, .. }));
    }

    #[test]
    fn test_bad_lines() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let order = paid_order(&storage);
        let a = order.items[0].id;
        let products = catalog(vec![]);

        assert!(matches!(
            run(&storage, &products, &ship(&[]), Actor::Admin(1)).unwrap_err(),
            OrderError::Validation(_)
        ));
        assert!(matches!(
            run(&storage, &products, &ship(&[(a, 0)]), Actor::Admin(1)).unwrap_err(),
            OrderError::Validation(_)
        ));
        assert!(matches!(
            run(&storage, &products, &ship(&[(a, 1), (a, 1)]), Actor::Admin(1)).unwrap_err(),
            OrderError::Validation(_)
        ));
        assert!(matches!(
            run(&storage, &products, &ship(&[(999, 1)]), Actor::Admin(1)).unwrap_err(),
            OrderError::ItemNotFound(999)
        ));
    }

    #[test]
    fn test_no_shipping_goes_straight_to_shipped() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let mut order = paid_order(&storage);
        order.shipping_status = Some(ShippingStatus::NoShipping);
        let txn = storage.begin_write().unwrap();
        storage.store_order(&txn, &order).unwrap();
        txn.commit().unwrap();
        let products = catalog(vec![]);

        let (order, outcome) = run(&storage, &products, &ship(&[]), Actor::Admin(1)).unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.shipping_status, Some(ShippingStatus::NoShipping));
        assert_eq!(outcome.jobs_scheduled, 1);
    }

    #[test]
    fn test_unpaid_order_rejected() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let a = product(1, dec!(1.00));
        let order = seed_order(&storage, 1, OrderStatus::PendingPayment, &[(&a, 1)]);
        let products = catalog(vec![]);

        let err = run(&storage, &products, &ship(&[(order.items[0].id, 1)]), Actor::Admin(1))
            .unwrap_err();
        assert!(matches!(err, OrderError::IllegalStateTransition { .. }));
    }
}
