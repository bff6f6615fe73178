//! PaymentReceived command handler
//!
//! Records a confirmed payment. The status moves to `PaymentReceived`
//! before the ledger runs, so only products that deduct stock on payment
//! are taken here; products withheld at placement are left alone.
//! No notification is published: the payment event itself is the signal.

use rust_decimal::Decimal;
use shared::order::{Order, OrderStatus, PaymentMethod};

use crate::orders::traits::{CommandContext, CommandHandler, CommandMetadata, OrderError};

/// How a payment identifies its order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRef {
    Id(i64),
    No(i64),
}

/// PaymentReceived action
#[derive(Debug, Clone)]
pub struct PaymentReceivedAction {
    pub order: OrderRef,
    pub payment_method: Option<PaymentMethod>,
    /// Defaults to the order total
    pub amount: Option<Decimal>,
    /// Defaults to the operation time
    pub paid_at: Option<i64>,
    pub note: Option<String>,
}

impl CommandHandler for PaymentReceivedAction {
    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Order, OrderError> {
        let mut order = match self.order {
            OrderRef::Id(id) => ctx.load_order(id)?,
            OrderRef::No(no) => ctx.load_order_by_no(no)?,
        };
        if !order.status.is_pre_payment() {
            return Err(OrderError::illegal(order.status, "receive payment for"));
        }

        ctx.ensure_locked(&order)?;

        let now = metadata.timestamp;
        let actor = metadata.actor.id();
        order.status = OrderStatus::PaymentReceived;

        for item in order.active_items() {
            ctx.adjust_stock(item.into(), -item.quantity, &order, "Payment received", actor, now)?;
        }

        if let Some(method) = self.payment_method {
            order.payment_method = Some(method);
        }
        order.payment_amount = Some(self.amount.unwrap_or(order.order_total));
        order.paid_at = Some(self.paid_at.unwrap_or(now));
        order.touch(actor, now);
        ctx.save_order(order.clone());

        tracing::info!(
            order_id = order.order_id,
            amount = ?order.payment_amount,
            note = ?self.note,
            "Payment received"
        );
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
    use shared::order::StockReduceStrategy;

    fn pay(order: OrderRef) -> PaymentReceivedAction {
        PaymentReceivedAction {
            order,
            payment_method: Some(PaymentMethod::WeChat),
            amount: None,
            paid_at: None,
            note: None,
        }
    }

    #[test]
    fn test_payment_by_number_records_fields() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let p = product(1, dec!(10.00));
        let seeded = seed_order(&storage, 1, OrderStatus::PendingPayment, &[(&p, 2)]);
        let products = catalog(vec![p]);

        let (order, outcome) =
            run(&storage, &products, &pay(OrderRef::No(seeded.order_no)), Actor::System).unwrap();

        assert_eq!(order.status, OrderStatus::PaymentReceived);
        assert_eq!(order.payment_method, Some(PaymentMethod::WeChat));
        assert_eq!(order.payment_amount, Some(dec!(20.00)));
        assert_eq!(order.paid_at, Some(NOW));
        assert!(outcome.events.is_empty());
    }

    #[test]
    fn test_withheld_stock_not_taken_twice() {
        let storage = OrderStorage::open_in_memory().unwrap();
        stock(&storage, 1, 8);
        let p = product(1, dec!(10.00));
        seed_order(&storage, 1, OrderStatus::PendingPayment, &[(&p, 2)]);
        let products = catalog(vec![p]);

        run(&storage, &products, &pay(OrderRef::Id(1)), Actor::System).unwrap();
        assert_eq!(total_stock(&storage, 1), 8);
    }

    #[test]
    fn test_deduct_on_payment_takes_stock() {
        let storage = OrderStorage::open_in_memory().unwrap();
        stock(&storage, 1, 10);
        let mut p = product(1, dec!(10.00));
        p.stock_reduce_strategy = StockReduceStrategy::PaymentSuccessDeduct;
        seed_order(&storage, 1, OrderStatus::PendingPayment, &[(&p, 3)]);
        let products = catalog(vec![p]);

        run(&storage, &products, &pay(OrderRef::Id(1)), Actor::System).unwrap();
        assert_eq!(total_stock(&storage, 1), 7);
    }

    #[test]
    fn test_deduct_follows_item_when_catalog_changed() {
        let storage = OrderStorage::open_in_memory().unwrap();
        stock(&storage, 1, 10);
        stock(&storage, 2, 10);
        let mut p1 = product(1, dec!(10.00));
        p1.stock_reduce_strategy = StockReduceStrategy::PaymentSuccessDeduct;
        let p2 = product(2, dec!(5.00));
        seed_order(&storage, 1, OrderStatus::PendingPayment, &[(&p1, 3), (&p2, 1)]);
        // p1 left the catalog, p2 switched strategy since placement
        let mut p2_now = p2.clone();
        p2_now.stock_reduce_strategy = StockReduceStrategy::PaymentSuccessDeduct;
        let products = catalog(vec![p2_now]);

        run(&storage, &products, &pay(OrderRef::Id(1)), Actor::System).unwrap();
        assert_eq!(total_stock(&storage, 1), 7);
        assert_eq!(total_stock(&storage, 2), 10);
    }

    #[test]
    fn test_payment_on_paid_order_rejected() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let p = product(1, dec!(10.00));
        seed_order(&storage, 1, OrderStatus::Shipping, &[(&p, 1)]);
        let products = catalog(vec![p]);

        let err = run(&storage, &products, &pay(OrderRef::Id(1)), Actor::System).unwrap_err();
        assert!(matches!(err, OrderError::IllegalStateTransition { .. }));
    }

    #[test]
    fn test_unknown_order_number() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let products = catalog(vec![]);
        let err = run(&storage, &products, &pay(OrderRef::No(123)), Actor::System).unwrap_err();
        assert!(matches!(err, OrderError::OrderNotFound(_)));
    }
}
