//! EditOrder command handler (admin)
//!
//! Replaces the item set and optionally overrides order fields. Stock moves
//! by the quantity difference per product, evaluated against the status the
//! order had before the edit. Items dropped from the set are soft-deleted
//! and their stock is not returned.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{AddressSnapshot, OrderAddress};
use shared::order::{
    AddressType, EventPayload, Order, OrderEvent, OrderItem, OrderStatus, PaymentMethod,
    PaymentType, RefundStatus, ShippingMethod, ShippingStatus,
};

use crate::inventory::StockTarget;
use crate::orders::money;
use crate::orders::traits::{CommandContext, CommandHandler, CommandMetadata, OrderError};

/// Desired state of one line after the edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditOrderItem {
    pub product_id: i64,
    pub quantity: i32,
    pub product_price: Decimal,
    pub discount_amount: Decimal,
}

/// Requested changes. `None` fields are left as they are.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditOrderParams {
    pub items: Vec<EditOrderItem>,
    #[serde(default)]
    pub shipping_address: Option<AddressSnapshot>,
    #[serde(default)]
    pub billing_address: Option<AddressSnapshot>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub shipping_status: Option<ShippingStatus>,
    #[serde(default)]
    pub shipping_method: Option<ShippingMethod>,
    #[serde(default)]
    pub payment_type: Option<PaymentType>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub shipping_fee: Option<Decimal>,
    #[serde(default)]
    pub discount: Option<Decimal>,
    #[serde(default)]
    pub order_note: Option<String>,
    #[serde(default)]
    pub admin_note: Option<String>,
    #[serde(default)]
    pub refund_status: Option<RefundStatus>,
    #[serde(default)]
    pub refund_amount: Option<Decimal>,
    #[serde(default)]
    pub refund_reason: Option<String>,
}

/// EditOrder action
#[derive(Debug, Clone)]
pub struct EditOrderAction {
    pub order_id: i64,
    pub params: EditOrderParams,
}

impl EditOrderParams {
    fn validate_items(&self) -> Result<(), OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::Validation("Please add a product".to_string()));
        }
        for (idx, item) in self.items.iter().enumerate() {
            money::require_quantity(item.quantity, item.product_id)?;
            money::require_amount(item.product_price, "product_price")?;
            money::require_amount(item.discount_amount, "discount_amount")?;
            if self.items[..idx].iter().any(|i| i.product_id == item.product_id) {
                return Err(OrderError::Validation(format!(
                    "Product {} appears more than once",
                    item.product_id
                )));
            }
        }
        money::require_optional_amount(self.shipping_fee, "shipping_fee")?;
        money::require_optional_amount(self.discount, "discount")?;
        money::require_optional_amount(self.refund_amount, "refund_amount")?;
        Ok(())
    }

    fn apply_fields(&self, order: &mut Order) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(shipping_status) = self.shipping_status {
            order.shipping_status = Some(shipping_status);
        }
        if let Some(method) = self.shipping_method {
            order.shipping_method = method;
        }
        if let Some(payment_type) = self.payment_type {
            order.payment_type = payment_type;
        }
        if let Some(method) = self.payment_method {
            order.payment_method = Some(method);
        }
        if let Some(fee) = self.shipping_fee {
            order.shipping_fee = fee;
        }
        if let Some(discount) = self.discount {
            order.discount = discount;
        }
        if self.order_note.is_some() {
            order.order_note = self.order_note.clone();
        }
        if self.admin_note.is_some() {
            order.admin_note = self.admin_note.clone();
        }
        if let Some(refund_status) = self.refund_status {
            order.refund_status = Some(refund_status);
        }
        if let Some(amount) = self.refund_amount {
            order.refund_amount = Some(amount);
        }
        if self.refund_reason.is_some() {
            order.refund_reason = self.refund_reason.clone();
        }
    }
}

fn replace_address(slot: &mut Option<OrderAddress>, address_type: AddressType, snapshot: &AddressSnapshot) {
    match slot {
        Some(existing) => existing.address = snapshot.clone(),
        None => *slot = Some(OrderAddress::new(address_type, snapshot.clone())),
    }
}

impl CommandHandler for EditOrderAction {
    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Order, OrderError> {
        let params = &self.params;
        params.validate_items()?;
        let mut order = ctx.load_order(self.order_id)?;
        ctx.ensure_locked(&order)?;

        let now = metadata.timestamp;
        let actor = metadata.actor.id();
        let old_status = order.status;

        // Stock moves against the pre-edit order
        let before = order.clone();
        for wanted in &params.items {
            let product = match ctx.product(wanted.product_id) {
                Some(p) if p.is_orderable() => p,
                _ => {
                    return Err(OrderError::ProductUnavailable(format!(
                        "Product {} cannot be ordered",
                        wanted.product_id
                    )));
                }
            };

            // existing items move under the settings they were placed with
            let (target, delta) = match before.find_item_by_product(wanted.product_id) {
                Some(existing) => {
                    if wanted.quantity < existing.shipped_quantity {
                        return Err(OrderError::Validation(format!(
                            "Item {} already shipped {}, cannot reduce to {}",
                            existing.id, existing.shipped_quantity, wanted.quantity
                        )));
                    }
                    (StockTarget::from(existing), existing.quantity - wanted.quantity)
                }
                None => (StockTarget::from(product), -wanted.quantity),
            };
            ctx.adjust_stock(target, delta, &before, "Edit order", actor, now)?;

            let existing = order
                .items
                .iter()
                .position(|i| !i.deleted && i.product_id == wanted.product_id);
            match existing {
                Some(idx) => {
                    let item = &mut order.items[idx];
                    item.quantity = wanted.quantity;
                    item.product_price = wanted.product_price;
                    item.discount_amount = wanted.discount_amount;
                    item.updated_at = now;
                }
                None => order.items.push(OrderItem {
                    id: ctx.next_item_id()?,
                    product_id: product.id,
                    product_name: product.name.clone(),
                    product_price: wanted.product_price,
                    product_image: product.thumbnail_url.clone(),
                    quantity: wanted.quantity,
                    stock_tracking_enabled: product.stock_tracking_enabled,
                    stock_reduce_strategy: product.stock_reduce_strategy,
                    shipped_quantity: 0,
                    discount_amount: wanted.discount_amount,
                    item_amount: Decimal::ZERO,
                    deleted: false,
                    created_at: now,
                    updated_at: now,
                }),
            }
        }

        for item in order.active_items_mut() {
            if !params.items.iter().any(|w| w.product_id == item.product_id) {
                item.deleted = true;
                item.updated_at = now;
            }
        }

        if let Some(snapshot) = &params.shipping_address {
            replace_address(&mut order.shipping_address, AddressType::Shipping, snapshot);
        }
        if let Some(snapshot) = &params.billing_address {
            replace_address(&mut order.billing_address, AddressType::Billing, snapshot);
        }
        params.apply_fields(&mut order);
        order.recalculate_totals();
        order.touch(actor, now);

        ctx.emit(OrderEvent::new(
            order.order_id,
            actor,
            now,
            EventPayload::OrderChanged {
                old_status,
                new_status: order.status,
                note: params.admin_note.clone().unwrap_or_default(),
            },
        ));
        ctx.save_order(order.clone());

        tracing::info!(order_id = self.order_id, total = %order.order_total, "Order edited");
        Ok(order)
    }
}
