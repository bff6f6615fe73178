//! Order aggregate - the persisted state of one order
//!
//! Items and addresses are embedded in the order record, so one storage
//! write covers the whole aggregate. Nothing is ever hard-deleted: items,
//! addresses and the order itself carry a `deleted` flag.

use super::types::{
    OrderStatus, PaymentMethod, PaymentType, RefundStatus, ShippingMethod, ShippingStatus,
    StockReduceStrategy,
};
use crate::models::OrderAddress;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Round a monetary value to 2 decimal places, half-up
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn tracking_default() -> bool {
    true
}

/// Order line item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: i64,
    pub product_id: i64,
    /// Snapshot of the product name at order time
    pub product_name: String,
    /// Snapshot of the unit price at order time
    pub product_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_image: Option<String>,
    pub quantity: i32,
    /// Whether the product tracked stock when the item was added
    #[serde(default = "tracking_default")]
    pub stock_tracking_enabled: bool,
    /// Strategy the item's stock was taken under
    #[serde(default)]
    pub stock_reduce_strategy: StockReduceStrategy,
    /// Always within `0..=quantity`
    pub shipped_quantity: i32,
    pub discount_amount: Decimal,
    /// `quantity * product_price - discount_amount`
    pub item_amount: Decimal,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl OrderItem {
    pub fn recalculate_amount(&mut self) {
        self.item_amount =
            round_money(self.product_price * Decimal::from(self.quantity) - self.discount_amount);
    }

    pub fn remaining_to_ship(&self) -> i32 {
        self.quantity - self.shipped_quantity
    }

    pub fn is_fully_shipped(&self) -> bool {
        self.shipped_quantity >= self.quantity
    }
}

/// Order aggregate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub order_id: i64,
    /// Customer-visible order number, globally unique
    pub order_no: i64,
    pub customer_id: i64,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_status: Option<ShippingStatus>,
    pub shipping_method: ShippingMethod,
    pub payment_type: PaymentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,

    // === Addresses (snapshots) ===
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<OrderAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<OrderAddress>,

    pub items: Vec<OrderItem>,

    // === Totals ===
    pub subtotal: Decimal,
    /// Sum of item-level discounts
    pub subtotal_with_discount: Decimal,
    pub shipping_fee: Decimal,
    /// Order-level discount
    pub discount: Decimal,
    pub order_total: Decimal,

    // === Payment ===
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<i64>,
    /// Unpaid orders are cancelled after this instant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_end_on: Option<i64>,

    // === Refund ===
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_status: Option<RefundStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_at: Option<i64>,

    // === Shipping timeline ===
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<i64>,
    /// Auto-complete deadline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_end_on: Option<i64>,

    // === Notes ===
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_hold_reason: Option<String>,

    #[serde(default)]
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub created_by: i64,
    pub updated_by: i64,
}

impl Order {
    /// Empty order in `New` status
    pub fn new(order_id: i64, order_no: i64, customer_id: i64, actor: i64, now: i64) -> Self {
        Self {
            order_id,
            order_no,
            customer_id,
            status: OrderStatus::New,
            shipping_status: None,
            shipping_method: ShippingMethod::default(),
            payment_type: PaymentType::default(),
            payment_method: None,
            shipping_address: None,
            billing_address: None,
            items: Vec::new(),
            subtotal: Decimal::ZERO,
            subtotal_with_discount: Decimal::ZERO,
            shipping_fee: Decimal::ZERO,
            discount: Decimal::ZERO,
            order_total: Decimal::ZERO,
            payment_amount: None,
            paid_at: None,
            payment_end_on: None,
            refund_status: None,
            refund_amount: None,
            refund_reason: None,
            refund_at: None,
            shipped_at: None,
            delivered_at: None,
            delivered_end_on: None,
            order_note: None,
            admin_note: None,
            cancel_reason: None,
            canceled_at: None,
            on_hold_reason: None,
            deleted: false,
            created_at: now,
            updated_at: now,
            created_by: actor,
            updated_by: actor,
        }
    }

    /// Items that have not been soft-deleted
    pub fn active_items(&self) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(|i| !i.deleted)
    }

    pub fn active_items_mut(&mut self) -> impl Iterator<Item = &mut OrderItem> {
        self.items.iter_mut().filter(|i| !i.deleted)
    }

    pub fn find_item(&self, item_id: i64) -> Option<&OrderItem> {
        self.active_items().find(|i| i.id == item_id)
    }

    pub fn find_item_by_product(&self, product_id: i64) -> Option<&OrderItem> {
        self.active_items().find(|i| i.product_id == product_id)
    }

    /// True when there is at least one active item and all are fully shipped
    pub fn all_items_shipped(&self) -> bool {
        let mut any = false;
        for item in self.active_items() {
            any = true;
            if !item.is_fully_shipped() {
                return false;
            }
        }
        any
    }

    /// Recompute item amounts and order totals from active items
    ///
    /// `order_total = subtotal + shipping_fee - subtotal_with_discount - discount`
    pub fn recalculate_totals(&mut self) {
        let mut subtotal = Decimal::ZERO;
        let mut item_discounts = Decimal::ZERO;
        for item in self.active_items_mut() {
            item.recalculate_amount();
            subtotal += item.product_price * Decimal::from(item.quantity);
            item_discounts += item.discount_amount;
        }
        self.subtotal = round_money(subtotal);
        self.subtotal_with_discount = round_money(item_discounts);
        self.shipping_fee = round_money(self.shipping_fee);
        self.discount = round_money(self.discount);
        self.order_total =
            self.subtotal + self.shipping_fee - self.subtotal_with_discount - self.discount;
    }

    /// Check the total invariant without modifying anything
    pub fn totals_consistent(&self) -> bool {
        self.order_total
            == self.subtotal + self.shipping_fee - self.subtotal_with_discount - self.discount
    }

    pub fn touch(&mut self, actor: i64, now: i64) {
        self.updated_at = now;
        self.updated_by = actor;
    }
}

/// One line of a shipment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShipmentItem {
    pub order_item_id: i64,
    pub product_id: i64,
    pub quantity: i32,
}

/// Record of one shipment call against an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shipment {
    pub id: u64,
    pub order_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_weight: Option<Decimal>,
    pub items: Vec<ShipmentItem>,
    pub shipped_at: i64,
    pub created_by: i64,
}

/// Status change log entry, written by the history consumer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderHistoryEntry {
    pub order_id: i64,
    pub sequence: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub note: String,
    pub operator_id: i64,
    pub created_at: i64,
}
