//! Request shapes accepted by the manager

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::order::{PaymentMethod, PaymentType, ShippingMethod};
use validator::Validate;

use super::super::actions::{OrderLine, ShipmentLine};

/// Longest note accepted on an order
pub const MAX_NOTE_LENGTH: u64 = 450;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemParam {
    pub product_id: i64,
    pub quantity: i32,
}

impl From<OrderItemParam> for OrderLine {
    fn from(p: OrderItemParam) -> Self {
        OrderLine {
            product_id: p.product_id,
            quantity: p.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateOrderParams {
    pub customer_id: i64,
    #[validate(length(min = 1, message = "Please add a product"))]
    pub items: Vec<OrderItemParam>,
    pub shipping_address_id: i64,
    #[serde(default)]
    pub billing_address_id: Option<i64>,
    #[serde(default)]
    pub shipping_method: ShippingMethod,
    #[serde(default)]
    pub payment_type: PaymentType,
    #[serde(default)]
    pub shipping_fee: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    #[validate(length(max = 450, message = "Order note is too long"))]
    pub order_note: Option<String>,
    #[serde(default)]
    #[validate(length(max = 450, message = "Admin note is too long"))]
    pub admin_note: Option<String>,
}

/// Payment notification; the order is matched by id first, then by number
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceivedParams {
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub order_no: Option<i64>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub paid_at: Option<i64>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentItemParam {
    pub order_item_id: i64,
    pub quantity: i32,
}

impl From<ShipmentItemParam> for ShipmentLine {
    fn from(p: ShipmentItemParam) -> Self {
        ShipmentLine {
            order_item_id: p.order_item_id,
            quantity: p.quantity,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ShipmentParams {
    #[serde(default)]
    #[validate(length(max = 450, message = "Tracking number is too long"))]
    pub tracking_number: Option<String>,
    #[serde(default)]
    #[validate(length(max = 450, message = "Comment is too long"))]
    pub admin_comment: Option<String>,
    #[serde(default)]
    pub total_weight: Option<Decimal>,
    #[serde(default)]
    pub items: Vec<ShipmentItemParam>,
}
