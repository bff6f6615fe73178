//! Checkout quote
//!
//! Prices a prospective order without touching persistent state. The
//! manager resolves products, stock sums and the address; this module only
//! decides orderability and adds up the lines.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{AddressSnapshot, ProductInfo};
use shared::order::round_money;

use crate::orders::actions::{OrderLine, merge_lines};
use crate::orders::money;
use crate::orders::traits::OrderError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: i64,
    pub items: Vec<CheckoutItem>,
    /// Falls back to the customer's default address
    pub address_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: i64,
    pub name: String,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub quantity: i32,
    /// 0 unless the product displays its stock
    pub stock_quantity: i32,
    pub is_allow_to_order: bool,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutQuote {
    pub customer_id: i64,
    pub items: Vec<CheckoutLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<AddressSnapshot>,
    /// Sum over orderable lines only
    pub subtotal: Decimal,
    pub shipping_amount: Decimal,
    pub discount: Decimal,
    pub coupon_code: String,
    pub order_total: Decimal,
}

impl CheckoutRequest {
    /// Shape check plus duplicate merge
    pub fn validated_lines(&self) -> Result<Vec<OrderLine>, OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::Validation("Please add a product".to_string()));
        }
        let lines: Vec<OrderLine> = self
            .items
            .iter()
            .map(|i| OrderLine {
                product_id: i.product_id,
                quantity: i.quantity,
            })
            .collect();
        for line in &lines {
            money::require_quantity(line.quantity, line.product_id)?;
        }
        Ok(merge_lines(&lines))
    }
}

/// Quote one line from the product and its enabled stock sum
fn quote_line(product: &ProductInfo, quantity: i32, available: i32) -> CheckoutLine {
    let mut stock_quantity = available;
    let mut allowed = product.is_allow_to_order;
    if !product.is_published {
        allowed = false;
        stock_quantity = 0;
    }
    if allowed && product.stock_tracking_enabled && stock_quantity <= 0 {
        allowed = false;
    }
    if !product.display_stock_quantity {
        stock_quantity = 0;
    }

    CheckoutLine {
        product_id: product.id,
        name: product.name.clone(),
        price: product.price,
        image: product.thumbnail_url.clone(),
        quantity,
        stock_quantity: stock_quantity.max(0),
        is_allow_to_order: allowed,
        line_total: round_money(product.price * Decimal::from(quantity)),
    }
}

/// Build the quote. `stock` maps product id to the sum of its enabled lines.
pub fn build_quote(
    customer_id: i64,
    lines: &[OrderLine],
    products: &HashMap<i64, ProductInfo>,
    stock: &HashMap<i64, i32>,
    address_id: Option<i64>,
    address: Option<AddressSnapshot>,
) -> Result<CheckoutQuote, OrderError> {
    let items: Vec<CheckoutLine> = lines
        .iter()
        .filter_map(|line| {
            let product = products.get(&line.product_id)?;
            let available = stock.get(&line.product_id).copied().unwrap_or(0);
            Some(quote_line(product, line.quantity, available))
        })
        .collect();
    if items.is_empty() {
        return Err(OrderError::EmptyCart);
    }

    let subtotal: Decimal = items
        .iter()
        .filter(|l| l.is_allow_to_order)
        .map(|l| l.line_total)
        .sum();

    Ok(CheckoutQuote {
        customer_id,
        items,
        address_id: address.as_ref().and(address_id),
        address,
        subtotal,
        shipping_amount: Decimal::ZERO,
        discount: Decimal::ZERO,
        coupon_code: String::new(),
        order_total: subtotal,
    })
}
