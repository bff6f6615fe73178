//! Fixtures shared by the action tests

use std::collections::HashMap;

use rust_decimal::Decimal;
use shared::models::{AddressSnapshot, OrderAddress, ProductInfo, StockLine};
use shared::order::{AddressType, Order, OrderItem, OrderStatus, StockReduceStrategy};

use crate::orders::storage::OrderStorage;
use crate::orders::traits::{
    Actor, CommandContext, CommandHandler, CommandMetadata, CommandOutcome, OrderError,
    OrderTimings,
};

pub const NOW: i64 = 1_700_000_000_000;

pub fn timings() -> OrderTimings {
    OrderTimings {
        auto_cancel_minutes: 30,
        auto_complete_minutes: 60,
        auto_review_minutes: 120,
    }
}

pub fn metadata(actor: Actor) -> CommandMetadata {
    CommandMetadata::new(actor, NOW)
}

pub fn product(id: i64, price: Decimal) -> ProductInfo {
    ProductInfo {
        id,
        name: format!("Product {}", id),
        price,
        is_published: true,
        is_allow_to_order: true,
        stock_tracking_enabled: true,
        stock_reduce_strategy: StockReduceStrategy::PlaceOrderWithhold,
        thumbnail_url: Some(format!("/img/{}.png", id)),
        display_stock_quantity: false,
    }
}

pub fn catalog(products: Vec<ProductInfo>) -> HashMap<i64, ProductInfo> {
    products.into_iter().map(|p| (p.id, p)).collect()
}

pub fn address() -> OrderAddress {
    OrderAddress::new(
        AddressType::Shipping,
        AddressSnapshot {
            contact_name: "Alice".to_string(),
            phone: "555-0100".to_string(),
            city: "Springfield".to_string(),
            zip_code: "12345".to_string(),
            address_line1: "1 Main St".to_string(),
            ..Default::default()
        },
    )
}

pub fn stock(storage: &OrderStorage, product_id: i64, quantity: i32) {
    storage
        .put_stock_line(&StockLine::new(product_id, 1, quantity, 0))
        .unwrap();
}

pub fn total_stock(storage: &OrderStorage, product_id: i64) -> i32 {
    storage
        .get_stock_lines(product_id)
        .unwrap()
        .iter()
        .map(|l| l.quantity)
        .sum()
}

/// Store an order with one item per `(product, quantity)` directly
pub fn seed_order(
    storage: &OrderStorage,
    order_id: i64,
    status: OrderStatus,
    items: &[(&ProductInfo, i32)],
) -> Order {
    let mut order = Order::new(order_id, 9_000 + order_id, 42, 42, NOW - 1_000);
    order.status = status;
    order.shipping_address = Some(address());
    for (idx, (product, quantity)) in items.iter().enumerate() {
        order.items.push(OrderItem {
            id: order_id * 100 + idx as i64,
            product_id: product.id,
            product_name: product.name.clone(),
            product_price: product.price,
            product_image: None,
            quantity: *quantity,
            stock_tracking_enabled: product.stock_tracking_enabled,
            stock_reduce_strategy: product.stock_reduce_strategy,
            shipped_quantity: 0,
            discount_amount: Decimal::ZERO,
            item_amount: Decimal::ZERO,
            deleted: false,
            created_at: NOW - 1_000,
            updated_at: NOW - 1_000,
        });
    }
    order.recalculate_totals();
    let txn = storage.begin_write().unwrap();
    storage.store_order(&txn, &order).unwrap();
    txn.commit().unwrap();
    order
}

/// Product ids the fixtures hold stock locks for
const LOCKED: &[i64] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

/// Execute an action in its own transaction and commit on success
pub fn run(
    storage: &OrderStorage,
    products: &HashMap<i64, ProductInfo>,
    action: &dyn CommandHandler,
    actor: Actor,
) -> Result<(Order, CommandOutcome), OrderError> {
    run_with_locks(storage, products, LOCKED, action, actor)
}

/// [`run`] holding only the given product locks
pub fn run_with_locks(
    storage: &OrderStorage,
    products: &HashMap<i64, ProductInfo>,
    locked: &[i64],
    action: &dyn CommandHandler,
    actor: Actor,
) -> Result<(Order, CommandOutcome), OrderError> {
    let txn = storage.begin_write()?;
    let mut ctx = CommandContext::new(&txn, storage, products, locked, timings());
    let order = action.execute(&mut ctx, &metadata(actor))?;
    let outcome = ctx.finish()?;
    txn.commit().map_err(crate::orders::storage::StorageError::from)?;
    Ok((order, outcome))
}
