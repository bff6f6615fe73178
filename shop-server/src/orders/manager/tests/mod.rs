use super::*;
use crate::orders::checkout::CheckoutItem;
use crate::services::memory::MemoryServices;
use rust_decimal_macros::dec;
use shared::models::AddressSnapshot;
use shared::order::{
    CommandError, CommandErrorCode, EventPayload, OrderStatus, PaymentMethod, ShippingStatus,
    StockReduceStrategy,
};

const CUSTOMER: i64 = 42;
const ADDRESS: i64 = 1;
const ADMIN: Actor = Actor::Admin(7);

struct TestShop {
    manager: OrdersManager,
    services: MemoryServices,
}

fn shop_product(id: i64, price: Decimal) -> ProductInfo {
    ProductInfo {
        id,
        name: format!("Product {}", id),
        price,
        is_published: true,
        is_allow_to_order: true,
        stock_tracking_enabled: true,
        stock_reduce_strategy: StockReduceStrategy::PlaceOrderWithhold,
        thumbnail_url: None,
        display_stock_quantity: false,
    }
}

fn home_address() -> AddressSnapshot {
    AddressSnapshot {
        contact_name: "Alice".to_string(),
        phone: "555-0100".to_string(),
        city: "Springfield".to_string(),
        zip_code: "12345".to_string(),
        address_line1: "1 Main St".to_string(),
        ..Default::default()
    }
}

/// Shop with products 1 (10.00) and 2 (5.00), ten of each in stock,
/// customer 42 with address 1 and a bound payment account
fn create_test_shop() -> TestShop {
    let storage = OrderStorage::open_in_memory().unwrap();
    let services = MemoryServices::new(30, 60, 120);
    let config = Config::with_work_dir("./unused");
    let manager = OrdersManager::new(storage, services.services(), &config);

    services.catalog.upsert(shop_product(1, dec!(10.00)));
    services.catalog.upsert(shop_product(2, dec!(5.00)));
    services.customers.add_customer(CUSTOMER, Some("openid-42"));
    services.customers.add_address(ADDRESS, CUSTOMER, home_address());
    put_stock(&manager, 1, 10);
    put_stock(&manager, 2, 10);

    TestShop { manager, services }
}

fn put_stock(manager: &OrdersManager, product_id: i64, quantity: i32) {
    manager
        .storage()
        .put_stock_line(&StockLine::new(product_id, 1, quantity, 0))
        .unwrap();
}

fn stock_of(manager: &OrdersManager, product_id: i64) -> i32 {
    inventory::available_quantity(&manager.get_stock_lines(product_id).unwrap())
}

fn order_params(items: &[(i64, i32)]) -> CreateOrderParams {
    CreateOrderParams {
        customer_id: CUSTOMER,
        items: items
            .iter()
            .map(|&(product_id, quantity)| OrderItemParam { product_id, quantity })
            .collect(),
        shipping_address_id: ADDRESS,
        billing_address_id: None,
        shipping_method: Default::default(),
        payment_type: Default::default(),
        shipping_fee: Decimal::ZERO,
        discount: Decimal::ZERO,
        order_note: None,
        admin_note: None,
    }
}

async fn place_order(shop: &TestShop, items: &[(i64, i32)]) -> Order {
    shop.manager
        .create_order(Actor::Customer(CUSTOMER), order_params(items))
        .await
        .unwrap()
}

async fn pay(shop: &TestShop, order_id: i64) -> Order {
    shop.manager
        .payment_received(PaymentReceivedParams {
            order_id: Some(order_id),
            ..Default::default()
        })
        .await
        .unwrap()
}

fn ship_all(order: &Order) -> ShipmentParams {
    ShipmentParams {
        tracking_number: Some("TRACK-1".to_string()),
        items: order
            .active_items()
            .map(|i| ShipmentItemParam {
                order_item_id: i.id,
                quantity: i.quantity,
            })
            .collect(),
        ..Default::default()
    }
}

fn error_code(err: ManagerError) -> CommandErrorCode {
    CommandError::from(err).code
}

mod test_concurrency;
