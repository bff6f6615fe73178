use super::*;
use crate::orders::actions::EditOrderItem;
use crate::services::SettingsProvider;
use crate::services::memory::MemorySettings;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Settings that park the first lookup until released, holding its caller
/// between the order read and the stock locks
struct GatedSettings {
    inner: Arc<MemorySettings>,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

#[async_trait::async_trait]
impl SettingsProvider for GatedSettings {
    async fn get_minutes(&self, key: SettingKey) -> crate::services::ServiceResult<i64> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.get_minutes(key).await
    }
}

// Twenty customers race for five units of the same product
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_never_oversell() {
    let shop = create_test_shop();
    put_stock(&shop.manager, 1, 5);
    let manager = Arc::new(shop.manager);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .create_order(Actor::Customer(CUSTOMER), order_params(&[(1, 1)]))
                .await
        }));
    }

    let mut placed = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(err) => {
                assert_eq!(error_code(err), CommandErrorCode::InsufficientStock);
                rejected += 1;
            }
        }
    }

    assert_eq!(placed, 5);
    assert_eq!(rejected, 15);
    assert_eq!(stock_of(&manager, 1), 0);
    assert_eq!(manager.list_customer_orders(CUSTOMER).unwrap().len(), 5);
    assert_eq!(manager.get_stock_history(1).unwrap().len(), 5);
}

// Placements and cancellations interleave; the ledger must balance
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_place_and_cancel_conserve_stock() {
    let shop = create_test_shop();
    let manager = Arc::new(shop.manager);

    let mut handles = Vec::new();
    for i in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            let order = manager
                .create_order(Actor::Customer(CUSTOMER), order_params(&[(1, 1), (2, 1)]))
                .await?;
            if i % 2 == 0 {
                manager
                    .cancel_order(Actor::Customer(CUSTOMER), order.order_id, None)
                    .await?;
            }
            Ok::<_, ManagerError>(())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let open: i32 = manager
        .list_customer_orders(CUSTOMER)
        .unwrap()
        .iter()
        .filter(|o| o.status == OrderStatus::PendingPayment)
        .count() as i32;
    assert_eq!(open, 4);
    assert_eq!(stock_of(&manager, 1), 10 - open);
    assert_eq!(stock_of(&manager, 2), 10 - open);

    let delta: i32 = manager
        .get_stock_history(1)
        .unwrap()
        .iter()
        .map(|h| h.adjusted_quantity)
        .sum();
    assert_eq!(delta, -open);
}

// Random basket sizes against a small stock: whatever wins, nothing oversells
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_random_quantities_never_oversell() {
    use rand::Rng;

    let shop = create_test_shop();
    put_stock(&shop.manager, 1, 7);
    let manager = Arc::new(shop.manager);

    let mut rng = rand::thread_rng();
    let mut handles = Vec::new();
    for _ in 0..12 {
        let quantity: i32 = rng.gen_range(1..=3);
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .create_order(Actor::Customer(CUSTOMER), order_params(&[(1, quantity)]))
                .await
                .map(|_| quantity)
        }));
    }

    let mut sold = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(quantity) => sold += quantity,
            Err(err) => assert_eq!(error_code(err), CommandErrorCode::InsufficientStock),
        }
    }

    assert!(sold <= 7);
    assert!(sold >= 5, "a rejected basket of at most 3 leaves at most 2 units");
    assert_eq!(stock_of(&manager, 1), 7 - sold);
}

// An admin adds a product while a cancel is between its read and its locks
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_edit_during_cancel_restores_added_item() {
    let shop = create_test_shop();
    let order = place_order(&shop, &[(1, 1)]).await;
    assert_eq!(stock_of(&shop.manager, 1), 9);

    let gate = Arc::new(GatedSettings {
        inner: shop.services.settings.clone(),
        armed: AtomicBool::new(true),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let mut services = shop.services.services();
    services.settings = gate.clone();
    let manager = Arc::new(OrdersManager::new(
        shop.manager.storage().clone(),
        services,
        &Config::with_work_dir("./unused"),
    ));

    let cancel = {
        let manager = manager.clone();
        let order_id = order.order_id;
        tokio::spawn(async move {
            manager
                .cancel_order(Actor::Customer(CUSTOMER), order_id, None)
                .await
        })
    };
    gate.entered.notified().await;

    let edited = manager
        .edit_order(
            ADMIN,
            order.order_id,
            EditOrderParams {
                items: vec![
                    EditOrderItem {
                        product_id: 1,
                        quantity: 1,
                        product_price: dec!(10.00),
                        discount_amount: Decimal::ZERO,
                    },
                    EditOrderItem {
                        product_id: 2,
                        quantity: 3,
                        product_price: dec!(5.00),
                        discount_amount: Decimal::ZERO,
                    },
                ],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.active_items().count(), 2);
    assert_eq!(stock_of(&manager, 2), 7);

    gate.release.notify_one();
    let cancelled = cancel.await.unwrap().unwrap();

    assert_eq!(cancelled.status, OrderStatus::Canceled);
    assert_eq!(stock_of(&manager, 1), 10);
    assert_eq!(stock_of(&manager, 2), 10);
    let net: i32 = manager
        .get_stock_history(2)
        .unwrap()
        .iter()
        .map(|h| h.adjusted_quantity)
        .sum();
    assert_eq!(net, 0);
}
