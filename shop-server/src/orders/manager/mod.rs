//! OrdersManager - entry point of every order operation
//!
//! # Operation Flow
//!
//! ```text
//! operation(params)
//!     ├─ 1. Validate input
//!     ├─ 2. Resolve collaborators (catalog, directory, settings)  [async, nothing held]
//!     ├─ 3. Acquire stock locks for the touched products          [async, bounded retry]
//!     ├─ 4. Begin write transaction, build CommandContext
//!     ├─ 5. Execute the action                                    [sync]
//!     ├─ 6. Persist order, stock lines, history and jobs
//!     ├─ 7. Commit, release locks
//!     └─ 8. Broadcast events, wake the job worker
//! ```
//!
//! Any error before step 7 drops the transaction; nothing buffered in the
//! context survives. Operations on a stored order repeat steps 2-7 when the
//! order gained a product between its read and the locks.

mod error;
mod params;

pub use error::*;
pub use params::*;

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use shared::models::{OrderAddress, ProductInfo, StockHistory, StockLine};
use shared::order::{AddressType, Order, OrderEvent, OrderHistoryEntry, Shipment};
use shared::util::now_millis;
use tokio::sync::{Notify, broadcast};
use validator::Validate;

use super::actions::{
    AutoCompleteAction, CancelOrderAction, CommandAction, ConfirmReceiptAction,
    CreateOrderAction, CreateShipmentAction, DelayReceiptAction, DeleteOrderAction,
    EditOrderAction, EditOrderParams, HoldOrderAction, OrderLine, OrderRef,
    PaymentReceivedAction,
};
use super::checkout::{self, CheckoutQuote, CheckoutRequest};
use super::storage::{OrderStorage, StorageError};
use super::traits::{
    Actor, CommandContext, CommandHandler, CommandMetadata, CommandOutcome, OrderError,
    OrderTimings,
};
use crate::core::Config;
use crate::inventory::{self, StockLocks};
use crate::scheduler::ScheduledAction;
use crate::services::{PaymentIntent, PaymentOrderRequest, Services, SettingKey};

/// Event broadcast channel capacity
const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Reads of an order before its stock locks are taken
const SNAPSHOT_ATTEMPTS: u32 = 3;

/// Reason recorded on orders cancelled by the payment deadline
pub const AUTO_CANCEL_REASON: &str = "Payment timed out";

pub struct OrdersManager {
    storage: OrderStorage,
    event_tx: broadcast::Sender<OrderEvent>,
    locks: StockLocks,
    services: Services,
    shop_name: String,
    /// Wakes the job worker when new jobs were committed
    job_notify: Arc<Notify>,
}

impl std::fmt::Debug for OrdersManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrdersManager")
            .field("storage", &"<OrderStorage>")
            .field("event_tx", &"<broadcast::Sender>")
            .field("shop_name", &self.shop_name)
            .finish()
    }
}

fn unique_ids(ids: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut ids: Vec<i64> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

impl OrdersManager {
    pub fn new(storage: OrderStorage, services: Services, config: &Config) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            storage,
            event_tx,
            locks: StockLocks::new(config.stock_lock_timeout(), config.stock_lock_max_attempts),
            services,
            shop_name: config.shop_name.clone(),
            job_notify: Arc::new(Notify::new()),
        }
    }

    /// Subscribe to committed order events
    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.event_tx.subscribe()
    }

    pub fn storage(&self) -> &OrderStorage {
        &self.storage
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn job_notify(&self) -> Arc<Notify> {
        self.job_notify.clone()
    }

    // ========== Reads ==========

    pub fn get_order(&self, order_id: i64) -> ManagerResult<Option<Order>> {
        Ok(self.storage.get_order(order_id)?)
    }

    pub fn get_order_by_no(&self, order_no: i64) -> ManagerResult<Option<Order>> {
        Ok(self.storage.get_order_by_no(order_no)?)
    }

    pub fn list_customer_orders(&self, customer_id: i64) -> ManagerResult<Vec<Order>> {
        Ok(self.storage.list_customer_orders(customer_id)?)
    }

    pub fn get_shipments(&self, order_id: i64) -> ManagerResult<Vec<Shipment>> {
        Ok(self.storage.get_shipments(order_id)?)
    }

    pub fn get_order_history(&self, order_id: i64) -> ManagerResult<Vec<OrderHistoryEntry>> {
        Ok(self.storage.get_order_history(order_id)?)
    }

    pub fn get_stock_lines(&self, product_id: i64) -> ManagerResult<Vec<StockLine>> {
        Ok(self.storage.get_stock_lines(product_id)?)
    }

    pub fn get_stock_history(&self, product_id: i64) -> ManagerResult<Vec<StockHistory>> {
        Ok(self.storage.get_stock_history(product_id)?)
    }

    // ========== Checkout ==========

    /// Price a prospective order without changing anything
    pub async fn checkout(&self, request: CheckoutRequest) -> ManagerResult<CheckoutQuote> {
        let lines = request.validated_lines()?;
        let customer_id = request.customer_id;
        if !self.services.customers.customer_exists(customer_id).await? {
            return Err(OrderError::CustomerNotFound(customer_id).into());
        }

        let ids = unique_ids(lines.iter().map(|l| l.product_id));
        let products = self.fetch_products(&ids).await?;
        let mut stock = HashMap::with_capacity(products.len());
        for product_id in products.keys() {
            let lines = self.storage.get_stock_lines(*product_id)?;
            stock.insert(*product_id, inventory::available_quantity(&lines));
        }

        let (address_id, address) = match request.address_id {
            Some(id) => {
                let address = self
                    .services
                    .customers
                    .resolve_address(id, customer_id, AddressType::Shipping)
                    .await?
                    .ok_or(OrderError::AddressNotFound(id))?;
                (Some(id), Some(address))
            }
            None => match self.services.customers.default_address_id(customer_id).await? {
                Some(id) => {
                    let address = self
                        .services
                        .customers
                        .resolve_address(id, customer_id, AddressType::Shipping)
                        .await?;
                    (Some(id), address)
                }
                None => (None, None),
            },
        };

        Ok(checkout::build_quote(
            customer_id,
            &lines,
            &products,
            &stock,
            address_id,
            address,
        )?)
    }

    // ========== Creation ==========

    pub async fn create_order(&self, actor: Actor, params: CreateOrderParams) -> ManagerResult<Order> {
        params
            .validate()
            .map_err(|e| ManagerError::validation(e.to_string()))?;
        let customer_id = params.customer_id;
        if matches!(actor, Actor::Customer(id) if id != customer_id) {
            return Err(ManagerError::validation("Customers can only order for themselves"));
        }
        if !self.services.customers.customer_exists(customer_id).await? {
            return Err(OrderError::CustomerNotFound(customer_id).into());
        }

        let shipping = self
            .resolve_order_address(params.shipping_address_id, customer_id, AddressType::Shipping)
            .await?;
        let billing = match params.billing_address_id {
            Some(id) => Some(
                self.resolve_order_address(id, customer_id, AddressType::Billing)
                    .await?,
            ),
            None => None,
        };

        let lines: Vec<OrderLine> = params.items.iter().map(|&i| i.into()).collect();
        let ids = unique_ids(lines.iter().map(|l| l.product_id));
        let products = self.fetch_products(&ids).await?;

        let action = CreateOrderAction {
            customer_id,
            lines,
            shipping_address: shipping,
            billing_address: billing,
            shipping_method: params.shipping_method,
            payment_type: params.payment_type,
            shipping_fee: params.shipping_fee,
            discount: params.discount,
            order_note: params.order_note,
            admin_note: params.admin_note,
        };
        self.run(CommandAction::CreateOrder(action), actor, products, ids)
            .await
    }

    /// Place a new order with the active items of an earlier one
    pub async fn reorder(
        &self,
        customer_id: i64,
        source_order_id: i64,
        shipping_address_id: i64,
        order_note: Option<String>,
    ) -> ManagerResult<Order> {
        let actor = Actor::Customer(customer_id);
        let source = self.load_visible_order(source_order_id, actor)?;
        let items = source
            .active_items()
            .map(|i| OrderItemParam {
                product_id: i.product_id,
                quantity: i.quantity,
            })
            .collect();

        let params = CreateOrderParams {
            customer_id,
            items,
            shipping_address_id,
            billing_address_id: None,
            shipping_method: source.shipping_method,
            payment_type: source.payment_type,
            shipping_fee: Decimal::ZERO,
            discount: Decimal::ZERO,
            order_note,
            admin_note: None,
        };
        self.create_order(actor, params).await
    }

    // ========== Admin maintenance ==========

    pub async fn edit_order(
        &self,
        actor: Actor,
        order_id: i64,
        params: EditOrderParams,
    ) -> ManagerResult<Order> {
        require_admin(actor)?;
        let wanted = unique_ids(params.items.iter().map(|i| i.product_id));
        let products = self.fetch_products(&wanted).await?;
        self.run_on_order(
            CommandAction::EditOrder(EditOrderAction { order_id, params }),
            actor,
            now_millis(),
            &products,
            &wanted,
            || self.load_visible_order(order_id, actor),
        )
        .await
    }

    pub async fn delete_order(&self, actor: Actor, order_id: i64) -> ManagerResult<Order> {
        self.run(
            CommandAction::DeleteOrder(DeleteOrderAction { order_id }),
            actor,
            HashMap::new(),
            Vec::new(),
        )
        .await
    }

    pub async fn hold(&self, actor: Actor, order_id: i64, reason: Option<String>) -> ManagerResult<Order> {
        require_admin(actor)?;
        self.run(
            CommandAction::HoldOrder(HoldOrderAction { order_id, reason }),
            actor,
            HashMap::new(),
            Vec::new(),
        )
        .await
    }

    // ========== Payment ==========

    /// Request payment parameters for an unpaid order of the customer
    pub async fn pay_info(&self, customer_id: i64, order_id: i64) -> ManagerResult<PaymentIntent> {
        let order = self.load_visible_order(order_id, Actor::Customer(customer_id))?;
        if !order.status.is_pre_payment() {
            return Err(OrderError::illegal(order.status, "pay for").into());
        }
        let payer_ref = self
            .services
            .customers
            .payer_reference(customer_id)
            .await?
            .filter(|r| !r.is_empty())
            .ok_or_else(|| ManagerError::validation("Customer has no payment account bound"))?;

        let request = PaymentOrderRequest {
            order_id: order.order_id,
            order_no: order.order_no,
            amount: order.order_total,
            payer_ref,
            subject: self.shop_name.clone(),
        };
        let intent = self.services.payments.generate_payment_order(request).await?;
        tracing::info!(order_id, prepay_id = %intent.prepay_id, "Payment order generated");
        Ok(intent)
    }

    /// Payment confirmation from the payment provider
    pub async fn payment_received(&self, params: PaymentReceivedParams) -> ManagerResult<Order> {
        self.receive_payment(Actor::System, params).await
    }

    /// Admin records an offline payment
    pub async fn mark_paid(&self, actor: Actor, order_id: i64) -> ManagerResult<Order> {
        require_admin(actor)?;
        let params = PaymentReceivedParams {
            order_id: Some(order_id),
            note: Some("Marked paid by admin".to_string()),
            ..Default::default()
        };
        self.receive_payment(actor, params).await
    }

    async fn receive_payment(&self, actor: Actor, params: PaymentReceivedParams) -> ManagerResult<Order> {
        let reference = match (params.order_id, params.order_no) {
            (Some(id), _) => OrderRef::Id(id),
            (None, Some(no)) => OrderRef::No(no),
            (None, None) => {
                return Err(ManagerError::validation("Payment does not name an order"));
            }
        };
        let load = || -> ManagerResult<Order> {
            let (order, key) = match reference {
                OrderRef::Id(id) => (self.storage.get_order(id)?, id.to_string()),
                OrderRef::No(no) => (self.storage.get_order_by_no(no)?, format!("no {}", no)),
            };
            Ok(order.ok_or(OrderError::OrderNotFound(key))?)
        };

        let action = PaymentReceivedAction {
            order: reference,
            payment_method: params.payment_method,
            amount: params.amount,
            paid_at: params.paid_at,
            note: params.note,
        };
        self.run_on_order(
            CommandAction::PaymentReceived(action),
            actor,
            now_millis(),
            &HashMap::new(),
            &[],
            load,
        )
        .await
    }

    // ========== Lifecycle ==========

    pub async fn cancel_order(
        &self,
        actor: Actor,
        order_id: i64,
        reason: Option<String>,
    ) -> ManagerResult<Order> {
        self.run_on_order(
            CommandAction::CancelOrder(CancelOrderAction { order_id, reason }),
            actor,
            now_millis(),
            &HashMap::new(),
            &[],
            || self.load_visible_order(order_id, actor),
        )
        .await
    }

    pub async fn create_shipment(
        &self,
        actor: Actor,
        order_id: i64,
        params: ShipmentParams,
    ) -> ManagerResult<Order> {
        require_admin(actor)?;
        params
            .validate()
            .map_err(|e| ManagerError::validation(e.to_string()))?;
        let action = CreateShipmentAction {
            order_id,
            tracking_number: params.tracking_number,
            admin_comment: params.admin_comment,
            total_weight: params.total_weight,
            lines: params.items.into_iter().map(Into::into).collect(),
        };
        self.run(
            CommandAction::CreateShipment(action),
            actor,
            HashMap::new(),
            Vec::new(),
        )
        .await
    }

    pub async fn confirm_receipt(&self, actor: Actor, order_id: i64) -> ManagerResult<Order> {
        self.run(
            CommandAction::ConfirmReceipt(ConfirmReceiptAction { order_id }),
            actor,
            HashMap::new(),
            Vec::new(),
        )
        .await
    }

    pub async fn delay_confirm_receipt(&self, actor: Actor, order_id: i64) -> ManagerResult<Order> {
        self.run(
            CommandAction::DelayReceipt(DelayReceiptAction { order_id }),
            actor,
            HashMap::new(),
            Vec::new(),
        )
        .await
    }

    // ========== Deferred jobs ==========

    /// Execute a deferred action as the system at `now`
    pub async fn execute_job(&self, action: &ScheduledAction, now: i64) -> ManagerResult<()> {
        match *action {
            ScheduledAction::AutoCancel { order_id } => {
                let action = CancelOrderAction {
                    order_id,
                    reason: Some(AUTO_CANCEL_REASON.to_string()),
                };
                self.run_on_order(
                    CommandAction::CancelOrder(action),
                    Actor::System,
                    now,
                    &HashMap::new(),
                    &[],
                    || self.load_visible_order(order_id, Actor::System),
                )
                .await?;
            }
            ScheduledAction::AutoComplete { order_id } => {
                self.run_at(
                    CommandAction::AutoComplete(AutoCompleteAction { order_id }),
                    Actor::System,
                    now,
                    &HashMap::new(),
                    &[],
                )
                .await?;
            }
            ScheduledAction::AutoReview {
                order_id,
                product_id,
            } => {
                self.services
                    .reviews
                    .auto_positive_review(product_id, order_id)
                    .await?;
                tracing::debug!(order_id, product_id, "Auto review left");
            }
        }
        Ok(())
    }

    // ========== Internals ==========

    /// Order as the actor may see it; other customers' orders do not exist
    fn load_visible_order(&self, order_id: i64, actor: Actor) -> ManagerResult<Order> {
        self.storage
            .get_order(order_id)?
            .filter(|o| actor.can_access(o))
            .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()).into())
    }

    async fn resolve_order_address(
        &self,
        address_id: i64,
        customer_id: i64,
        address_type: AddressType,
    ) -> ManagerResult<OrderAddress> {
        let snapshot = self
            .services
            .customers
            .resolve_address(address_id, customer_id, address_type)
            .await?
            .ok_or(OrderError::AddressNotFound(address_id))?;
        Ok(OrderAddress::new(address_type, snapshot))
    }

    async fn fetch_products(&self, ids: &[i64]) -> ManagerResult<HashMap<i64, ProductInfo>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let products = self.services.catalog.get_products(ids).await?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn timings(&self) -> ManagerResult<OrderTimings> {
        let settings = &self.services.settings;
        Ok(OrderTimings {
            auto_cancel_minutes: settings.get_minutes(SettingKey::AutoCancelMinutes).await?,
            auto_complete_minutes: settings.get_minutes(SettingKey::AutoCompleteMinutes).await?,
            auto_review_minutes: settings.get_minutes(SettingKey::AutoReviewMinutes).await?,
        })
    }

    async fn run(
        &self,
        action: CommandAction,
        actor: Actor,
        products: HashMap<i64, ProductInfo>,
        lock_ids: Vec<i64>,
    ) -> ManagerResult<Order> {
        self.run_at(action, actor, now_millis(), &products, &lock_ids)
            .await
    }

    /// Run an action on a stored order under the locks of its products.
    ///
    /// `load` reads the order before any lock is held, so an edit committed
    /// in between can add a product the lock set misses. The action then
    /// fails with a stale snapshot and the read is repeated.
    async fn run_on_order(
        &self,
        action: CommandAction,
        actor: Actor,
        now: i64,
        products: &HashMap<i64, ProductInfo>,
        extra_ids: &[i64],
        load: impl Fn() -> ManagerResult<Order>,
    ) -> ManagerResult<Order> {
        let mut attempt = 1;
        loop {
            let order = load()?;
            let lock_ids = unique_ids(
                order
                    .active_items()
                    .map(|i| i.product_id)
                    .chain(extra_ids.iter().copied()),
            );
            match self.run_at(action.clone(), actor, now, products, &lock_ids).await {
                Err(e) if e.is_stale_snapshot() && attempt < SNAPSHOT_ATTEMPTS => {
                    tracing::debug!(
                        action = action.name(),
                        order_id = order.order_id,
                        attempt,
                        "Order changed before its stock was locked, reloading"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn run_at(
        &self,
        action: CommandAction,
        actor: Actor,
        now: i64,
        products: &HashMap<i64, ProductInfo>,
        lock_ids: &[i64],
    ) -> ManagerResult<Order> {
        let timings = self.timings().await?;
        let guard = self.locks.acquire(lock_ids).await?;

        let metadata = CommandMetadata::new(actor, now);
        let result = self.execute_in_txn(&action, products, lock_ids, timings, &metadata);
        drop(guard);

        match result {
            Ok((order, outcome)) => {
                tracing::debug!(
                    action = action.name(),
                    order_id = order.order_id,
                    events = outcome.events.len(),
                    jobs = outcome.jobs_scheduled,
                    "Operation committed"
                );
                self.publish(outcome);
                Ok(order)
            }
            Err(e) => {
                tracing::debug!(action = action.name(), error = %e, "Operation rejected");
                Err(e)
            }
        }
    }

    /// One unit of work: nothing in here may await
    fn execute_in_txn(
        &self,
        action: &CommandAction,
        products: &HashMap<i64, ProductInfo>,
        lock_ids: &[i64],
        timings: OrderTimings,
        metadata: &CommandMetadata,
    ) -> ManagerResult<(Order, CommandOutcome)> {
        let txn = self.storage.begin_write()?;
        let mut ctx = CommandContext::new(&txn, &self.storage, products, lock_ids, timings);
        let order = action.execute(&mut ctx, metadata)?;
        let outcome = ctx.finish()?;
        txn.commit().map_err(StorageError::from)?;
        Ok((order, outcome))
    }

    fn publish(&self, outcome: CommandOutcome) {
        if outcome.jobs_scheduled > 0 {
            self.job_notify.notify_one();
        }
        for event in outcome.events {
            if self.event_tx.send(event).is_err() {
                tracing::debug!("Event broadcast skipped: no active receivers");
                break;
            }
        }
    }
}

fn require_admin(actor: Actor) -> ManagerResult<()> {
    match actor {
        Actor::Customer(_) => Err(ManagerError::validation("Only administrators can do this")),
        Actor::System | Actor::Admin(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests;
