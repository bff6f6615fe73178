//! Unit of work and the action trait
//!
//! Every state-changing operation runs as a [`CommandHandler`] against a
//! [`CommandContext`]. The context wraps one redb write transaction and
//! buffers what must only become visible after commit: stock history,
//! notifications and scheduled jobs. Dropping the context without calling
//! [`CommandContext::finish`] discards all of it together with the
//! transaction.

use std::collections::{BTreeSet, HashMap};

use redb::WriteTransaction;
use shared::models::{ProductInfo, StockHistory, StockLine};
use shared::order::{Order, OrderEvent, OrderStatus, Shipment};
use thiserror::Error;

use crate::inventory::{self, LedgerEntry, LedgerError, StockTarget};
use crate::orders::storage::{ORDER_ID_KEY, ORDER_ITEM_ID_KEY, OrderStorage, StorageError};
use crate::scheduler::ScheduledJob;

/// Domain errors raised while executing an action
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("None of the requested products exist")]
    EmptyCart,

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Order item not found: {0}")]
    ItemNotFound(i64),

    #[error("Customer not found: {0}")]
    CustomerNotFound(i64),

    #[error("Address not found: {0}")]
    AddressNotFound(i64),

    #[error("Product unavailable: {0}")]
    ProductUnavailable(String),

    #[error("Insufficient stock for {product_name}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: i64,
        product_name: String,
        available: i32,
        requested: i32,
    },

    #[error("No enabled stock line for {0}")]
    NoStockLine(String),

    #[error("Item {item_id} over-shipped: ordered {ordered}, shipped {shipped}, requested {requested}")]
    OverShipment {
        item_id: i64,
        ordered: i32,
        shipped: i32,
        requested: i32,
    },

    #[error("Cannot {action} an order in status {status}")]
    IllegalStateTransition {
        status: OrderStatus,
        action: &'static str,
    },

    /// The order gained a product after the caller chose its stock locks.
    /// Retrying with a fresh read resolves it.
    #[error("Order {order_id} changed while the operation was prepared (product {product_id} not locked)")]
    StaleSnapshot { order_id: i64, product_id: i64 },

    #[error("Receipt confirmation cannot be extended past {limit}")]
    ReceiptExtensionExceeded { limit: i64 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl OrderError {
    pub fn illegal(status: OrderStatus, action: &'static str) -> Self {
        OrderError::IllegalStateTransition { status, action }
    }
}

impl From<LedgerError> for OrderError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientStock {
                product_id,
                product_name,
                available,
                requested,
            } => OrderError::InsufficientStock {
                product_id,
                product_name,
                available,
                requested,
            },
            LedgerError::NoStockLine { product_name, .. } => OrderError::NoStockLine(product_name),
        }
    }
}

/// Who performs an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    System,
    Admin(i64),
    Customer(i64),
}

impl Actor {
    /// Id recorded in audit fields (0 for the system)
    pub fn id(&self) -> i64 {
        match self {
            Actor::System => 0,
            Actor::Admin(id) | Actor::Customer(id) => *id,
        }
    }

    /// Customers may only touch their own orders
    pub fn can_access(&self, order: &Order) -> bool {
        match self {
            Actor::Customer(id) => order.customer_id == *id,
            Actor::System | Actor::Admin(_) => true,
        }
    }
}

/// Metadata of the running operation
#[derive(Debug, Clone)]
pub struct CommandMetadata {
    pub actor: Actor,
    /// Server time of the operation (Unix milliseconds)
    pub timestamp: i64,
}

impl CommandMetadata {
    pub fn new(actor: Actor, timestamp: i64) -> Self {
        Self { actor, timestamp }
    }
}

/// Order time limits resolved from the settings provider before the
/// transaction starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTimings {
    pub auto_cancel_minutes: i64,
    pub auto_complete_minutes: i64,
    pub auto_review_minutes: i64,
}

/// What a committed unit of work leaves behind for the caller
#[derive(Debug, Default)]
pub struct CommandOutcome {
    pub events: Vec<OrderEvent>,
    pub jobs_scheduled: usize,
}

/// Unit of work over one write transaction
pub struct CommandContext<'a> {
    txn: &'a WriteTransaction,
    storage: &'a OrderStorage,
    products: &'a HashMap<i64, ProductInfo>,
    locked: &'a [i64],
    timings: OrderTimings,
    orders: HashMap<i64, Order>,
    stock: HashMap<i64, Vec<StockLine>>,
    dirty_stock: BTreeSet<i64>,
    history: Vec<StockHistory>,
    events: Vec<OrderEvent>,
    jobs: Vec<ScheduledJob>,
}

impl<'a> CommandContext<'a> {
    pub fn new(
        txn: &'a WriteTransaction,
        storage: &'a OrderStorage,
        products: &'a HashMap<i64, ProductInfo>,
        locked: &'a [i64],
        timings: OrderTimings,
    ) -> Self {
        Self {
            txn,
            storage,
            products,
            locked,
            timings,
            orders: HashMap::new(),
            stock: HashMap::new(),
            dirty_stock: BTreeSet::new(),
            history: Vec::new(),
            events: Vec::new(),
            jobs: Vec::new(),
        }
    }

    pub fn timings(&self) -> OrderTimings {
        self.timings
    }

    /// Product resolved by the caller, if the catalog knows it
    pub fn product(&self, product_id: i64) -> Option<&'a ProductInfo> {
        self.products.get(&product_id)
    }

    /// Check that the caller holds the stock lock of every product the order
    /// still carries. The lock set is chosen from a read taken before the
    /// transaction, so a concurrent edit may have added products since.
    pub fn ensure_locked(&self, order: &Order) -> Result<(), OrderError> {
        match order
            .active_items()
            .find(|item| !self.locked.contains(&item.product_id))
        {
            Some(item) => Err(OrderError::StaleSnapshot {
                order_id: order.order_id,
                product_id: item.product_id,
            }),
            None => Ok(()),
        }
    }

    // ========== Orders ==========

    /// Load an order (soft-deleted orders count as missing)
    pub fn load_order(&self, order_id: i64) -> Result<Order, OrderError> {
        if let Some(order) = self.orders.get(&order_id) {
            return Ok(order.clone());
        }
        self.storage
            .get_order_txn(self.txn, order_id)?
            .filter(|o| !o.deleted)
            .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()))
    }

    pub fn load_order_by_no(&self, order_no: i64) -> Result<Order, OrderError> {
        match self.storage.find_order_id_by_no_txn(self.txn, order_no)? {
            Some(order_id) => self.load_order(order_id),
            None => Err(OrderError::OrderNotFound(format!("no {}", order_no))),
        }
    }

    /// Stage an order for persistence on [`finish`](Self::finish)
    pub fn save_order(&mut self, order: Order) {
        self.orders.insert(order.order_id, order);
    }

    pub fn next_order_id(&self) -> Result<i64, OrderError> {
        Ok(self.storage.next_id(self.txn, ORDER_ID_KEY)? as i64)
    }

    pub fn next_item_id(&self) -> Result<i64, OrderError> {
        Ok(self.storage.next_id(self.txn, ORDER_ITEM_ID_KEY)? as i64)
    }

    pub fn allocate_order_no(&self) -> Result<i64, OrderError> {
        Ok(self.storage.allocate_order_no(self.txn)?)
    }

    // ========== Stock ==========

    /// Run the ledger for one product against the order's current status
    ///
    /// Lines are loaded once per product and kept in the context, so several
    /// adjustments of the same product within one operation see each other.
    pub fn adjust_stock(
        &mut self,
        target: StockTarget<'_>,
        quantity: i32,
        order: &Order,
        note: &str,
        actor: i64,
        now: i64,
    ) -> Result<(), OrderError> {
        let product_id = target.product_id;
        if !self.stock.contains_key(&product_id) {
            let lines = self.storage.get_stock_lines_txn(self.txn, product_id)?;
            self.stock.insert(product_id, lines);
        }
        let Some(lines) = self.stock.get_mut(&product_id) else {
            return Ok(());
        };

        let entry = LedgerEntry {
            order_id: Some(order.order_id),
            order_status: order.status,
            note,
            actor,
            now,
        };
        let history = inventory::adjust(lines, target, quantity, &entry)?;
        if !history.is_empty() {
            tracing::debug!(
                product_id,
                order_id = order.order_id,
                quantity,
                lines = history.len(),
                "Stock adjusted"
            );
            self.dirty_stock.insert(product_id);
            self.history.extend(history);
        }
        Ok(())
    }

    // ========== Side effects ==========

    /// Buffer a notification, published only after commit
    pub fn emit(&mut self, event: OrderEvent) {
        self.events.push(event);
    }

    /// Buffer a deferred action, written in this transaction
    pub fn schedule(&mut self, job: ScheduledJob) {
        self.jobs.push(job);
    }

    pub fn store_shipment(&self, shipment: &mut Shipment) -> Result<(), OrderError> {
        Ok(self.storage.store_shipment(self.txn, shipment)?)
    }

    /// Persist everything staged in the context. The caller commits.
    pub fn finish(self) -> Result<CommandOutcome, OrderError> {
        for order in self.orders.values() {
            self.storage.store_order(self.txn, order)?;
        }
        for product_id in &self.dirty_stock {
            if let Some(lines) = self.stock.get(product_id) {
                for line in lines {
                    self.storage.store_stock_line(self.txn, line)?;
                }
            }
        }
        for mut entry in self.history {
            self.storage.append_stock_history(self.txn, &mut entry)?;
        }
        let jobs_scheduled = self.jobs.len();
        for mut job in self.jobs {
            self.storage.schedule_job_txn(self.txn, &mut job)?;
        }
        Ok(CommandOutcome {
            events: self.events,
            jobs_scheduled,
        })
    }
}

/// An order operation executed inside a unit of work
///
/// Execution is synchronous: nothing awaits while the write transaction is
/// open. Returns the order as it stands after the operation.
pub trait CommandHandler {
    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Order, OrderError>;
}
