//! redb-based storage layer for orders, stock and scheduled jobs
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `Order` | Order aggregate (items + addresses embedded) |
//! | `order_no_index` | `order_no` | `order_id` | Order number uniqueness + lookup |
//! | `customer_orders` | `(customer_id, order_id)` | `()` | Orders of a customer |
//! | `stock_lines` | `(product_id, warehouse_id)` | `StockLine` | Available quantity |
//! | `stock_history` | `(product_id, id)` | `StockHistory` | Ledger audit (append-only) |
//! | `order_history` | `(order_id, seq)` | `OrderHistoryEntry` | Status change log |
//! | `shipments` | `(order_id, id)` | `Shipment` | Shipment records |
//! | `scheduled_jobs` | `(due_at, job_id)` | `ScheduledJob` | Deferred actions |
//! | `dead_jobs` | `job_id` | `DeadJob` | Jobs that exhausted retries |
//! | `sequence_counter` | name | `u64` | Id allocation |
//!
//! Values are JSON-serialized. Reads exposed to callers never return
//! soft-deleted orders.

use crate::scheduler::{DeadJob, ScheduledJob};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use shared::models::{StockHistory, StockLine};
use shared::order::{Order, OrderHistoryEntry, Shipment};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const ORDERS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("orders");

const ORDER_NO_INDEX_TABLE: TableDefinition<i64, i64> = TableDefinition::new("order_no_index");

const CUSTOMER_ORDERS_TABLE: TableDefinition<(i64, i64), ()> =
    TableDefinition::new("customer_orders");

const STOCK_LINES_TABLE: TableDefinition<(i64, i64), &[u8]> = TableDefinition::new("stock_lines");

const STOCK_HISTORY_TABLE: TableDefinition<(i64, u64), &[u8]> =
    TableDefinition::new("stock_history");

const ORDER_HISTORY_TABLE: TableDefinition<(i64, u64), &[u8]> =
    TableDefinition::new("order_history");

const SHIPMENTS_TABLE: TableDefinition<(i64, u64), &[u8]> = TableDefinition::new("shipments");

const SCHEDULED_JOBS_TABLE: TableDefinition<(i64, u64), &[u8]> =
    TableDefinition::new("scheduled_jobs");

const DEAD_JOBS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("dead_jobs");

const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

pub(crate) const ORDER_ID_KEY: &str = "order_id";
pub(crate) const ORDER_ITEM_ID_KEY: &str = "order_item_id";
const STOCK_HISTORY_KEY: &str = "stock_history";
const ORDER_HISTORY_KEY: &str = "order_history";
const SHIPMENT_KEY: &str = "shipment";
const JOB_KEY: &str = "job";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Could not allocate a unique order number")]
    OrderNoExhausted,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Row counts for health logging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub order_count: u64,
    pub pending_jobs: u64,
    pub dead_jobs: u64,
}

/// Order storage backed by redb
#[derive(Clone)]
pub struct OrderStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for OrderStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderStorage").finish_non_exhaustive()
    }
}

impl OrderStorage {
    /// Open or create the database at the given path
    ///
    /// redb commits are durable once `commit()` returns (copy-on-write with an
    /// atomic root swap), so a crash never leaves a half-applied order change.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init_tables(&db)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init_tables(&db)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn init_tables(db: &Database) -> StorageResult<()> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(ORDER_NO_INDEX_TABLE)?;
            let _ = write_txn.open_table(CUSTOMER_ORDERS_TABLE)?;
            let _ = write_txn.open_table(STOCK_LINES_TABLE)?;
            let _ = write_txn.open_table(STOCK_HISTORY_TABLE)?;
            let _ = write_txn.open_table(ORDER_HISTORY_TABLE)?;
            let _ = write_txn.open_table(SHIPMENTS_TABLE)?;
            let _ = write_txn.open_table(SCHEDULED_JOBS_TABLE)?;
            let _ = write_txn.open_table(DEAD_JOBS_TABLE)?;
            let _ = write_txn.open_table(SEQUENCE_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Id Allocation ==========

    /// Increment and return the named counter (first value is 1)
    pub fn next_id(&self, txn: &WriteTransaction, key: &str) -> StorageResult<u64> {
        let mut table = txn.open_table(SEQUENCE_TABLE)?;
        let current = table.get(key)?.map(|guard| guard.value()).unwrap_or(0);
        let next = current + 1;
        table.insert(key, next)?;
        Ok(next)
    }

    /// Generate an order number not present in the index
    pub fn allocate_order_no(&self, txn: &WriteTransaction) -> StorageResult<i64> {
        let table = txn.open_table(ORDER_NO_INDEX_TABLE)?;
        for _ in 0..16 {
            let candidate = shared::util::snowflake_id();
            if table.get(candidate)?.is_none() {
                return Ok(candidate);
            }
        }
        Err(StorageError::OrderNoExhausted)
    }

    // ========== Orders ==========

    /// Store an order and maintain its indexes
    pub fn store_order(&self, txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        {
            let mut table = txn.open_table(ORDERS_TABLE)?;
            let value = serde_json::to_vec(order)?;
            table.insert(order.order_id, value.as_slice())?;
        }
        {
            let mut index = txn.open_table(ORDER_NO_INDEX_TABLE)?;
            index.insert(order.order_no, order.order_id)?;
        }
        let mut by_customer = txn.open_table(CUSTOMER_ORDERS_TABLE)?;
        by_customer.insert((order.customer_id, order.order_id), ())?;
        Ok(())
    }

    /// Load an order inside a write transaction, including soft-deleted ones
    pub fn get_order_txn(
        &self,
        txn: &WriteTransaction,
        order_id: i64,
    ) -> StorageResult<Option<Order>> {
        let table = txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn find_order_id_by_no_txn(
        &self,
        txn: &WriteTransaction,
        order_no: i64,
    ) -> StorageResult<Option<i64>> {
        let table = txn.open_table(ORDER_NO_INDEX_TABLE)?;
        Ok(table.get(order_no)?.map(|guard| guard.value()))
    }

    /// Get an order by id (soft-deleted orders are hidden)
    pub fn get_order(&self, order_id: i64) -> StorageResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        let order: Option<Order> = match table.get(order_id)? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        Ok(order.filter(|o| !o.deleted))
    }

    /// Get an order by its order number (soft-deleted orders are hidden)
    pub fn get_order_by_no(&self, order_no: i64) -> StorageResult<Option<Order>> {
        let order_id = {
            let read_txn = self.db.begin_read()?;
            let index = read_txn.open_table(ORDER_NO_INDEX_TABLE)?;
            index.get(order_no)?.map(|guard| guard.value())
        };
        match order_id {
            Some(id) => self.get_order(id),
            None => Ok(None),
        }
    }

    /// Orders of a customer, newest first
    pub fn list_customer_orders(&self, customer_id: i64) -> StorageResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(CUSTOMER_ORDERS_TABLE)?;
        let orders_table = read_txn.open_table(ORDERS_TABLE)?;

        let mut orders = Vec::new();
        for result in index.range((customer_id, i64::MIN)..=(customer_id, i64::MAX))? {
            let (key, _value) = result?;
            let (_, order_id) = key.value();
            if let Some(value) = orders_table.get(order_id)? {
                let order: Order = serde_json::from_slice(value.value())?;
                if !order.deleted {
                    orders.push(order);
                }
            }
        }
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.order_id.cmp(&a.order_id)));
        Ok(orders)
    }

    // ========== Stock Lines ==========

    pub fn get_stock_lines_txn(
        &self,
        txn: &WriteTransaction,
        product_id: i64,
    ) -> StorageResult<Vec<StockLine>> {
        let table = txn.open_table(STOCK_LINES_TABLE)?;
        let mut lines = Vec::new();
        for result in table.range((product_id, i64::MIN)..=(product_id, i64::MAX))? {
            let (_key, value) = result?;
            lines.push(serde_json::from_slice(value.value())?);
        }
        Ok(lines)
    }

    pub fn store_stock_line(&self, txn: &WriteTransaction, line: &StockLine) -> StorageResult<()> {
        let mut table = txn.open_table(STOCK_LINES_TABLE)?;
        let value = serde_json::to_vec(line)?;
        table.insert((line.product_id, line.warehouse_id), value.as_slice())?;
        Ok(())
    }

    /// Create or replace a stock line in its own transaction
    pub fn put_stock_line(&self, line: &StockLine) -> StorageResult<()> {
        let txn = self.begin_write()?;
        self.store_stock_line(&txn, line)?;
        txn.commit()?;
        Ok(())
    }

    pub fn get_stock_lines(&self, product_id: i64) -> StorageResult<Vec<StockLine>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(STOCK_LINES_TABLE)?;
        let mut lines = Vec::new();
        for result in table.range((product_id, i64::MIN)..=(product_id, i64::MAX))? {
            let (_key, value) = result?;
            lines.push(serde_json::from_slice(value.value())?);
        }
        Ok(lines)
    }

    // ========== Stock History ==========

    /// Append a history entry, assigning its id
    pub fn append_stock_history(
        &self,
        txn: &WriteTransaction,
        entry: &mut StockHistory,
    ) -> StorageResult<()> {
        entry.id = self.next_id(txn, STOCK_HISTORY_KEY)?;
        let mut table = txn.open_table(STOCK_HISTORY_TABLE)?;
        let value = serde_json::to_vec(entry)?;
        table.insert((entry.product_id, entry.id), value.as_slice())?;
        Ok(())
    }

    /// History of a product in insertion order
    pub fn get_stock_history(&self, product_id: i64) -> StorageResult<Vec<StockHistory>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(STOCK_HISTORY_TABLE)?;
        let mut entries = Vec::new();
        for result in table.range((product_id, 0u64)..=(product_id, u64::MAX))? {
            let (_key, value) = result?;
            entries.push(serde_json::from_slice(value.value())?);
        }
        Ok(entries)
    }

    // ========== Order History ==========

    /// Append a status change entry in its own transaction
    pub fn append_order_history(&self, entry: &mut OrderHistoryEntry) -> StorageResult<()> {
        let txn = self.begin_write()?;
        entry.sequence = self.next_id(&txn, ORDER_HISTORY_KEY)?;
        {
            let mut table = txn.open_table(ORDER_HISTORY_TABLE)?;
            let value = serde_json::to_vec(entry)?;
            table.insert((entry.order_id, entry.sequence), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_order_history(&self, order_id: i64) -> StorageResult<Vec<OrderHistoryEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDER_HISTORY_TABLE)?;
        let mut entries = Vec::new();
        for result in table.range((order_id, 0u64)..=(order_id, u64::MAX))? {
            let (_key, value) = result?;
            entries.push(serde_json::from_slice(value.value())?);
        }
        Ok(entries)
    }

    // ========== Shipments ==========

    pub fn store_shipment(&self, txn: &WriteTransaction, shipment: &mut Shipment) -> StorageResult<()> {
        shipment.id = self.next_id(txn, SHIPMENT_KEY)?;
        let mut table = txn.open_table(SHIPMENTS_TABLE)?;
        let value = serde_json::to_vec(shipment)?;
        table.insert((shipment.order_id, shipment.id), value.as_slice())?;
        Ok(())
    }

    pub fn get_shipments(&self, order_id: i64) -> StorageResult<Vec<Shipment>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SHIPMENTS_TABLE)?;
        let mut shipments = Vec::new();
        for result in table.range((order_id, 0u64)..=(order_id, u64::MAX))? {
            let (_key, value) = result?;
            shipments.push(serde_json::from_slice(value.value())?);
        }
        Ok(shipments)
    }

    // ========== Scheduled Jobs ==========

    /// Insert a job, assigning its id
    pub fn schedule_job_txn(&self, txn: &WriteTransaction, job: &mut ScheduledJob) -> StorageResult<()> {
        job.job_id = self.next_id(txn, JOB_KEY)?;
        self.insert_job(txn, job)
    }

    fn insert_job(&self, txn: &WriteTransaction, job: &ScheduledJob) -> StorageResult<()> {
        let mut table = txn.open_table(SCHEDULED_JOBS_TABLE)?;
        let value = serde_json::to_vec(job)?;
        table.insert((job.due_at, job.job_id), value.as_slice())?;
        Ok(())
    }

    /// Insert a job in its own transaction
    pub fn schedule_job(&self, job: &mut ScheduledJob) -> StorageResult<()> {
        let txn = self.begin_write()?;
        self.schedule_job_txn(&txn, job)?;
        txn.commit()?;
        Ok(())
    }

    /// Jobs with `due_at <= now`, earliest first
    pub fn get_due_jobs(&self, now: i64, limit: usize) -> StorageResult<Vec<ScheduledJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SCHEDULED_JOBS_TABLE)?;
        let mut jobs = Vec::new();
        for result in table.range((i64::MIN, 0u64)..=(now, u64::MAX))? {
            if jobs.len() >= limit {
                break;
            }
            let (_key, value) = result?;
            jobs.push(serde_json::from_slice(value.value())?);
        }
        Ok(jobs)
    }

    /// All pending jobs, earliest first
    pub fn get_pending_jobs(&self) -> StorageResult<Vec<ScheduledJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SCHEDULED_JOBS_TABLE)?;
        let mut jobs = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            jobs.push(serde_json::from_slice(value.value())?);
        }
        Ok(jobs)
    }

    /// Due time of the earliest pending job
    pub fn next_due_at(&self) -> StorageResult<Option<i64>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SCHEDULED_JOBS_TABLE)?;
        Ok(table.first()?.map(|(key, _value)| key.value().0))
    }

    /// Remove a finished job
    pub fn complete_job(&self, job: &ScheduledJob) -> StorageResult<()> {
        let txn = self.begin_write()?;
        {
            let mut table = txn.open_table(SCHEDULED_JOBS_TABLE)?;
            table.remove((job.due_at, job.job_id))?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Move a job to a new due time, recording the failure that caused it
    pub fn reschedule_job(
        &self,
        job: &ScheduledJob,
        due_at: i64,
        error: Option<&str>,
    ) -> StorageResult<ScheduledJob> {
        let mut updated = job.clone();
        updated.due_at = due_at;
        if let Some(error) = error {
            updated.attempts += 1;
            updated.last_error = Some(error.to_string());
        }

        let txn = self.begin_write()?;
        {
            let mut table = txn.open_table(SCHEDULED_JOBS_TABLE)?;
            table.remove((job.due_at, job.job_id))?;
        }
        self.insert_job(&txn, &updated)?;
        txn.commit()?;
        Ok(updated)
    }

    /// Move a job to the dead letter table
    pub fn move_job_to_dead_letter(&self, job: &ScheduledJob, error: &str) -> StorageResult<()> {
        let txn = self.begin_write()?;
        {
            let mut pending = txn.open_table(SCHEDULED_JOBS_TABLE)?;
            pending.remove((job.due_at, job.job_id))?;
        }
        {
            let mut dead = txn.open_table(DEAD_JOBS_TABLE)?;
            let mut final_job = job.clone();
            final_job.attempts += 1;
            final_job.last_error = Some(error.to_string());
            let entry = DeadJob {
                job: final_job,
                failed_at: shared::util::now_millis(),
                last_error: error.to_string(),
            };
            let value = serde_json::to_vec(&entry)?;
            dead.insert(job.job_id, value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_dead_jobs(&self) -> StorageResult<Vec<DeadJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEAD_JOBS_TABLE)?;
        let mut entries = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            entries.push(serde_json::from_slice(value.value())?);
        }
        Ok(entries)
    }

    /// Requeue every dead job, due immediately with a fresh attempt count
    pub fn recover_dead_jobs(&self, now: i64) -> StorageResult<usize> {
        let dead = self.get_dead_jobs()?;
        if dead.is_empty() {
            return Ok(0);
        }
        let txn = self.begin_write()?;
        {
            let mut dead_table = txn.open_table(DEAD_JOBS_TABLE)?;
            for entry in &dead {
                dead_table.remove(entry.job.job_id)?;
            }
        }
        for entry in &dead {
            let mut job = entry.job.clone();
            job.due_at = now;
            job.attempts = 0;
            self.insert_job(&txn, &job)?;
        }
        txn.commit()?;
        Ok(dead.len())
    }

    // ========== Stats ==========

    pub fn get_stats(&self) -> StorageResult<StorageStats> {
        let read_txn = self.db.begin_read()?;
        Ok(StorageStats {
            order_count: read_txn.open_table(ORDERS_TABLE)?.len()?,
            pending_jobs: read_txn.open_table(SCHEDULED_JOBS_TABLE)?.len()?,
            dead_jobs: read_txn.open_table(DEAD_JOBS_TABLE)?.len()?,
        })
    }
}
