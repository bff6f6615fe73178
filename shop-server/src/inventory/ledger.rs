//! Stock ledger
//!
//! Pure allocation logic over the stock lines of one product. The caller
//! loads the lines, runs [`adjust`] and persists the mutated lines plus the
//! returned history entries inside its own write transaction.

use shared::models::{ProductInfo, StockHistory, StockLine};
use shared::order::{OrderItem, OrderStatus, StockReduceStrategy};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient stock for {product_name}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: i64,
        product_name: String,
        available: i32,
        requested: i32,
    },

    #[error("No enabled stock line for {product_name}")]
    NoStockLine { product_id: i64, product_name: String },
}

/// The stock settings a ledger call runs under
///
/// Placement and edits take them from the catalog; cancel and payment take
/// them from the order item, which froze them when it was added.
#[derive(Debug, Clone, Copy)]
pub struct StockTarget<'a> {
    pub product_id: i64,
    pub product_name: &'a str,
    pub stock_tracking_enabled: bool,
    pub stock_reduce_strategy: StockReduceStrategy,
}

impl<'a> From<&'a ProductInfo> for StockTarget<'a> {
    fn from(product: &'a ProductInfo) -> Self {
        Self {
            product_id: product.id,
            product_name: &product.name,
            stock_tracking_enabled: product.stock_tracking_enabled,
            stock_reduce_strategy: product.stock_reduce_strategy,
        }
    }
}

impl<'a> From<&'a OrderItem> for StockTarget<'a> {
    fn from(item: &'a OrderItem) -> Self {
        Self {
            product_id: item.product_id,
            product_name: &item.product_name,
            stock_tracking_enabled: item.stock_tracking_enabled,
            stock_reduce_strategy: item.stock_reduce_strategy,
        }
    }
}

/// Who and what a ledger call is recorded against
#[derive(Debug, Clone)]
pub struct LedgerEntry<'a> {
    pub order_id: Option<i64>,
    /// Status of the order at the moment the ledger runs
    pub order_status: OrderStatus,
    pub note: &'a str,
    pub actor: i64,
    pub now: i64,
}

/// Sum of enabled line quantities
pub fn available_quantity(lines: &[StockLine]) -> i32 {
    lines
        .iter()
        .filter(|l| l.enabled)
        .map(|l| l.quantity.max(0))
        .sum()
}

/// Whether the product's reduce strategy lets the ledger move at this status
///
/// Withhold products move at placement and stop moving once payment is in;
/// deduct-on-payment products stay untouched until the order is paid.
pub fn strategy_applies(strategy: StockReduceStrategy, status: OrderStatus) -> bool {
    match strategy {
        StockReduceStrategy::PlaceOrderWithhold => status != OrderStatus::PaymentReceived,
        StockReduceStrategy::PaymentSuccessDeduct => !status.is_pre_payment(),
    }
}

/// Apply a signed quantity change to a product's stock lines.
///
/// Negative `quantity` takes stock out, positive puts it back. Returns one
/// history entry per mutated line (ids are assigned on persist). Lines are
/// only modified when the whole call succeeds.
pub fn adjust(
    lines: &mut [StockLine],
    target: StockTarget<'_>,
    quantity: i32,
    entry: &LedgerEntry<'_>,
) -> Result<Vec<StockHistory>, LedgerError> {
    if !target.stock_tracking_enabled
        || quantity == 0
        || entry.order_status.is_terminal()
        || !strategy_applies(target.stock_reduce_strategy, entry.order_status)
    {
        return Ok(Vec::new());
    }

    let mut order: Vec<usize> = (0..lines.len()).filter(|&i| lines[i].enabled).collect();
    if order.is_empty() {
        return Err(LedgerError::NoStockLine {
            product_id: target.product_id,
            product_name: target.product_name.to_string(),
        });
    }
    order.sort_by_key(|&i| (lines[i].display_order, lines[i].warehouse_id));

    let history_for = |line: &StockLine, delta: i32| StockHistory {
        id: 0,
        product_id: line.product_id,
        warehouse_id: line.warehouse_id,
        order_id: entry.order_id,
        adjusted_quantity: delta,
        stock_quantity: line.quantity,
        note: entry.note.to_string(),
        created_by: entry.actor,
        created_at: entry.now,
    };

    if quantity > 0 {
        let line = &mut lines[order[0]];
        line.quantity += quantity;
        return Ok(vec![history_for(line, quantity)]);
    }

    let requested = quantity.saturating_neg();
    let available = available_quantity(lines);
    if available < requested {
        return Err(LedgerError::InsufficientStock {
            product_id: target.product_id,
            product_name: target.product_name.to_string(),
            available,
            requested,
        });
    }

    let mut remaining = requested;
    let mut history = Vec::new();
    for idx in order {
        if remaining == 0 {
            break;
        }
        let line = &mut lines[idx];
        if line.quantity <= 0 {
            continue;
        }
        let take = remaining.min(line.quantity);
        line.quantity -= take;
        remaining -= take;
        history.push(history_for(line, -take));
    }

    Ok(history)
}
