//! Stock ledger records

use serde::{Deserialize, Serialize};

/// Available quantity of one product in one warehouse
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockLine {
    pub product_id: i64,
    pub warehouse_id: i64,
    /// Never negative
    pub quantity: i32,
    /// Allocation order, lowest first
    pub display_order: i32,
    pub enabled: bool,
}

impl StockLine {
    pub fn new(product_id: i64, warehouse_id: i64, quantity: i32, display_order: i32) -> Self {
        Self {
            product_id,
            warehouse_id,
            quantity,
            display_order,
            enabled: true,
        }
    }
}

/// Append-only audit entry, one per mutated stock line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockHistory {
    /// Assigned on persist
    pub id: u64,
    pub product_id: i64,
    pub warehouse_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    /// Signed delta applied to the line
    pub adjusted_quantity: i32,
    /// Line quantity after the adjustment
    pub stock_quantity: i32,
    pub note: String,
    pub created_by: i64,
    pub created_at: i64,
}
