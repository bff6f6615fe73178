//! Product Model

use crate::order::StockReduceStrategy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Product as exposed by the catalog to the order engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductInfo {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub is_published: bool,
    pub is_allow_to_order: bool,
    pub stock_tracking_enabled: bool,
    #[serde(default)]
    pub stock_reduce_strategy: StockReduceStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Show the real stock number on checkout
    #[serde(default)]
    pub display_stock_quantity: bool,
}

impl ProductInfo {
    /// Published and accepting orders
    pub fn is_orderable(&self) -> bool {
        self.is_published && self.is_allow_to_order
    }
}
