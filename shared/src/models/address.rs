//! Address Model

use crate::order::AddressType;
use serde::{Deserialize, Serialize};

/// Customer address as returned by the directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AddressSnapshot {
    pub contact_name: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub country_id: i64,
    pub state_province_id: i64,
    pub city: String,
    pub zip_code: String,
    pub address_line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
}

/// Frozen copy of an address attached to an order
///
/// Later edits of the customer's address book never reach this copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderAddress {
    pub address_type: AddressType,
    #[serde(flatten)]
    pub address: AddressSnapshot,
    #[serde(default)]
    pub deleted: bool,
}

impl OrderAddress {
    pub fn new(address_type: AddressType, address: AddressSnapshot) -> Self {
        Self {
            address_type,
            address,
            deleted: false,
        }
    }
}
