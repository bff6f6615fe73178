//! Order enums and command error types

use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};

// ============================================================================
// Status
// ============================================================================

/// Order lifecycle status
///
/// Discriminants keep the numeric values used by store reporting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    New = 0,
    OnHold = 10,
    PendingPayment = 20,
    PaymentFailed = 25,
    PaymentReceived = 30,
    Shipping = 40,
    Shipped = 50,
    Complete = 60,
    Canceled = 70,
}

impl OrderStatus {
    /// Statuses before payment (payable and cancellable)
    pub fn is_pre_payment(self) -> bool {
        matches!(
            self,
            OrderStatus::New | OrderStatus::PendingPayment | OrderStatus::PaymentFailed
        )
    }

    pub fn is_cancellable(self) -> bool {
        self.is_pre_payment()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Complete | OrderStatus::Canceled)
    }

    /// Statuses from which a shipment can be recorded
    pub fn is_shippable(self) -> bool {
        matches!(self, OrderStatus::PaymentReceived | OrderStatus::Shipping)
    }

    /// Statuses from which receipt can be confirmed or delayed
    pub fn is_awaiting_receipt(self) -> bool {
        matches!(
            self,
            OrderStatus::PaymentReceived | OrderStatus::Shipping | OrderStatus::Shipped
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OrderStatus::New => "New",
            OrderStatus::OnHold => "OnHold",
            OrderStatus::PendingPayment => "PendingPayment",
            OrderStatus::PaymentFailed => "PaymentFailed",
            OrderStatus::PaymentReceived => "PaymentReceived",
            OrderStatus::Shipping => "Shipping",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Complete => "Complete",
            OrderStatus::Canceled => "Canceled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShippingStatus {
    /// No delivery needed
    NoShipping = 0,
    NotYetShipped = 20,
    PartiallyShipped = 25,
    Shipped = 30,
    Delivered = 40,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    WaitRefund,
    RefundOk,
    RefundCancel,
    Close,
    RefundFrozen,
}

// ============================================================================
// Payment / Shipping
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    #[default]
    OnlinePayment,
    CashOnDelivery,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Alipay,
    WeChat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShippingMethod {
    #[default]
    Free,
    Standard,
}

/// When a product's stock is taken out of the ledger
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockReduceStrategy {
    /// Stock leaves the ledger when the order is placed
    #[default]
    PlaceOrderWithhold,
    /// Stock leaves the ledger when payment is received
    PaymentSuccessDeduct,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AddressType {
    Shipping,
    Billing,
}

// ============================================================================
// Command Errors
// ============================================================================

/// User-facing error of an order operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandError {
    pub code: CommandErrorCode,
    pub message: String,
}

impl CommandError {
    pub fn new(code: CommandErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for CommandError {}

/// Command error codes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandErrorCode {
    ValidationFailed,
    NotFound,
    ItemNotFound,
    ProductUnavailable,
    InsufficientStock,
    IllegalStateTransition,
    OverShipment,
    ConcurrencyConflict,
    PaymentFailed,
    ServiceUnavailable,
    InternalError,
    // Storage errors (maps to ErrorCode 94xx)
    StorageFull,
    StorageCorrupted,
    SystemBusy,
}

impl CommandErrorCode {
    /// Map to the numeric [`ErrorCode`]
    pub fn to_error_code(self) -> ErrorCode {
        match self {
            CommandErrorCode::ValidationFailed => ErrorCode::ValidationFailed,
            CommandErrorCode::NotFound => ErrorCode::OrderNotFound,
            CommandErrorCode::ItemNotFound => ErrorCode::OrderItemNotFound,
            CommandErrorCode::ProductUnavailable => ErrorCode::ProductUnavailable,
            CommandErrorCode::InsufficientStock => ErrorCode::InsufficientStock,
            CommandErrorCode::IllegalStateTransition => ErrorCode::IllegalStateTransition,
            CommandErrorCode::OverShipment => ErrorCode::OverShipment,
            CommandErrorCode::ConcurrencyConflict => ErrorCode::ConcurrencyConflict,
            CommandErrorCode::PaymentFailed => ErrorCode::PaymentFailed,
            CommandErrorCode::ServiceUnavailable => ErrorCode::ServiceUnavailable,
            CommandErrorCode::InternalError => ErrorCode::InternalError,
            CommandErrorCode::StorageFull => ErrorCode::StorageFull,
            CommandErrorCode::StorageCorrupted => ErrorCode::StorageCorrupted,
            CommandErrorCode::SystemBusy => ErrorCode::SystemBusy,
        }
    }
}
