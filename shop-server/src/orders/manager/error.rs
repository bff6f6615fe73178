use super::super::storage::StorageError;
use super::super::traits::OrderError;
use crate::inventory::LockConflict;
use crate::services::ServiceError;
use shared::order::{CommandError, CommandErrorCode};
use thiserror::Error;

/// Manager errors
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Stock of product {product_id} is busy after {attempts} attempts")]
    ConcurrencyConflict { product_id: i64, attempts: u32 },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<LockConflict> for ManagerError {
    fn from(err: LockConflict) -> Self {
        ManagerError::ConcurrencyConflict {
            product_id: err.product_id,
            attempts: err.attempts,
        }
    }
}

impl ManagerError {
    /// Validation failure raised before any unit of work starts
    pub fn validation(message: impl Into<String>) -> Self {
        ManagerError::Order(OrderError::Validation(message.into()))
    }

    /// The order left the state a deferred job expected, or vanished
    pub fn is_stale_job(&self) -> bool {
        matches!(
            self,
            ManagerError::Order(
                OrderError::IllegalStateTransition { .. } | OrderError::OrderNotFound(_)
            )
        )
    }

    /// The order gained a product between the lock choice and the transaction
    pub fn is_stale_snapshot(&self) -> bool {
        matches!(self, ManagerError::Order(OrderError::StaleSnapshot { .. }))
    }
}

/// Map a storage failure onto a client-facing error code
fn classify_storage_error(e: &StorageError) -> CommandErrorCode {
    match e {
        StorageError::Serialization(_) => return CommandErrorCode::InternalError,
        StorageError::OrderNoExhausted => return CommandErrorCode::SystemBusy,
        _ => {}
    }

    // redb errors carry no kind, classify by message
    let err_str = e.to_string().to_lowercase();

    if err_str.contains("no space") || err_str.contains("disk full") || err_str.contains("enospc")
    {
        return CommandErrorCode::StorageFull;
    }

    if err_str.contains("corrupt") || err_str.contains("invalid database") {
        return CommandErrorCode::StorageCorrupted;
    }

    CommandErrorCode::SystemBusy
}

fn storage_message(code: CommandErrorCode) -> &'static str {
    match code {
        CommandErrorCode::StorageFull => "Storage is full",
        CommandErrorCode::StorageCorrupted => "Storage is damaged, contact support",
        CommandErrorCode::SystemBusy => "System busy, please retry",
        _ => "Internal error",
    }
}

fn storage_to_command(e: StorageError) -> CommandError {
    let code = classify_storage_error(&e);
    tracing::error!(error = %e, error_code = ?code, "Storage error occurred");
    CommandError::new(code, storage_message(code))
}

impl From<ManagerError> for CommandError {
    fn from(err: ManagerError) -> Self {
        let (code, message) = match err {
            ManagerError::Storage(e) | ManagerError::Order(OrderError::Storage(e)) => {
                return storage_to_command(e);
            }
            ManagerError::Order(OrderError::StaleSnapshot { order_id, product_id }) => {
                tracing::warn!(order_id, product_id, "Order kept changing while being locked");
                (
                    CommandErrorCode::ConcurrencyConflict,
                    "The order is being changed by someone else, please retry".to_string(),
                )
            }
            ManagerError::Order(e) => {
                let code = match &e {
                    OrderError::Validation(_) | OrderError::EmptyCart => {
                        CommandErrorCode::ValidationFailed
                    }
                    OrderError::OrderNotFound(_)
                    | OrderError::CustomerNotFound(_)
                    | OrderError::AddressNotFound(_) => CommandErrorCode::NotFound,
                    OrderError::ItemNotFound(_) => CommandErrorCode::ItemNotFound,
                    OrderError::ProductUnavailable(_) | OrderError::NoStockLine(_) => {
                        CommandErrorCode::ProductUnavailable
                    }
                    OrderError::InsufficientStock { .. } => CommandErrorCode::InsufficientStock,
                    OrderError::OverShipment { .. } => CommandErrorCode::OverShipment,
                    OrderError::IllegalStateTransition { .. }
                    | OrderError::ReceiptExtensionExceeded { .. } => {
                        CommandErrorCode::IllegalStateTransition
                    }
                    OrderError::StaleSnapshot { .. } => CommandErrorCode::ConcurrencyConflict,
                    OrderError::Storage(_) => CommandErrorCode::InternalError,
                };
                (code, e.to_string())
            }
            ManagerError::ConcurrencyConflict { product_id, attempts } => {
                tracing::warn!(product_id, attempts, "Stock lock contention surfaced to caller");
                (
                    CommandErrorCode::ConcurrencyConflict,
                    "The product is being ordered by others, please retry".to_string(),
                )
            }
            ManagerError::Service(e) => {
                tracing::error!(error = %e, "External service failed");
                let code = match &e {
                    ServiceError::Rejected { service, .. } if *service == "payment gateway" => {
                        CommandErrorCode::PaymentFailed
                    }
                    _ => CommandErrorCode::ServiceUnavailable,
                };
                (code, "Service temporarily unavailable, please retry".to_string())
            }
        };
        CommandError::new(code, message)
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;
