//! Order action implementations
//!
//! Each action implements `CommandHandler` for one operation of the order
//! lifecycle.

use shared::order::Order;

use crate::orders::traits::{CommandContext, CommandHandler, CommandMetadata, OrderError};

mod cancel_order;
mod confirm_receipt;
mod create_order;
mod create_shipment;
mod delay_receipt;
mod delete_order;
mod edit_order;
mod hold_order;
mod payment_received;

#[cfg(test)]
pub(crate) mod test_support;

pub use cancel_order::CancelOrderAction;
pub use confirm_receipt::{AutoCompleteAction, ConfirmReceiptAction};
pub use create_order::{CreateOrderAction, OrderLine, merge_lines};
pub use create_shipment::{CreateShipmentAction, ShipmentLine};
pub use delay_receipt::{DelayReceiptAction, MAX_RECEIPT_DAYS};
pub use delete_order::DeleteOrderAction;
pub use edit_order::{EditOrderAction, EditOrderItem, EditOrderParams};
pub use hold_order::HoldOrderAction;
pub use payment_received::{OrderRef, PaymentReceivedAction};

/// CommandAction enum - dispatches to concrete action implementations
#[derive(Debug, Clone)]
pub enum CommandAction {
    CreateOrder(CreateOrderAction),
    EditOrder(EditOrderAction),
    DeleteOrder(DeleteOrderAction),
    CancelOrder(CancelOrderAction),
    HoldOrder(HoldOrderAction),
    PaymentReceived(PaymentReceivedAction),
    CreateShipment(CreateShipmentAction),
    ConfirmReceipt(ConfirmReceiptAction),
    DelayReceipt(DelayReceiptAction),
    AutoComplete(AutoCompleteAction),
}

impl CommandAction {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            CommandAction::CreateOrder(_) => "create_order",
            CommandAction::EditOrder(_) => "edit_order",
            CommandAction::DeleteOrder(_) => "delete_order",
            CommandAction::CancelOrder(_) => "cancel_order",
            CommandAction::HoldOrder(_) => "hold_order",
            CommandAction::PaymentReceived(_) => "payment_received",
            CommandAction::CreateShipment(_) => "create_shipment",
            CommandAction::ConfirmReceipt(_) => "confirm_receipt",
            CommandAction::DelayReceipt(_) => "delay_receipt",
            CommandAction::AutoComplete(_) => "auto_complete",
        }
    }
}

impl CommandHandler for CommandAction {
    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        metadata: &CommandMetadata,
    ) -> Result<Order, OrderError> {
        match self {
            CommandAction::CreateOrder(action) => action.execute(ctx, metadata),
            CommandAction::EditOrder(action) => action.execute(ctx, metadata),
            CommandAction::DeleteOrder(action) => action.execute(ctx, metadata),
            CommandAction::CancelOrder(action) => action.execute(ctx, metadata),
            CommandAction::HoldOrder(action) => action.execute(ctx, metadata),
            CommandAction::PaymentReceived(action) => action.execute(ctx, metadata),
            CommandAction::CreateShipment(action) => action.execute(ctx, metadata),
            CommandAction::ConfirmReceipt(action) => action.execute(ctx, metadata),
            CommandAction::DelayReceipt(action) => action.execute(ctx, metadata),
            CommandAction::AutoComplete(action) => action.execute(ctx, metadata),
        }
    }
}
