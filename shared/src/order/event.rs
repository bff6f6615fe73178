//! Order notifications - published after a transaction commits

use super::types::OrderStatus;
use serde::{Deserialize, Serialize};

/// Order event - immutable fact about a committed change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderEvent {
    /// Event unique ID (UUID v4)
    pub event_id: String,
    /// Order this event belongs to
    pub order_id: i64,
    /// Server timestamp (Unix milliseconds)
    pub timestamp: i64,
    /// Operator who triggered this event (0 = system)
    pub operator_id: i64,
    pub event_type: OrderEventType,
    pub payload: EventPayload,
}

impl OrderEvent {
    pub fn new(order_id: i64, operator_id: i64, timestamp: i64, payload: EventPayload) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            order_id,
            timestamp,
            operator_id,
            event_type: payload.event_type(),
            payload,
        }
    }
}

/// Event type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEventType {
    OrderCreated,
    OrderChanged,
}

/// Event payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    OrderCreated {
        order_no: i64,
        customer_id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    OrderChanged {
        old_status: OrderStatus,
        new_status: OrderStatus,
        note: String,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> OrderEventType {
        match self {
            EventPayload::OrderCreated { .. } => OrderEventType::OrderCreated,
            EventPayload::OrderChanged { .. } => OrderEventType::OrderChanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_follows_payload() {
        let event = OrderEvent::new(
            1,
            0,
            1000,
            EventPayload::OrderChanged {
                old_status: OrderStatus::PendingPayment,
                new_status: OrderStatus::Canceled,
                note: "cancel order".to_string(),
            },
        );
        assert_eq!(event.event_type, OrderEventType::OrderChanged);
        assert!(!event.event_id.is_empty());

        let json = serde_json::to_value(&event.payload).unwrap();
        assert_eq!(json["type"], "ORDER_CHANGED");
        assert_eq!(json["new_status"], "CANCELED");
    }
}
