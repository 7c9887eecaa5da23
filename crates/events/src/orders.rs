//! Order lifecycle events consumed from the order service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{OrderId, ProductId, WarehouseId};

use crate::event::DomainEvent;
use crate::topics;

/// One requested line of an incoming order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemDetail {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// An order was created; stock must be reserved for its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order_id: OrderId,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub items: Vec<OrderItemDetail>,
    /// Preferred warehouse for the whole order, when the caller has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<WarehouseId>,
}

impl DomainEvent for OrderCreatedEvent {
    fn event_type(&self) -> &'static str {
        topics::ORDER_CREATED
    }

    fn aggregate_type(&self) -> &'static str {
        "order"
    }

    fn aggregate_id(&self) -> String {
        self.order_id.to_string()
    }
}

/// An order was cancelled; all its active reservations must be released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order_id: OrderId,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
}

impl DomainEvent for OrderCancelledEvent {
    fn event_type(&self) -> &'static str {
        topics::ORDER_CANCELLED
    }

    fn aggregate_type(&self) -> &'static str {
        "order"
    }

    fn aggregate_id(&self) -> String {
        self.order_id.to_string()
    }
}

/// An order shipped; the active reservation must be fulfilled in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFulfilledEvent {
    pub order_id: OrderId,
    #[serde(default)]
    pub fulfilled_at: Option<DateTime<Utc>>,
}

impl DomainEvent for OrderFulfilledEvent {
    fn event_type(&self) -> &'static str {
        topics::ORDER_FULFILLED
    }

    fn aggregate_type(&self) -> &'static str {
        "order"
    }

    fn aggregate_id(&self) -> String {
        self.order_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_created_parses_minimal_payload() {
        let order_id = OrderId::new();
        let product_id = ProductId::new();
        let json = format!(
            r#"{{"order_id":"{order_id}","customer_id":null,"items":[{{"product_id":"{product_id}","quantity":3}}]}}"#
        );

        let event: OrderCreatedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.order_id, order_id);
        assert_eq!(event.items.len(), 1);
        assert_eq!(event.items[0].quantity, 3);
        assert_eq!(event.warehouse_id, None);
    }

    #[test]
    fn order_cancelled_defaults_missing_reason() {
        let order_id = OrderId::new();
        let json = format!(r#"{{"order_id":"{order_id}"}}"#);
        let event: OrderCancelledEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.cancellation_reason, None);
    }

    #[test]
    fn malformed_order_created_is_an_error() {
        let result = serde_json::from_str::<OrderCreatedEvent>(r#"{"order_id":"oops"}"#);
        assert!(result.is_err());
    }
}
