//! Events this service publishes.
//!
//! Every payload here travels inside an [`EventEnvelope`]; the fields are
//! the event body's `payload` object.
//!
//! [`EventEnvelope`]: crate::envelope::EventEnvelope

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{
    AlertId, MovementId, OrderId, ProductId, ReservationId, StockItemId, WarehouseId,
};
use stockflow_stock::{AlertSeverity, MovementType};

use crate::event::DomainEvent;
use crate::topics;

/// One successfully held line inside `inventory.stock.reserved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedItemDetail {
    pub stock_item_id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity_reserved: i64,
}

/// Stock was successfully reserved for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservedEvent {
    pub reservation_id: ReservationId,
    pub order_id: OrderId,
    pub items: Vec<ReservedItemDetail>,
    pub expires_at: DateTime<Utc>,
}

impl DomainEvent for StockReservedEvent {
    fn event_type(&self) -> &'static str {
        topics::STOCK_RESERVED
    }

    fn aggregate_type(&self) -> &'static str {
        "reservation"
    }

    fn aggregate_id(&self) -> String {
        self.reservation_id.to_string()
    }
}

/// One shortfall line inside `inventory.stock.reservation_failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItemDetail {
    pub product_id: ProductId,
    pub requested_quantity: i64,
    pub available_quantity: i64,
}

/// Reservation could not be made for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservationFailedEvent {
    pub order_id: OrderId,
    pub failure_reason: String,
    pub failed_items: Vec<FailedItemDetail>,
}

impl DomainEvent for StockReservationFailedEvent {
    fn event_type(&self) -> &'static str {
        topics::STOCK_RESERVATION_FAILED
    }

    fn aggregate_type(&self) -> &'static str {
        "order"
    }

    fn aggregate_id(&self) -> String {
        self.order_id.to_string()
    }
}

/// One released line inside `inventory.stock.released`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasedItemDetail {
    pub stock_item_id: StockItemId,
    pub product_id: ProductId,
    pub quantity_released: i64,
}

/// Reserved stock went back to available (cancelled, expired or partial).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleasedEvent {
    pub reservation_id: ReservationId,
    pub order_id: OrderId,
    pub release_reason: String,
    pub items: Vec<ReleasedItemDetail>,
}

impl DomainEvent for StockReleasedEvent {
    fn event_type(&self) -> &'static str {
        topics::STOCK_RELEASED
    }

    fn aggregate_type(&self) -> &'static str {
        "reservation"
    }

    fn aggregate_id(&self) -> String {
        self.reservation_id.to_string()
    }
}

/// Reservation was fulfilled; on-hand stock decremented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDecrementedEvent {
    pub reservation_id: ReservationId,
    pub order_id: OrderId,
    pub items: Vec<ReleasedItemDetail>,
}

impl DomainEvent for StockDecrementedEvent {
    fn event_type(&self) -> &'static str {
        topics::STOCK_DECREMENTED
    }

    fn aggregate_type(&self) -> &'static str {
        "reservation"
    }

    fn aggregate_id(&self) -> String {
        self.reservation_id.to_string()
    }
}

/// Stock was added via replenishment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReplenishedEvent {
    pub movement_id: MovementId,
    pub stock_item_id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub new_on_hand: i64,
}

impl DomainEvent for StockReplenishedEvent {
    fn event_type(&self) -> &'static str {
        topics::STOCK_REPLENISHED
    }

    fn aggregate_type(&self) -> &'static str {
        "stock_movement"
    }

    fn aggregate_id(&self) -> String {
        self.movement_id.to_string()
    }
}

/// A low-stock alert opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlertEvent {
    pub alert_id: AlertId,
    pub stock_item_id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub current_available: i64,
    pub reorder_point: i64,
    pub severity: AlertSeverity,
}

impl DomainEvent for LowStockAlertEvent {
    fn event_type(&self) -> &'static str {
        topics::STOCK_LOW_STOCK_ALERT
    }

    fn aggregate_type(&self) -> &'static str {
        "low_stock_alert"
    }

    fn aggregate_id(&self) -> String {
        self.alert_id.to_string()
    }
}

/// Audit feed entry for every ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovementRecordedEvent {
    pub movement_id: MovementId,
    pub stock_item_id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub previous_on_hand: i64,
    pub new_on_hand: i64,
    pub previous_reserved: i64,
    pub new_reserved: i64,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub reason: Option<String>,
    pub performed_by: String,
}

impl DomainEvent for StockMovementRecordedEvent {
    fn event_type(&self) -> &'static str {
        topics::STOCK_MOVEMENT_RECORDED
    }

    fn aggregate_type(&self) -> &'static str {
        "stock_movement"
    }

    fn aggregate_id(&self) -> String {
        self.movement_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_match_topics() {
        let reserved = StockReservedEvent {
            reservation_id: ReservationId::new(),
            order_id: OrderId::new(),
            items: vec![],
            expires_at: Utc::now(),
        };
        assert_eq!(reserved.event_type(), "inventory.stock.reserved");
        assert_eq!(reserved.aggregate_id(), reserved.reservation_id.to_string());

        let failed = StockReservationFailedEvent {
            order_id: OrderId::new(),
            failure_reason: "insufficient stock".to_string(),
            failed_items: vec![],
        };
        assert_eq!(failed.event_type(), "inventory.stock.reservation_failed");
        assert_eq!(failed.aggregate_type(), "order");
    }

    #[test]
    fn severity_serializes_snake_case() {
        let alert = LowStockAlertEvent {
            alert_id: AlertId::new(),
            stock_item_id: StockItemId::new(),
            product_id: ProductId::new(),
            warehouse_id: WarehouseId::new(),
            current_available: 0,
            reorder_point: 3,
            severity: AlertSeverity::OutOfStock,
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["severity"], "out_of_stock");
    }
}
