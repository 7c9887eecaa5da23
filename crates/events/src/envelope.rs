use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::DomainEvent;

/// Media type of every published message body.
pub const CONTENT_TYPE: &str = "application/json";

/// Envelope schema version carried in message headers.
pub const SCHEMA_VERSION: &str = "1.0";

/// Wire envelope for a published event.
///
/// The envelope is the **unit of transport**: what lands in the outbox and
/// on the bus. Headers mirror `event_id`, `event_type` and `correlation_id`
/// so brokers and middleboxes can route without parsing the body. The
/// partition key is `aggregate_id`, which preserves per-aggregate order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Wrap a domain event for transport.
    pub fn wrap<E: DomainEvent>(
        event: &E,
        correlation_id: impl Into<String>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: Uuid::now_v7(),
            event_type: event.event_type().to_string(),
            aggregate_type: event.aggregate_type().to_string(),
            aggregate_id: event.aggregate_id(),
            correlation_id: correlation_id.into(),
            timestamp: Utc::now(),
            payload: serde_json::to_value(event)?,
        })
    }

    /// Message headers mirroring the envelope identity fields.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("event_id", self.event_id.to_string()),
            ("event_type", self.event_type.clone()),
            ("correlation_id", self.correlation_id.clone()),
            ("content_type", CONTENT_TYPE.to_string()),
            ("schema_version", SCHEMA_VERSION.to_string()),
        ]
    }

    /// Partition key on the bus.
    pub fn partition_key(&self) -> &str {
        &self.aggregate_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::published::StockReplenishedEvent;
    use stockflow_core::{MovementId, ProductId, StockItemId, WarehouseId};

    fn test_event() -> StockReplenishedEvent {
        StockReplenishedEvent {
            movement_id: MovementId::new(),
            stock_item_id: StockItemId::new(),
            product_id: ProductId::new(),
            warehouse_id: WarehouseId::new(),
            quantity: 5,
            new_on_hand: 15,
        }
    }

    #[test]
    fn wrap_carries_event_identity() {
        let event = test_event();
        let envelope = EventEnvelope::wrap(&event, "corr-1").unwrap();

        assert_eq!(envelope.event_type, "inventory.stock.replenished");
        assert_eq!(envelope.aggregate_type, "stock_movement");
        assert_eq!(envelope.aggregate_id, event.movement_id.to_string());
        assert_eq!(envelope.correlation_id, "corr-1");
        assert_eq!(envelope.payload["quantity"], 5);
    }

    #[test]
    fn headers_mirror_envelope_fields() {
        let envelope = EventEnvelope::wrap(&test_event(), "corr-2").unwrap();
        let headers = envelope.headers();

        let get = |k: &str| {
            headers
                .iter()
                .find(|(name, _)| *name == k)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("event_id"), envelope.event_id.to_string());
        assert_eq!(get("event_type"), envelope.event_type);
        assert_eq!(get("correlation_id"), "corr-2");
        assert_eq!(get("content_type"), CONTENT_TYPE);
        assert_eq!(get("schema_version"), SCHEMA_VERSION);
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = EventEnvelope::wrap(&test_event(), "corr-3").unwrap();
        let json = serde_json::to_string(&envelope).unwrap();
        let back: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope, back);
    }

    #[test]
    fn partition_key_is_aggregate_id() {
        let envelope = EventEnvelope::wrap(&test_event(), "corr-4").unwrap();
        assert_eq!(envelope.partition_key(), envelope.aggregate_id);
    }
}
