use serde::Serialize;

/// A domain event this service publishes or consumes.
///
/// Events are immutable facts. The `event_type` doubles as the bus topic;
/// the `aggregate_id` is the partition key, preserving per-aggregate order.
pub trait DomainEvent: Clone + core::fmt::Debug + Serialize + Send + Sync + 'static {
    /// Stable event name, e.g. "inventory.stock.reserved".
    fn event_type(&self) -> &'static str;

    /// The entity the event is attributed to ("reservation", "stock_item", ...).
    fn aggregate_type(&self) -> &'static str;

    /// Identity of that entity, as carried on the wire.
    fn aggregate_id(&self) -> String;
}
