//! `stockflow-events` — domain event contracts and bus mechanics.
//!
//! This crate defines **mechanics**, not business logic: the payloads this
//! service publishes, the order events it consumes, the wire envelope, and a
//! transport-agnostic bus abstraction with an in-memory implementation for
//! tests. Delivery is at-least-once everywhere; consumers must be idempotent.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod orders;
pub mod published;
pub mod topics;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::DomainEvent;
pub use in_memory_bus::InMemoryEventBus;
pub use orders::{OrderCancelledEvent, OrderCreatedEvent, OrderFulfilledEvent, OrderItemDetail};
pub use published::{
    FailedItemDetail, LowStockAlertEvent, ReleasedItemDetail, ReservedItemDetail,
    StockDecrementedEvent, StockMovementRecordedEvent, StockReleasedEvent,
    StockReplenishedEvent, StockReservationFailedEvent, StockReservedEvent,
};
