//! Canonical topic names.

/// Consumed from the order service.
pub const ORDER_CREATED: &str = "order.created";
pub const ORDER_CANCELLED: &str = "order.cancelled";
pub const ORDER_FULFILLED: &str = "order.fulfilled";

/// Published by this service.
pub const STOCK_RESERVED: &str = "inventory.stock.reserved";
pub const STOCK_RESERVATION_FAILED: &str = "inventory.stock.reservation_failed";
pub const STOCK_RELEASED: &str = "inventory.stock.released";
pub const STOCK_DECREMENTED: &str = "inventory.stock.decremented";
pub const STOCK_REPLENISHED: &str = "inventory.stock.replenished";
pub const STOCK_LOW_STOCK_ALERT: &str = "inventory.stock.low_stock_alert";
pub const STOCK_MOVEMENT_RECORDED: &str = "inventory.stock.movement_recorded";

/// Dead-letter topic for order events this consumer cannot process.
pub const ORDER_EVENTS_DLQ: &str = "inventory.order_events.dlq";

/// All order topics the consumer subscribes to.
pub const CONSUMED_TOPICS: [&str; 3] = [ORDER_CREATED, ORDER_CANCELLED, ORDER_FULFILLED];
