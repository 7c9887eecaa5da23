//! `stockflow-infra` — persistence, transactions, and the message bus.
//!
//! Everything stateful lives here: the Postgres-backed stock ledger and its
//! repositories, the reservation coordinator, the transactional outbox and
//! its Kafka publisher, the order-event consumer, and the expiry sweeper.
//! Domain crates stay pure; this crate owns every `Transaction` and every
//! broker round trip.

pub mod config;
pub mod consumer;
#[cfg(test)]
mod integration_tests;
pub mod coordinator;
pub mod error;
pub mod kafka;
pub mod ledger;
pub mod low_stock;
pub mod outbox_publisher;
pub mod repo;
pub mod retry;
pub mod shutdown;
pub mod sweeper;

pub use config::AppConfig;
pub use consumer::{run_consumer, Disposition, OrderEventHandler};
pub use coordinator::{ReservationCoordinator, ReserveCommand, ReserveOutcome};
pub use error::{InfraError, InfraResult};
pub use ledger::StockService;
pub use outbox_publisher::{MessagePublisher, OutboxPublisher};
pub use shutdown::{shutdown_channel, ShutdownHandle, ShutdownSignal};
pub use sweeper::ExpirySweeper;
