//! `stockflow-stock` — the ledger's domain math.
//!
//! A [`StockItem`] is the atomic unit of the ledger: one `(product,
//! warehouse)` counter pair. Every committed mutation produces exactly one
//! [`StockMovement`] audit row; the low-stock rules decide when a
//! [`LowStockAlert`] opens or resolves. All of it is pure - persistence and
//! transactions live in the infra crate.

pub mod alert;
pub mod item;
pub mod movement;

pub use alert::{AlertSeverity, AlertStatus, LowStockAlert};
pub use item::StockItem;
pub use movement::{MovementRef, MovementType, StockMovement};
