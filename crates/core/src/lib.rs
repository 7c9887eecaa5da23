//! `stockflow-core` — strongly-typed identifiers and the domain error model.
//!
//! This crate defines the vocabulary shared by every other crate: UUID
//! newtypes for domain identities and the error taxonomy for business
//! failures. It has no I/O and no business rules of its own.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{
    AlertId, MovementId, OrderId, ProductId, ReservationId, StockItemId, UserId, WarehouseId,
};
