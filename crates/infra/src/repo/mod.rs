//! Postgres repositories.
//!
//! Functions that participate in a business transaction take `&mut
//! Transaction<'_, Postgres>`; read-only query paths take the pool. Row
//! mapping is explicit `try_get` per column, and every SQLx failure goes
//! through the shared error mapping.

pub mod alerts;
pub mod idempotency;
pub mod movements;
pub mod outbox;
pub mod products;
pub mod reservations;
pub mod stock_items;
pub mod warehouses;
