//! `stockflow-catalog` — products and warehouses.
//!
//! The catalog is deliberately thin: the ledger only needs product existence
//! and the `min_stock` threshold, and the allocator only needs warehouse
//! activity and priority. CRUD surfaces live elsewhere.

pub mod product;
pub mod warehouse;

pub use product::{Product, ProductVariant};
pub use warehouse::{Warehouse, WarehouseAddress};
