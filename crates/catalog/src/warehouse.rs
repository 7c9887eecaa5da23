use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, WarehouseId};

/// Physical address of a warehouse. Opaque to the core; formatting lives
/// in the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
}

/// A storage location for inventory.
///
/// `priority` orders warehouses for allocation (lower allocates first).
/// Inactive warehouses are skipped by the allocator but still back
/// existing reservations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub code: String,
    pub name: String,
    pub address: WarehouseAddress,
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Warehouse {
    /// Create a new warehouse with validation.
    pub fn new(
        id: WarehouseId,
        code: impl Into<String>,
        name: impl Into<String>,
        address: WarehouseAddress,
        priority: i32,
    ) -> DomainResult<Self> {
        let code = code.into();
        let name = name.into();
        if code.trim().is_empty() {
            return Err(DomainError::validation("warehouse code is required"));
        }
        if name.trim().is_empty() {
            return Err(DomainError::validation("warehouse name is required"));
        }

        let now = Utc::now();
        Ok(Self {
            id,
            code,
            name,
            address,
            priority,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Modify warehouse details. Rejected after soft deletion.
    pub fn update(
        &mut self,
        name: impl Into<String>,
        address: WarehouseAddress,
        priority: i32,
    ) -> DomainResult<()> {
        if self.is_deleted() {
            return Err(DomainError::invalid_state("warehouse has been deleted"));
        }
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("warehouse name is required"));
        }

        self.name = name;
        self.address = address;
        self.priority = priority;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Deactivate without deleting; existing reservations stay backed.
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.updated_at = Utc::now();
    }

    pub fn activate(&mut self) {
        self.is_active = true;
        self.updated_at = Utc::now();
    }

    /// Mark the warehouse as deleted.
    pub fn soft_delete(&mut self) -> DomainResult<()> {
        if self.is_deleted() {
            return Err(DomainError::invalid_state("warehouse has been deleted"));
        }
        let now = Utc::now();
        self.deleted_at = Some(now);
        self.is_active = false;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the allocator may place new holds here.
    pub fn allocatable(&self) -> bool {
        self.is_active && !self.is_deleted()
    }
}
