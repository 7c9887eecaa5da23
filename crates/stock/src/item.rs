use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, ProductId, StockItemId, WarehouseId};

/// Stock level of a product in a specific warehouse.
///
/// The counter pair must satisfy `0 <= quantity_reserved <=
/// quantity_on_hand` at every committed state. `version` increases by one per
/// successful mutation and backs optimistic concurrency in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity_on_hand: i64,
    pub quantity_reserved: i64,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockItem {
    /// Create an empty stock item with validation.
    pub fn new(
        id: StockItemId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        reorder_point: i64,
        reorder_quantity: i64,
    ) -> DomainResult<Self> {
        if reorder_point < 0 {
            return Err(DomainError::validation("reorder point cannot be negative"));
        }
        if reorder_quantity < 0 {
            return Err(DomainError::validation(
                "reorder quantity cannot be negative",
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id,
            product_id,
            warehouse_id,
            quantity_on_hand: 0,
            quantity_reserved: 0,
            reorder_point,
            reorder_quantity,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Quantity available for new reservations.
    pub fn available(&self) -> i64 {
        self.quantity_on_hand - self.quantity_reserved
    }

    /// Add stock to the on-hand counter.
    pub fn replenish(&mut self, quantity: i64) -> DomainResult<()> {
        require_positive(quantity)?;
        self.quantity_on_hand += quantity;
        self.touch();
        Ok(())
    }

    /// Hold stock for a reservation.
    pub fn reserve(&mut self, quantity: i64) -> DomainResult<()> {
        require_positive(quantity)?;
        if self.available() < quantity {
            return Err(DomainError::InsufficientStock {
                requested: quantity,
                available: self.available(),
            });
        }
        self.quantity_reserved += quantity;
        self.touch();
        Ok(())
    }

    /// Return previously held stock to available.
    pub fn release(&mut self, quantity: i64) -> DomainResult<()> {
        require_positive(quantity)?;
        if self.quantity_reserved < quantity {
            return Err(DomainError::InsufficientReserved {
                requested: quantity,
                reserved: self.quantity_reserved,
            });
        }
        self.quantity_reserved -= quantity;
        self.touch();
        Ok(())
    }

    /// Ship held stock: decrements both counters.
    pub fn fulfill(&mut self, quantity: i64) -> DomainResult<()> {
        require_positive(quantity)?;
        if self.quantity_reserved < quantity {
            return Err(DomainError::InsufficientReserved {
                requested: quantity,
                reserved: self.quantity_reserved,
            });
        }
        if self.quantity_on_hand < quantity {
            return Err(DomainError::InsufficientStock {
                requested: quantity,
                available: self.quantity_on_hand,
            });
        }
        self.quantity_reserved -= quantity;
        self.quantity_on_hand -= quantity;
        self.touch();
        Ok(())
    }

    /// Correct the on-hand counter by a signed delta.
    ///
    /// Rejected when the result would go negative or would strand reserved
    /// stock above on-hand.
    pub fn adjust(&mut self, delta: i64) -> DomainResult<()> {
        if delta == 0 {
            return Err(DomainError::validation("adjustment delta cannot be zero"));
        }
        let new_on_hand = self.quantity_on_hand + delta;
        if new_on_hand < 0 || self.quantity_reserved > new_on_hand {
            return Err(DomainError::NegativeResult {
                on_hand: self.quantity_on_hand,
                delta,
            });
        }
        self.quantity_on_hand = new_on_hand;
        self.touch();
        Ok(())
    }

    /// Whether available stock is at or below the reorder point.
    pub fn is_low_stock(&self) -> bool {
        self.available() <= self.reorder_point
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

fn require_positive(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}
