use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, MovementId, StockItemId};

use crate::item::StockItem;

/// Kind of ledger transition a movement records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Replenishment,
    Reservation,
    Release,
    Fulfillment,
    Adjustment,
    Transfer,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Replenishment => "replenishment",
            MovementType::Reservation => "reservation",
            MovementType::Release => "release",
            MovementType::Fulfillment => "fulfillment",
            MovementType::Adjustment => "adjustment",
            MovementType::Transfer => "transfer",
        }
    }
}

impl core::str::FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replenishment" => Ok(MovementType::Replenishment),
            "reservation" => Ok(MovementType::Reservation),
            "release" => Ok(MovementType::Release),
            "fulfillment" => Ok(MovementType::Fulfillment),
            "adjustment" => Ok(MovementType::Adjustment),
            "transfer" => Ok(MovementType::Transfer),
            other => Err(DomainError::validation(format!(
                "invalid movement type: {other}"
            ))),
        }
    }
}

/// Reference tuple attached to a ledger mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRef {
    /// Order ID, reservation ID, etc.
    pub reference_id: Option<String>,
    /// "order", "reservation", "manual", etc.
    pub reference_type: Option<String>,
    pub reason: Option<String>,
    /// Actor identity; "system" on background paths.
    pub created_by: String,
}

impl MovementRef {
    pub fn system(reason: impl Into<String>) -> Self {
        Self {
            reference_id: None,
            reference_type: None,
            reason: Some(reason.into()),
            created_by: "system".to_string(),
        }
    }

    pub fn with_reference(
        mut self,
        reference_id: impl Into<String>,
        reference_type: impl Into<String>,
    ) -> Self {
        self.reference_id = Some(reference_id.into());
        self.reference_type = Some(reference_type.into());
        self
    }
}

/// Append-only audit record of one ledger transition.
///
/// `quantity` is signed: positive for additions on the axis the movement
/// type touches, negative for reductions. The pre/post images make every
/// movement independently auditable without replaying the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub stock_item_id: StockItemId,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub previous_on_hand: i64,
    pub new_on_hand: i64,
    pub previous_reserved: i64,
    pub new_reserved: i64,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// Record a transition between two images of the same stock item.
    ///
    /// Validates that the counter deltas match the sign rule of
    /// `movement_type`; a mismatch means the caller mixed up images and is
    /// rejected before anything reaches the store.
    pub fn record(
        id: MovementId,
        movement_type: MovementType,
        quantity: i64,
        before: &StockItem,
        after: &StockItem,
        reference: MovementRef,
    ) -> DomainResult<Self> {
        if before.id != after.id {
            return Err(DomainError::invariant(
                "movement images refer to different stock items",
            ));
        }
        if quantity == 0 {
            return Err(DomainError::validation("movement quantity cannot be zero"));
        }

        let on_hand_delta = after.quantity_on_hand - before.quantity_on_hand;
        let reserved_delta = after.quantity_reserved - before.quantity_reserved;

        let consistent = match movement_type {
            MovementType::Replenishment => {
                quantity > 0 && on_hand_delta == quantity && reserved_delta == 0
            }
            MovementType::Reservation => {
                quantity > 0 && reserved_delta == quantity && on_hand_delta == 0
            }
            MovementType::Release => {
                quantity < 0 && reserved_delta == quantity && on_hand_delta == 0
            }
            MovementType::Fulfillment => {
                quantity < 0 && on_hand_delta == quantity && reserved_delta == quantity
            }
            MovementType::Adjustment => on_hand_delta == quantity && reserved_delta == 0,
            MovementType::Transfer => on_hand_delta == quantity && reserved_delta == 0,
        };
        if !consistent {
            return Err(DomainError::invariant(format!(
                "movement {} of {} does not match deltas (on_hand {}, reserved {})",
                movement_type.as_str(),
                quantity,
                on_hand_delta,
                reserved_delta
            )));
        }

        Ok(Self {
            id,
            stock_item_id: before.id,
            movement_type,
            quantity,
            previous_on_hand: before.quantity_on_hand,
            new_on_hand: after.quantity_on_hand,
            previous_reserved: before.quantity_reserved,
            new_reserved: after.quantity_reserved,
            reference_id: reference.reference_id,
            reference_type: reference.reference_type,
            reason: reference.reason,
            created_by: reference.created_by,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::{ProductId, WarehouseId};

    fn item_with(on_hand: i64, reserved: i64) -> StockItem {
        let mut item =
            StockItem::new(StockItemId::new(), ProductId::new(), WarehouseId::new(), 0, 0).unwrap();
        if on_hand > 0 {
            item.replenish(on_hand).unwrap();
        }
        if reserved > 0 {
            item.reserve(reserved).unwrap();
        }
        item
    }

    fn same_item(before: &StockItem, on_hand: i64, reserved: i64) -> StockItem {
        let mut after = before.clone();
        after.quantity_on_hand = on_hand;
        after.quantity_reserved = reserved;
        after
    }

    #[test]
    fn replenishment_records_positive_on_hand_delta() {
        let before = item_with(10, 0);
        let after = same_item(&before, 15, 0);
        let m = StockMovement::record(
            MovementId::new(),
            MovementType::Replenishment,
            5,
            &before,
            &after,
            MovementRef::system("restock"),
        )
        .unwrap();

        assert_eq!(m.previous_on_hand, 10);
        assert_eq!(m.new_on_hand, 15);
        assert_eq!(m.quantity, 5);
    }

    #[test]
    fn reservation_records_reserved_axis() {
        let before = item_with(10, 0);
        let after = same_item(&before, 10, 3);
        let m = StockMovement::record(
            MovementId::new(),
            MovementType::Reservation,
            3,
            &before,
            &after,
            MovementRef::system("hold"),
        )
        .unwrap();
        assert_eq!(m.previous_reserved, 0);
        assert_eq!(m.new_reserved, 3);
    }

    #[test]
    fn release_quantity_is_negative() {
        let before = item_with(10, 3);
        let after = same_item(&before, 10, 0);
        let m = StockMovement::record(
            MovementId::new(),
            MovementType::Release,
            -3,
            &before,
            &after,
            MovementRef::system("cancelled"),
        )
        .unwrap();
        assert_eq!(m.quantity, -3);
    }

    #[test]
    fn fulfillment_moves_both_axes() {
        let before = item_with(10, 3);
        let after = same_item(&before, 7, 0);
        let m = StockMovement::record(
            MovementId::new(),
            MovementType::Fulfillment,
            -3,
            &before,
            &after,
            MovementRef::system("shipped"),
        )
        .unwrap();
        assert_eq!(m.new_on_hand, 7);
        assert_eq!(m.new_reserved, 0);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let before = item_with(10, 0);
        let after = before.clone();
        let err = StockMovement::record(
            MovementId::new(),
            MovementType::Adjustment,
            0,
            &before,
            &after,
            MovementRef::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn mismatched_delta_is_rejected() {
        let before = item_with(10, 0);
        let after = same_item(&before, 15, 0);
        // Claims +3 but the images moved +5.
        let err = StockMovement::record(
            MovementId::new(),
            MovementType::Replenishment,
            3,
            &before,
            &after,
            MovementRef::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn mismatched_items_are_rejected() {
        let before = item_with(10, 0);
        let other = item_with(10, 0);
        let err = StockMovement::record(
            MovementId::new(),
            MovementType::Adjustment,
            1,
            &before,
            &other,
            MovementRef::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn movement_type_round_trips_through_str() {
        for mt in [
            MovementType::Replenishment,
            MovementType::Reservation,
            MovementType::Release,
            MovementType::Fulfillment,
            MovementType::Adjustment,
            MovementType::Transfer,
        ] {
            let parsed: MovementType = mt.as_str().parse().unwrap();
            assert_eq!(parsed, mt);
        }
    }
}
