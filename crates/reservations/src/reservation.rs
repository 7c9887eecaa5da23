use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{
    DomainError, DomainResult, OrderId, ProductId, ReservationId, StockItemId, WarehouseId,
};

/// Status of a reservation.
///
/// `Fulfilled`, `Released` and `Expired` are terminal; no transition leaves
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Fulfilled,
    Released,
    Expired,
}

impl ReservationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Fulfilled | ReservationStatus::Released | ReservationStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Fulfilled => "fulfilled",
            ReservationStatus::Released => "released",
            ReservationStatus::Expired => "expired",
        }
    }
}

impl core::str::FromStr for ReservationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "fulfilled" => Ok(ReservationStatus::Fulfilled),
            "released" => Ok(ReservationStatus::Released),
            "expired" => Ok(ReservationStatus::Expired),
            other => Err(DomainError::validation(format!(
                "invalid reservation status: {other}"
            ))),
        }
    }
}

/// Action applied to a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationAction {
    Confirm,
    Fulfill,
    Release,
    Expire,
}

/// Total transition function of the reservation state machine.
///
/// Implemented as a switch table so the whole machine is visible in one
/// place; entity methods funnel through here.
pub fn transition(
    status: ReservationStatus,
    action: ReservationAction,
) -> DomainResult<ReservationStatus> {
    use ReservationAction::*;
    use ReservationStatus::*;

    match (status, action) {
        (Pending, Confirm) => Ok(Confirmed),
        (Pending, Fulfill) | (Confirmed, Fulfill) => Ok(Fulfilled),
        (Pending, Release) | (Confirmed, Release) => Ok(Released),
        (Pending, Expire) | (Confirmed, Expire) => Ok(Expired),
        (from, action) => Err(DomainError::invalid_state(format!(
            "cannot {:?} a {} reservation",
            action,
            from.as_str()
        ))),
    }
}

/// One line of a reservation: a hold of `quantity` against a stock item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationItem {
    pub stock_item_id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
}

/// Stock reserved for an external order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub order_id: OrderId,
    pub items: Vec<ReservationItem>,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Create a pending reservation with validation.
    pub fn new(
        id: ReservationId,
        order_id: OrderId,
        items: Vec<ReservationItem>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation(
                "at least one reservation item is required",
            ));
        }
        if items.iter().any(|i| i.quantity <= 0) {
            return Err(DomainError::validation(
                "reservation item quantity must be positive",
            ));
        }
        if expires_at <= now {
            return Err(DomainError::validation(
                "reservation expiry must be in the future",
            ));
        }

        Ok(Self {
            id,
            order_id,
            items,
            status: ReservationStatus::Pending,
            expires_at,
            created_at: now,
            updated_at: now,
            released_at: None,
            fulfilled_at: None,
        })
    }

    /// Confirm the hold (pending only, and not past expiry).
    pub fn confirm(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.is_expired(now) {
            return Err(DomainError::invalid_state("reservation has expired"));
        }
        self.status = transition(self.status, ReservationAction::Confirm)?;
        self.updated_at = now;
        Ok(())
    }

    /// Mark the reservation fulfilled (order shipped).
    pub fn fulfill(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.status = transition(self.status, ReservationAction::Fulfill)?;
        self.fulfilled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Release every remaining hold and close the reservation.
    ///
    /// Returns the `(stock_item_id, quantity)` pairs the ledger must release.
    pub fn release_all(&mut self, now: DateTime<Utc>) -> DomainResult<Vec<(StockItemId, i64)>> {
        self.status = transition(self.status, ReservationAction::Release)?;
        let released = self
            .items
            .iter()
            .filter(|i| i.quantity > 0)
            .map(|i| (i.stock_item_id, i.quantity))
            .collect();
        for item in &mut self.items {
            item.quantity = 0;
        }
        self.released_at = Some(now);
        self.updated_at = now;
        Ok(released)
    }

    /// Release only the listed per-product quantities.
    ///
    /// The reservation stays active while any item quantity remains; once
    /// everything is released it closes exactly like [`release_all`].
    /// Returns the `(stock_item_id, quantity)` pairs the ledger must release.
    ///
    /// [`release_all`]: Reservation::release_all
    pub fn release_partial(
        &mut self,
        partial: &[(ProductId, i64)],
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<(StockItemId, i64)>> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_state(format!(
                "cannot Release a {} reservation",
                self.status.as_str()
            )));
        }

        let mut released = Vec::new();
        for &(product_id, quantity) in partial {
            if quantity <= 0 {
                return Err(DomainError::validation(
                    "partial release quantity must be positive",
                ));
            }
            let mut remaining = quantity;
            for item in self.items.iter_mut().filter(|i| i.product_id == product_id) {
                if remaining == 0 {
                    break;
                }
                let take = remaining.min(item.quantity);
                if take > 0 {
                    item.quantity -= take;
                    remaining -= take;
                    released.push((item.stock_item_id, take));
                }
            }
            if remaining > 0 {
                return Err(DomainError::InsufficientReserved {
                    requested: quantity,
                    reserved: quantity - remaining,
                });
            }
        }

        if self.items.iter().all(|i| i.quantity == 0) {
            self.status = transition(self.status, ReservationAction::Release)?;
            self.released_at = Some(now);
        }
        self.updated_at = now;
        Ok(released)
    }

    /// System transition driven by the expiry sweeper.
    ///
    /// Returns the holds the ledger must release.
    pub fn expire(&mut self, now: DateTime<Utc>) -> DomainResult<Vec<(StockItemId, i64)>> {
        self.status = transition(self.status, ReservationAction::Expire)?;
        let released = self
            .items
            .iter()
            .filter(|i| i.quantity > 0)
            .map(|i| (i.stock_item_id, i.quantity))
            .collect();
        for item in &mut self.items {
            item.quantity = 0;
        }
        self.released_at = Some(now);
        self.updated_at = now;
        Ok(released)
    }

    /// Whether the sweeper should pick this reservation up.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now && !self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(quantity: i64) -> ReservationItem {
        ReservationItem {
            stock_item_id: StockItemId::new(),
            product_id: ProductId::new(),
            warehouse_id: WarehouseId::new(),
            quantity,
        }
    }

    fn test_reservation(quantities: &[i64]) -> Reservation {
        let now = Utc::now();
        Reservation::new(
            ReservationId::new(),
            OrderId::new(),
            quantities.iter().map(|&q| item(q)).collect(),
            now + Duration::minutes(15),
            now,
        )
        .unwrap()
    }

    #[test]
    fn new_reservation_is_pending() {
        let r = test_reservation(&[3]);
        assert_eq!(r.status, ReservationStatus::Pending);
        assert!(r.is_active());
        assert_eq!(r.total_quantity(), 3);
    }

    #[test]
    fn rejects_empty_items() {
        let now = Utc::now();
        let err = Reservation::new(
            ReservationId::new(),
            OrderId::new(),
            vec![],
            now + Duration::minutes(15),
            now,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn rejects_expiry_in_the_past() {
        let now = Utc::now();
        let err = Reservation::new(
            ReservationId::new(),
            OrderId::new(),
            vec![item(1)],
            now,
            now,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn transition_table_is_total() {
        use ReservationAction::*;
        use ReservationStatus::*;

        assert_eq!(transition(Pending, Confirm).unwrap(), Confirmed);
        assert_eq!(transition(Pending, Fulfill).unwrap(), Fulfilled);
        assert_eq!(transition(Confirmed, Fulfill).unwrap(), Fulfilled);
        assert_eq!(transition(Pending, Release).unwrap(), Released);
        assert_eq!(transition(Confirmed, Release).unwrap(), Released);
        assert_eq!(transition(Pending, Expire).unwrap(), Expired);
        assert_eq!(transition(Confirmed, Expire).unwrap(), Expired);

        // Confirm only applies to pending.
        assert!(transition(Confirmed, Confirm).is_err());

        // Terminal states reject everything.
        for terminal in [Fulfilled, Released, Expired] {
            for action in [Confirm, Fulfill, Release, Expire] {
                assert!(matches!(
                    transition(terminal, action).unwrap_err(),
                    DomainError::InvalidState(_)
                ));
            }
        }
    }

    #[test]
    fn fulfill_after_release_is_invalid() {
        let mut r = test_reservation(&[3]);
        r.release_all(Utc::now()).unwrap();
        assert!(matches!(
            r.fulfill(Utc::now()).unwrap_err(),
            DomainError::InvalidState(_)
        ));
    }

    #[test]
    fn release_after_fulfill_is_invalid() {
        let mut r = test_reservation(&[3]);
        r.fulfill(Utc::now()).unwrap();
        assert!(matches!(
            r.release_all(Utc::now()).unwrap_err(),
            DomainError::InvalidState(_)
        ));
    }

    #[test]
    fn release_all_returns_every_hold() {
        let mut r = test_reservation(&[3, 2]);
        let released = r.release_all(Utc::now()).unwrap();
        assert_eq!(released.len(), 2);
        assert_eq!(released.iter().map(|(_, q)| q).sum::<i64>(), 5);
        assert_eq!(r.status, ReservationStatus::Released);
        assert!(r.released_at.is_some());
        assert_eq!(r.total_quantity(), 0);
    }

    #[test]
    fn partial_release_keeps_reservation_active() {
        let mut r = test_reservation(&[3]);
        let product_id = r.items[0].product_id;

        let released = r.release_partial(&[(product_id, 2)], Utc::now()).unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].1, 2);
        assert_eq!(r.status, ReservationStatus::Pending);
        assert_eq!(r.total_quantity(), 1);
    }

    #[test]
    fn partial_release_of_everything_closes_the_reservation() {
        let mut r = test_reservation(&[3]);
        let product_id = r.items[0].product_id;

        r.release_partial(&[(product_id, 3)], Utc::now()).unwrap();
        assert_eq!(r.status, ReservationStatus::Released);
        assert!(r.released_at.is_some());
    }

    #[test]
    fn partial_release_beyond_held_quantity_fails() {
        let mut r = test_reservation(&[3]);
        let product_id = r.items[0].product_id;

        let err = r
            .release_partial(&[(product_id, 4)], Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientReserved { .. }));
    }

    #[test]
    fn expire_from_confirmed() {
        let mut r = test_reservation(&[2]);
        r.confirm(Utc::now()).unwrap();
        let released = r.expire(Utc::now()).unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(r.status, ReservationStatus::Expired);
    }

    #[test]
    fn confirm_past_expiry_is_invalid() {
        let mut r = test_reservation(&[2]);
        let late = r.expires_at + Duration::milliseconds(1);
        assert!(matches!(
            r.confirm(late).unwrap_err(),
            DomainError::InvalidState(_)
        ));
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let r = test_reservation(&[2]);
        assert!(!r.is_expired(r.expires_at - Duration::milliseconds(1)));
        assert!(!r.is_expired(r.expires_at));
        assert!(r.is_expired(r.expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn terminal_reservation_is_never_expired() {
        let mut r = test_reservation(&[2]);
        r.fulfill(Utc::now()).unwrap();
        assert!(!r.is_expired(r.expires_at + Duration::hours(1)));
    }
}
