//! Reservation coordinator: the transactional use cases driving the state
//! machine against the ledger.
//!
//! Every use case exists in two forms: an `*_in_tx` core that runs inside a
//! caller-provided transaction (the event consumer composes these with its
//! idempotency record), and a public wrapper that owns the transaction and
//! retries lock conflicts.

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

use stockflow_core::{DomainError, OrderId, ProductId, ReservationId, StockItemId};
use stockflow_events::{
    EventEnvelope, FailedItemDetail, ReleasedItemDetail, ReservedItemDetail,
    StockDecrementedEvent, StockReleasedEvent, StockReservationFailedEvent, StockReservedEvent,
};
use stockflow_reservations::{
    allocate, AllocationError, BasketLine, Reservation, ReservationItem, Shortfall,
};
use stockflow_stock::MovementRef;

use crate::config::ReservationConfig;
use crate::error::{map_sqlx, InfraError, InfraResult};
use crate::ledger::{self, MutationCtx};
use crate::repo::{outbox, reservations, stock_items};
use crate::retry::{with_conflict_retry, RetryPolicy};

/// Reason recorded when the sweeper expires a reservation.
pub const REASON_EXPIRED: &str = "expired";

/// Reason recorded when an order cancellation releases reservations.
pub const REASON_ORDER_CANCELLED: &str = "order_cancelled";

/// Request to hold stock for an order.
#[derive(Debug, Clone)]
pub struct ReserveCommand {
    pub order_id: OrderId,
    pub items: Vec<BasketLine>,
    /// Defaults to now + the configured TTL when absent.
    pub expires_at: Option<DateTime<Utc>>,
    pub correlation_id: String,
    pub actor: String,
}

/// Business outcome of a reserve request. A shortage is not an error on
/// event-driven paths; it commits a `reservation_failed` event instead.
#[derive(Debug, Clone)]
pub enum ReserveOutcome {
    Reserved(Reservation),
    Failed(Vec<Shortfall>),
}

#[derive(Debug, Clone)]
pub struct ReservationCoordinator {
    pool: PgPool,
    default_ttl: Duration,
    retry: RetryPolicy,
}

impl ReservationCoordinator {
    pub fn new(pool: PgPool, config: &ReservationConfig) -> Self {
        Self {
            pool,
            default_ttl: Duration::from_std(config.default_ttl)
                .unwrap_or_else(|_| Duration::minutes(15)),
            retry: RetryPolicy::ledger_conflict(),
        }
    }

    /// Reserve stock for an order in its own transaction.
    #[instrument(skip(self, cmd), fields(order_id = %cmd.order_id), err)]
    pub async fn reserve(&self, cmd: ReserveCommand) -> InfraResult<ReserveOutcome> {
        with_conflict_retry(&self.retry, || async {
            let mut tx = self.begin().await?;
            let outcome = self.reserve_in_tx(&mut tx, &cmd).await?;
            commit(tx).await?;
            Ok(outcome)
        })
        .await
    }

    /// Core reserve algorithm, inside the caller's transaction.
    ///
    /// Plans against a snapshot, locks the planned rows in ascending
    /// `stock_item_id` order, re-validates under those locks, and only then
    /// mutates the ledger. A shortage at either stage writes the failure
    /// event and returns `Failed` without touching a single counter.
    pub async fn reserve_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cmd: &ReserveCommand,
    ) -> InfraResult<ReserveOutcome> {
        let now = Utc::now();
        if let Some(expires_at) = cmd.expires_at {
            if expires_at <= now {
                return Err(InfraError::Domain(DomainError::validation(
                    "reservation expiry must be in the future",
                )));
            }
        }
        let expires_at = cmd.expires_at.unwrap_or(now + self.default_ttl);

        if cmd.items.is_empty() {
            return Err(InfraError::Domain(DomainError::validation(
                "reservation requires at least one item",
            )));
        }
        if reservations::has_active_for_order(tx, cmd.order_id).await? {
            return Err(InfraError::Domain(DomainError::invalid_state(
                "order already has an active reservation",
            )));
        }

        // Draft plan against a snapshot.
        let product_ids: Vec<ProductId> = cmd.items.iter().map(|l| l.product_id).collect();
        let candidates = stock_items::candidates_for_products(tx, &product_ids).await?;
        let plan = match allocate(&cmd.items, &candidates) {
            Ok(plan) => plan,
            Err(AllocationError::InsufficientStock(shortfalls)) => {
                self.enqueue_failure(tx, cmd, &shortfalls).await?;
                return Ok(ReserveOutcome::Failed(shortfalls));
            }
            Err(AllocationError::InvalidQuantity) => {
                return Err(InfraError::Domain(DomainError::validation(
                    "basket quantities must be positive",
                )));
            }
        };

        // Lock in ascending order, then re-validate the snapshot numbers.
        let mut locked = std::collections::HashMap::new();
        for stock_item_id in plan.lock_order() {
            let item = stock_items::lock(tx, stock_item_id).await?;
            locked.insert(stock_item_id, item);
        }

        let mut short_products = Vec::new();
        for line in &cmd.items {
            let available_now: i64 = locked
                .values()
                .filter(|i| i.product_id == line.product_id)
                .map(|i| i.available())
                .sum();
            let planned = plan.planned_for(line.product_id);
            if available_now < planned && !short_products.contains(&line.product_id) {
                short_products.push(line.product_id);
            }
        }
        if !short_products.is_empty() {
            let shortfalls: Vec<Shortfall> = cmd
                .items
                .iter()
                .filter(|l| short_products.contains(&l.product_id))
                .map(|l| Shortfall {
                    product_id: l.product_id,
                    requested: l.quantity,
                    available: locked
                        .values()
                        .filter(|i| i.product_id == l.product_id)
                        .map(|i| i.available())
                        .sum(),
                })
                .collect();
            self.enqueue_failure(tx, cmd, &shortfalls).await?;
            return Ok(ReserveOutcome::Failed(shortfalls));
        }

        // Apply the holds. Entries follow plan order; the rows are already
        // locked, so re-entry inside the ledger is cheap.
        let reservation_id = ReservationId::new();
        let ctx = MutationCtx {
            reference: MovementRef {
                reference_id: Some(reservation_id.to_string()),
                reference_type: Some("reservation".to_string()),
                reason: None,
                created_by: cmd.actor.clone(),
            },
            correlation_id: cmd.correlation_id.clone(),
        };
        for entry in &plan.entries {
            ledger::reserve(tx, entry.stock_item_id, entry.quantity, &ctx).await?;
        }

        let items: Vec<ReservationItem> = plan
            .entries
            .iter()
            .map(|e| ReservationItem {
                stock_item_id: e.stock_item_id,
                product_id: e.product_id,
                warehouse_id: e.warehouse_id,
                quantity: e.quantity,
            })
            .collect();
        let reservation = Reservation::new(reservation_id, cmd.order_id, items, expires_at, now)?;
        reservations::insert(tx, &reservation).await?;

        let event = StockReservedEvent {
            reservation_id,
            order_id: cmd.order_id,
            items: reservation
                .items
                .iter()
                .map(|i| ReservedItemDetail {
                    stock_item_id: i.stock_item_id,
                    product_id: i.product_id,
                    warehouse_id: i.warehouse_id,
                    quantity_reserved: i.quantity,
                })
                .collect(),
            expires_at,
        };
        outbox::enqueue(tx, &EventEnvelope::wrap(&event, &cmd.correlation_id)?).await?;

        info!(reservation_id = %reservation_id, order_id = %cmd.order_id, "stock reserved");
        Ok(ReserveOutcome::Reserved(reservation))
    }

    /// Confirm a pending reservation.
    #[instrument(skip(self), err)]
    pub async fn confirm(&self, reservation_id: ReservationId) -> InfraResult<Reservation> {
        with_conflict_retry(&self.retry, || async {
            let mut tx = self.begin().await?;
            let mut reservation = reservations::lock(&mut tx, reservation_id).await?;
            reservation.confirm(Utc::now())?;
            reservations::update(&mut tx, &reservation).await?;
            commit(tx).await?;
            Ok(reservation)
        })
        .await
    }

    /// Release a reservation (fully, or the listed per-product quantities)
    /// in its own transaction.
    #[instrument(skip(self, partial), err)]
    pub async fn release(
        &self,
        reservation_id: ReservationId,
        reason: &str,
        partial: Option<Vec<(ProductId, i64)>>,
        correlation_id: &str,
        actor: &str,
    ) -> InfraResult<Reservation> {
        with_conflict_retry(&self.retry, || async {
            let mut tx = self.begin().await?;
            let reservation = self
                .release_in_tx(
                    &mut tx,
                    reservation_id,
                    reason,
                    partial.clone(),
                    correlation_id,
                    actor,
                )
                .await?;
            commit(tx).await?;
            Ok(reservation)
        })
        .await
    }

    /// Core release algorithm, inside the caller's transaction.
    pub async fn release_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        reservation_id: ReservationId,
        reason: &str,
        partial: Option<Vec<(ProductId, i64)>>,
        correlation_id: &str,
        actor: &str,
    ) -> InfraResult<Reservation> {
        let reservation = reservations::lock(tx, reservation_id).await?;
        self.release_locked(tx, reservation, reason, partial, correlation_id, actor)
            .await
    }

    /// Release every active reservation for an order. Returns the ids
    /// released; empty when the order has none (cancellation of an order
    /// whose reservation already expired is a no-op, not an error).
    pub async fn release_all_for_order_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
        reason: &str,
        correlation_id: &str,
        actor: &str,
    ) -> InfraResult<Vec<ReservationId>> {
        let active = reservations::lock_active_by_order(tx, order_id).await?;
        let mut released = Vec::with_capacity(active.len());
        for reservation in active {
            let id = reservation.id;
            self.release_locked(tx, reservation, reason, None, correlation_id, actor)
                .await?;
            released.push(id);
        }
        Ok(released)
    }

    async fn release_locked(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        mut reservation: Reservation,
        reason: &str,
        partial: Option<Vec<(ProductId, i64)>>,
        correlation_id: &str,
        actor: &str,
    ) -> InfraResult<Reservation> {
        let now = Utc::now();
        let before_items = reservation.items.clone();

        let mut pairs = match partial {
            None => reservation.release_all(now)?,
            Some(list) => reservation.release_partial(&list, now)?,
        };
        pairs.sort_by_key(|(stock_item_id, _)| *stock_item_id);

        let ctx = MutationCtx {
            reference: MovementRef {
                reference_id: Some(reservation.id.to_string()),
                reference_type: Some("reservation".to_string()),
                reason: Some(reason.to_string()),
                created_by: actor.to_string(),
            },
            correlation_id: correlation_id.to_string(),
        };
        for (stock_item_id, quantity) in &pairs {
            ledger::release(tx, *stock_item_id, *quantity, &ctx).await?;
        }

        reservations::update(tx, &reservation).await?;

        let event = StockReleasedEvent {
            reservation_id: reservation.id,
            order_id: reservation.order_id,
            release_reason: reason.to_string(),
            items: pairs
                .iter()
                .filter_map(|(stock_item_id, quantity)| {
                    product_for(&before_items, *stock_item_id).map(|product_id| {
                        ReleasedItemDetail {
                            stock_item_id: *stock_item_id,
                            product_id,
                            quantity_released: *quantity,
                        }
                    })
                })
                .collect(),
        };
        outbox::enqueue(tx, &EventEnvelope::wrap(&event, correlation_id)?).await?;

        info!(
            reservation_id = %reservation.id,
            order_id = %reservation.order_id,
            reason,
            "reservation released"
        );
        Ok(reservation)
    }

    /// Fulfill a reservation in its own transaction.
    #[instrument(skip(self), err)]
    pub async fn fulfill(
        &self,
        reservation_id: ReservationId,
        correlation_id: &str,
        actor: &str,
    ) -> InfraResult<Reservation> {
        with_conflict_retry(&self.retry, || async {
            let mut tx = self.begin().await?;
            let reservation = self
                .fulfill_in_tx(&mut tx, reservation_id, correlation_id, actor)
                .await?;
            commit(tx).await?;
            Ok(reservation)
        })
        .await
    }

    /// Core fulfill algorithm, inside the caller's transaction.
    pub async fn fulfill_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        reservation_id: ReservationId,
        correlation_id: &str,
        actor: &str,
    ) -> InfraResult<Reservation> {
        let reservation = reservations::lock(tx, reservation_id).await?;
        self.fulfill_locked(tx, reservation, correlation_id, actor)
            .await
    }

    /// Fulfill the most recent active reservation for an order, if any.
    pub async fn fulfill_latest_for_order_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
        correlation_id: &str,
        actor: &str,
    ) -> InfraResult<Option<ReservationId>> {
        match reservations::lock_latest_active_by_order(tx, order_id).await? {
            Some(reservation) => {
                let id = reservation.id;
                self.fulfill_locked(tx, reservation, correlation_id, actor)
                    .await?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    async fn fulfill_locked(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        mut reservation: Reservation,
        correlation_id: &str,
        actor: &str,
    ) -> InfraResult<Reservation> {
        let now = Utc::now();

        let mut pairs: Vec<(StockItemId, i64)> = reservation
            .items
            .iter()
            .filter(|i| i.quantity > 0)
            .map(|i| (i.stock_item_id, i.quantity))
            .collect();
        pairs.sort_by_key(|(stock_item_id, _)| *stock_item_id);

        // Transition first so a terminal reservation never touches the ledger.
        reservation.fulfill(now)?;

        let ctx = MutationCtx {
            reference: MovementRef {
                reference_id: Some(reservation.id.to_string()),
                reference_type: Some("reservation".to_string()),
                reason: None,
                created_by: actor.to_string(),
            },
            correlation_id: correlation_id.to_string(),
        };
        for (stock_item_id, quantity) in &pairs {
            ledger::fulfill(tx, *stock_item_id, *quantity, &ctx).await?;
        }

        reservations::update(tx, &reservation).await?;

        let event = StockDecrementedEvent {
            reservation_id: reservation.id,
            order_id: reservation.order_id,
            items: pairs
                .iter()
                .filter_map(|(stock_item_id, quantity)| {
                    product_for(&reservation.items, *stock_item_id).map(|product_id| {
                        ReleasedItemDetail {
                            stock_item_id: *stock_item_id,
                            product_id,
                            quantity_released: *quantity,
                        }
                    })
                })
                .collect(),
        };
        outbox::enqueue(tx, &EventEnvelope::wrap(&event, correlation_id)?).await?;

        info!(
            reservation_id = %reservation.id,
            order_id = %reservation.order_id,
            "reservation fulfilled"
        );
        Ok(reservation)
    }

    /// Expire one overdue reservation in its own transaction.
    ///
    /// Idempotent: a reservation that reached a terminal state between the
    /// sweeper's scan and this call is skipped. Returns whether a
    /// transition happened.
    #[instrument(skip(self), err)]
    pub async fn expire(&self, reservation_id: ReservationId) -> InfraResult<bool> {
        with_conflict_retry(&self.retry, || async {
            let mut tx = self.begin().await?;
            let mut reservation = reservations::lock(&mut tx, reservation_id).await?;
            if reservation.status.is_terminal() {
                return Ok(false);
            }

            let now = Utc::now();
            let correlation_id = Uuid::now_v7().to_string();
            let before_items = reservation.items.clone();
            let mut pairs = reservation.expire(now)?;
            pairs.sort_by_key(|(stock_item_id, _)| *stock_item_id);

            let ctx = MutationCtx {
                reference: MovementRef {
                    reference_id: Some(reservation.id.to_string()),
                    reference_type: Some("reservation".to_string()),
                    reason: Some(REASON_EXPIRED.to_string()),
                    created_by: "system".to_string(),
                },
                correlation_id: correlation_id.clone(),
            };
            for (stock_item_id, quantity) in &pairs {
                ledger::release(&mut tx, *stock_item_id, *quantity, &ctx).await?;
            }

            reservations::update(&mut tx, &reservation).await?;

            let event = StockReleasedEvent {
                reservation_id: reservation.id,
                order_id: reservation.order_id,
                release_reason: REASON_EXPIRED.to_string(),
                items: pairs
                    .iter()
                    .filter_map(|(stock_item_id, quantity)| {
                        product_for(&before_items, *stock_item_id).map(|product_id| {
                            ReleasedItemDetail {
                                stock_item_id: *stock_item_id,
                                product_id,
                                quantity_released: *quantity,
                            }
                        })
                    })
                    .collect(),
            };
            outbox::enqueue(&mut tx, &EventEnvelope::wrap(&event, &correlation_id)?).await?;
            commit(tx).await?;

            info!(reservation_id = %reservation_id, "reservation expired");
            Ok(true)
        })
        .await
    }

    async fn enqueue_failure(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cmd: &ReserveCommand,
        shortfalls: &[Shortfall],
    ) -> InfraResult<()> {
        let event = StockReservationFailedEvent {
            order_id: cmd.order_id,
            failure_reason: "insufficient stock".to_string(),
            failed_items: shortfalls
                .iter()
                .map(|s| FailedItemDetail {
                    product_id: s.product_id,
                    requested_quantity: s.requested,
                    available_quantity: s.available,
                })
                .collect(),
        };
        outbox::enqueue(tx, &EventEnvelope::wrap(&event, &cmd.correlation_id)?).await?;
        info!(order_id = %cmd.order_id, lines = shortfalls.len(), "reservation failed: insufficient stock");
        Ok(())
    }

    async fn begin(&self) -> InfraResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(|e| map_sqlx("begin", e))
    }
}

fn product_for(items: &[ReservationItem], stock_item_id: StockItemId) -> Option<ProductId> {
    items
        .iter()
        .find(|i| i.stock_item_id == stock_item_id)
        .map(|i| i.product_id)
}

async fn commit(tx: Transaction<'static, Postgres>) -> InfraResult<()> {
    tx.commit().await.map_err(|e| map_sqlx("commit", e))
}
