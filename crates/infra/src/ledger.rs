//! The stock ledger: transactional counter mutations with an audit trail.
//!
//! Every mutator locks the target row for the caller's transaction, applies
//! the counter math from the domain crate, persists the post-image, writes
//! exactly one movement row, enqueues the audit event, and runs the
//! low-stock detector - all in the same transaction. Callers that span
//! multiple stock items must lock in ascending `stock_item_id` order.

use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use stockflow_core::{DomainError, MovementId, ProductId, StockItemId, UserId, WarehouseId};
use stockflow_events::{EventEnvelope, StockMovementRecordedEvent, StockReplenishedEvent};
use stockflow_stock::{LowStockAlert, MovementRef, MovementType, StockItem, StockMovement};

use crate::error::{InfraError, InfraResult};
use crate::low_stock;
use crate::repo::{alerts, movements, outbox, products, stock_items, warehouses};
use crate::retry::{with_conflict_retry, RetryPolicy};

/// Reference context attached to one ledger mutation.
#[derive(Debug, Clone)]
pub struct MutationCtx {
    pub reference: MovementRef,
    pub correlation_id: String,
}

impl MutationCtx {
    pub fn system(reason: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            reference: MovementRef::system(reason),
            correlation_id: correlation_id.into(),
        }
    }
}

/// Add stock to the on-hand counter and emit `inventory.stock.replenished`.
pub async fn replenish(
    tx: &mut Transaction<'_, Postgres>,
    stock_item_id: StockItemId,
    quantity: i64,
    ctx: &MutationCtx,
) -> InfraResult<StockItem> {
    let before = stock_items::lock(tx, stock_item_id).await?;
    let mut item = before.clone();
    item.replenish(quantity)?;

    let movement = finish_mutation(
        tx,
        &before,
        &item,
        MovementType::Replenishment,
        quantity,
        ctx,
    )
    .await?;

    let event = StockReplenishedEvent {
        movement_id: movement.id,
        stock_item_id: item.id,
        product_id: item.product_id,
        warehouse_id: item.warehouse_id,
        quantity,
        new_on_hand: item.quantity_on_hand,
    };
    outbox::enqueue(tx, &EventEnvelope::wrap(&event, &ctx.correlation_id)?).await?;

    Ok(item)
}

/// Hold stock for a reservation. Requires `available >= quantity`.
pub async fn reserve(
    tx: &mut Transaction<'_, Postgres>,
    stock_item_id: StockItemId,
    quantity: i64,
    ctx: &MutationCtx,
) -> InfraResult<StockItem> {
    let before = stock_items::lock(tx, stock_item_id).await?;
    let mut item = before.clone();
    item.reserve(quantity)?;

    finish_mutation(tx, &before, &item, MovementType::Reservation, quantity, ctx).await?;
    Ok(item)
}

/// Return held stock to available. Requires `reserved >= quantity`.
pub async fn release(
    tx: &mut Transaction<'_, Postgres>,
    stock_item_id: StockItemId,
    quantity: i64,
    ctx: &MutationCtx,
) -> InfraResult<StockItem> {
    let before = stock_items::lock(tx, stock_item_id).await?;
    let mut item = before.clone();
    item.release(quantity)?;

    finish_mutation(tx, &before, &item, MovementType::Release, -quantity, ctx).await?;
    Ok(item)
}

/// Ship held stock: both counters decrease.
pub async fn fulfill(
    tx: &mut Transaction<'_, Postgres>,
    stock_item_id: StockItemId,
    quantity: i64,
    ctx: &MutationCtx,
) -> InfraResult<StockItem> {
    let before = stock_items::lock(tx, stock_item_id).await?;
    let mut item = before.clone();
    item.fulfill(quantity)?;

    finish_mutation(tx, &before, &item, MovementType::Fulfillment, -quantity, ctx).await?;
    Ok(item)
}

/// Correct on-hand by a signed delta.
pub async fn adjust(
    tx: &mut Transaction<'_, Postgres>,
    stock_item_id: StockItemId,
    delta: i64,
    ctx: &MutationCtx,
) -> InfraResult<StockItem> {
    let before = stock_items::lock(tx, stock_item_id).await?;
    let mut item = before.clone();
    item.adjust(delta)?;

    finish_mutation(tx, &before, &item, MovementType::Adjustment, delta, ctx).await?;
    Ok(item)
}

/// Shared tail of every mutator: persist counters, write the movement row,
/// enqueue the audit event, run the low-stock detector.
async fn finish_mutation(
    tx: &mut Transaction<'_, Postgres>,
    before: &StockItem,
    after: &StockItem,
    movement_type: MovementType,
    signed_quantity: i64,
    ctx: &MutationCtx,
) -> InfraResult<StockMovement> {
    stock_items::update_counters(tx, after).await?;

    let movement = StockMovement::record(
        MovementId::new(),
        movement_type,
        signed_quantity,
        before,
        after,
        ctx.reference.clone(),
    )?;
    movements::insert(tx, &movement).await?;

    let audit = StockMovementRecordedEvent {
        movement_id: movement.id,
        stock_item_id: after.id,
        product_id: after.product_id,
        warehouse_id: after.warehouse_id,
        movement_type,
        quantity: signed_quantity,
        previous_on_hand: movement.previous_on_hand,
        new_on_hand: movement.new_on_hand,
        previous_reserved: movement.previous_reserved,
        new_reserved: movement.new_reserved,
        reference_id: movement.reference_id.clone(),
        reference_type: movement.reference_type.clone(),
        reason: movement.reason.clone(),
        performed_by: movement.created_by.clone(),
    };
    outbox::enqueue(tx, &EventEnvelope::wrap(&audit, &ctx.correlation_id)?).await?;

    low_stock::evaluate(tx, after, &ctx.correlation_id).await?;

    Ok(movement)
}

/// Synchronous stock operations for the transport layer.
///
/// Each method owns its transaction and retries lock conflicts per the
/// ledger policy.
#[derive(Debug, Clone)]
pub struct StockService {
    pool: PgPool,
    retry: RetryPolicy,
}

impl StockService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::ledger_conflict(),
        }
    }

    /// Create the `(product, warehouse)` ledger row.
    ///
    /// Rejected when the product is deleted/inactive or the warehouse is
    /// missing; the unique key surfaces duplicates as `Conflict`.
    #[instrument(skip(self), err)]
    pub async fn create_stock_item(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        reorder_point: i64,
        reorder_quantity: i64,
    ) -> InfraResult<StockItem> {
        let mut tx = self.begin().await?;

        if !products::accepts_stock(&mut tx, product_id).await? {
            return Err(InfraError::Domain(DomainError::validation(
                "product does not accept stock",
            )));
        }
        if !warehouses::exists(&mut tx, warehouse_id).await? {
            return Err(InfraError::Domain(DomainError::validation(
                "warehouse does not exist",
            )));
        }

        let item = StockItem::new(
            StockItemId::new(),
            product_id,
            warehouse_id,
            reorder_point,
            reorder_quantity,
        )?;
        stock_items::create(&mut tx, &item).await?;
        self.commit(tx).await?;
        Ok(item)
    }

    /// Replenish on-hand stock, with conflict retry.
    #[instrument(skip(self, actor), err)]
    pub async fn replenish(
        &self,
        stock_item_id: StockItemId,
        quantity: i64,
        reference_id: Option<String>,
        reason: Option<String>,
        actor: UserId,
        correlation_id: String,
    ) -> InfraResult<StockItem> {
        let ctx = MutationCtx {
            reference: MovementRef {
                reference_id,
                reference_type: Some("replenishment".to_string()),
                reason,
                created_by: actor.to_string(),
            },
            correlation_id,
        };

        with_conflict_retry(&self.retry, || async {
            let mut tx = self.begin().await?;
            let item = replenish(&mut tx, stock_item_id, quantity, &ctx).await?;
            self.commit(tx).await?;
            Ok(item)
        })
        .await
    }

    /// Adjust on-hand stock by a signed delta, with conflict retry.
    #[instrument(skip(self, actor), err)]
    pub async fn adjust(
        &self,
        stock_item_id: StockItemId,
        delta: i64,
        reason: Option<String>,
        actor: UserId,
        correlation_id: String,
    ) -> InfraResult<StockItem> {
        let ctx = MutationCtx {
            reference: MovementRef {
                reference_id: None,
                reference_type: Some("manual".to_string()),
                reason,
                created_by: actor.to_string(),
            },
            correlation_id,
        };

        with_conflict_retry(&self.retry, || async {
            let mut tx = self.begin().await?;
            let item = adjust(&mut tx, stock_item_id, delta, &ctx).await?;
            self.commit(tx).await?;
            Ok(item)
        })
        .await
    }

    /// Operator acknowledgement of an open alert.
    #[instrument(skip(self), err)]
    pub async fn acknowledge_alert(
        &self,
        alert_id: stockflow_core::AlertId,
        user: String,
    ) -> InfraResult<LowStockAlert> {
        let mut tx = self.begin().await?;
        let mut alert = alerts::get(&self.pool, alert_id)
            .await?
            .ok_or(InfraError::Domain(DomainError::NotFound))?;
        alert.acknowledge(user)?;
        alerts::update(&mut tx, &alert).await?;
        self.commit(tx).await?;
        Ok(alert)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> InfraResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| crate::error::map_sqlx("begin", e))
    }

    async fn commit(&self, tx: Transaction<'static, Postgres>) -> InfraResult<()> {
        tx.commit().await.map_err(|e| crate::error::map_sqlx("commit", e))
    }
}
