//! Stock item rows: the ledger's authoritative counters.

use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use stockflow_core::{DomainError, ProductId, StockItemId, WarehouseId};
use stockflow_reservations::CandidateStock;
use stockflow_stock::StockItem;

use crate::error::{map_sqlx, InfraError, InfraResult};

const COLUMNS: &str = "id, product_id, warehouse_id, quantity_on_hand, quantity_reserved, \
     reorder_point, reorder_quantity, version, created_at, updated_at";

fn row_to_item(row: &PgRow) -> Result<StockItem, sqlx::Error> {
    Ok(StockItem {
        id: StockItemId::from_uuid(row.try_get("id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        warehouse_id: WarehouseId::from_uuid(row.try_get("warehouse_id")?),
        quantity_on_hand: row.try_get("quantity_on_hand")?,
        quantity_reserved: row.try_get("quantity_reserved")?,
        reorder_point: row.try_get("reorder_point")?,
        reorder_quantity: row.try_get("reorder_quantity")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a fresh stock item row.
pub async fn create(tx: &mut Transaction<'_, Postgres>, item: &StockItem) -> InfraResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_items (
            id, product_id, warehouse_id, quantity_on_hand, quantity_reserved,
            reorder_point, reorder_quantity, version, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(item.id.as_uuid())
    .bind(item.product_id.as_uuid())
    .bind(item.warehouse_id.as_uuid())
    .bind(item.quantity_on_hand)
    .bind(item.quantity_reserved)
    .bind(item.reorder_point)
    .bind(item.reorder_quantity)
    .bind(item.version)
    .bind(item.created_at)
    .bind(item.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx("create_stock_item", e))?;
    Ok(())
}

pub async fn get(pool: &PgPool, id: StockItemId) -> InfraResult<Option<StockItem>> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM stock_items WHERE id = $1"))
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await
        .map_err(|e| map_sqlx("get_stock_item", e))?;

    row.map(|r| row_to_item(&r))
        .transpose()
        .map_err(|e| map_sqlx("get_stock_item", e))
}

pub async fn get_by_product_and_warehouse(
    pool: &PgPool,
    product_id: ProductId,
    warehouse_id: WarehouseId,
) -> InfraResult<Option<StockItem>> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM stock_items WHERE product_id = $1 AND warehouse_id = $2"
    ))
    .bind(product_id.as_uuid())
    .bind(warehouse_id.as_uuid())
    .fetch_optional(pool)
    .await
    .map_err(|e| map_sqlx("get_stock_item_by_product_warehouse", e))?;

    row.map(|r| row_to_item(&r))
        .transpose()
        .map_err(|e| map_sqlx("get_stock_item_by_product_warehouse", e))
}

/// Lock one stock item row for the duration of the caller's transaction.
///
/// Multi-item callers must lock in ascending `stock_item_id` order.
pub async fn lock(tx: &mut Transaction<'_, Postgres>, id: StockItemId) -> InfraResult<StockItem> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM stock_items WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx("lock_stock_item", e))?
    .ok_or(InfraError::Domain(DomainError::NotFound))?;

    row_to_item(&row).map_err(|e| map_sqlx("lock_stock_item", e))
}

/// Lock by the `(product, warehouse)` alternate key.
pub async fn lock_by_product_and_warehouse(
    tx: &mut Transaction<'_, Postgres>,
    product_id: ProductId,
    warehouse_id: WarehouseId,
) -> InfraResult<StockItem> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM stock_items WHERE product_id = $1 AND warehouse_id = $2 FOR UPDATE"
    ))
    .bind(product_id.as_uuid())
    .bind(warehouse_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx("lock_stock_item_by_product_warehouse", e))?
    .ok_or(InfraError::Domain(DomainError::NotFound))?;

    row_to_item(&row).map_err(|e| map_sqlx("lock_stock_item_by_product_warehouse", e))
}

/// Persist mutated counters, guarding on the pre-mutation version.
///
/// The row lock makes a lost update impossible; the version guard is kept so
/// the optimistic strategy stays a drop-in alternative.
pub async fn update_counters(
    tx: &mut Transaction<'_, Postgres>,
    item: &StockItem,
) -> InfraResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE stock_items
        SET quantity_on_hand = $1,
            quantity_reserved = $2,
            version = $3,
            updated_at = $4
        WHERE id = $5 AND version = $6
        "#,
    )
    .bind(item.quantity_on_hand)
    .bind(item.quantity_reserved)
    .bind(item.version)
    .bind(item.updated_at)
    .bind(item.id.as_uuid())
    .bind(item.version - 1)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx("update_stock_counters", e))?;

    if result.rows_affected() == 0 {
        return Err(InfraError::Domain(DomainError::conflict(format!(
            "stock item {} version moved past {}",
            item.id,
            item.version - 1
        ))));
    }
    Ok(())
}

/// Allocation candidates for a basket, joined with warehouse metadata.
pub async fn candidates_for_products(
    tx: &mut Transaction<'_, Postgres>,
    product_ids: &[ProductId],
) -> InfraResult<Vec<CandidateStock>> {
    let ids: Vec<uuid::Uuid> = product_ids.iter().map(|p| *p.as_uuid()).collect();

    let rows = sqlx::query(
        r#"
        SELECT
            s.id AS stock_item_id,
            s.product_id,
            s.warehouse_id,
            s.quantity_on_hand - s.quantity_reserved AS available,
            w.priority AS warehouse_priority,
            (w.is_active AND w.deleted_at IS NULL) AS warehouse_active
        FROM stock_items s
        JOIN warehouses w ON w.id = s.warehouse_id
        WHERE s.product_id = ANY($1)
        ORDER BY s.id ASC
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx("candidates_for_products", e))?;

    let mut candidates = Vec::with_capacity(rows.len());
    for row in rows {
        candidates.push(CandidateStock {
            stock_item_id: StockItemId::from_uuid(
                row.try_get("stock_item_id")
                    .map_err(|e| map_sqlx("candidates_for_products", e))?,
            ),
            product_id: ProductId::from_uuid(
                row.try_get("product_id")
                    .map_err(|e| map_sqlx("candidates_for_products", e))?,
            ),
            warehouse_id: WarehouseId::from_uuid(
                row.try_get("warehouse_id")
                    .map_err(|e| map_sqlx("candidates_for_products", e))?,
            ),
            available: row
                .try_get("available")
                .map_err(|e| map_sqlx("candidates_for_products", e))?,
            warehouse_priority: row
                .try_get("warehouse_priority")
                .map_err(|e| map_sqlx("candidates_for_products", e))?,
            warehouse_active: row
                .try_get("warehouse_active")
                .map_err(|e| map_sqlx("candidates_for_products", e))?,
        });
    }
    Ok(candidates)
}

/// Total stock for a product across warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedStock {
    pub product_id: ProductId,
    pub total_on_hand: i64,
    pub total_reserved: i64,
    pub total_available: i64,
    pub warehouse_count: i64,
}

pub async fn aggregated_stock(
    pool: &PgPool,
    product_id: ProductId,
) -> InfraResult<AggregatedStock> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(SUM(quantity_on_hand), 0)::BIGINT AS total_on_hand,
            COALESCE(SUM(quantity_reserved), 0)::BIGINT AS total_reserved,
            COUNT(*) AS warehouse_count
        FROM stock_items
        WHERE product_id = $1
        "#,
    )
    .bind(product_id.as_uuid())
    .fetch_one(pool)
    .await
    .map_err(|e| map_sqlx("aggregated_stock", e))?;

    let total_on_hand: i64 = row
        .try_get("total_on_hand")
        .map_err(|e| map_sqlx("aggregated_stock", e))?;
    let total_reserved: i64 = row
        .try_get("total_reserved")
        .map_err(|e| map_sqlx("aggregated_stock", e))?;
    let warehouse_count: i64 = row
        .try_get("warehouse_count")
        .map_err(|e| map_sqlx("aggregated_stock", e))?;

    Ok(AggregatedStock {
        product_id,
        total_on_hand,
        total_reserved,
        total_available: total_on_hand - total_reserved,
        warehouse_count,
    })
}

/// Items at or below their reorder point.
pub async fn low_stock_items(pool: &PgPool) -> InfraResult<Vec<StockItem>> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM stock_items \
         WHERE quantity_on_hand - quantity_reserved <= reorder_point \
         ORDER BY id ASC"
    ))
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx("low_stock_items", e))?;

    rows.iter()
        .map(|r| row_to_item(r).map_err(|e| map_sqlx("low_stock_items", e)))
        .collect()
}
