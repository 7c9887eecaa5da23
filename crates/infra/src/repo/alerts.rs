//! Low-stock alert rows.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use stockflow_core::{AlertId, ProductId, StockItemId, WarehouseId};
use stockflow_stock::{AlertStatus, LowStockAlert};

use crate::error::{map_sqlx, InfraResult};

const COLUMNS: &str = "id, stock_item_id, product_id, warehouse_id, current_quantity, \
     reorder_point, status, acknowledged_by, acknowledged_at, resolved_at, \
     created_at, updated_at";

fn row_to_alert(row: &PgRow) -> Result<LowStockAlert, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status: AlertStatus = status
        .parse()
        .map_err(|e| sqlx::Error::Decode(format!("{e}").into()))?;

    Ok(LowStockAlert {
        id: AlertId::from_uuid(row.try_get("id")?),
        stock_item_id: StockItemId::from_uuid(row.try_get("stock_item_id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        warehouse_id: WarehouseId::from_uuid(row.try_get("warehouse_id")?),
        current_quantity: row.try_get("current_quantity")?,
        reorder_point: row.try_get("reorder_point")?,
        status,
        acknowledged_by: row.try_get("acknowledged_by")?,
        acknowledged_at: row.try_get("acknowledged_at")?,
        resolved_at: row.try_get("resolved_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn insert(tx: &mut Transaction<'_, Postgres>, alert: &LowStockAlert) -> InfraResult<()> {
    sqlx::query(
        r#"
        INSERT INTO low_stock_alerts (
            id, stock_item_id, product_id, warehouse_id, current_quantity,
            reorder_point, status, acknowledged_by, acknowledged_at,
            resolved_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(alert.id.as_uuid())
    .bind(alert.stock_item_id.as_uuid())
    .bind(alert.product_id.as_uuid())
    .bind(alert.warehouse_id.as_uuid())
    .bind(alert.current_quantity)
    .bind(alert.reorder_point)
    .bind(alert.status.as_str())
    .bind(&alert.acknowledged_by)
    .bind(alert.acknowledged_at)
    .bind(alert.resolved_at)
    .bind(alert.created_at)
    .bind(alert.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx("insert_alert", e))?;
    Ok(())
}

pub async fn update(tx: &mut Transaction<'_, Postgres>, alert: &LowStockAlert) -> InfraResult<()> {
    sqlx::query(
        r#"
        UPDATE low_stock_alerts
        SET status = $1, acknowledged_by = $2, acknowledged_at = $3,
            resolved_at = $4, updated_at = $5
        WHERE id = $6
        "#,
    )
    .bind(alert.status.as_str())
    .bind(&alert.acknowledged_by)
    .bind(alert.acknowledged_at)
    .bind(alert.resolved_at)
    .bind(alert.updated_at)
    .bind(alert.id.as_uuid())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx("update_alert", e))?;
    Ok(())
}

/// The (at most one) non-resolved alert for a stock item, locked.
pub async fn lock_open_by_stock_item(
    tx: &mut Transaction<'_, Postgres>,
    stock_item_id: StockItemId,
) -> InfraResult<Option<LowStockAlert>> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM low_stock_alerts \
         WHERE stock_item_id = $1 AND status <> 'resolved' \
         FOR UPDATE"
    ))
    .bind(stock_item_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx("lock_open_alert", e))?;

    row.map(|r| row_to_alert(&r))
        .transpose()
        .map_err(|e| map_sqlx("lock_open_alert", e))
}

pub async fn get(pool: &PgPool, id: AlertId) -> InfraResult<Option<LowStockAlert>> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM low_stock_alerts WHERE id = $1"))
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await
        .map_err(|e| map_sqlx("get_alert", e))?;

    row.map(|r| row_to_alert(&r))
        .transpose()
        .map_err(|e| map_sqlx("get_alert", e))
}
