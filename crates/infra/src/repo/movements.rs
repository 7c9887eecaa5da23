//! Append-only stock movement log.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use stockflow_core::{MovementId, StockItemId};
use stockflow_stock::{MovementType, StockMovement};

use crate::error::{map_sqlx, InfraResult};

const COLUMNS: &str = "id, stock_item_id, movement_type, quantity, previous_on_hand, \
     new_on_hand, previous_reserved, new_reserved, reference_id, reference_type, \
     reason, created_by, created_at";

fn row_to_movement(row: &PgRow) -> Result<StockMovement, sqlx::Error> {
    let movement_type: String = row.try_get("movement_type")?;
    let movement_type: MovementType = movement_type
        .parse()
        .map_err(|e| sqlx::Error::Decode(format!("{e}").into()))?;

    Ok(StockMovement {
        id: MovementId::from_uuid(row.try_get("id")?),
        stock_item_id: StockItemId::from_uuid(row.try_get("stock_item_id")?),
        movement_type,
        quantity: row.try_get("quantity")?,
        previous_on_hand: row.try_get("previous_on_hand")?,
        new_on_hand: row.try_get("new_on_hand")?,
        previous_reserved: row.try_get("previous_reserved")?,
        new_reserved: row.try_get("new_reserved")?,
        reference_id: row.try_get("reference_id")?,
        reference_type: row.try_get("reference_type")?,
        reason: row.try_get("reason")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert one movement row. Movements are never updated or deleted by the
/// service; retention is an operator concern.
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    movement: &StockMovement,
) -> InfraResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, stock_item_id, movement_type, quantity, previous_on_hand,
            new_on_hand, previous_reserved, new_reserved, reference_id,
            reference_type, reason, created_by, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(movement.id.as_uuid())
    .bind(movement.stock_item_id.as_uuid())
    .bind(movement.movement_type.as_str())
    .bind(movement.quantity)
    .bind(movement.previous_on_hand)
    .bind(movement.new_on_hand)
    .bind(movement.previous_reserved)
    .bind(movement.new_reserved)
    .bind(&movement.reference_id)
    .bind(&movement.reference_type)
    .bind(&movement.reason)
    .bind(&movement.created_by)
    .bind(movement.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx("insert_stock_movement", e))?;
    Ok(())
}

/// Movement history for one stock item, newest first.
pub async fn list_by_stock_item(
    pool: &PgPool,
    stock_item_id: StockItemId,
    limit: i64,
    offset: i64,
) -> InfraResult<Vec<StockMovement>> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM stock_movements \
         WHERE stock_item_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2 OFFSET $3"
    ))
    .bind(stock_item_id.as_uuid())
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx("list_movements", e))?;

    rows.iter()
        .map(|r| row_to_movement(r).map_err(|e| map_sqlx("list_movements", e)))
        .collect()
}
