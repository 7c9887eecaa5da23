//! Reservation rows and their ordered item lists.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use stockflow_core::{DomainError, OrderId, ProductId, ReservationId, StockItemId, WarehouseId};
use stockflow_reservations::{Reservation, ReservationItem, ReservationStatus};

use crate::error::{map_sqlx, InfraError, InfraResult};

const COLUMNS: &str =
    "id, order_id, status, expires_at, created_at, updated_at, released_at, fulfilled_at";

struct ReservationHead {
    id: ReservationId,
    order_id: OrderId,
    status: ReservationStatus,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    released_at: Option<DateTime<Utc>>,
    fulfilled_at: Option<DateTime<Utc>>,
}

fn row_to_head(row: &PgRow) -> Result<ReservationHead, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status: ReservationStatus = status
        .parse()
        .map_err(|e| sqlx::Error::Decode(format!("{e}").into()))?;

    Ok(ReservationHead {
        id: ReservationId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        status,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        released_at: row.try_get("released_at")?,
        fulfilled_at: row.try_get("fulfilled_at")?,
    })
}

async fn load_items(
    tx: &mut Transaction<'_, Postgres>,
    id: ReservationId,
) -> InfraResult<Vec<ReservationItem>> {
    let rows = sqlx::query(
        "SELECT stock_item_id, product_id, warehouse_id, quantity \
         FROM reservation_items WHERE reservation_id = $1 ORDER BY position ASC",
    )
    .bind(id.as_uuid())
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx("load_reservation_items", e))?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(ReservationItem {
            stock_item_id: StockItemId::from_uuid(
                row.try_get("stock_item_id")
                    .map_err(|e| map_sqlx("load_reservation_items", e))?,
            ),
            product_id: ProductId::from_uuid(
                row.try_get("product_id")
                    .map_err(|e| map_sqlx("load_reservation_items", e))?,
            ),
            warehouse_id: WarehouseId::from_uuid(
                row.try_get("warehouse_id")
                    .map_err(|e| map_sqlx("load_reservation_items", e))?,
            ),
            quantity: row
                .try_get("quantity")
                .map_err(|e| map_sqlx("load_reservation_items", e))?,
        });
    }
    Ok(items)
}

fn assemble(head: ReservationHead, items: Vec<ReservationItem>) -> Reservation {
    Reservation {
        id: head.id,
        order_id: head.order_id,
        items,
        status: head.status,
        expires_at: head.expires_at,
        created_at: head.created_at,
        updated_at: head.updated_at,
        released_at: head.released_at,
        fulfilled_at: head.fulfilled_at,
    }
}

/// Insert a reservation and its ordered items.
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    reservation: &Reservation,
) -> InfraResult<()> {
    sqlx::query(
        r#"
        INSERT INTO reservations (
            id, order_id, status, expires_at, created_at, updated_at,
            released_at, fulfilled_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(reservation.id.as_uuid())
    .bind(reservation.order_id.as_uuid())
    .bind(reservation.status.as_str())
    .bind(reservation.expires_at)
    .bind(reservation.created_at)
    .bind(reservation.updated_at)
    .bind(reservation.released_at)
    .bind(reservation.fulfilled_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx("insert_reservation", e))?;

    for (position, item) in reservation.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO reservation_items (
                reservation_id, position, stock_item_id, product_id,
                warehouse_id, quantity
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(position as i32)
        .bind(item.stock_item_id.as_uuid())
        .bind(item.product_id.as_uuid())
        .bind(item.warehouse_id.as_uuid())
        .bind(item.quantity)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx("insert_reservation_item", e))?;
    }
    Ok(())
}

/// Lock a reservation row and load it with items.
pub async fn lock(
    tx: &mut Transaction<'_, Postgres>,
    id: ReservationId,
) -> InfraResult<Reservation> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM reservations WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx("lock_reservation", e))?
    .ok_or(InfraError::Domain(DomainError::NotFound))?;

    let head = row_to_head(&row).map_err(|e| map_sqlx("lock_reservation", e))?;
    let items = load_items(tx, head.id).await?;
    Ok(assemble(head, items))
}

/// Persist status, timestamps, and current item quantities.
pub async fn update(
    tx: &mut Transaction<'_, Postgres>,
    reservation: &Reservation,
) -> InfraResult<()> {
    sqlx::query(
        r#"
        UPDATE reservations
        SET status = $1, updated_at = $2, released_at = $3, fulfilled_at = $4
        WHERE id = $5
        "#,
    )
    .bind(reservation.status.as_str())
    .bind(reservation.updated_at)
    .bind(reservation.released_at)
    .bind(reservation.fulfilled_at)
    .bind(reservation.id.as_uuid())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx("update_reservation", e))?;

    for (position, item) in reservation.items.iter().enumerate() {
        sqlx::query(
            "UPDATE reservation_items SET quantity = $1 \
             WHERE reservation_id = $2 AND position = $3",
        )
        .bind(item.quantity)
        .bind(reservation.id.as_uuid())
        .bind(position as i32)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx("update_reservation_item", e))?;
    }
    Ok(())
}

/// Lock every non-terminal reservation for an order, oldest first.
pub async fn lock_active_by_order(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
) -> InfraResult<Vec<Reservation>> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM reservations \
         WHERE order_id = $1 AND status IN ('pending', 'confirmed') \
         ORDER BY created_at ASC \
         FOR UPDATE"
    ))
    .bind(order_id.as_uuid())
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx("lock_active_reservations", e))?;

    let mut reservations = Vec::with_capacity(rows.len());
    for row in rows {
        let head = row_to_head(&row).map_err(|e| map_sqlx("lock_active_reservations", e))?;
        let items = load_items(tx, head.id).await?;
        reservations.push(assemble(head, items));
    }
    Ok(reservations)
}

/// Lock the most recent non-terminal reservation for an order, if any.
pub async fn lock_latest_active_by_order(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
) -> InfraResult<Option<Reservation>> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM reservations \
         WHERE order_id = $1 AND status IN ('pending', 'confirmed') \
         ORDER BY created_at DESC \
         LIMIT 1 \
         FOR UPDATE"
    ))
    .bind(order_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx("lock_latest_active_reservation", e))?;

    match row {
        Some(row) => {
            let head =
                row_to_head(&row).map_err(|e| map_sqlx("lock_latest_active_reservation", e))?;
            let items = load_items(tx, head.id).await?;
            Ok(Some(assemble(head, items)))
        }
        None => Ok(None),
    }
}

/// Whether the order already has a non-terminal reservation.
pub async fn has_active_for_order(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
) -> InfraResult<bool> {
    let row = sqlx::query(
        "SELECT EXISTS(\
            SELECT 1 FROM reservations \
            WHERE order_id = $1 AND status IN ('pending', 'confirmed')\
         ) AS ok",
    )
    .bind(order_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx("has_active_reservation", e))?;

    row.try_get("ok")
        .map_err(|e| map_sqlx("has_active_reservation", e))
}

/// Reservations past expiry, for the sweeper. Bounded batch; ids only so
/// each expiry can run in its own transaction.
pub async fn due_for_expiry(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> InfraResult<Vec<ReservationId>> {
    let rows = sqlx::query(
        "SELECT id FROM reservations \
         WHERE expires_at < $1 AND status IN ('pending', 'confirmed') \
         ORDER BY expires_at ASC \
         LIMIT $2",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx("due_for_expiry", e))?;

    rows.iter()
        .map(|row| {
            row.try_get("id")
                .map(ReservationId::from_uuid)
                .map_err(|e| map_sqlx("due_for_expiry", e))
        })
        .collect()
}
