//! Warehouse rows (activity and allocation priority).

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use stockflow_catalog::{Warehouse, WarehouseAddress};
use stockflow_core::WarehouseId;

use crate::error::{map_sqlx, InfraResult};

const COLUMNS: &str = "id, code, name, street, city, state, country, postal_code, \
     priority, is_active, created_at, updated_at, deleted_at";

fn row_to_warehouse(row: &PgRow) -> Result<Warehouse, sqlx::Error> {
    Ok(Warehouse {
        id: WarehouseId::from_uuid(row.try_get("id")?),
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        address: WarehouseAddress {
            street: row.try_get("street")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            country: row.try_get("country")?,
            postal_code: row.try_get("postal_code")?,
        },
        priority: row.try_get("priority")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

pub async fn create(tx: &mut Transaction<'_, Postgres>, warehouse: &Warehouse) -> InfraResult<()> {
    sqlx::query(
        r#"
        INSERT INTO warehouses (
            id, code, name, street, city, state, country, postal_code,
            priority, is_active, created_at, updated_at, deleted_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(warehouse.id.as_uuid())
    .bind(&warehouse.code)
    .bind(&warehouse.name)
    .bind(&warehouse.address.street)
    .bind(&warehouse.address.city)
    .bind(&warehouse.address.state)
    .bind(&warehouse.address.country)
    .bind(&warehouse.address.postal_code)
    .bind(warehouse.priority)
    .bind(warehouse.is_active)
    .bind(warehouse.created_at)
    .bind(warehouse.updated_at)
    .bind(warehouse.deleted_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx("create_warehouse", e))?;
    Ok(())
}

pub async fn get(pool: &PgPool, id: WarehouseId) -> InfraResult<Option<Warehouse>> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM warehouses WHERE id = $1"))
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await
        .map_err(|e| map_sqlx("get_warehouse", e))?;

    row.map(|r| row_to_warehouse(&r))
        .transpose()
        .map_err(|e| map_sqlx("get_warehouse", e))
}

/// Whether a warehouse exists and is not deleted; gates new stock items.
pub async fn exists(tx: &mut Transaction<'_, Postgres>, id: WarehouseId) -> InfraResult<bool> {
    let row = sqlx::query(
        "SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1 AND deleted_at IS NULL) AS ok",
    )
    .bind(id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx("warehouse_exists", e))?;

    row.try_get("ok").map_err(|e| map_sqlx("warehouse_exists", e))
}
