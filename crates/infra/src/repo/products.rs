//! Product catalog rows (only what the ledger needs).

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use stockflow_catalog::{Product, ProductVariant};
use stockflow_core::ProductId;

use crate::error::{map_sqlx, InfraResult};

const COLUMNS: &str = "id, sku, name, description, variant_size, variant_color, category, \
     min_stock, is_active, created_at, updated_at, deleted_at";

fn row_to_product(row: &PgRow) -> Result<Product, sqlx::Error> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id")?),
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        variant: ProductVariant {
            size: row.try_get("variant_size")?,
            color: row.try_get("variant_color")?,
        },
        category: row.try_get("category")?,
        min_stock: row.try_get("min_stock")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

pub async fn create(tx: &mut Transaction<'_, Postgres>, product: &Product) -> InfraResult<()> {
    sqlx::query(
        r#"
        INSERT INTO products (
            id, sku, name, description, variant_size, variant_color,
            category, min_stock, is_active, created_at, updated_at, deleted_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(product.id.as_uuid())
    .bind(&product.sku)
    .bind(&product.name)
    .bind(&product.description)
    .bind(&product.variant.size)
    .bind(&product.variant.color)
    .bind(&product.category)
    .bind(product.min_stock)
    .bind(product.is_active)
    .bind(product.created_at)
    .bind(product.updated_at)
    .bind(product.deleted_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx("create_product", e))?;
    Ok(())
}

pub async fn get(pool: &PgPool, id: ProductId) -> InfraResult<Option<Product>> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM products WHERE id = $1"))
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await
        .map_err(|e| map_sqlx("get_product", e))?;

    row.map(|r| row_to_product(&r))
        .transpose()
        .map_err(|e| map_sqlx("get_product", e))
}

/// Whether a non-deleted, active product exists; gates new stock items.
pub async fn accepts_stock(
    tx: &mut Transaction<'_, Postgres>,
    id: ProductId,
) -> InfraResult<bool> {
    let row = sqlx::query(
        "SELECT EXISTS(\
            SELECT 1 FROM products WHERE id = $1 AND is_active AND deleted_at IS NULL\
         ) AS ok",
    )
    .bind(id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx("product_accepts_stock", e))?;

    row.try_get("ok").map_err(|e| map_sqlx("product_accepts_stock", e))
}
