//! Transactional outbox rows.
//!
//! Unpublished rows (`published_at IS NULL`) are the work queue. Rows that
//! exhaust their retries stay visible for operator inspection and are only
//! re-processed after an explicit reset.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use stockflow_events::EventEnvelope;

use crate::error::{map_sqlx, InfraResult};

/// One durable event awaiting (or past) publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    /// The full wire envelope, serialized.
    pub payload: serde_json::Value,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub last_error: Option<String>,
}

impl OutboxEntry {
    /// Reconstruct the wire envelope for publishing.
    pub fn envelope(&self) -> Result<EventEnvelope, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

fn row_to_entry(row: &PgRow) -> Result<OutboxEntry, sqlx::Error> {
    Ok(OutboxEntry {
        id: row.try_get("id")?,
        aggregate_type: row.try_get("aggregate_type")?,
        aggregate_id: row.try_get("aggregate_id")?,
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        correlation_id: row.try_get("correlation_id")?,
        created_at: row.try_get("created_at")?,
        published_at: row.try_get("published_at")?,
        retry_count: row.try_get("retry_count")?,
        last_error: row.try_get("last_error")?,
    })
}

/// Enqueue an envelope inside the caller's business transaction.
pub async fn enqueue(
    tx: &mut Transaction<'_, Postgres>,
    envelope: &EventEnvelope,
) -> InfraResult<()> {
    let payload = serde_json::to_value(envelope)?;
    sqlx::query(
        r#"
        INSERT INTO outbox (
            id, aggregate_type, aggregate_id, event_type, payload,
            correlation_id, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(envelope.event_id)
    .bind(&envelope.aggregate_type)
    .bind(&envelope.aggregate_id)
    .bind(&envelope.event_type)
    .bind(payload)
    .bind(&envelope.correlation_id)
    .bind(envelope.timestamp)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx("enqueue_outbox", e))?;
    Ok(())
}

/// Claim a batch of unpublished, non-quarantined rows in `created_at` order.
///
/// `FOR UPDATE SKIP LOCKED` makes peer workers skip rows a sibling is
/// already publishing, so the queue drains in parallel without double
/// publishes inside a lock window (at-least-once still applies across
/// crashes).
pub async fn claim_batch(
    tx: &mut Transaction<'_, Postgres>,
    batch_size: i64,
    max_retries: i32,
) -> InfraResult<Vec<OutboxEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, aggregate_type, aggregate_id, event_type, payload,
               correlation_id, created_at, published_at, retry_count, last_error
        FROM outbox
        WHERE published_at IS NULL AND retry_count < $1
        ORDER BY created_at ASC, id ASC
        LIMIT $2
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(max_retries)
    .bind(batch_size)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx("claim_outbox_batch", e))?;

    rows.iter()
        .map(|r| row_to_entry(r).map_err(|e| map_sqlx("claim_outbox_batch", e)))
        .collect()
}

/// Mark a row published. `published_at` is set exactly once.
pub async fn mark_published(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    now: DateTime<Utc>,
) -> InfraResult<()> {
    sqlx::query("UPDATE outbox SET published_at = $1 WHERE id = $2 AND published_at IS NULL")
        .bind(now)
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx("mark_outbox_published", e))?;
    Ok(())
}

/// Record a publish failure; at `max_retries` the row is quarantined by the
/// claim filter.
pub async fn mark_failed(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    error: &str,
) -> InfraResult<()> {
    sqlx::query(
        "UPDATE outbox SET retry_count = retry_count + 1, last_error = $1 WHERE id = $2",
    )
    .bind(error)
    .bind(id)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx("mark_outbox_failed", e))?;
    Ok(())
}

/// Operator action: return a quarantined row to the queue.
pub async fn reset_retries(pool: &PgPool, id: Uuid) -> InfraResult<()> {
    sqlx::query("UPDATE outbox SET retry_count = 0, last_error = NULL WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx("reset_outbox_retries", e))?;
    Ok(())
}

/// Rows awaiting publication (excluding quarantined ones).
pub async fn unpublished_count(pool: &PgPool, max_retries: i32) -> InfraResult<i64> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS n FROM outbox WHERE published_at IS NULL AND retry_count < $1",
    )
    .bind(max_retries)
    .fetch_one(pool)
    .await
    .map_err(|e| map_sqlx("unpublished_count", e))?;

    row.try_get("n").map_err(|e| map_sqlx("unpublished_count", e))
}

/// Quarantined rows, for operator inspection.
pub async fn quarantined(pool: &PgPool, max_retries: i32) -> InfraResult<Vec<OutboxEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, aggregate_type, aggregate_id, event_type, payload,
               correlation_id, created_at, published_at, retry_count, last_error
        FROM outbox
        WHERE published_at IS NULL AND retry_count >= $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(max_retries)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx("quarantined_outbox", e))?;

    rows.iter()
        .map(|r| row_to_entry(r).map_err(|e| map_sqlx("quarantined_outbox", e)))
        .collect()
}

/// Delete published rows older than the retention cutoff. Returns the
/// number of rows removed.
pub async fn sweep_published(pool: &PgPool, older_than: DateTime<Utc>) -> InfraResult<u64> {
    let result =
        sqlx::query("DELETE FROM outbox WHERE published_at IS NOT NULL AND published_at < $1")
            .bind(older_than)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx("sweep_outbox", e))?;
    Ok(result.rows_affected())
}
