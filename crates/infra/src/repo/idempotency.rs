//! Processed-event records gating consumer side effects.

use sqlx::{Postgres, Row, Transaction};

use crate::error::{map_sqlx, InfraResult};

/// Whether `(event_id, topic)` has already been consumed.
pub async fn is_processed(
    tx: &mut Transaction<'_, Postgres>,
    event_id: &str,
    topic: &str,
) -> InfraResult<bool> {
    let row = sqlx::query(
        "SELECT EXISTS(\
            SELECT 1 FROM processed_events WHERE event_id = $1 AND topic = $2\
         ) AS ok",
    )
    .bind(event_id)
    .bind(topic)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx("is_event_processed", e))?;

    row.try_get("ok").map_err(|e| map_sqlx("is_event_processed", e))
}

/// Record the event as processed, in the same transaction as its side
/// effects. A concurrent duplicate surfaces as a unique-key conflict.
pub async fn mark_processed(
    tx: &mut Transaction<'_, Postgres>,
    event_id: &str,
    topic: &str,
) -> InfraResult<()> {
    sqlx::query("INSERT INTO processed_events (event_id, topic) VALUES ($1, $2)")
        .bind(event_id)
        .bind(topic)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx("mark_event_processed", e))?;
    Ok(())
}
