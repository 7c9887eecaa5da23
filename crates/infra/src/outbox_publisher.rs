//! Outbox drain worker.
//!
//! Repeatedly claims a batch of unpublished rows (skipping rows locked by a
//! peer), publishes them to the bus, and marks them published. Per
//! `aggregate_id` the `created_at` order is preserved: a failed publish
//! parks the rest of that aggregate's batch, while other aggregates keep
//! draining. Delivery is at-least-once; consumers dedupe by `event_id`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use sqlx::PgPool;

use crate::config::OutboxConfig;
use crate::error::{map_sqlx, InfraError, InfraResult};
use crate::repo::outbox::{self, OutboxEntry};
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownSignal;

/// Transport-facing producer port. Implemented by the Kafka producer and by
/// in-memory fakes in tests.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        headers: &[(&'static str, String)],
        payload: &[u8],
    ) -> Result<(), InfraError>;
}

/// Result of one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub published: usize,
    pub failed: usize,
}

/// Long-running worker draining the outbox into the message bus.
pub struct OutboxPublisher<P> {
    pool: PgPool,
    producer: P,
    config: OutboxConfig,
    backoff: RetryPolicy,
}

impl<P: MessagePublisher> OutboxPublisher<P> {
    pub fn new(pool: PgPool, producer: P, config: OutboxConfig) -> Self {
        Self {
            pool,
            producer,
            config,
            backoff: RetryPolicy::outbox_publish(),
        }
    }

    /// Drain loop. Exits after finishing the in-flight batch once the
    /// shutdown signal fires.
    pub async fn run(&self, mut shutdown: ShutdownSignal) {
        info!("outbox publisher started");
        let mut consecutive_failures: u32 = 0;
        let mut last_retention_sweep = std::time::Instant::now();

        loop {
            let delay = if consecutive_failures > 0 {
                self.backoff.delay_for_attempt(consecutive_failures)
            } else {
                self.config.poll_interval
            };

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            match self.drain_once().await {
                Ok(stats) => {
                    if stats.failed > 0 {
                        consecutive_failures = consecutive_failures.saturating_add(1);
                        warn!(
                            published = stats.published,
                            failed = stats.failed,
                            "outbox batch finished with failures"
                        );
                    } else {
                        consecutive_failures = 0;
                        if stats.published > 0 {
                            debug!(published = stats.published, "outbox batch published");
                        }
                    }
                }
                Err(err) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    error!(error = %err, "outbox drain failed");
                }
            }

            if last_retention_sweep.elapsed() >= RETENTION_SWEEP_INTERVAL {
                last_retention_sweep = std::time::Instant::now();
                match self.sweep_retention().await {
                    Ok(removed) if removed > 0 => {
                        info!(removed, "swept published outbox rows past retention");
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "outbox retention sweep failed"),
                }
            }
        }

        info!("outbox publisher stopped");
    }

    /// Claim and publish one batch. The claim lock is held for the duration
    /// of the batch so peers skip these rows.
    #[instrument(skip(self), err)]
    pub async fn drain_once(&self) -> InfraResult<DrainStats> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx("begin", e))?;
        let entries =
            outbox::claim_batch(&mut tx, self.config.batch_size, self.config.max_retries).await?;
        if entries.is_empty() {
            tx.commit().await.map_err(|e| map_sqlx("commit", e))?;
            return Ok(DrainStats::default());
        }

        let mut stats = DrainStats::default();
        for group in group_by_aggregate(entries) {
            for entry in group {
                match self.publish_entry(&entry).await {
                    Ok(()) => {
                        outbox::mark_published(&mut tx, entry.id, Utc::now()).await?;
                        stats.published += 1;
                    }
                    Err(err) => {
                        warn!(
                            outbox_id = %entry.id,
                            event_type = %entry.event_type,
                            retry_count = entry.retry_count,
                            error = %err,
                            "outbox publish failed"
                        );
                        outbox::mark_failed(&mut tx, entry.id, &err.to_string()).await?;
                        stats.failed += 1;
                        // Preserve per-aggregate order: park the rest of
                        // this aggregate's rows until the retry.
                        break;
                    }
                }
            }
        }

        tx.commit().await.map_err(|e| map_sqlx("commit", e))?;
        Ok(stats)
    }

    async fn publish_entry(&self, entry: &OutboxEntry) -> Result<(), InfraError> {
        let envelope = entry.envelope()?;
        let headers = envelope.headers();
        let payload = serde_json::to_vec(&envelope)?;

        self.producer
            .send(
                &envelope.event_type,
                envelope.partition_key(),
                &headers,
                &payload,
            )
            .await
    }

    /// Delete published rows past the retention window.
    pub async fn sweep_retention(&self) -> InfraResult<u64> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.retention)
                .unwrap_or_else(|_| chrono::Duration::days(7));
        outbox::sweep_published(&self.pool, cutoff).await
    }
}

/// Group a claimed batch by `aggregate_id`, preserving `created_at` order
/// within each group and first-seen order across groups.
fn group_by_aggregate(entries: Vec<OutboxEntry>) -> Vec<Vec<OutboxEntry>> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: std::collections::HashMap<String, Vec<OutboxEntry>> =
        std::collections::HashMap::new();

    for entry in entries {
        if !groups.contains_key(&entry.aggregate_id) {
            order.push(entry.aggregate_id.clone());
        }
        groups.entry(entry.aggregate_id.clone()).or_default().push(entry);
    }

    order
        .into_iter()
        .filter_map(|aggregate_id| groups.remove(&aggregate_id))
        .collect()
}

/// Sleep used between retention sweeps when the publisher owns them.
pub const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    fn entry(aggregate_id: &str, offset_ms: i64) -> OutboxEntry {
        OutboxEntry {
            id: Uuid::now_v7(),
            aggregate_type: "reservation".to_string(),
            aggregate_id: aggregate_id.to_string(),
            event_type: "inventory.stock.reserved".to_string(),
            payload: serde_json::json!({}),
            correlation_id: "corr".to_string(),
            created_at: Utc::now() + ChronoDuration::milliseconds(offset_ms),
            published_at: None,
            retry_count: 0,
            last_error: None,
        }
    }

    #[test]
    fn grouping_preserves_order_within_aggregate() {
        let batch = vec![entry("a", 0), entry("b", 1), entry("a", 2), entry("a", 3)];
        let a0 = batch[0].id;
        let a2 = batch[2].id;
        let a3 = batch[3].id;

        let groups = group_by_aggregate(batch);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].iter().map(|e| e.id).collect::<Vec<_>>(), vec![a0, a2, a3]);
        assert_eq!(groups[1][0].aggregate_id, "b");
    }

    #[test]
    fn grouping_keeps_first_seen_group_order() {
        let batch = vec![entry("x", 0), entry("y", 1), entry("z", 2), entry("y", 3)];
        let groups = group_by_aggregate(batch);
        let ids: Vec<&str> = groups.iter().map(|g| g[0].aggregate_id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }

    #[test]
    fn empty_batch_produces_no_groups() {
        assert!(group_by_aggregate(vec![]).is_empty());
    }
}
