//! Retry policies with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{InfraError, InfraResult};

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (initial try included).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Delay cap.
    pub max_delay: Duration,
    /// Jitter factor (0.0-1.0) applied around the computed delay.
    pub jitter: f64,
}

impl RetryPolicy {
    /// Ledger optimistic-lock collisions: 5 attempts, 10ms -> 160ms.
    pub fn ledger_conflict() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(160),
            jitter: 0.2,
        }
    }

    /// Outbox publish failures: 100ms doubling up to 10s.
    pub fn outbox_publish() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: 0.2,
        }
    }

    /// Delay before attempt `attempt + 1` (0-indexed attempts).
    ///
    /// Jitter is deterministic per attempt so schedules are reproducible in
    /// tests; the spread still breaks retry convoys across rows.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let exp = 2_f64.powi((attempt - 1).min(30) as i32);
        let delay_ms = (base_ms * exp).min(max_ms);

        let jitter_range = delay_ms * self.jitter;
        let jitter = if jitter_range > 0.0 {
            let pseudo_random = ((attempt as f64 * 17.0) % 100.0) / 100.0;
            jitter_range * (pseudo_random - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

/// Run `op`, retrying on transient conflicts per `policy`.
///
/// Only `Domain(Conflict)` qualifies; every other error surfaces
/// immediately. Each attempt must be a fresh transaction - the closure is
/// re-invoked from scratch.
pub async fn with_conflict_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> InfraResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = InfraResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if matches!(&err, InfraError::Domain(d) if d.is_retryable()) => {
                if !policy.should_retry(attempt) {
                    return Err(err);
                }
                attempt += 1;
                let delay = policy.delay_for_attempt(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after conflict");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use stockflow_core::DomainError;

    #[test]
    fn ledger_schedule_doubles_to_the_cap() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::ledger_conflict()
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(40));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(80));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(160));
        // Capped thereafter.
        assert_eq!(policy.delay_for_attempt(6), Duration::from_millis(160));
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let policy = RetryPolicy::outbox_publish();
        for attempt in 1..=8 {
            let nominal = RetryPolicy {
                jitter: 0.0,
                ..policy.clone()
            }
            .delay_for_attempt(attempt)
            .as_millis() as f64;
            let actual = policy.delay_for_attempt(attempt).as_millis() as f64;
            assert!((actual - nominal).abs() <= nominal * 0.2 + 1.0);
        }
    }

    #[tokio::test]
    async fn retries_conflicts_up_to_the_limit() {
        let calls = AtomicU32::new(0);
        let result: InfraResult<()> =
            with_conflict_retry(&RetryPolicy::ledger_conflict(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(InfraError::Domain(DomainError::conflict("busy"))) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn succeeds_after_transient_conflicts() {
        let calls = AtomicU32::new(0);
        let result = with_conflict_retry(&RetryPolicy::ledger_conflict(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(InfraError::Domain(DomainError::conflict("busy")))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_conflict_errors_surface_immediately() {
        let calls = AtomicU32::new(0);
        let result: InfraResult<()> =
            with_conflict_retry(&RetryPolicy::ledger_conflict(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(InfraError::Domain(DomainError::not_found())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
