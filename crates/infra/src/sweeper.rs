//! Expiry sweeper: drives the `expire` transition on overdue reservations.
//!
//! One background loop, one reservation per transaction, bounded batch per
//! tick. Crash-safe because terminal states reject re-entry.

use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, error, info};

use crate::config::SweeperConfig;
use crate::coordinator::ReservationCoordinator;
use crate::repo::reservations;
use crate::shutdown::ShutdownSignal;

pub struct ExpirySweeper {
    pool: PgPool,
    coordinator: ReservationCoordinator,
    config: SweeperConfig,
}

impl ExpirySweeper {
    pub fn new(pool: PgPool, coordinator: ReservationCoordinator, config: SweeperConfig) -> Self {
        Self {
            pool,
            coordinator,
            config,
        }
    }

    /// Sweep loop. No new batch starts after the shutdown signal fires.
    pub async fn run(&self, mut shutdown: ShutdownSignal) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "expiry sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            match self.sweep_once(&shutdown).await {
                Ok(expired) if expired > 0 => {
                    info!(expired, "expired overdue reservations");
                }
                Ok(_) => {}
                Err(err) => error!(error = %err, "expiry sweep failed"),
            }
        }

        info!("expiry sweeper stopped");
    }

    /// One sweep pass: fetch due reservations and expire each in its own
    /// transaction. Returns how many actually transitioned.
    pub async fn sweep_once(&self, shutdown: &ShutdownSignal) -> crate::InfraResult<usize> {
        let due =
            reservations::due_for_expiry(&self.pool, Utc::now(), self.config.batch_size).await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!(count = due.len(), "found overdue reservations");

        let mut expired = 0;
        for reservation_id in due {
            if shutdown.is_shutdown() {
                break;
            }
            match self.coordinator.expire(reservation_id).await {
                Ok(true) => expired += 1,
                // Lost the race with fulfill/release; nothing to do.
                Ok(false) => {}
                Err(err) => {
                    error!(reservation_id = %reservation_id, error = %err, "expiry failed");
                }
            }
        }
        Ok(expired)
    }
}
