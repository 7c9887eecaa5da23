//! Service configuration, read once from the environment.

use std::time::Duration;

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/stockflow".to_string(),
            max_connections: 10,
        }
    }
}

/// Kafka connection settings shared by producer and consumer.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub client_id: String,
    pub group_id: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            client_id: "stockflow".to_string(),
            group_id: "stockflow-inventory".to_string(),
        }
    }
}

/// Outbox drain worker settings.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_retries: i32,
    /// Published rows older than this are swept.
    pub retention: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            batch_size: 100,
            max_retries: 5,
            retention: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Expiry sweeper settings.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub batch_size: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            batch_size: 500,
        }
    }
}

/// Reservation behavior settings.
#[derive(Debug, Clone)]
pub struct ReservationConfig {
    /// Applied when a reserve request carries no `expires_at`.
    pub default_ttl: Duration,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(15 * 60),
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    pub outbox: OutboxConfig,
    pub sweeper: SweeperConfig,
    pub reservation: ReservationConfig,
    /// Graceful-shutdown drain window for background tasks.
    pub drain_window: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self {
            drain_window: Duration::from_secs(30),
            ..Self::default()
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Some(n) = env_parse::<u32>("DATABASE_MAX_CONNECTIONS") {
            config.database.max_connections = n;
        }
        if let Ok(brokers) = std::env::var("KAFKA_BROKERS") {
            config.kafka.brokers = brokers;
        }
        if let Ok(group) = std::env::var("KAFKA_GROUP_ID") {
            config.kafka.group_id = group;
        }
        if let Ok(client) = std::env::var("KAFKA_CLIENT_ID") {
            config.kafka.client_id = client;
        }
        if let Some(ms) = env_parse::<u64>("OUTBOX_POLL_INTERVAL_MS") {
            config.outbox.poll_interval = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<i64>("OUTBOX_BATCH_SIZE") {
            config.outbox.batch_size = n;
        }
        if let Some(n) = env_parse::<i32>("OUTBOX_MAX_RETRIES") {
            config.outbox.max_retries = n;
        }
        if let Some(secs) = env_parse::<u64>("OUTBOX_RETENTION_SECS") {
            config.outbox.retention = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("SWEEPER_INTERVAL_SECS") {
            config.sweeper.interval = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<i64>("SWEEPER_BATCH_SIZE") {
            config.sweeper.batch_size = n;
        }
        if let Some(secs) = env_parse::<u64>("RESERVATION_TTL_SECS") {
            config.reservation.default_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("SHUTDOWN_DRAIN_SECS") {
            config.drain_window = Duration::from_secs(secs);
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = AppConfig::default();
        assert_eq!(config.outbox.poll_interval, Duration::from_millis(100));
        assert_eq!(config.outbox.batch_size, 100);
        assert_eq!(config.outbox.max_retries, 5);
        assert_eq!(config.sweeper.interval, Duration::from_secs(30));
        assert_eq!(config.sweeper.batch_size, 500);
        assert_eq!(
            config.reservation.default_ttl,
            Duration::from_secs(15 * 60)
        );
    }
}
