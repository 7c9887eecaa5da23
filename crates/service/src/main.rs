use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};

use stockflow_infra::{
    consumer, coordinator::ReservationCoordinator, kafka, shutdown_channel, AppConfig,
    ExpirySweeper, OrderEventHandler, OutboxPublisher,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockflow_observability::init();

    let config = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    sqlx::migrate!("../infra/migrations").run(&pool).await?;
    info!("database ready");

    let producer = kafka::create_producer(&config.kafka)
        .map_err(|e| anyhow::anyhow!("kafka producer: {e}"))?;
    let publisher = kafka::KafkaMessagePublisher::new(producer);
    let stream_consumer = kafka::create_consumer(&config.kafka)
        .map_err(|e| anyhow::anyhow!("kafka consumer: {e}"))?;

    let coordinator = ReservationCoordinator::new(pool.clone(), &config.reservation);
    let (shutdown_handle, shutdown) = shutdown_channel();

    let outbox = OutboxPublisher::new(pool.clone(), publisher.clone(), config.outbox.clone());
    let outbox_task = tokio::spawn({
        let signal = shutdown.clone();
        async move { outbox.run(signal).await }
    });

    let sweeper = ExpirySweeper::new(
        pool.clone(),
        coordinator.clone(),
        config.sweeper.clone(),
    );
    let sweeper_task = tokio::spawn({
        let signal = shutdown.clone();
        async move { sweeper.run(signal).await }
    });

    let handler = OrderEventHandler::new(pool.clone(), coordinator);
    let consumer_task = tokio::spawn({
        let signal = shutdown.clone();
        let dlq = publisher.clone();
        async move { consumer::run_consumer(stream_consumer, handler, dlq, signal).await }
    });

    info!("stockflow inventory service running");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, draining background tasks");
    shutdown_handle.shutdown();

    let drain = async {
        for (name, task) in [
            ("consumer", consumer_task),
            ("outbox", outbox_task),
            ("sweeper", sweeper_task),
        ] {
            if let Err(err) = task.await {
                error!(task = name, error = %err, "background task panicked");
            }
        }
    };
    if tokio::time::timeout(config.drain_window, drain).await.is_err() {
        warn!(
            drain_secs = config.drain_window.as_secs(),
            "drain window elapsed, exiting with tasks still running"
        );
    }

    pool.close().await;
    info!("stockflow inventory service stopped");
    Ok(())
}
