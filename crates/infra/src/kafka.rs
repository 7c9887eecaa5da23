//! Kafka producer/consumer construction and the producer port adapter.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};

use stockflow_events::topics;

use crate::config::KafkaConfig;
use crate::error::InfraError;
use crate::outbox_publisher::MessagePublisher;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the idempotent producer used by the outbox publisher and the DLQ.
pub fn create_producer(config: &KafkaConfig) -> Result<FutureProducer, InfraError> {
    ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("client.id", &config.client_id)
        .set("acks", "all")
        .set("enable.idempotence", "true")
        .set("compression.type", "snappy")
        .set("message.timeout.ms", "10000")
        .create()
        .map_err(|e| InfraError::Bus(e.to_string()))
}

/// Build the order-events consumer. Offsets are committed manually, only
/// after the handling transaction commits.
pub fn create_consumer(config: &KafkaConfig) -> Result<StreamConsumer, InfraError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("client.id", &config.client_id)
        .set("group.id", &config.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .create()
        .map_err(|e| InfraError::Bus(e.to_string()))?;

    consumer
        .subscribe(&topics::CONSUMED_TOPICS)
        .map_err(|e| InfraError::Bus(e.to_string()))?;
    Ok(consumer)
}

/// `MessagePublisher` adapter over the Kafka producer.
#[derive(Clone)]
pub struct KafkaMessagePublisher {
    producer: FutureProducer,
}

impl KafkaMessagePublisher {
    pub fn new(producer: FutureProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl MessagePublisher for KafkaMessagePublisher {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        headers: &[(&'static str, String)],
        payload: &[u8],
    ) -> Result<(), InfraError> {
        let mut kafka_headers = OwnedHeaders::new();
        for (name, value) in headers {
            kafka_headers = kafka_headers.insert(Header {
                key: name,
                value: Some(value.as_str()),
            });
        }

        let record = FutureRecord::to(topic)
            .key(key)
            .headers(kafka_headers)
            .payload(payload);

        self.producer
            .send(record, SEND_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|(err, _)| InfraError::Bus(err.to_string()))
    }
}
