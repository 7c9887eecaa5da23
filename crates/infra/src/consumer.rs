//! Order event consumer: exactly-once ingestion of the order lifecycle.
//!
//! Per message: extract `event_id`, open a transaction, check the
//! idempotency record, dispatch to the coordinator, record the event as
//! processed, commit, acknowledge. Transient failures leave the offset
//! uncommitted so the bus redelivers; permanent failures are acknowledged
//! and routed to the dead-letter topic with the original headers.

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use sqlx::PgPool;
use tracing::{error, info, instrument, warn};

use stockflow_events::{
    topics, OrderCancelledEvent, OrderCreatedEvent, OrderFulfilledEvent,
};
use stockflow_reservations::BasketLine;

use crate::coordinator::{
    ReservationCoordinator, ReserveCommand, REASON_ORDER_CANCELLED,
};
use crate::error::{map_sqlx, InfraResult};
use crate::outbox_publisher::MessagePublisher;
use crate::repo::idempotency;
use crate::shutdown::ShutdownSignal;

/// Actor recorded on ledger movements driven by the bus.
const SYSTEM_ACTOR: &str = "system";

/// What to do with the message after handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Side effects committed; acknowledge.
    Processed,
    /// Idempotency record hit; acknowledge without side effects.
    Duplicate,
    /// Permanent failure; acknowledge and route to the DLQ.
    DeadLettered(String),
}

/// Decoded order lifecycle event (tagged-variant dispatch by topic).
#[derive(Debug, Clone)]
enum OrderEvent {
    Created(OrderCreatedEvent),
    Cancelled(OrderCancelledEvent),
    Fulfilled(OrderFulfilledEvent),
}

fn decode_order_event(topic: &str, payload: &[u8]) -> Result<OrderEvent, String> {
    match topic {
        topics::ORDER_CREATED => serde_json::from_slice(payload)
            .map(OrderEvent::Created)
            .map_err(|e| format!("invalid order.created payload: {e}")),
        topics::ORDER_CANCELLED => serde_json::from_slice(payload)
            .map(OrderEvent::Cancelled)
            .map_err(|e| format!("invalid order.cancelled payload: {e}")),
        topics::ORDER_FULFILLED => serde_json::from_slice(payload)
            .map(OrderEvent::Fulfilled)
            .map_err(|e| format!("invalid order.fulfilled payload: {e}")),
        other => Err(format!("unknown topic: {other}")),
    }
}

/// Handles one consumed message end to end (minus broker acknowledgement).
#[derive(Clone)]
pub struct OrderEventHandler {
    pool: PgPool,
    coordinator: ReservationCoordinator,
}

impl OrderEventHandler {
    pub fn new(pool: PgPool, coordinator: ReservationCoordinator) -> Self {
        Self { pool, coordinator }
    }

    /// Process one message. `Err` means transient: do not acknowledge.
    #[instrument(skip(self, payload), err)]
    pub async fn handle(
        &self,
        topic: &str,
        event_id: Option<&str>,
        correlation_id: Option<&str>,
        payload: &[u8],
    ) -> InfraResult<Disposition> {
        let event_id = match event_id {
            Some(id) if !id.is_empty() => id,
            _ => {
                return Ok(Disposition::DeadLettered(
                    "missing event_id header".to_string(),
                ))
            }
        };
        let correlation_id = correlation_id.unwrap_or(event_id);

        let event = match decode_order_event(topic, payload) {
            Ok(event) => event,
            Err(reason) => return Ok(Disposition::DeadLettered(reason)),
        };

        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx("begin", e))?;

        if idempotency::is_processed(&mut tx, event_id, topic).await? {
            tx.commit().await.map_err(|e| map_sqlx("commit", e))?;
            return Ok(Disposition::Duplicate);
        }

        let result = match event {
            OrderEvent::Created(created) => {
                let cmd = ReserveCommand {
                    order_id: created.order_id,
                    items: created
                        .items
                        .iter()
                        .map(|i| BasketLine {
                            product_id: i.product_id,
                            quantity: i.quantity,
                            preferred_warehouse_id: created.warehouse_id,
                        })
                        .collect(),
                    expires_at: None,
                    correlation_id: correlation_id.to_string(),
                    actor: SYSTEM_ACTOR.to_string(),
                };
                // A shortage is a business outcome: the failure event is
                // already in the outbox, the message still acknowledges.
                self.coordinator.reserve_in_tx(&mut tx, &cmd).await.map(|_| ())
            }
            OrderEvent::Cancelled(cancelled) => self
                .coordinator
                .release_all_for_order_in_tx(
                    &mut tx,
                    cancelled.order_id,
                    cancelled
                        .cancellation_reason
                        .as_deref()
                        .unwrap_or(REASON_ORDER_CANCELLED),
                    correlation_id,
                    SYSTEM_ACTOR,
                )
                .await
                .map(|released| {
                    if released.is_empty() {
                        info!(order_id = %cancelled.order_id, "cancellation with no active reservations");
                    }
                }),
            OrderEvent::Fulfilled(fulfilled) => self
                .coordinator
                .fulfill_latest_for_order_in_tx(
                    &mut tx,
                    fulfilled.order_id,
                    correlation_id,
                    SYSTEM_ACTOR,
                )
                .await
                .map(|reservation| {
                    if reservation.is_none() {
                        warn!(order_id = %fulfilled.order_id, "fulfillment with no active reservation");
                    }
                }),
        };

        match result {
            Ok(()) => {
                idempotency::mark_processed(&mut tx, event_id, topic).await?;
                tx.commit().await.map_err(|e| map_sqlx("commit", e))?;
                Ok(Disposition::Processed)
            }
            Err(err) if err.is_transient() => {
                // Roll back and let the bus redeliver.
                Err(err)
            }
            Err(err) => {
                // Deterministic failure: the partition must not stall.
                Ok(Disposition::DeadLettered(err.to_string()))
            }
        }
    }
}

fn header_value<'a>(message: &'a BorrowedMessage<'_>, name: &str) -> Option<&'a str> {
    let headers = message.headers()?;
    headers
        .iter()
        .find(|h| h.key == name)
        .and_then(|h| h.value)
        .and_then(|v| std::str::from_utf8(v).ok())
}

/// Consume order events until shutdown.
pub async fn run_consumer<P: MessagePublisher>(
    consumer: StreamConsumer,
    handler: OrderEventHandler,
    dlq: P,
    mut shutdown: ShutdownSignal,
) {
    info!("order event consumer started");

    loop {
        let message = tokio::select! {
            _ = shutdown.recv() => break,
            received = consumer.recv() => received,
        };

        let message = match message {
            Ok(message) => message,
            Err(err) => {
                error!(error = %err, "consumer receive failed");
                continue;
            }
        };

        let topic = message.topic().to_string();
        let event_id = header_value(&message, "event_id").map(str::to_string);
        let correlation_id = header_value(&message, "correlation_id").map(str::to_string);
        let payload = message.payload().unwrap_or_default();

        match handler
            .handle(
                &topic,
                event_id.as_deref(),
                correlation_id.as_deref(),
                payload,
            )
            .await
        {
            Ok(Disposition::Processed) | Ok(Disposition::Duplicate) => {
                if let Err(err) = consumer.commit_message(&message, CommitMode::Async) {
                    error!(error = %err, "offset commit failed");
                }
            }
            Ok(Disposition::DeadLettered(reason)) => {
                warn!(topic = %topic, reason = %reason, "routing message to DLQ");
                let headers: Vec<(&'static str, String)> = vec![
                    ("event_id", event_id.clone().unwrap_or_default()),
                    ("correlation_id", correlation_id.clone().unwrap_or_default()),
                    ("original_topic", topic.clone()),
                    ("error", reason),
                ];
                if let Err(err) = dlq
                    .send(
                        topics::ORDER_EVENTS_DLQ,
                        event_id.as_deref().unwrap_or(""),
                        &headers,
                        payload,
                    )
                    .await
                {
                    // DLQ unreachable: keep the offset so nothing is lost.
                    error!(error = %err, "DLQ publish failed; leaving offset uncommitted");
                    continue;
                }
                if let Err(err) = consumer.commit_message(&message, CommitMode::Async) {
                    error!(error = %err, "offset commit failed");
                }
            }
            Err(err) => {
                // Transient: no ack, the bus redelivers.
                warn!(topic = %topic, error = %err, "transient consumer failure");
            }
        }
    }

    info!("order event consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::OrderId;

    #[test]
    fn decodes_each_topic() {
        let order_id = OrderId::new();

        let created = format!(r#"{{"order_id":"{order_id}","items":[]}}"#);
        assert!(matches!(
            decode_order_event(topics::ORDER_CREATED, created.as_bytes()),
            Ok(OrderEvent::Created(_))
        ));

        let cancelled = format!(r#"{{"order_id":"{order_id}"}}"#);
        assert!(matches!(
            decode_order_event(topics::ORDER_CANCELLED, cancelled.as_bytes()),
            Ok(OrderEvent::Cancelled(_))
        ));

        let fulfilled = format!(r#"{{"order_id":"{order_id}"}}"#);
        assert!(matches!(
            decode_order_event(topics::ORDER_FULFILLED, fulfilled.as_bytes()),
            Ok(OrderEvent::Fulfilled(_))
        ));
    }

    #[test]
    fn unknown_topic_is_permanent() {
        let err = decode_order_event("order.refunded", b"{}").unwrap_err();
        assert!(err.contains("unknown topic"));
    }

    #[test]
    fn malformed_payload_is_permanent() {
        let err = decode_order_event(topics::ORDER_CREATED, b"{not json").unwrap_err();
        assert!(err.contains("invalid order.created payload"));
    }
}
