//! Low-stock detector.
//!
//! Runs synchronously after every ledger mutation, inside the same
//! transaction, against the post-image of the stock item.

use sqlx::{Postgres, Transaction};
use tracing::debug;

use stockflow_core::AlertId;
use stockflow_events::{EventEnvelope, LowStockAlertEvent};
use stockflow_stock::{AlertSeverity, LowStockAlert, StockItem};

use crate::error::InfraResult;
use crate::repo::{alerts, outbox};

/// Open or resolve the stock item's alert based on its post-image.
///
/// - `available <= reorder_point` with no open alert: open one and enqueue
///   `inventory.stock.low_stock_alert`.
/// - `available > reorder_point` with an open alert: resolve it silently.
pub async fn evaluate(
    tx: &mut Transaction<'_, Postgres>,
    item: &StockItem,
    correlation_id: &str,
) -> InfraResult<()> {
    let open = alerts::lock_open_by_stock_item(tx, item.id).await?;

    if item.is_low_stock() {
        if open.is_some() {
            return Ok(());
        }

        let available = item.available();
        let alert = LowStockAlert::open(
            AlertId::new(),
            item.id,
            item.product_id,
            item.warehouse_id,
            available,
            item.reorder_point,
        );
        alerts::insert(tx, &alert).await?;

        let event = LowStockAlertEvent {
            alert_id: alert.id,
            stock_item_id: item.id,
            product_id: item.product_id,
            warehouse_id: item.warehouse_id,
            current_available: available,
            reorder_point: item.reorder_point,
            severity: AlertSeverity::classify(available, item.reorder_point),
        };
        let envelope = EventEnvelope::wrap(&event, correlation_id)?;
        outbox::enqueue(tx, &envelope).await?;

        debug!(
            stock_item_id = %item.id,
            available,
            reorder_point = item.reorder_point,
            severity = event.severity.as_str(),
            "low stock alert opened"
        );
    } else if let Some(mut alert) = open {
        // Recovered; close the alert without an event.
        alert.resolve()?;
        alerts::update(tx, &alert).await?;
        debug!(stock_item_id = %item.id, alert_id = %alert.id, "low stock alert resolved");
    }

    Ok(())
}
