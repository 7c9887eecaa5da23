use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{AlertId, DomainError, DomainResult, ProductId, StockItemId, WarehouseId};

/// Lifecycle of a low-stock alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl core::str::FromStr for AlertStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(DomainError::validation(format!(
                "invalid alert status: {other}"
            ))),
        }
    }
}

/// How far below the reorder point available stock has fallen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
    OutOfStock,
}

impl AlertSeverity {
    /// Classify a low-stock condition. Callers only invoke this when
    /// `available <= reorder_point`.
    pub fn classify(available: i64, reorder_point: i64) -> Self {
        if available <= 0 {
            AlertSeverity::OutOfStock
        } else if 2 * available <= reorder_point {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
            AlertSeverity::OutOfStock => "out_of_stock",
        }
    }
}

/// An open or historical low-stock condition on one stock item.
///
/// `current_quantity` and `reorder_point` are snapshots taken when the alert
/// opened. At most one non-resolved alert may exist per stock item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub id: AlertId,
    pub stock_item_id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub current_quantity: i64,
    pub reorder_point: i64,
    pub status: AlertStatus,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LowStockAlert {
    /// Open a new alert with a snapshot of the triggering quantities.
    pub fn open(
        id: AlertId,
        stock_item_id: StockItemId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        current_quantity: i64,
        reorder_point: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            stock_item_id,
            product_id,
            warehouse_id,
            current_quantity,
            reorder_point,
            status: AlertStatus::Active,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Severity at open time.
    pub fn severity(&self) -> AlertSeverity {
        AlertSeverity::classify(self.current_quantity, self.reorder_point)
    }

    /// Operator acknowledgement; keeps the alert open.
    pub fn acknowledge(&mut self, user: impl Into<String>) -> DomainResult<()> {
        if self.status == AlertStatus::Resolved {
            return Err(DomainError::invalid_state("alert has already been resolved"));
        }
        let now = Utc::now();
        self.status = AlertStatus::Acknowledged;
        self.acknowledged_by = Some(user.into());
        self.acknowledged_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Close the alert once stock recovers above the reorder point.
    pub fn resolve(&mut self) -> DomainResult<()> {
        if self.status == AlertStatus::Resolved {
            return Err(DomainError::invalid_state("alert has already been resolved"));
        }
        let now = Utc::now();
        self.status = AlertStatus::Resolved;
        self.resolved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.status != AlertStatus::Resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_alert(current: i64, reorder_point: i64) -> LowStockAlert {
        LowStockAlert::open(
            AlertId::new(),
            StockItemId::new(),
            ProductId::new(),
            WarehouseId::new(),
            current,
            reorder_point,
        )
    }

    #[test]
    fn severity_warning_above_half_point() {
        // reorder_point 3, available 2: 2*2 > 3, still warning
        assert_eq!(AlertSeverity::classify(2, 3), AlertSeverity::Warning);
    }

    #[test]
    fn severity_critical_at_half_point() {
        assert_eq!(AlertSeverity::classify(1, 3), AlertSeverity::Critical);
        assert_eq!(AlertSeverity::classify(2, 4), AlertSeverity::Critical);
    }

    #[test]
    fn severity_out_of_stock_at_zero() {
        assert_eq!(AlertSeverity::classify(0, 3), AlertSeverity::OutOfStock);
    }

    #[test]
    fn alert_lifecycle() {
        let mut alert = test_alert(2, 3);
        assert_eq!(alert.status, AlertStatus::Active);
        assert!(alert.is_open());

        alert.acknowledge("ops@example.com").unwrap();
        assert_eq!(alert.status, AlertStatus::Acknowledged);
        assert!(alert.is_open());

        alert.resolve().unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert!(!alert.is_open());
    }

    #[test]
    fn resolved_alert_rejects_further_transitions() {
        let mut alert = test_alert(2, 3);
        alert.resolve().unwrap();
        assert!(alert.acknowledge("ops").is_err());
        assert!(alert.resolve().is_err());
    }

    #[test]
    fn acknowledged_alert_can_resolve() {
        let mut alert = test_alert(0, 3);
        assert_eq!(alert.severity(), AlertSeverity::OutOfStock);
        alert.acknowledge("ops").unwrap();
        alert.resolve().unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
    }
}
