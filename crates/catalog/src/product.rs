use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, ProductId};

/// A specific variant of a product (e.g. size, color).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub size: Option<String>,
    pub color: Option<String>,
}

/// A product in the inventory catalog.
///
/// `min_stock` is the threshold driving low-stock detection. Soft-deleted
/// products accept no new stock items; existing stock stays readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub variant: ProductVariant,
    pub category: String,
    pub min_stock: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Create a new product with validation.
    pub fn new(
        id: ProductId,
        sku: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        variant: ProductVariant,
        min_stock: i64,
    ) -> DomainResult<Self> {
        let sku = sku.into();
        let name = name.into();
        if sku.trim().is_empty() {
            return Err(DomainError::validation("product SKU is required"));
        }
        if name.trim().is_empty() {
            return Err(DomainError::validation("product name is required"));
        }
        if min_stock < 0 {
            return Err(DomainError::validation("minimum stock cannot be negative"));
        }

        let now = Utc::now();
        Ok(Self {
            id,
            sku,
            name,
            description: description.into(),
            variant,
            category: category.into(),
            min_stock,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Modify product details. Rejected after soft deletion.
    pub fn update(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        variant: ProductVariant,
        min_stock: i64,
    ) -> DomainResult<()> {
        if self.is_deleted() {
            return Err(DomainError::invalid_state("product has been deleted"));
        }
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("product name is required"));
        }
        if min_stock < 0 {
            return Err(DomainError::validation("minimum stock cannot be negative"));
        }

        self.name = name;
        self.description = description.into();
        self.category = category.into();
        self.variant = variant;
        self.min_stock = min_stock;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the product as deleted. Existing stock items remain readable.
    pub fn soft_delete(&mut self) -> DomainResult<()> {
        if self.is_deleted() {
            return Err(DomainError::invalid_state("product has been deleted"));
        }
        let now = Utc::now();
        self.deleted_at = Some(now);
        self.is_active = false;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether new stock items may reference this product.
    pub fn accepts_stock(&self) -> bool {
        self.is_active && !self.is_deleted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_product() -> Product {
        Product::new(
            ProductId::new(),
            "SKU-001",
            "Widget",
            "A widget",
            "widgets",
            ProductVariant::default(),
            5,
        )
        .unwrap()
    }

    #[test]
    fn new_product_is_active() {
        let p = test_product();
        assert!(p.is_active);
        assert!(p.accepts_stock());
        assert!(!p.is_deleted());
    }

    #[test]
    fn rejects_empty_sku() {
        let err = Product::new(
            ProductId::new(),
            "  ",
            "Widget",
            "",
            "",
            ProductVariant::default(),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn rejects_negative_min_stock() {
        let err = Product::new(
            ProductId::new(),
            "SKU-001",
            "Widget",
            "",
            "",
            ProductVariant::default(),
            -1,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn soft_delete_blocks_new_stock_and_updates() {
        let mut p = test_product();
        p.soft_delete().unwrap();

        assert!(p.is_deleted());
        assert!(!p.accepts_stock());
        let err = p
            .update("Widget 2", "", "", ProductVariant::default(), 5)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn soft_delete_is_not_repeatable() {
        let mut p = test_product();
        p.soft_delete().unwrap();
        assert!(p.soft_delete().is_err());
    }
}
