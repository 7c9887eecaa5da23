use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockflow_core::{ProductId, StockItemId, WarehouseId};

/// One requested line of an order basket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub preferred_warehouse_id: Option<WarehouseId>,
}

/// Snapshot of one stock item offered to the allocator.
///
/// The allocator only plans; the coordinator re-validates these numbers
/// under row locks before applying any hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateStock {
    pub stock_item_id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub available: i64,
    pub warehouse_priority: i32,
    pub warehouse_active: bool,
}

/// One planned hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub stock_item_id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
}

/// Cross-warehouse allocation for a whole basket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub entries: Vec<PlanEntry>,
}

impl AllocationPlan {
    /// Total planned quantity for one product.
    pub fn planned_for(&self, product_id: ProductId) -> i64 {
        self.entries
            .iter()
            .filter(|e| e.product_id == product_id)
            .map(|e| e.quantity)
            .sum()
    }

    /// Stock item ids in ascending order - the lock acquisition order.
    pub fn lock_order(&self) -> Vec<StockItemId> {
        let mut ids: Vec<StockItemId> = self.entries.iter().map(|e| e.stock_item_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// A basket line the snapshot cannot cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub product_id: ProductId,
    pub requested: i64,
    pub available: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// Every shortfall line is reported, not just the first, so callers get
    /// the complete picture in one round trip.
    #[error("insufficient stock for {} basket line(s)", .0.len())]
    InsufficientStock(Vec<Shortfall>),

    #[error("basket line quantity must be positive")]
    InvalidQuantity,
}

/// Plan holds for a basket against a candidate snapshot.
///
/// Per line, in request order: candidates for the product are filtered to
/// active warehouses, sorted by preferred warehouse first, then warehouse
/// priority ascending, then available descending, then warehouse id
/// ascending, and assigned greedily from the head. Reads only; no mutation.
pub fn allocate(
    lines: &[BasketLine],
    candidates: &[CandidateStock],
) -> Result<AllocationPlan, AllocationError> {
    if lines.iter().any(|l| l.quantity <= 0) {
        return Err(AllocationError::InvalidQuantity);
    }

    // Remaining availability per stock item, shared across lines so two
    // lines of the same product never double-assign the same units.
    let mut remaining: HashMap<StockItemId, i64> = candidates
        .iter()
        .map(|c| (c.stock_item_id, c.available.max(0)))
        .collect();

    let mut plan = AllocationPlan::default();
    let mut shortfalls = Vec::new();

    for line in lines {
        let mut ranked: Vec<&CandidateStock> = candidates
            .iter()
            .filter(|c| c.product_id == line.product_id && c.warehouse_active)
            .collect();

        ranked.sort_by(|a, b| {
            let a_preferred = Some(a.warehouse_id) == line.preferred_warehouse_id;
            let b_preferred = Some(b.warehouse_id) == line.preferred_warehouse_id;
            b_preferred
                .cmp(&a_preferred)
                .then(a.warehouse_priority.cmp(&b.warehouse_priority))
                .then(b.available.cmp(&a.available))
                .then(a.warehouse_id.cmp(&b.warehouse_id))
        });

        let line_available: i64 = ranked.iter().map(|c| remaining[&c.stock_item_id]).sum();

        let mut needed = line.quantity;
        for candidate in ranked {
            if needed == 0 {
                break;
            }
            let Some(left) = remaining.get_mut(&candidate.stock_item_id) else {
                continue;
            };
            let take = needed.min(*left);
            if take == 0 {
                continue;
            }
            *left -= take;
            needed -= take;
            plan.entries.push(PlanEntry {
                stock_item_id: candidate.stock_item_id,
                product_id: candidate.product_id,
                warehouse_id: candidate.warehouse_id,
                quantity: take,
            });
        }

        if needed > 0 {
            shortfalls.push(Shortfall {
                product_id: line.product_id,
                requested: line.quantity,
                available: line_available,
            });
        }
    }

    if !shortfalls.is_empty() {
        return Err(AllocationError::InsufficientStock(shortfalls));
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(
        product_id: ProductId,
        warehouse_id: WarehouseId,
        available: i64,
        priority: i32,
    ) -> CandidateStock {
        CandidateStock {
            stock_item_id: StockItemId::new(),
            product_id,
            warehouse_id,
            available,
            warehouse_priority: priority,
            warehouse_active: true,
        }
    }

    fn line(product_id: ProductId, quantity: i64) -> BasketLine {
        BasketLine {
            product_id,
            quantity,
            preferred_warehouse_id: None,
        }
    }

    #[test]
    fn splits_across_warehouses_by_priority() {
        let product = ProductId::new();
        let w1 = candidate(product, WarehouseId::new(), 2, 1);
        let w2 = candidate(product, WarehouseId::new(), 5, 2);

        let plan = allocate(&[line(product, 4)], &[w2.clone(), w1.clone()]).unwrap();

        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.entries[0].stock_item_id, w1.stock_item_id);
        assert_eq!(plan.entries[0].quantity, 2);
        assert_eq!(plan.entries[1].stock_item_id, w2.stock_item_id);
        assert_eq!(plan.entries[1].quantity, 2);
        assert_eq!(plan.planned_for(product), 4);
    }

    #[test]
    fn preferred_warehouse_wins_over_priority() {
        let product = ProductId::new();
        let w1 = candidate(product, WarehouseId::new(), 10, 1);
        let w2 = candidate(product, WarehouseId::new(), 10, 2);

        let plan = allocate(
            &[BasketLine {
                product_id: product,
                quantity: 3,
                preferred_warehouse_id: Some(w2.warehouse_id),
            }],
            &[w1, w2.clone()],
        )
        .unwrap();

        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].warehouse_id, w2.warehouse_id);
    }

    #[test]
    fn inactive_warehouses_are_skipped() {
        let product = ProductId::new();
        let mut inactive = candidate(product, WarehouseId::new(), 10, 1);
        inactive.warehouse_active = false;
        let active = candidate(product, WarehouseId::new(), 10, 2);

        let plan = allocate(&[line(product, 3)], &[inactive, active.clone()]).unwrap();

        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].stock_item_id, active.stock_item_id);
    }

    #[test]
    fn higher_availability_breaks_priority_ties() {
        let product = ProductId::new();
        let small = candidate(product, WarehouseId::new(), 2, 1);
        let big = candidate(product, WarehouseId::new(), 8, 1);

        let plan = allocate(&[line(product, 3)], &[small, big.clone()]).unwrap();

        assert_eq!(plan.entries[0].stock_item_id, big.stock_item_id);
    }

    #[test]
    fn warehouse_id_breaks_remaining_ties() {
        let product = ProductId::new();
        let a = candidate(product, WarehouseId::new(), 5, 1);
        let b = candidate(product, WarehouseId::new(), 5, 1);
        let first = if a.warehouse_id < b.warehouse_id {
            a.clone()
        } else {
            b.clone()
        };

        let plan = allocate(&[line(product, 2)], &[a, b]).unwrap();
        assert_eq!(plan.entries[0].warehouse_id, first.warehouse_id);
    }

    #[test]
    fn exact_availability_succeeds_and_one_more_fails() {
        let product = ProductId::new();
        let w = candidate(product, WarehouseId::new(), 10, 1);

        assert!(allocate(&[line(product, 10)], &[w.clone()]).is_ok());

        let err = allocate(&[line(product, 11)], &[w]).unwrap_err();
        match err {
            AllocationError::InsufficientStock(shortfalls) => {
                assert_eq!(shortfalls.len(), 1);
                assert_eq!(shortfalls[0].requested, 11);
                assert_eq!(shortfalls[0].available, 10);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn all_shortfall_lines_are_reported() {
        let p1 = ProductId::new();
        let p2 = ProductId::new();
        let c1 = candidate(p1, WarehouseId::new(), 1, 1);

        let err = allocate(&[line(p1, 5), line(p2, 2)], &[c1]).unwrap_err();
        match err {
            AllocationError::InsufficientStock(shortfalls) => {
                assert_eq!(shortfalls.len(), 2);
                assert_eq!(shortfalls[0].product_id, p1);
                assert_eq!(shortfalls[0].available, 1);
                assert_eq!(shortfalls[1].product_id, p2);
                assert_eq!(shortfalls[1].available, 0);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn repeated_product_lines_share_availability() {
        let product = ProductId::new();
        let w = candidate(product, WarehouseId::new(), 5, 1);

        let err = allocate(&[line(product, 3), line(product, 3)], &[w]).unwrap_err();
        match err {
            AllocationError::InsufficientStock(shortfalls) => {
                assert_eq!(shortfalls.len(), 1);
                // Second line sees only what the first left behind.
                assert_eq!(shortfalls[0].available, 2);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_positive_quantities() {
        let product = ProductId::new();
        assert_eq!(
            allocate(&[line(product, 0)], &[]).unwrap_err(),
            AllocationError::InvalidQuantity
        );
    }

    #[test]
    fn lock_order_is_ascending_and_deduplicated() {
        let product = ProductId::new();
        let w1 = candidate(product, WarehouseId::new(), 2, 1);
        let w2 = candidate(product, WarehouseId::new(), 5, 2);

        let plan = allocate(&[line(product, 4)], &[w1, w2]).unwrap();
        let order = plan.lock_order();
        assert_eq!(order.len(), 2);
        assert!(order[0] < order[1]);
    }

    mod properties {
        use std::collections::HashMap;

        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Whenever a plan is produced, per-product totals equal the
            /// request and no stock item is over-assigned.
            #[test]
            fn plans_are_exact_and_within_availability(
                quantities in prop::collection::vec(1i64..=20, 1..4),
                availabilities in prop::collection::vec(0i64..=15, 1..6),
            ) {
                let product = ProductId::new();
                let candidates: Vec<CandidateStock> = availabilities
                    .iter()
                    .enumerate()
                    .map(|(i, &available)| CandidateStock {
                        stock_item_id: StockItemId::new(),
                        product_id: product,
                        warehouse_id: WarehouseId::new(),
                        available,
                        warehouse_priority: i as i32,
                        warehouse_active: true,
                    })
                    .collect();
                let lines: Vec<BasketLine> = quantities
                    .iter()
                    .map(|&q| BasketLine {
                        product_id: product,
                        quantity: q,
                        preferred_warehouse_id: None,
                    })
                    .collect();

                if let Ok(plan) = allocate(&lines, &candidates) {
                    let requested: i64 = quantities.iter().sum();
                    prop_assert_eq!(plan.planned_for(product), requested);

                    let mut per_item: HashMap<StockItemId, i64> = HashMap::new();
                    for entry in &plan.entries {
                        prop_assert!(entry.quantity > 0);
                        *per_item.entry(entry.stock_item_id).or_insert(0) += entry.quantity;
                    }
                    for candidate in &candidates {
                        let assigned = per_item.get(&candidate.stock_item_id).copied().unwrap_or(0);
                        prop_assert!(assigned <= candidate.available);
                    }
                }
            }
        }
    }
}
