//! Integration tests for the in-process pipeline.
//!
//! Exercises the domain math, allocator, state machine, envelope, and bus
//! mechanics composed the way the transactional components compose them.
//! (Postgres- and Kafka-backed paths are covered by the deployment's test
//! environment; these tests pin the behavior everything above the stores
//! relies on.)

use chrono::{Duration, Utc};

use stockflow_core::{OrderId, ProductId, ReservationId, StockItemId, WarehouseId};
use stockflow_events::{EventBus, EventEnvelope, InMemoryEventBus, StockReservedEvent};
use stockflow_reservations::{
    allocate, AllocationError, BasketLine, CandidateStock, Reservation, ReservationItem,
    ReservationStatus,
};
use stockflow_stock::StockItem;

fn stock_item(product_id: ProductId, on_hand: i64, reorder_point: i64) -> StockItem {
    let mut item = StockItem::new(
        StockItemId::new(),
        product_id,
        WarehouseId::new(),
        reorder_point,
        0,
    )
    .unwrap();
    if on_hand > 0 {
        item.replenish(on_hand).unwrap();
    }
    item
}

fn candidate_of(item: &StockItem, priority: i32) -> CandidateStock {
    CandidateStock {
        stock_item_id: item.id,
        product_id: item.product_id,
        warehouse_id: item.warehouse_id,
        available: item.available(),
        warehouse_priority: priority,
        warehouse_active: true,
    }
}

fn reservation_from_plan(
    items: Vec<ReservationItem>,
    order_id: OrderId,
) -> Reservation {
    let now = Utc::now();
    Reservation::new(
        ReservationId::new(),
        order_id,
        items,
        now + Duration::minutes(15),
        now,
    )
    .unwrap()
}

#[test]
fn happy_path_reserve_then_fulfill() {
    let product = ProductId::new();
    let mut item = stock_item(product, 10, 0);

    // order.created: qty 3
    let plan = allocate(
        &[BasketLine {
            product_id: product,
            quantity: 3,
            preferred_warehouse_id: None,
        }],
        &[candidate_of(&item, 1)],
    )
    .unwrap();
    assert_eq!(plan.entries.len(), 1);

    for entry in &plan.entries {
        item.reserve(entry.quantity).unwrap();
    }
    let mut reservation = reservation_from_plan(
        plan.entries
            .iter()
            .map(|e| ReservationItem {
                stock_item_id: e.stock_item_id,
                product_id: e.product_id,
                warehouse_id: e.warehouse_id,
                quantity: e.quantity,
            })
            .collect(),
        OrderId::new(),
    );

    assert_eq!(item.quantity_on_hand, 10);
    assert_eq!(item.quantity_reserved, 3);
    assert_eq!(reservation.status, ReservationStatus::Pending);

    // Conservation: active reservation quantities equal the reserved counter.
    let held: i64 = reservation
        .items
        .iter()
        .filter(|i| i.stock_item_id == item.id)
        .map(|i| i.quantity)
        .sum();
    assert_eq!(held, item.quantity_reserved);

    // order.fulfilled
    let pairs: Vec<_> = reservation
        .items
        .iter()
        .map(|i| (i.stock_item_id, i.quantity))
        .collect();
    reservation.fulfill(Utc::now()).unwrap();
    for (_, quantity) in pairs {
        item.fulfill(quantity).unwrap();
    }

    assert_eq!(reservation.status, ReservationStatus::Fulfilled);
    assert_eq!(item.quantity_on_hand, 7);
    assert_eq!(item.quantity_reserved, 0);
}

#[test]
fn cross_warehouse_allocation_applies_to_both_ledger_rows() {
    let product = ProductId::new();
    let mut w1 = stock_item(product, 2, 0);
    let mut w2 = stock_item(product, 5, 0);

    let plan = allocate(
        &[BasketLine {
            product_id: product,
            quantity: 4,
            preferred_warehouse_id: None,
        }],
        &[candidate_of(&w1, 1), candidate_of(&w2, 2)],
    )
    .unwrap();

    for entry in &plan.entries {
        let target = if entry.stock_item_id == w1.id {
            &mut w1
        } else {
            &mut w2
        };
        target.reserve(entry.quantity).unwrap();
    }

    assert_eq!(w1.quantity_reserved, 2);
    assert_eq!(w2.quantity_reserved, 2);
    // Lock order for the enclosing transaction is ascending.
    let order = plan.lock_order();
    assert!(order.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn shortage_leaves_ledger_untouched() {
    let product = ProductId::new();
    let item = stock_item(product, 10, 0);

    let err = allocate(
        &[BasketLine {
            product_id: product,
            quantity: 20,
            preferred_warehouse_id: None,
        }],
        &[candidate_of(&item, 1)],
    )
    .unwrap_err();

    match err {
        AllocationError::InsufficientStock(shortfalls) => {
            assert_eq!(shortfalls[0].requested, 20);
            assert_eq!(shortfalls[0].available, 10);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(item.quantity_reserved, 0);
    assert_eq!(item.version, 2); // replenish only
}

#[test]
fn expiry_releases_every_hold() {
    let product = ProductId::new();
    let mut item = stock_item(product, 10, 0);
    item.reserve(4).unwrap();

    let mut reservation = reservation_from_plan(
        vec![ReservationItem {
            stock_item_id: item.id,
            product_id: product,
            warehouse_id: item.warehouse_id,
            quantity: 4,
        }],
        OrderId::new(),
    );

    let past_due = reservation.expires_at + Duration::milliseconds(1);
    assert!(reservation.is_expired(past_due));

    let pairs = reservation.expire(past_due).unwrap();
    for (_, quantity) in pairs {
        item.release(quantity).unwrap();
    }

    assert_eq!(reservation.status, ReservationStatus::Expired);
    assert_eq!(item.quantity_reserved, 0);
    assert_eq!(item.available(), 10);
}

#[test]
fn reserved_event_envelope_reaches_subscribers_in_order() {
    let bus: InMemoryEventBus<EventEnvelope> = InMemoryEventBus::new();
    let sub = bus.subscribe();

    let reservation_id = ReservationId::new();
    for quantity in 1..=3 {
        let event = StockReservedEvent {
            reservation_id,
            order_id: OrderId::new(),
            items: vec![],
            expires_at: Utc::now() + Duration::minutes(15),
        };
        let mut envelope = EventEnvelope::wrap(&event, format!("corr-{quantity}")).unwrap();
        envelope.payload["marker"] = serde_json::json!(quantity);
        bus.publish(envelope).unwrap();
    }

    let received = sub.drain();
    assert_eq!(received.len(), 3);
    // Same aggregate: publish order preserved end to end.
    let markers: Vec<i64> = received
        .iter()
        .map(|e| e.payload["marker"].as_i64().unwrap())
        .collect();
    assert_eq!(markers, vec![1, 2, 3]);
    assert!(received
        .iter()
        .all(|e| e.aggregate_id == reservation_id.to_string()));
}
