// SPDX-License-Identifier: Apache-2.0
//! Aggregate maintenance across re-parenting, in-place changes, deletes, and
//! the departing-extremum rescans.

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use ripple_core::{ChangeEvent, Engine, EngineError, EntityRef, EntitySnapshot, Value, Verb};
use ripple_dry_tests::{
    apply_delete, apply_insert, apply_update, line_item, order_store, registry, seed_line_item,
    seed_order, RecordingListener, ORDER,
};

#[test]
fn reparenting_adjusts_both_orders() {
    let engine = Engine::new(registry()).expect("catalogs seal");
    let mut store = order_store();
    let order1 = seed_order(&mut store, 1, "USD");
    let order2 = seed_order(&mut store, 2, "EUR");
    let moved = seed_line_item(&mut store, 10, &order1, 5, 3);
    let _stays = seed_line_item(&mut store, 11, &order1, 3, 2);
    let _other = seed_line_item(&mut store, 20, &order2, 2, 4);

    let mut ctx = engine.begin();
    let mut relocated = store.live(&moved).expect("seeded").clone();
    relocated.set_to_one("order", Some(order2.clone()));
    let event = apply_update(&mut store, relocated);
    engine.submit(&mut ctx, event).expect("submit");
    engine.before_commit(&mut ctx, &mut store).expect("drain");
    store.try_commit(&ctx).expect("commit");

    let left = store.live(&order1).expect("prior parent");
    assert_eq!(left.get("total"), Value::Int(6));
    assert_eq!(left.get("line_count"), Value::Int(1));
    assert_eq!(
        left.get("largest_qty"),
        Value::Int(3),
        "the departing extremum forces a sibling rescan"
    );

    let right = store.live(&order2).expect("new parent");
    assert_eq!(right.get("total"), Value::Int(23));
    assert_eq!(right.get("line_count"), Value::Int(2));
    assert_eq!(right.get("largest_qty"), Value::Int(5));

    // The item picked up the new parent's currency on the same pass.
    assert_eq!(
        store.live(&moved).expect("item").get("currency"),
        Value::from("EUR")
    );

    // Prior parent is adjusted before the new one.
    let chained: Vec<&EntityRef> = ctx
        .runners()
        .filter(|r| r.entity().ty == ORDER)
        .map(ripple_core::Runner::entity)
        .collect();
    assert_eq!(chained, vec![&order1, &order2]);
}

#[test]
fn lowering_the_extremum_in_place_rescans_siblings() {
    let engine = Engine::new(registry()).expect("catalogs seal");
    let mut store = order_store();
    let order = seed_order(&mut store, 1, "USD");
    let item = seed_line_item(&mut store, 10, &order, 5, 3);
    let _sibling = seed_line_item(&mut store, 11, &order, 3, 2);

    let mut ctx = engine.begin();
    let mut lowered = store.live(&item).expect("seeded").clone();
    lowered.set_attr("qty", 1i64);
    let event = apply_update(&mut store, lowered);
    engine.submit(&mut ctx, event).expect("submit");
    engine.before_commit(&mut ctx, &mut store).expect("drain");
    store.try_commit(&ctx).expect("commit");

    let committed = store.live(&order).expect("order");
    assert_eq!(committed.get("total"), Value::Int(9), "21 - 15 + 3");
    assert_eq!(committed.get("line_count"), Value::Int(2));
    assert_eq!(
        committed.get("largest_qty"),
        Value::Int(3),
        "rescan counts the item at its new qty and the sibling wins"
    );
}

#[test]
fn raising_a_non_extremum_skips_the_rescan_path() {
    let engine = Engine::new(registry()).expect("catalogs seal");
    let mut store = order_store();
    let order = seed_order(&mut store, 1, "USD");
    let item = seed_line_item(&mut store, 10, &order, 2, 1);
    let _sibling = seed_line_item(&mut store, 11, &order, 5, 1);

    let mut ctx = engine.begin();
    let mut raised = store.live(&item).expect("seeded").clone();
    raised.set_attr("qty", 9i64);
    let event = apply_update(&mut store, raised);
    engine.submit(&mut ctx, event).expect("submit");
    engine.before_commit(&mut ctx, &mut store).expect("drain");
    store.try_commit(&ctx).expect("commit");

    assert_eq!(
        store.live(&order).expect("order").get("largest_qty"),
        Value::Int(9),
        "the raised value becomes the extremum directly"
    );
}

#[test]
fn deletes_rescan_and_the_last_departure_restores_the_sentinel() {
    let engine = Engine::new(registry()).expect("catalogs seal");
    let mut store = order_store();
    let order = seed_order(&mut store, 1, "USD");
    let big = seed_line_item(&mut store, 10, &order, 5, 3);
    let small = seed_line_item(&mut store, 11, &order, 3, 2);

    let mut ctx = engine.begin();
    let event = apply_delete(&mut store, &big).expect("seeded");
    engine.submit(&mut ctx, event).expect("submit");
    engine.before_commit(&mut ctx, &mut store).expect("drain");
    store.try_commit(&ctx).expect("commit");

    let after_first = store.live(&order).expect("order");
    assert_eq!(after_first.get("total"), Value::Int(6));
    assert_eq!(after_first.get("line_count"), Value::Int(1));
    assert_eq!(after_first.get("largest_qty"), Value::Int(3));
    assert!(store.live(&big).is_none(), "deleted item is gone");

    let mut ctx = engine.begin();
    let event = apply_delete(&mut store, &small).expect("seeded");
    engine.submit(&mut ctx, event).expect("submit");
    engine.before_commit(&mut ctx, &mut store).expect("drain");
    store.try_commit(&ctx).expect("commit");

    let emptied = store.live(&order).expect("order");
    assert_eq!(emptied.get("total"), Value::Int(0));
    assert_eq!(emptied.get("line_count"), Value::Int(0));
    assert!(
        emptied.get("largest_qty").is_null(),
        "no observations left: back to the sentinel"
    );
}

#[test]
fn writes_after_the_parents_delete_skip_adjustment() {
    let engine = Engine::new(registry()).expect("catalogs seal");
    let listener = Arc::new(RecordingListener::default());
    engine.register_listener(listener.clone());

    let mut store = order_store();
    let order = seed_order(&mut store, 1, "USD");
    let item = seed_line_item(&mut store, 10, &order, 2, 10);

    // The substrate defers the physical delete to commit, so the order is
    // still readable; the transaction context alone marks it gone.
    let mut ctx = engine.begin();
    let doomed = store.live(&order).expect("seeded").clone();
    engine
        .submit(&mut ctx, ChangeEvent::delete(doomed))
        .expect("submit delete");
    let mut raised = store.live(&item).expect("seeded").clone();
    raised.set_attr("qty", 5i64);
    let event = apply_update(&mut store, raised);
    engine.submit(&mut ctx, event).expect("submit update");
    engine.before_commit(&mut ctx, &mut store).expect("drain");
    store.try_commit(&ctx).expect("commit");

    // No adjustment runner chased the deleted order.
    assert_eq!(listener.runner_starts(&order, Verb::Update), 0);
    assert_eq!(listener.runner_starts(&order, Verb::Delete), 1);

    let committed = store.live(&item).expect("item outlives the order here");
    assert_eq!(committed.get("amount"), Value::Int(50));
    assert!(
        committed.get("currency").is_null(),
        "the parent copy reads an unset link once the order is gone"
    );
    assert!(store.live(&order).is_none(), "the delete lands at commit");
}

#[test]
fn sum_overflow_surfaces_as_an_aggregate_delta_error() {
    let engine = Engine::new(registry()).expect("catalogs seal");
    let mut store = order_store();
    let order = EntityRef::new(ORDER, 1);
    store.seed(
        EntitySnapshot::new(order.clone())
            .with_attr("currency", "USD")
            .with_attr("total", i64::MAX)
            .with_attr("line_count", 1i64)
            .with_attr("largest_qty", 2i64),
    );

    let mut ctx = engine.begin();
    let event = apply_insert(&mut store, line_item(10, &order, 1, 1));
    engine.submit(&mut ctx, event).expect("submit");
    let err = engine
        .before_commit(&mut ctx, &mut store)
        .expect_err("the sum overflows");
    assert!(err.is_system());
    assert!(matches!(
        err,
        EngineError::AggregateDelta {
            rule: "li/sum_amount",
            attribute: "total",
            ..
        }
    ));
}
