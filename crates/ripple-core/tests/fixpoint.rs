// SPDX-License-Identifier: Apache-2.0
//! Fixpoint behavior: action idempotence across re-entry, flush refills, and
//! the drain ceiling.

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use ripple_core::{
    CatalogRegistry, ChangeEvent, ChildRole, Engine, EngineError, Value, Verb,
};
use ripple_dry_tests::{
    apply_update, line_item_catalog, order_catalog, order_store, registry, seed_line_item,
    seed_order, EndlessStore, RecordingListener, LINE_ITEM,
};

/// Like the standard fixture registry, but the order also watches `total`,
/// so aggregate adjustments flow back into the line items.
fn echoing_registry() -> CatalogRegistry {
    let mut order = order_catalog();
    order.child_roles.clear();
    order.child_roles.push(ChildRole {
        role: "line_items",
        child_type: LINE_ITEM,
        inverse: "order",
        watched: &["currency", "total"],
    });
    let mut catalogs = CatalogRegistry::new();
    catalogs.register(order).expect("register order");
    catalogs
        .register(line_item_catalog())
        .expect("register line item");
    catalogs
}

#[test]
fn actions_fire_once_per_entity_even_when_runners_reenter() {
    let engine = Engine::new(echoing_registry()).expect("catalogs seal");
    let listener = Arc::new(RecordingListener::default());
    engine.register_listener(listener.clone());

    let mut store = order_store();
    let order = seed_order(&mut store, 7, "USD");
    let first = seed_line_item(&mut store, 1, &order, 2, 10);
    let second = seed_line_item(&mut store, 2, &order, 1, 5);

    let mut ctx = engine.begin();
    let mut a = store.live(&first).expect("seeded").clone();
    a.set_attr("qty", 3i64);
    let mut b = store.live(&second).expect("seeded").clone();
    b.set_attr("qty", 4i64);
    let event_a = apply_update(&mut store, a);
    let event_b = apply_update(&mut store, b);
    engine.submit(&mut ctx, event_a).expect("submit a");
    engine.submit(&mut ctx, event_b).expect("submit b");
    engine.before_commit(&mut ctx, &mut store).expect("drain");
    store.try_commit(&ctx).expect("commit");

    // The total-watching cascade re-entered the first item after it had
    // already completed; the fired-actions registry kept its action from
    // firing a second time.
    assert_eq!(listener.runner_starts(&first, Verb::Update), 2);
    let stats = engine.stats();
    assert_eq!(stats.get("li/touch").map(|c| c.ran), Some(2));

    let committed = store.live(&order).expect("order");
    assert_eq!(committed.get("total"), Value::Int(50), "3*10 + 4*5");
    assert_eq!(committed.get("largest_qty"), Value::Int(4));
}

#[test]
fn flush_refills_run_as_additional_rounds() {
    let engine = Engine::new(registry()).expect("catalogs seal");
    let mut store = order_store();
    let order = seed_order(&mut store, 7, "USD");
    let first = seed_line_item(&mut store, 1, &order, 2, 10);
    let second = seed_line_item(&mut store, 2, &order, 1, 5);

    let mut ctx = engine.begin();
    let mut a = store.live(&first).expect("seeded").clone();
    a.set_attr("qty", 4i64);
    let event = apply_update(&mut store, a);
    engine.submit(&mut ctx, event).expect("submit");

    // A write the substrate performs on its own surfaces through flush and
    // is processed in the next round.
    let mut b = store.live(&second).expect("seeded").clone();
    b.set_attr("qty", 6i64);
    let staged = apply_update(&mut store, b);
    store.stage_flush_event(staged);

    engine.before_commit(&mut ctx, &mut store).expect("drain");
    store.try_commit(&ctx).expect("commit");

    let committed = store.live(&order).expect("order");
    assert_eq!(committed.get("total"), Value::Int(70), "4*10 + 6*5");
    assert_eq!(committed.get("line_count"), Value::Int(2));
    assert_eq!(committed.get("largest_qty"), Value::Int(6));
    assert_eq!(
        store.live(&second).expect("item").get("amount"),
        Value::Int(30)
    );
}

#[test]
fn a_store_that_never_quiesces_hits_the_ceiling() {
    let engine = Engine::new(registry()).expect("catalogs seal");
    let mut inner = order_store();
    let order = seed_order(&mut inner, 7, "USD");
    let snapshot = inner.live(&order).expect("seeded").clone();
    let mut store = EndlessStore::new(inner, order);

    let mut ctx = engine.begin();
    let mut changed = snapshot.clone();
    changed.set_attr("currency", "EUR");
    let event = ChangeEvent::update(changed, snapshot.duplicate());
    engine.submit(&mut ctx, event).expect("submit");

    let err = engine
        .before_commit(&mut ctx, &mut store)
        .expect_err("no fixpoint exists");
    assert!(err.is_system());
    assert!(matches!(err, EngineError::FixpointCeiling(_)));
}
