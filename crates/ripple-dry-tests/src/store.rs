// SPDX-License-Identifier: Apache-2.0
//! Store builders for the Order/LineItem fixture domain, plus a store that
//! never quiesces (for drain-ceiling tests).

use ripple_core::{
    ChangeEvent, ConstraintFailure, EngineError, EntityRef, EntitySnapshot, MemStore, RolePair,
    Substrate,
};

use crate::catalog::{LINE_ITEM, ORDER};

/// Empty store wired with the `LineItem.order` / `Order.line_items` role
/// pair.
#[must_use]
pub fn order_store() -> MemStore {
    MemStore::new(vec![RolePair {
        child_type: LINE_ITEM,
        child_role: "order",
        parent_role: "line_items",
    }])
}

/// Seeds an order with the given currency. Aggregate attributes start unset:
/// `Null` is the additive identity for sums/counts and the "no observations
/// yet" sentinel for max.
pub fn seed_order(store: &mut MemStore, key: i64, currency: &str) -> EntityRef {
    let entity = EntityRef::new(ORDER, key);
    store.seed(EntitySnapshot::new(entity.clone()).with_attr("currency", currency));
    entity
}

/// Builds (without seeding) a line item snapshot under `order`. `amount` is
/// left unset; the `li/amount` formula computes it.
#[must_use]
pub fn line_item(key: i64, order: &EntityRef, qty: i64, price: i64) -> EntitySnapshot {
    EntitySnapshot::new(EntityRef::new(LINE_ITEM, key))
        .with_to_one("order", Some(order.clone()))
        .with_attr("qty", qty)
        .with_attr("price", price)
}

/// Seeds a line item that already went through the pipeline once: `amount`
/// computed, and the parent's aggregates brought up to date.
pub fn seed_line_item(
    store: &mut MemStore,
    key: i64,
    order: &EntityRef,
    qty: i64,
    price: i64,
) -> EntityRef {
    let snap = line_item(key, order, qty, price).with_attr("amount", qty.saturating_mul(price));
    let entity = snap.entity().clone();
    store.seed(snap);
    if let Some(parent) = store.live(order).cloned() {
        let total = parent.get("total").as_int().unwrap_or(0) + qty.saturating_mul(price);
        let count = parent.get("line_count").as_int().unwrap_or(0) + 1;
        let largest = parent
            .get("largest_qty")
            .as_int()
            .map_or(qty, |prev| prev.max(qty));
        store.seed(
            parent
                .with_attr("total", total)
                .with_attr("line_count", count)
                .with_attr("largest_qty", largest),
        );
    }
    entity
}

/// Records a user-level insert. The substrate's live object exists as soon as
/// the caller creates it, so the store is seeded before the event is built.
#[must_use]
pub fn apply_insert(store: &mut MemStore, snapshot: EntitySnapshot) -> ChangeEvent {
    store.seed(snapshot.clone());
    ChangeEvent::insert(snapshot)
}

/// Records a user-level update. The live object already carries the caller's
/// write by the time the event reaches the engine; the pre-change copy is
/// whatever the store held before.
#[must_use]
pub fn apply_update(store: &mut MemStore, new: EntitySnapshot) -> ChangeEvent {
    let prior = store.snapshot(new.entity()).unwrap_or_else(|| new.clone());
    store.seed(new.clone());
    ChangeEvent::update(new, prior)
}

/// Records a user-level delete of a seeded entity. `None` when the entity is
/// not in the store.
#[must_use]
pub fn apply_delete(store: &mut MemStore, entity: &EntityRef) -> Option<ChangeEvent> {
    let current = store.snapshot(entity)?;
    store.remove(entity);
    Some(ChangeEvent::delete(current))
}

/// Store whose flush keeps surfacing an update event for one entity, so a
/// transaction can never reach a fixpoint.
#[derive(Debug)]
pub struct EndlessStore {
    inner: MemStore,
    pulse: EntityRef,
}

impl EndlessStore {
    /// Wraps a seeded store; `pulse` must exist in it.
    #[must_use]
    pub fn new(inner: MemStore, pulse: EntityRef) -> Self {
        Self { inner, pulse }
    }
}

impl Substrate for EndlessStore {
    fn snapshot(&self, entity: &EntityRef) -> Option<EntitySnapshot> {
        self.inner.snapshot(entity)
    }

    fn children(&self, parent: &EntityRef, role: &'static str) -> Vec<EntityRef> {
        self.inner.children(parent, role)
    }

    fn persist(&mut self, snapshot: &EntitySnapshot) -> Result<(), EngineError> {
        self.inner.persist(snapshot)
    }

    fn flush(&mut self) -> Result<Vec<ChangeEvent>, EngineError> {
        let current = self
            .inner
            .snapshot(&self.pulse)
            .ok_or_else(|| EngineError::MissingEntity(self.pulse.clone()))?;
        let prior = current.duplicate();
        Ok(vec![ChangeEvent::update(current, prior)])
    }

    fn register_abort_guard(&mut self, failure: &ConstraintFailure) {
        self.inner.register_abort_guard(failure);
    }
}
