// SPDX-License-Identifier: Apache-2.0
//! Minimal in-memory substrate used by the engine tests and fixtures.
//!
//! Entities live in an arena keyed by [`EntityRef`], with explicit
//! forward/reverse role indexes instead of live object pointers — the
//! parent↔child cycle of the object graph becomes two independent lookups.
//! A production substrate would sit on real storage; this one keeps the
//! engine self-contained.

use std::collections::BTreeMap;

use crate::error::{ConstraintFailure, EngineError};
use crate::event::ChangeEvent;
use crate::ident::{EntityRef, EntityType};
use crate::snapshot::EntitySnapshot;
use crate::substrate::Substrate;
use crate::txctx::TxContext;
use crate::verb::Verb;

/// Bidirectional role pair: the child's to-one role and the parent's
/// collection role it inverts.
#[derive(Clone, Copy, Debug)]
pub struct RolePair {
    /// Child entity type.
    pub child_type: EntityType,
    /// The child's to-one role toward the parent.
    pub child_role: &'static str,
    /// The parent's collection role holding the children.
    pub parent_role: &'static str,
}

/// In-memory entity store implementing [`Substrate`].
#[derive(Debug, Default)]
pub struct MemStore {
    entities: BTreeMap<EntityRef, EntitySnapshot>,
    role_pairs: Vec<RolePair>,
    /// (parent, parent collection role) → children, kept in insertion order.
    children: BTreeMap<(EntityRef, &'static str), Vec<EntityRef>>,
    /// (child, child to-one role) → parent currently indexed, for reparenting.
    memberships: BTreeMap<(EntityRef, &'static str), EntityRef>,
    staged_events: Vec<ChangeEvent>,
    abort_guards: Vec<ConstraintFailure>,
    persist_log: Vec<EntityRef>,
}

impl MemStore {
    /// Creates an empty store with the given role pairs.
    #[must_use]
    pub fn new(role_pairs: Vec<RolePair>) -> Self {
        Self {
            role_pairs,
            ..Self::default()
        }
    }

    /// Seeds an entity without emitting events (fixture setup).
    pub fn seed(&mut self, snapshot: EntitySnapshot) {
        self.upsert(snapshot);
    }

    /// Stages a substrate-level event to be surfaced by the next
    /// [`Substrate::flush`], simulating writes the substrate performs on its
    /// own (e.g. its delete cascades).
    pub fn stage_flush_event(&mut self, event: ChangeEvent) {
        self.staged_events.push(event);
    }

    /// Returns `true` once any abort guard was registered.
    #[must_use]
    pub fn aborted(&self) -> bool {
        !self.abort_guards.is_empty()
    }

    /// Registered abort guards, in registration order.
    #[must_use]
    pub fn abort_guards(&self) -> &[ConstraintFailure] {
        &self.abort_guards
    }

    /// Entities the engine asked to persist, in call order.
    #[must_use]
    pub fn persist_log(&self) -> &[EntityRef] {
        &self.persist_log
    }

    /// Reads an entity's live state.
    #[must_use]
    pub fn live(&self, entity: &EntityRef) -> Option<&EntitySnapshot> {
        self.entities.get(entity)
    }

    /// The substrate's commit point and its normal persistence path for
    /// caller-submitted entities: applies the transaction's final states.
    ///
    /// # Errors
    /// Returns the first registered abort guard as a constraint error —
    /// a transaction with a registered guard can never commit, even when the
    /// caller discarded the failure the engine raised earlier.
    pub fn try_commit(&mut self, ctx: &TxContext) -> Result<(), EngineError> {
        if let Some(guard) = self.abort_guards.first() {
            return Err(EngineError::Constraint(guard.clone()));
        }
        let finals: Vec<(EntitySnapshot, Verb)> = ctx
            .final_states()
            .map(|(snap, verb)| (snap.clone(), verb))
            .collect();
        for (snapshot, verb) in finals {
            if verb == Verb::Delete {
                self.remove(snapshot.entity());
            } else {
                self.upsert(snapshot);
            }
        }
        Ok(())
    }

    fn upsert(&mut self, snapshot: EntitySnapshot) {
        let entity = snapshot.entity().clone();
        self.reindex(&entity, &snapshot);
        self.entities.insert(entity, snapshot);
    }

    /// Removes an entity and drops it from every role index.
    pub fn remove(&mut self, entity: &EntityRef) {
        for pair in pairs_for(&self.role_pairs, entity.ty) {
            if let Some(parent) = self.memberships.remove(&(entity.clone(), pair.child_role)) {
                if let Some(list) = self.children.get_mut(&(parent, pair.parent_role)) {
                    list.retain(|c| c != entity);
                }
            }
        }
        self.entities.remove(entity);
    }

    fn reindex(&mut self, entity: &EntityRef, snapshot: &EntitySnapshot) {
        for pair in pairs_for(&self.role_pairs, entity.ty) {
            let target = snapshot.to_one(pair.child_role).cloned();
            let key = (entity.clone(), pair.child_role);
            let indexed = self.memberships.get(&key).cloned();
            if indexed == target {
                continue;
            }
            if let Some(old_parent) = indexed {
                if let Some(list) = self.children.get_mut(&(old_parent, pair.parent_role)) {
                    list.retain(|c| c != entity);
                }
                self.memberships.remove(&key);
            }
            if let Some(new_parent) = target {
                self.children
                    .entry((new_parent.clone(), pair.parent_role))
                    .or_default()
                    .push(entity.clone());
                self.memberships.insert(key, new_parent);
            }
        }
    }
}

fn pairs_for(pairs: &[RolePair], ty: EntityType) -> Vec<RolePair> {
    pairs.iter().filter(|p| p.child_type == ty).copied().collect()
}

impl Substrate for MemStore {
    fn snapshot(&self, entity: &EntityRef) -> Option<EntitySnapshot> {
        self.entities.get(entity).cloned()
    }

    fn children(&self, parent: &EntityRef, role: &'static str) -> Vec<EntityRef> {
        self.children
            .get(&(parent.clone(), role))
            .cloned()
            .unwrap_or_default()
    }

    fn persist(&mut self, snapshot: &EntitySnapshot) -> Result<(), EngineError> {
        self.persist_log.push(snapshot.entity().clone());
        self.upsert(snapshot.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<Vec<ChangeEvent>, EngineError> {
        Ok(std::mem::take(&mut self.staged_events))
    }

    fn register_abort_guard(&mut self, failure: &ConstraintFailure) {
        self.abort_guards.push(failure.clone());
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    const ORDER: EntityType = EntityType("Order");
    const ITEM: EntityType = EntityType("LineItem");

    fn pairs() -> Vec<RolePair> {
        vec![RolePair {
            child_type: ITEM,
            child_role: "order",
            parent_role: "line_items",
        }]
    }

    fn order(key: i64) -> EntityRef {
        EntityRef::new(ORDER, key)
    }

    fn item(key: i64, parent: &EntityRef) -> EntitySnapshot {
        EntitySnapshot::new(EntityRef::new(ITEM, key))
            .with_to_one("order", Some(parent.clone()))
    }

    #[test]
    fn children_index_follows_the_to_one_role() {
        let mut store = MemStore::new(pairs());
        store.seed(EntitySnapshot::new(order(1)));
        store.seed(item(10, &order(1)));
        store.seed(item(11, &order(1)));
        assert_eq!(store.children(&order(1), "line_items").len(), 2);
    }

    #[test]
    fn reparenting_moves_the_membership() {
        let mut store = MemStore::new(pairs());
        store.seed(EntitySnapshot::new(order(1)));
        store.seed(EntitySnapshot::new(order(2)));
        store.seed(item(10, &order(1)));

        let moved = item(10, &order(2));
        store.seed(moved);
        assert!(store.children(&order(1), "line_items").is_empty());
        assert_eq!(store.children(&order(2), "line_items"), vec![EntityRef::new(ITEM, 10)]);
    }

    #[test]
    fn remove_clears_all_indexes() {
        let mut store = MemStore::new(pairs());
        store.seed(EntitySnapshot::new(order(1)));
        store.seed(item(10, &order(1)));
        store.remove(&EntityRef::new(ITEM, 10));
        assert!(store.children(&order(1), "line_items").is_empty());
        assert!(store.live(&EntityRef::new(ITEM, 10)).is_none());
    }
}
