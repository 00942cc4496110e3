// SPDX-License-Identifier: Apache-2.0
//! Point-in-time views of one entity's attribute and role values.

use std::collections::BTreeMap;

use crate::ident::EntityRef;
use crate::value::Value;

/// Snapshot of one entity's attributes and single-valued roles.
///
/// Two kinds exist:
/// - *live*: the working copy a runner mutates in place and the substrate
///   persists;
/// - *frozen copy*: produced by [`EntitySnapshot::duplicate`] to capture an
///   "old value" before mutation. Frozen copies are immutable after
///   construction.
///
/// Collection roles are never materialized in a snapshot; they are read
/// through the substrate. That keeps parent↔child back-reference cycles out
/// of the ownership graph entirely: "parent holds child collection, child
/// holds parent reference" becomes two independent index lookups.
///
/// Maps are `BTreeMap` so attribute iteration order is deterministic
/// wherever it is observable (listeners, summaries, tests).
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EntitySnapshot {
    entity: EntityRef,
    attrs: BTreeMap<&'static str, Value>,
    to_one: BTreeMap<&'static str, Option<EntityRef>>,
    frozen: bool,
}

impl EntitySnapshot {
    /// Creates an empty live snapshot for `entity`.
    #[must_use]
    pub fn new(entity: EntityRef) -> Self {
        Self {
            entity,
            attrs: BTreeMap::new(),
            to_one: BTreeMap::new(),
            frozen: false,
        }
    }

    /// Returns the identity this snapshot belongs to.
    #[must_use]
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    /// Returns `true` for a frozen copy.
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Returns the attribute value, or `None` when never set.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Returns the attribute value, treating unset as [`Value::Null`].
    #[must_use]
    pub fn get(&self, name: &str) -> Value {
        self.attrs.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Sets an attribute value.
    ///
    /// Frozen copies must never be mutated; this is a programming error in
    /// rule code and trips a debug assertion.
    pub fn set_attr(&mut self, name: &'static str, value: impl Into<Value>) {
        debug_assert!(!self.frozen, "attempted to mutate a frozen snapshot");
        self.attrs.insert(name, value.into());
    }

    /// Returns the target of a single-valued role, when set and non-null.
    #[must_use]
    pub fn to_one(&self, role: &str) -> Option<&EntityRef> {
        self.to_one.get(role).and_then(Option::as_ref)
    }

    /// Sets (or clears, with `None`) a single-valued role.
    pub fn set_to_one(&mut self, role: &'static str, target: Option<EntityRef>) {
        debug_assert!(!self.frozen, "attempted to mutate a frozen snapshot");
        self.to_one.insert(role, target);
    }

    /// Iterates attributes in deterministic (name) order.
    pub fn iter_attrs(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.attrs.iter().map(|(k, v)| (*k, v))
    }

    /// Produces a frozen copy capturing current attribute and to-one role
    /// values.
    ///
    /// Invariant: never copy a copy. Duplicating a frozen copy returns the
    /// copy itself (a clone with identical contents), so old-value capture
    /// can be applied unconditionally without stacking copies.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        if self.frozen {
            return self.clone();
        }
        Self {
            entity: self.entity.clone(),
            attrs: self.attrs.clone(),
            to_one: self.to_one.clone(),
            frozen: true,
        }
    }

    /// Builder-style attribute setter for seeding snapshots.
    #[must_use]
    pub fn with_attr(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder-style role setter for seeding snapshots.
    #[must_use]
    pub fn with_to_one(mut self, role: &'static str, target: Option<EntityRef>) -> Self {
        self.set_to_one(role, target);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::EntityType;

    fn entity() -> EntityRef {
        EntityRef::new(EntityType("Order"), 1)
    }

    #[test]
    fn unset_attribute_reads_as_null() {
        let snap = EntitySnapshot::new(entity());
        assert_eq!(snap.attr("total"), None);
        assert_eq!(snap.get("total"), Value::Null);
    }

    #[test]
    fn duplicate_captures_values_and_freezes() {
        let mut live = EntitySnapshot::new(entity()).with_attr("total", 10i64);
        let copy = live.duplicate();
        live.set_attr("total", 25i64);

        assert!(copy.is_frozen());
        assert_eq!(copy.get("total"), Value::Int(10));
        assert_eq!(live.get("total"), Value::Int(25));
    }

    #[test]
    fn duplicate_of_duplicate_is_itself() {
        let live = EntitySnapshot::new(entity()).with_attr("total", 10i64);
        let copy = live.duplicate();
        let copy2 = copy.duplicate();
        assert_eq!(copy, copy2);
        assert!(copy2.is_frozen());
    }

    #[test]
    fn cleared_role_reads_as_absent() {
        let mut snap = EntitySnapshot::new(entity());
        let parent = EntityRef::new(EntityType("Customer"), 9);
        snap.set_to_one("customer", Some(parent.clone()));
        assert_eq!(snap.to_one("customer"), Some(&parent));
        snap.set_to_one("customer", None);
        assert_eq!(snap.to_one("customer"), None);
    }
}
