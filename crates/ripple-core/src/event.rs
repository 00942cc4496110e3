// SPDX-License-Identifier: Apache-2.0
//! Change events (substrate → engine) and transaction summaries
//! (engine → listeners).

use std::collections::BTreeMap;

use crate::ident::EntityRef;
use crate::snapshot::EntitySnapshot;
use crate::verb::Verb;

/// One substrate-level write, as delivered to [`crate::Engine::submit`].
///
/// Submission only enqueues; rule execution happens later, when the
/// transaction driver drains the queue. `current` is the engine's working
/// copy of the entity's live state; `prior` is the frozen pre-change copy
/// (`None` for inserts).
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    /// Entity the write touched.
    pub entity: EntityRef,
    /// Nature of the write.
    pub verb: Verb,
    /// Live state after the write.
    pub current: EntitySnapshot,
    /// Frozen pre-change state (`None` for inserts).
    pub prior: Option<EntitySnapshot>,
    /// Set when the write originates from a substrate-level delete cascade;
    /// child runners propagate the flag and cascade unconditionally.
    pub cascade_delete: bool,
}

impl ChangeEvent {
    /// Insert event: no prior state.
    #[must_use]
    pub fn insert(current: EntitySnapshot) -> Self {
        Self {
            entity: current.entity().clone(),
            verb: Verb::Insert,
            current,
            prior: None,
            cascade_delete: false,
        }
    }

    /// Update event with an explicit pre-change copy.
    #[must_use]
    pub fn update(current: EntitySnapshot, prior: EntitySnapshot) -> Self {
        Self {
            entity: current.entity().clone(),
            verb: Verb::Update,
            prior: Some(prior.duplicate()),
            current,
            cascade_delete: false,
        }
    }

    /// Delete event. The prior copy is captured from the state being deleted.
    #[must_use]
    pub fn delete(current: EntitySnapshot) -> Self {
        Self {
            entity: current.entity().clone(),
            verb: Verb::Delete,
            prior: Some(current.duplicate()),
            current,
            cascade_delete: false,
        }
    }
}

/// Per-transaction summary of every touched entity, deduplicated by identity
/// with the latest verb winning. Delivered to listeners at commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ChangeSummary {
    entries: BTreeMap<EntityRef, Verb>,
}

impl ChangeSummary {
    /// Creates an empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed change; a later record for the same identity
    /// replaces the earlier verb.
    pub fn record(&mut self, entity: EntityRef, verb: Verb) {
        self.entries.insert(entity, verb);
    }

    /// Returns the recorded verb for `entity`, if it was touched.
    #[must_use]
    pub fn verb_for(&self, entity: &EntityRef) -> Option<Verb> {
        self.entries.get(entity).copied()
    }

    /// Iterates all entries in deterministic (identity) order.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityRef, Verb)> {
        self.entries.iter().map(|(e, v)| (e, *v))
    }

    /// Entities whose latest event is the given verb.
    pub fn with_verb(&self, verb: Verb) -> impl Iterator<Item = &EntityRef> {
        self.entries
            .iter()
            .filter(move |(_, v)| **v == verb)
            .map(|(e, _)| e)
    }

    /// Number of distinct touched entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing was touched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::EntityType;

    #[test]
    fn latest_verb_wins_per_identity() {
        let entity = EntityRef::new(EntityType("Order"), 1);
        let mut summary = ChangeSummary::new();
        summary.record(entity.clone(), Verb::Insert);
        summary.record(entity.clone(), Verb::Update);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary.verb_for(&entity), Some(Verb::Update));
    }

    #[test]
    fn delete_event_freezes_its_own_prior() {
        let entity = EntityRef::new(EntityType("Order"), 1);
        let snap = EntitySnapshot::new(entity).with_attr("total", 5i64);
        let event = ChangeEvent::delete(snap);
        let prior = event.prior.as_ref().map(EntitySnapshot::is_frozen);
        assert_eq!(prior, Some(true));
        assert!(!event.current.is_frozen());
    }
}
