// SPDX-License-Identifier: Apache-2.0
//! Per-transaction state.
//!
//! Everything a transaction accumulates lives here as owned fields — queue,
//! latest-runner map, deleted set, fired-action registry, change summary —
//! passed explicitly to the driver and phase executors. Nothing is looked up
//! from thread-local or global state, which is what keeps concurrent
//! transactions on different threads fully isolated.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::error::EngineError;
use crate::event::ChangeSummary;
use crate::ident::EntityRef;
use crate::runner::{Cause, PhaseMarker, Runner, RunnerId, RunnerState};
use crate::snapshot::EntitySnapshot;
use crate::verb::Verb;

/// Everything needed to create (or merge) a runner.
#[derive(Debug)]
pub(crate) struct RunnerSpec {
    pub entity: EntityRef,
    pub verb: Verb,
    pub cascade_delete: bool,
    pub user_submitted: bool,
    pub current: EntitySnapshot,
    pub prior: Option<EntitySnapshot>,
    pub cause: Option<Cause>,
    pub depth: u16,
}

/// Ceiling on runner executions within one transaction. Forward chaining is
/// recursive, so this bounds rule cycles the same way the drain-round ceiling
/// bounds flush refill cycles.
pub(crate) const MAX_RUNNERS_PER_TX: u32 = 10_000;

/// State owned exclusively by one logical transaction.
///
/// Created by [`crate::Engine::begin`], destroyed when the transaction ends.
#[derive(Debug, Default)]
pub struct TxContext {
    runners: Vec<Runner>,
    queue: VecDeque<RunnerId>,
    latest: FxHashMap<EntityRef, RunnerId>,
    deleted: FxHashSet<EntityRef>,
    fired: FxHashMap<EntityRef, FxHashSet<&'static str>>,
    summary: ChangeSummary,
    executed: u32,
}

impl TxContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enqueues a runner, enforcing the one-live-queued-runner-per-entity
    /// invariant.
    ///
    /// A second event for an entity with a queued runner merges into it:
    /// verbs escalate (Delete dominates, Insert absorbs Update), cascade
    /// flags union, the newest live state replaces the working copy, and the
    /// earliest prior copy is kept. Merging requires at least one side to be
    /// forward-chained; two user submissions for the same entity are a
    /// programming error.
    pub(crate) fn enqueue(&mut self, spec: RunnerSpec) -> Result<RunnerId, EngineError> {
        if let Some(&id) = self.latest.get(&spec.entity) {
            let existing = &mut self.runners[id.index()];
            if existing.state == RunnerState::Queued {
                if spec.user_submitted && existing.user_submitted {
                    return Err(EngineError::DuplicateQueuedRunner(spec.entity));
                }
                trace!(entity = %spec.entity, runner = %id, verb = %spec.verb, "merging into queued runner");
                existing.verb = existing.verb.escalate(spec.verb);
                existing.cascade_delete |= spec.cascade_delete;
                existing.user_submitted |= spec.user_submitted;
                existing.current = spec.current;
                if existing.prior.is_none() && existing.verb != Verb::Insert {
                    existing.prior = spec.prior;
                }
                return Ok(id);
            }
        }
        let id = self.create_runner(spec)?;
        self.queue.push_back(id);
        Ok(id)
    }

    /// Registers a runner in the arena and latest-runner map without queueing
    /// it. Forward chaining uses this for runners it executes immediately.
    pub(crate) fn create_runner(&mut self, spec: RunnerSpec) -> Result<RunnerId, EngineError> {
        let id = RunnerId(u32::try_from(self.runners.len()).map_err(|_| {
            EngineError::InternalCorruption("runner arena exceeded u32 indexing")
        })?);
        trace!(entity = %spec.entity, runner = %id, verb = %spec.verb, depth = spec.depth, "runner created");
        self.runners.push(Runner {
            id,
            entity: spec.entity.clone(),
            verb: spec.verb,
            cascade_delete: spec.cascade_delete,
            user_submitted: spec.user_submitted,
            current: spec.current,
            prior: spec.prior,
            cause: spec.cause,
            depth: spec.depth,
            state: RunnerState::Queued,
            phase: PhaseMarker::NotStarted,
        });
        self.latest.insert(spec.entity, id);
        Ok(id)
    }

    /// Charges one runner execution against the per-transaction ceiling.
    pub(crate) fn note_execution(&mut self) -> Result<(), EngineError> {
        self.executed = self.executed.saturating_add(1);
        if self.executed > MAX_RUNNERS_PER_TX {
            return Err(EngineError::FixpointCeiling(MAX_RUNNERS_PER_TX));
        }
        Ok(())
    }

    /// Removes and returns the current queue contents in FIFO order.
    ///
    /// FIFO is required correctness, not an optimization: processing sibling
    /// entities out of submission order can double-count aggregates.
    pub(crate) fn take_round(&mut self) -> Vec<RunnerId> {
        std::mem::take(&mut self.queue).into_iter().collect()
    }

    /// Returns `true` when no runner is queued.
    #[must_use]
    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Shared access to a runner.
    #[must_use]
    pub fn runner(&self, id: RunnerId) -> &Runner {
        &self.runners[id.index()]
    }

    /// Iterates every runner created in this transaction, in creation order.
    pub fn runners(&self) -> impl Iterator<Item = &Runner> {
        self.runners.iter()
    }

    pub(crate) fn runner_mut(&mut self, id: RunnerId) -> &mut Runner {
        &mut self.runners[id.index()]
    }

    /// The latest runner recorded for an entity, if it was touched.
    #[must_use]
    pub fn latest_runner(&self, entity: &EntityRef) -> Option<RunnerId> {
        self.latest.get(entity).copied()
    }

    /// Latest runner ids per touched entity, in submission order.
    ///
    /// The commit-scoped phase iterates this so an entity updated five times
    /// receives its commit-time checks once, against its final state.
    #[must_use]
    pub fn latest_runners(&self) -> Vec<RunnerId> {
        let mut ids: Vec<RunnerId> = self.latest.values().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Final states of all completed runners, in submission order, paired
    /// with their verb. This is the substrate's normal persistence path for
    /// caller-submitted entities.
    pub fn final_states(&self) -> impl Iterator<Item = (&EntitySnapshot, Verb)> {
        let mut ids = self.latest_runners();
        ids.retain(|id| self.runner(*id).state == RunnerState::Completed);
        ids.into_iter().map(|id| {
            let runner = self.runner(id);
            (&runner.current, runner.verb)
        })
    }

    /// Marks an entity as confirmed deleted; forward-chaining skips it.
    pub(crate) fn mark_deleted(&mut self, entity: EntityRef) {
        self.deleted.insert(entity);
    }

    /// Returns `true` when the entity was deleted earlier in this
    /// transaction.
    #[must_use]
    pub fn is_deleted(&self, entity: &EntityRef) -> bool {
        self.deleted.contains(entity)
    }

    /// Records an action firing. Returns `true` when the rule had not fired
    /// for this entity yet in this transaction.
    pub(crate) fn record_fired(&mut self, entity: &EntityRef, rule: &'static str) -> bool {
        self.fired.entry(entity.clone()).or_default().insert(rule)
    }

    pub(crate) fn record_summary(&mut self, entity: EntityRef, verb: Verb) {
        self.summary.record(entity, verb);
    }

    /// Accumulated change summary (latest verb per touched identity).
    #[must_use]
    pub fn summary(&self) -> &ChangeSummary {
        &self.summary
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ident::EntityType;

    fn entity(key: i64) -> EntityRef {
        EntityRef::new(EntityType("Order"), key)
    }

    fn spec(key: i64, verb: Verb, user: bool) -> RunnerSpec {
        let e = entity(key);
        RunnerSpec {
            entity: e.clone(),
            verb,
            cascade_delete: false,
            user_submitted: user,
            current: EntitySnapshot::new(e),
            prior: None,
            cause: None,
            depth: 0,
        }
    }

    #[test]
    fn second_user_submission_is_rejected() {
        let mut ctx = TxContext::new();
        ctx.enqueue(spec(1, Verb::Update, true)).expect("first");
        let dup = ctx.enqueue(spec(1, Verb::Update, true));
        assert!(matches!(dup, Err(EngineError::DuplicateQueuedRunner(_))));
    }

    #[test]
    fn forward_chained_event_merges_and_escalates() {
        let mut ctx = TxContext::new();
        let first = ctx.enqueue(spec(1, Verb::Update, true)).expect("first");
        let merged = ctx
            .enqueue(spec(1, Verb::Delete, false))
            .expect("merge allowed");
        assert_eq!(first, merged);
        assert_eq!(ctx.runner(first).verb(), Verb::Delete);
        assert_eq!(ctx.take_round().len(), 1);
    }

    #[test]
    fn completed_runner_does_not_block_a_new_one() {
        let mut ctx = TxContext::new();
        let first = ctx.enqueue(spec(1, Verb::Insert, true)).expect("first");
        ctx.take_round();
        ctx.runner_mut(first).state = RunnerState::Completed;
        let second = ctx
            .enqueue(spec(1, Verb::Update, false))
            .expect("new runner after completion");
        assert_ne!(first, second);
        assert_eq!(ctx.latest_runner(&entity(1)), Some(second));
    }

    #[test]
    fn fired_registry_tracks_per_entity_rules() {
        let mut ctx = TxContext::new();
        let e = entity(1);
        assert!(ctx.record_fired(&e, "a/notify"));
        assert!(!ctx.record_fired(&e, "a/notify"));
        assert!(ctx.record_fired(&e, "a/other"));
        assert!(ctx.record_fired(&entity(2), "a/notify"));
    }

    #[test]
    fn take_round_preserves_fifo_order() {
        let mut ctx = TxContext::new();
        let a = ctx.enqueue(spec(1, Verb::Insert, true)).expect("a");
        let b = ctx.enqueue(spec(2, Verb::Insert, true)).expect("b");
        assert_eq!(ctx.take_round(), vec![a, b]);
        assert!(ctx.queue_is_empty());
    }
}
