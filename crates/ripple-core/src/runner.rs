// SPDX-License-Identifier: Apache-2.0
//! The computation unit: one (entity, verb) pair driving the phase pipeline.

use crate::ident::EntityRef;
use crate::snapshot::EntitySnapshot;
use crate::verb::Verb;

/// Handle to a [`Runner`] inside its transaction's arena.
///
/// Runners reference each other (causation chains) by id, never by pointer,
/// so forward chains carry no ownership cycles.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RunnerId(pub(crate) u32);

impl RunnerId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for RunnerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "runner#{}", self.0)
    }
}

/// Processing state of a runner.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RunnerState {
    /// Created and waiting in the transaction queue.
    Queued,
    /// Phase pipeline in progress.
    Running,
    /// Pipeline finished normally (including AdjustParents).
    Completed,
}

/// Phase marker, tracked independently of [`RunnerState`].
///
/// A runner aborted by a constraint failure still reaches
/// [`PhaseMarker::Finished`] while its processing state records the abort
/// (it never transitions to `Completed`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PhaseMarker {
    /// Nothing executed yet.
    NotStarted,
    /// Early actions (and insert defaults) in progress.
    EarlyActions,
    /// Parent copies and formulas in progress.
    Logic,
    /// Constraints in progress.
    Constraints,
    /// Ordinary actions in progress.
    Actions,
    /// Cascade to children / parent adjustment in progress.
    Cascade,
    /// Terminal.
    Finished,
}

/// Why a forward-chained runner exists: the parent runner that enqueued it
/// and the role traversed to reach the entity.
#[derive(Clone, Copy, Debug)]
pub struct Cause {
    /// Runner whose cascade or adjustment created this one.
    pub parent: RunnerId,
    /// Role traversed (a collection role for cascade, a to-one role for
    /// parent adjustment).
    pub role: &'static str,
}

/// The unit of work for one (entity, verb) pair.
///
/// Owns the working copy of the entity's state (`current`) and the frozen
/// pre-change copy (`prior`, `None` for inserts). Destroyed with its
/// transaction context.
#[derive(Debug)]
pub struct Runner {
    pub(crate) id: RunnerId,
    pub(crate) entity: EntityRef,
    pub(crate) verb: Verb,
    pub(crate) cascade_delete: bool,
    pub(crate) user_submitted: bool,
    pub(crate) current: EntitySnapshot,
    pub(crate) prior: Option<EntitySnapshot>,
    pub(crate) cause: Option<Cause>,
    pub(crate) depth: u16,
    pub(crate) state: RunnerState,
    pub(crate) phase: PhaseMarker,
}

impl Runner {
    /// Runner id within its transaction.
    #[must_use]
    pub const fn id(&self) -> RunnerId {
        self.id
    }

    /// Entity this runner computes for.
    #[must_use]
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    /// Verb driving the phase sequence.
    #[must_use]
    pub const fn verb(&self) -> Verb {
        self.verb
    }

    /// Processing state.
    #[must_use]
    pub const fn state(&self) -> RunnerState {
        self.state
    }

    /// Phase marker.
    #[must_use]
    pub const fn phase(&self) -> PhaseMarker {
        self.phase
    }

    /// Forward-chaining nesting depth (0 for submitted events).
    #[must_use]
    pub const fn depth(&self) -> u16 {
        self.depth
    }

    /// Causation: the runner and role this one was forward-chained from.
    #[must_use]
    pub const fn cause(&self) -> Option<Cause> {
        self.cause
    }

    /// `true` when the caller submitted this runner's event (the substrate
    /// persists those through its own path).
    #[must_use]
    pub const fn is_user_submitted(&self) -> bool {
        self.user_submitted
    }

    /// Current (working) snapshot.
    #[must_use]
    pub fn current(&self) -> &EntitySnapshot {
        &self.current
    }

    /// Frozen pre-change snapshot, `None` for inserts.
    #[must_use]
    pub fn prior(&self) -> Option<&EntitySnapshot> {
        self.prior.as_ref()
    }
}
