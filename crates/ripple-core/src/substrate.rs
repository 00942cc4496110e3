// SPDX-License-Identifier: Apache-2.0
//! The persistence-substrate boundary.
//!
//! The substrate owns the canonical entities, emits change events, and makes
//! the transaction durable. The engine consumes it through this trait only;
//! everything behind it (storage, durability, schema reflection) is out of
//! scope for the core.

use crate::error::{ConstraintFailure, EngineError};
use crate::event::ChangeEvent;
use crate::ident::EntityRef;
use crate::snapshot::EntitySnapshot;

/// Interface the engine requires from the persistence substrate.
///
/// One implementation serves one transaction at a time; the engine never
/// shares a substrate handle across threads.
pub trait Substrate {
    /// Reads the live state of an entity as a snapshot, or `None` when the
    /// entity does not exist (anymore).
    fn snapshot(&self, entity: &EntityRef) -> Option<EntitySnapshot>;

    /// Resolves a collection role: the children currently held by `parent`
    /// under `role`. Collection roles are deliberately *not* materialized in
    /// snapshots; this is the only way the engine walks them.
    fn children(&self, parent: &EntityRef, role: &'static str) -> Vec<EntityRef>;

    /// Write-back hook, invoked once per forward-chained runner after it
    /// completes (and by aggregate adjustment when it mutates a parent's live
    /// state). Runners the caller itself submitted are skipped — the
    /// substrate persists those through its normal path.
    fn persist(&mut self, snapshot: &EntitySnapshot) -> Result<(), EngineError>;

    /// Flushes pending writes at the end of a drain round. The flush may
    /// surface new substrate-level events, which the driver submits back
    /// into the queue.
    fn flush(&mut self) -> Result<Vec<ChangeEvent>, EngineError>;

    /// Registers a deferred abort guard: the enclosing transaction must not
    /// be able to commit once this is called, even if the raised failure is
    /// discarded by calling code.
    fn register_abort_guard(&mut self, failure: &ConstraintFailure);
}
