// SPDX-License-Identifier: Apache-2.0
//! Error taxonomy.
//!
//! Three classes, with distinct blast radii:
//! - [`ConstraintFailure`]: expected and user-triggerable; fatal to the
//!   transaction, never to the process.
//! - [`EngineError::ReferentialIntegrity`]: a programming error in the
//!   surrounding object graph; fatal and never retried.
//! - The remaining [`EngineError`] variants are the system-error class:
//!   engine or rule-catalog defects.

use thiserror::Error;

use crate::ident::{EntityRef, EntityType};

/// One failing constraint rule.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Violation {
    /// Name of the constraint rule that failed.
    pub rule: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Offending attribute names, when the rule can identify them.
    pub attributes: Vec<&'static str>,
}

impl Violation {
    /// Constructs a violation with no attribute attribution.
    #[must_use]
    pub fn new(rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
            attributes: Vec::new(),
        }
    }

    /// Attaches an offending attribute name.
    #[must_use]
    pub fn with_attribute(mut self, attribute: &'static str) -> Self {
        self.attributes.push(attribute);
        self
    }
}

/// Aggregate of every constraint violation one runner collected, tagged with
/// the entity's identity.
///
/// The constraints phase is the only place rule-level failures are converted;
/// it both returns this value as an error and registers a deferred abort
/// guard with the substrate, so the transaction cannot commit even if a
/// caller upstream discards the error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} constraint violation(s) for {entity}", violations.len())]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConstraintFailure {
    /// Entity the violations belong to.
    pub entity: EntityRef,
    /// One entry per failing rule, in catalog order.
    pub violations: Vec<Violation>,
}

impl ConstraintFailure {
    /// Constructs the aggregate. `violations` must be non-empty; the phase
    /// executor only builds this when at least one rule failed.
    #[must_use]
    pub fn new(entity: EntityRef, violations: Vec<Violation>) -> Self {
        Self { entity, violations }
    }
}

/// Errors emitted by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Constraint rules rejected the entity's state (expected, transactional).
    #[error(transparent)]
    Constraint(#[from] ConstraintFailure),

    /// A child's back-reference role does not resolve to the parent it was
    /// reached from. The graph is not safely interpretable; fatal.
    #[error("referential integrity violated: {child} role `{role}` does not reference {parent}")]
    ReferentialIntegrity {
        /// Child reached through the parent's collection role.
        child: EntityRef,
        /// The child's back-reference role that was checked.
        role: &'static str,
        /// Parent the traversal started from.
        parent: EntityRef,
    },

    /// No rule catalog is registered for the entity type.
    #[error("no rule catalog registered for entity type `{0}`")]
    UnknownCatalog(EntityType),

    /// A catalog for the entity type was already registered.
    #[error("duplicate rule catalog for entity type `{0}`")]
    DuplicateCatalog(EntityType),

    /// An aggregate or parent-copy rule names a to-one role the catalog does
    /// not declare.
    #[error("rule `{rule}` on `{ty}` references undeclared parent role `{role}`")]
    UndeclaredParentRole {
        /// Owning entity type.
        ty: EntityType,
        /// Offending rule name.
        rule: &'static str,
        /// Role name that is not in the catalog's parent roles.
        role: &'static str,
    },

    /// A second user-submitted event arrived for an entity that already has a
    /// live queued runner. Forward-chained work merges; user duplicates are a
    /// programming error.
    #[error("duplicate queued runner for {0}")]
    DuplicateQueuedRunner(EntityRef),

    /// The drain loop hit its iteration ceiling without reaching a fixpoint —
    /// almost certainly a rule cycle that never terminates.
    #[error("drain loop exceeded {0} rounds without reaching a fixpoint")]
    FixpointCeiling(u32),

    /// A forward-chaining target is not present in the substrate.
    #[error("entity {0} not present in the substrate")]
    MissingEntity(EntityRef),

    /// An aggregate delta could not be applied to the parent attribute
    /// (kind mismatch or integer overflow).
    #[error("aggregate `{rule}` could not adjust `{attribute}` on {parent}")]
    AggregateDelta {
        /// Aggregate rule name.
        rule: &'static str,
        /// Parent attribute being maintained.
        attribute: &'static str,
        /// Parent entity.
        parent: EntityRef,
    },

    /// Internal invariant violated (engine state corruption).
    #[error("internal invariant violated: {0}")]
    InternalCorruption(&'static str),
}

impl EngineError {
    /// Returns `true` for the expected, user-triggerable constraint class.
    #[must_use]
    pub const fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint(_))
    }

    /// Returns `true` for the fatal system-error class (engine or catalog
    /// defect), as opposed to constraint or referential-integrity failures.
    #[must_use]
    pub const fn is_system(&self) -> bool {
        !matches!(self, Self::Constraint(_) | Self::ReferentialIntegrity { .. })
    }
}
