// SPDX-License-Identifier: Apache-2.0
//! Rule descriptors.
//!
//! Rule bodies are plain function pointers; descriptor structs carry the
//! static configuration (names, attribute/role bindings). Catalogs of these
//! descriptors are built once at startup and treated as read-only data —
//! there is no runtime rule loading.

use crate::error::Violation;
use crate::snapshot::EntitySnapshot;
use crate::value::ValueKind;
use crate::verb::{Verb, VerbSet};

/// Body of a formula rule.
///
/// Receives the runner's current (mutable) snapshot and the prior frozen copy
/// (`None` for inserts). The body decides internally, based on its inputs,
/// whether it actually needs to recompute; the return value reports that
/// decision — "ran" and "recomputed" are distinct observations in statistics
/// and listener streams.
pub type FormulaFn = fn(current: &mut EntitySnapshot, prior: Option<&EntitySnapshot>) -> bool;

/// Body of a constraint rule.
///
/// Failure is a typed value, never an exception: return
/// `Err(`[`Violation`]`)` with a message and optionally the offending
/// attribute names. The constraints phase collects every violation for the
/// runner before reporting.
pub type ConstraintFn = fn(
    current: &EntitySnapshot,
    prior: Option<&EntitySnapshot>,
    verb: Verb,
) -> Result<(), Violation>;

/// Body of an action, early action, or commit action rule.
///
/// Actions may mutate the current snapshot (early actions use this to set up
/// preconditions before formulas run).
pub type ActionFn = fn(current: &mut EntitySnapshot, prior: Option<&EntitySnapshot>, verb: Verb);

/// Formula rule: recomputes one derived attribute of its entity.
///
/// Formulas execute in the externally supplied dependency order; the engine
/// never reorders them.
#[derive(Clone, Copy, Debug)]
pub struct FormulaRule {
    /// Rule name, used for statistics, listeners, and firing registries.
    pub name: &'static str,
    /// Attribute the formula maintains, when it maintains exactly one.
    pub attribute: Option<&'static str>,
    /// Rule body.
    pub body: FormulaFn,
}

/// Constraint rule: validates its entity's state for a set of verbs.
#[derive(Clone, Copy, Debug)]
pub struct ConstraintRule {
    /// Rule name.
    pub name: &'static str,
    /// Verbs this constraint applies to.
    pub verbs: VerbSet,
    /// Rule body.
    pub body: ConstraintFn,
}

/// Action rule: fires side effects at most once per (entity, transaction).
///
/// The same descriptor shape serves early actions, ordinary actions, and
/// commit-scoped actions; which list of the catalog it sits in decides when
/// it runs.
#[derive(Clone, Copy, Debug)]
pub struct ActionRule {
    /// Rule name (also the key in the per-transaction fired registry).
    pub name: &'static str,
    /// Rule body.
    pub body: ActionFn,
}

/// Kind of aggregate maintained on a parent attribute.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AggregateKind {
    /// Running sum of a child attribute.
    Sum,
    /// Count of child members.
    Count,
    /// Minimum observed child attribute value.
    Min,
    /// Maximum observed child attribute value.
    Max,
}

impl AggregateKind {
    /// Returns `true` for the min/max family, which keeps `Null` as the
    /// "no observations yet" sentinel instead of a zero default.
    #[must_use]
    pub const fn keeps_null_sentinel(self) -> bool {
        matches!(self, Self::Min | Self::Max)
    }
}

/// Aggregate rule, declared on the **child** type and bound to the child's
/// to-one role toward the parent.
#[derive(Clone, Copy, Debug)]
pub struct AggregateRule {
    /// Rule name.
    pub name: &'static str,
    /// The child's to-one role this aggregate is bound to.
    pub role: &'static str,
    /// Aggregate kind.
    pub kind: AggregateKind,
    /// Parent attribute holding the aggregate result.
    pub parent_attribute: &'static str,
    /// Child attribute being aggregated (`None` for `Count`).
    pub child_attribute: Option<&'static str>,
    /// Value kind of the result attribute, used by the insert Defaults phase.
    pub result_kind: ValueKind,
}

/// Parent-copy rule: keeps a child attribute equal to a parent attribute
/// reached through a to-one role. Refreshed at the head of the formulas
/// phase; when the role is unset the child attribute becomes `Null`.
#[derive(Clone, Copy, Debug)]
pub struct ParentCopyRule {
    /// Rule name.
    pub name: &'static str,
    /// The child's to-one role toward the parent.
    pub role: &'static str,
    /// Attribute read on the parent.
    pub parent_attribute: &'static str,
    /// Attribute written on the child.
    pub child_attribute: &'static str,
}

/// Kind tag for rule observations delivered to listeners and statistics.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RuleKind {
    /// Early action (before formulas and constraints).
    EarlyAction,
    /// Formula.
    Formula,
    /// Parent-copy refresh.
    ParentCopy,
    /// Constraint.
    Constraint,
    /// Ordinary action (after constraints pass).
    Action,
    /// Aggregate adjustment.
    Aggregate,
    /// Commit-scoped action.
    CommitAction,
    /// Commit-scoped constraint.
    CommitConstraint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_keep_the_null_sentinel() {
        assert!(AggregateKind::Min.keeps_null_sentinel());
        assert!(AggregateKind::Max.keeps_null_sentinel());
        assert!(!AggregateKind::Sum.keeps_null_sentinel());
        assert!(!AggregateKind::Count.keeps_null_sentinel());
    }
}
