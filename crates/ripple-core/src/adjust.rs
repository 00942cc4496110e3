// SPDX-License-Identifier: Apache-2.0
//! Aggregate adjustment of parents: incremental sum/count/min/max maintenance
//! through to-one roles.
//!
//! All aggregates bound to one role accumulate into a single per-parent slot,
//! so a parent touched by several aggregates receives exactly one coalesced
//! update runner. A parallel prior-parent slot handles re-parenting: when the
//! entity's parent reference itself changed, the previous parent gets its own
//! adjustment pass first.

use core::cmp::Ordering;

use tracing::trace;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::ident::EntityRef;
use crate::listener::RuleObservation;
use crate::pipeline::{self, Frame};
use crate::rule::{AggregateKind, AggregateRule, RuleKind};
use crate::runner::Cause;
use crate::snapshot::EntitySnapshot;
use crate::substrate::Substrate;
use crate::txctx::{RunnerSpec, TxContext};
use crate::value::Value;
use crate::verb::Verb;

/// One parent mid-adjustment. The prior copy is captured once, before the
/// first aggregate touches the parent, and is not overwritten by subsequent
/// aggregate calls for the same parent.
struct ParentSlot {
    entity: EntityRef,
    snap: EntitySnapshot,
    prior: EntitySnapshot,
    touched: bool,
}

impl ParentSlot {
    fn load(acx: &AggregateCx<'_>, entity: EntityRef) -> Result<Self, EngineError> {
        let snap = pipeline::live_view(acx.ctx, acx.store, &entity)
            .ok_or_else(|| EngineError::MissingEntity(entity.clone()))?;
        let prior = snap.duplicate();
        Ok(Self {
            entity,
            snap,
            prior,
            touched: false,
        })
    }
}

/// Read-only surroundings of one adjustment pass.
struct AggregateCx<'a> {
    store: &'a dyn Substrate,
    ctx: &'a TxContext,
    /// The child entity driving the adjustment.
    child: &'a EntityRef,
    /// The parent's collection role, for extremum rescans.
    collection_role: &'static str,
}

/// Final pipeline phase: applies every aggregate bound to each of this
/// entity's to-one roles and forward-chains one coalesced update runner per
/// touched parent.
pub(crate) fn adjust_parents(
    engine: &Engine,
    ctx: &mut TxContext,
    store: &mut dyn Substrate,
    frame: &Frame<'_>,
    current: &EntitySnapshot,
    prior: Option<&EntitySnapshot>,
) -> Result<(), EngineError> {
    for parent_role in &frame.catalog.parent_roles {
        let Some(aggregates) = frame.catalog.aggregates_by_role.get(parent_role.role) else {
            continue;
        };
        let new_parent = current.to_one(parent_role.role).cloned();
        let old_parent = prior.and_then(|p| p.to_one(parent_role.role)).cloned();
        let reparented = frame.verb == Verb::Update && old_parent != new_parent;

        let mut slot: Option<ParentSlot> = None;
        let mut old_slot: Option<ParentSlot> = None;

        let acx = AggregateCx {
            store: &*store,
            ctx: &*ctx,
            child: frame.entity,
            collection_role: parent_role.inverse,
        };
        for aggregate in aggregates {
            engine.observe_before(frame.entity, aggregate.name, RuleKind::Aggregate);
            let new_val = aggregate
                .child_attribute
                .map_or(Value::Null, |a| current.get(a));
            let old_val = aggregate
                .child_attribute
                .map_or(Value::Null, |a| prior.map_or(Value::Null, |p| p.get(a)));

            let mut changed = false;
            match frame.verb {
                Verb::Insert => {
                    if let Some(parent) = &new_parent {
                        if let Some(s) = slot_for(&mut slot, &acx, parent)? {
                            changed = apply_join(s, aggregate, &new_val)?;
                        }
                    }
                }
                Verb::Delete => {
                    if let Some(parent) = old_parent.as_ref().or(new_parent.as_ref()) {
                        if let Some(s) = slot_for(&mut slot, &acx, parent)? {
                            changed = apply_leave(&acx, s, aggregate, &old_val)?;
                        }
                    }
                }
                Verb::Update if reparented => {
                    if let Some(parent) = &old_parent {
                        if let Some(s) = slot_for(&mut old_slot, &acx, parent)? {
                            changed |= apply_leave(&acx, s, aggregate, &old_val)?;
                        }
                    }
                    if let Some(parent) = &new_parent {
                        if let Some(s) = slot_for(&mut slot, &acx, parent)? {
                            changed |= apply_join(s, aggregate, &new_val)?;
                        }
                    }
                }
                Verb::Update => {
                    if let Some(parent) = &new_parent {
                        if old_val != new_val {
                            if let Some(s) = slot_for(&mut slot, &acx, parent)? {
                                changed =
                                    apply_replace(&acx, s, aggregate, &old_val, &new_val)?;
                            }
                        }
                    }
                }
            }

            let stats = engine.stats_registry();
            stats.record_ran(aggregate.name);
            if changed {
                stats.record_recomputed(aggregate.name);
            }
            engine.observe_after(&RuleObservation {
                entity: frame.entity.clone(),
                rule: aggregate.name,
                kind: RuleKind::Aggregate,
                attribute: Some(aggregate.parent_attribute),
                old: None,
                new: None,
                recomputed: changed,
            });
        }

        // Prior parent first, then the current parent.
        for s in old_slot.into_iter().chain(slot) {
            flush_slot(engine, ctx, store, frame, parent_role.role, s)?;
        }
    }
    Ok(())
}

/// Lazily loads the slot for `parent`. `None` when the parent was already
/// deleted this transaction; there is nothing left to adjust.
fn slot_for<'a>(
    slot: &'a mut Option<ParentSlot>,
    acx: &AggregateCx<'_>,
    parent: &EntityRef,
) -> Result<Option<&'a mut ParentSlot>, EngineError> {
    if acx.ctx.is_deleted(parent) {
        return Ok(None);
    }
    if slot.is_none() {
        *slot = Some(ParentSlot::load(acx, parent.clone())?);
    }
    Ok(slot.as_mut())
}

/// Persists the adjusted parent write-through (so later siblings in the same
/// round read fresh state) and forward-chains its single update runner.
fn flush_slot(
    engine: &Engine,
    ctx: &mut TxContext,
    store: &mut dyn Substrate,
    frame: &Frame<'_>,
    role: &'static str,
    slot: ParentSlot,
) -> Result<(), EngineError> {
    if !slot.touched || ctx.is_deleted(&slot.entity) {
        return Ok(());
    }
    trace!(parent = %slot.entity, role, "coalesced parent adjustment");
    store.persist(&slot.snap)?;
    pipeline::chain(
        engine,
        ctx,
        store,
        RunnerSpec {
            entity: slot.entity,
            verb: Verb::Update,
            cascade_delete: false,
            user_submitted: false,
            current: slot.snap,
            prior: Some(slot.prior),
            cause: Some(Cause {
                parent: frame.id,
                role,
            }),
            depth: frame.depth.saturating_add(1),
        },
    )
}

/// The entity joins the parent's collection (insert, or the new side of a
/// re-parenting).
fn apply_join(
    slot: &mut ParentSlot,
    aggregate: &AggregateRule,
    value: &Value,
) -> Result<bool, EngineError> {
    let attr = aggregate.parent_attribute;
    let old = slot.snap.get(attr);
    let new = match aggregate.kind {
        AggregateKind::Sum => old.checked_add(value),
        AggregateKind::Count => old.checked_add(&Value::Int(1)),
        AggregateKind::Min => extremum(&old, value, Ordering::Less),
        AggregateKind::Max => extremum(&old, value, Ordering::Greater),
    }
    .ok_or_else(|| delta_error(aggregate, &slot.entity))?;
    Ok(set_if_changed(slot, attr, new))
}

/// The entity leaves the parent's collection (delete, or the old side of a
/// re-parenting).
fn apply_leave(
    acx: &AggregateCx<'_>,
    slot: &mut ParentSlot,
    aggregate: &AggregateRule,
    old_val: &Value,
) -> Result<bool, EngineError> {
    let attr = aggregate.parent_attribute;
    let old = slot.snap.get(attr);
    let new = match aggregate.kind {
        AggregateKind::Sum => old
            .checked_sub(old_val)
            .ok_or_else(|| delta_error(aggregate, &slot.entity))?,
        AggregateKind::Count => old
            .checked_sub(&Value::Int(1))
            .ok_or_else(|| delta_error(aggregate, &slot.entity))?,
        AggregateKind::Min | AggregateKind::Max => {
            if old_val.is_null() || old != *old_val {
                // A null contributes no observation; a non-extremum departure
                // cannot move the extremum.
                return Ok(false);
            }
            rescan(acx, &slot.entity, aggregate, None)?
        }
    };
    Ok(set_if_changed(slot, attr, new))
}

/// The entity stays under the same parent but the aggregated value changed.
fn apply_replace(
    acx: &AggregateCx<'_>,
    slot: &mut ParentSlot,
    aggregate: &AggregateRule,
    old_val: &Value,
    new_val: &Value,
) -> Result<bool, EngineError> {
    let attr = aggregate.parent_attribute;
    let old = slot.snap.get(attr);
    let new = match aggregate.kind {
        AggregateKind::Sum => old
            .checked_sub(old_val)
            .and_then(|v| v.checked_add(new_val))
            .ok_or_else(|| delta_error(aggregate, &slot.entity))?,
        AggregateKind::Count => return Ok(false),
        AggregateKind::Min | AggregateKind::Max => {
            let keep = keep_ordering(aggregate.kind);
            let candidate = extremum(&old, new_val, keep)
                .ok_or_else(|| delta_error(aggregate, &slot.entity))?;
            if candidate != old {
                candidate
            } else if !old_val.is_null() && old == *old_val {
                // The departing value held the extremum; rescan the siblings,
                // counting this entity at its new value.
                rescan(acx, &slot.entity, aggregate, Some(new_val))?
            } else {
                return Ok(false);
            }
        }
    };
    Ok(set_if_changed(slot, attr, new))
}

/// Recomputes a min/max from the parent's live children, excluding the child
/// driving the adjustment and optionally substituting its in-flight value.
/// `Null` when no observation remains.
fn rescan(
    acx: &AggregateCx<'_>,
    parent: &EntityRef,
    aggregate: &AggregateRule,
    include_self: Option<&Value>,
) -> Result<Value, EngineError> {
    let keep = keep_ordering(aggregate.kind);
    let mut best = Value::Null;
    for sibling in acx.store.children(parent, acx.collection_role) {
        if &sibling == acx.child {
            continue;
        }
        let Some(snap) = pipeline::live_view(acx.ctx, acx.store, &sibling) else {
            continue;
        };
        let val = aggregate
            .child_attribute
            .map_or(Value::Null, |a| snap.get(a));
        best = extremum(&best, &val, keep).ok_or_else(|| delta_error(aggregate, parent))?;
    }
    if let Some(val) = include_self {
        best = extremum(&best, val, keep).ok_or_else(|| delta_error(aggregate, parent))?;
    }
    trace!(parent = %parent, attribute = aggregate.parent_attribute, "extremum rescan");
    Ok(best)
}

/// Picks between the standing value and a candidate observation. `Null`
/// candidates contribute nothing; a `Null` standing value is replaced by any
/// observation. `None` on a kind mismatch.
fn extremum(old: &Value, candidate: &Value, keep: Ordering) -> Option<Value> {
    if candidate.is_null() {
        return Some(old.clone());
    }
    if old.is_null() {
        return Some(candidate.clone());
    }
    let ord = candidate.compare(old)?;
    Some(if ord == keep {
        candidate.clone()
    } else {
        old.clone()
    })
}

const fn keep_ordering(kind: AggregateKind) -> Ordering {
    match kind {
        AggregateKind::Min => Ordering::Less,
        _ => Ordering::Greater,
    }
}

fn set_if_changed(slot: &mut ParentSlot, attr: &'static str, new: Value) -> bool {
    if slot.snap.get(attr) == new {
        return false;
    }
    slot.snap.set_attr(attr, new);
    slot.touched = true;
    true
}

fn delta_error(aggregate: &AggregateRule, parent: &EntityRef) -> EngineError {
    EngineError::AggregateDelta {
        rule: aggregate.name,
        attribute: aggregate.parent_attribute,
        parent: parent.clone(),
    }
}
