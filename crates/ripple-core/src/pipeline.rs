// SPDX-License-Identifier: Apache-2.0
//! Phase executors and the per-verb phase sequence.
//!
//! `run` drives one runner through its verb's phases:
//!
//! - Insert: Defaults → EarlyActions → Formulas&ParentChecks → Constraints →
//!   Actions → AdjustParents
//! - Update: EarlyActions → Formulas&ParentChecks → Constraints → Actions →
//!   CascadeToChildren → AdjustParents
//! - Delete: EarlyActions → Formulas&ParentChecks → Constraints → Actions →
//!   AdjustParents (children are driven by the substrate's own delete
//!   cascades, never pushed proactively)
//!
//! Forward-chained runners execute immediately as nested calls through
//! [`chain`]; only submitted events and flush refills sit in the transaction
//! queue. The per-transaction execution ceiling bounds chain recursion.

use tracing::{debug, trace, warn};

use crate::adjust;
use crate::cascade;
use crate::catalog::RuleCatalog;
use crate::engine::Engine;
use crate::error::{ConstraintFailure, EngineError};
use crate::ident::EntityRef;
use crate::listener::RuleObservation;
use crate::rule::{ConstraintRule, RuleKind};
use crate::runner::{PhaseMarker, RunnerId, RunnerState};
use crate::snapshot::EntitySnapshot;
use crate::substrate::Substrate;
use crate::txctx::{RunnerSpec, TxContext};
use crate::value::Value;
use crate::verb::Verb;

/// Per-runner execution context threaded through the phase executors.
pub(crate) struct Frame<'a> {
    pub catalog: &'a RuleCatalog,
    pub id: RunnerId,
    pub entity: &'a EntityRef,
    pub verb: Verb,
    pub cascade_delete: bool,
    pub depth: u16,
}

/// Executes one queued runner to completion.
pub(crate) fn run(
    engine: &Engine,
    ctx: &mut TxContext,
    store: &mut dyn Substrate,
    id: RunnerId,
) -> Result<(), EngineError> {
    ctx.note_execution()?;
    let (entity, verb, cascade_delete, user_submitted, depth, mut current, prior) = {
        let runner = ctx.runner_mut(id);
        if runner.state != RunnerState::Queued {
            return Err(EngineError::InternalCorruption(
                "runner dispatched in a non-queued state",
            ));
        }
        runner.state = RunnerState::Running;
        let placeholder = EntitySnapshot::new(runner.entity.clone());
        (
            runner.entity.clone(),
            runner.verb,
            runner.cascade_delete,
            runner.user_submitted,
            runner.depth,
            core::mem::replace(&mut runner.current, placeholder),
            runner.prior.take(),
        )
    };
    let catalog = engine.catalog(entity.ty)?;
    debug!(entity = %entity, verb = %verb, runner = %id, depth, "runner dispatched");

    let frame = Frame {
        catalog: &catalog,
        id,
        entity: &entity,
        verb,
        cascade_delete,
        depth,
    };
    let result = run_phases(engine, ctx, store, &frame, &mut current, prior.as_ref());

    // The working snapshots go back whatever happened; an aborted runner's
    // final state must still be observable through the latest-runner map.
    let completed = result.is_ok();
    let runner = ctx.runner_mut(id);
    runner.current = current;
    runner.prior = prior;
    runner.phase = PhaseMarker::Finished;
    if !completed {
        return result;
    }
    runner.state = RunnerState::Completed;
    ctx.record_summary(entity.clone(), verb);
    if verb == Verb::Delete {
        ctx.mark_deleted(entity);
    } else if !user_submitted {
        // Write-back hook for forward-chained results; the substrate persists
        // caller-submitted entities through its normal path.
        store.persist(&ctx.runner(id).current)?;
    }
    Ok(())
}

/// Reads an entity's live state as the engine sees it mid-transaction.
///
/// A completed runner owns the entity's working copy for the rest of the
/// transaction — the store may lag behind it for caller-submitted writes the
/// substrate has not flushed yet. A running runner publishes its working copy
/// when it enters the cascade phase (the only phase that chains nested
/// reads), so chained children observe its recomputed formulas rather than
/// the stored pre-change state. Entities without such a runner read from the
/// store. `None` for entities already deleted this transaction.
pub(crate) fn live_view(
    ctx: &TxContext,
    store: &dyn Substrate,
    entity: &EntityRef,
) -> Option<EntitySnapshot> {
    if ctx.is_deleted(entity) {
        return None;
    }
    if let Some(id) = ctx.latest_runner(entity) {
        let runner = ctx.runner(id);
        let published = match runner.state() {
            RunnerState::Completed => true,
            RunnerState::Running => runner.phase() == PhaseMarker::Cascade,
            RunnerState::Queued => false,
        };
        if published {
            return Some(runner.current().clone());
        }
    }
    store.snapshot(entity)
}

/// Forward-chains a runner as a side effect of another runner's execution.
///
/// A still-queued runner for the same entity absorbs the chained work and
/// executes at its own queue position (verb escalation, newest working copy);
/// otherwise the chained runner executes immediately as a nested call.
pub(crate) fn chain(
    engine: &Engine,
    ctx: &mut TxContext,
    store: &mut dyn Substrate,
    spec: RunnerSpec,
) -> Result<(), EngineError> {
    if let Some(id) = ctx.latest_runner(&spec.entity) {
        if ctx.runner(id).state() == RunnerState::Queued {
            ctx.enqueue(spec)?;
            return Ok(());
        }
    }
    let id = ctx.create_runner(spec)?;
    run(engine, ctx, store, id)
}

fn run_phases(
    engine: &Engine,
    ctx: &mut TxContext,
    store: &mut dyn Substrate,
    frame: &Frame<'_>,
    current: &mut EntitySnapshot,
    prior: Option<&EntitySnapshot>,
) -> Result<(), EngineError> {
    enter_phase(engine, ctx, frame, PhaseMarker::EarlyActions);
    if frame.verb == Verb::Insert {
        apply_defaults(engine, frame, current);
    }
    run_actions(engine, ctx, frame, current, prior, RuleKind::EarlyAction);

    enter_phase(engine, ctx, frame, PhaseMarker::Logic);
    refresh_parent_copies(engine, ctx, store, frame, current)?;
    run_formulas(engine, frame, current, prior);

    enter_phase(engine, ctx, frame, PhaseMarker::Constraints);
    if let Err(failure) = check_constraints(
        engine,
        frame.entity,
        frame.verb,
        current,
        prior,
        &frame.catalog.constraints,
        RuleKind::Constraint,
    ) {
        warn!(
            entity = %frame.entity,
            violations = failure.violations.len(),
            "constraints failed, registering abort guard"
        );
        store.register_abort_guard(&failure);
        return Err(failure.into());
    }

    enter_phase(engine, ctx, frame, PhaseMarker::Actions);
    run_actions(engine, ctx, frame, current, prior, RuleKind::Action);

    // Chained runners resolve this entity through the latest-runner map
    // while this call is still on the stack; publish the working copy
    // before anything can chain.
    ctx.runner_mut(frame.id).current = current.clone();

    enter_phase(engine, ctx, frame, PhaseMarker::Cascade);
    if frame.verb == Verb::Update {
        cascade::cascade_to_children(engine, ctx, store, frame, current, prior)?;
    }
    adjust::adjust_parents(engine, ctx, store, frame, current, prior)
}

fn enter_phase(engine: &Engine, ctx: &mut TxContext, frame: &Frame<'_>, phase: PhaseMarker) {
    ctx.runner_mut(frame.id).phase = phase;
    trace!(entity = %frame.entity, phase = ?phase, "phase entered");
    engine.observe_phase(frame.entity, frame.verb, phase);
}

/// Insert only: seeds every aggregate-result attribute of this type that is
/// still `Null` with its kind's zero value. Min/max results stay `Null` — the
/// sentinel for "no observations yet".
fn apply_defaults(engine: &Engine, frame: &Frame<'_>, current: &mut EntitySnapshot) {
    for spec in engine.aggregate_defaults(frame.entity.ty) {
        if spec.kind.keeps_null_sentinel() {
            continue;
        }
        if current.get(spec.attribute).is_null() {
            current.set_attr(spec.attribute, Value::zero(spec.value_kind));
        }
    }
}

fn run_actions(
    engine: &Engine,
    ctx: &mut TxContext,
    frame: &Frame<'_>,
    current: &mut EntitySnapshot,
    prior: Option<&EntitySnapshot>,
    kind: RuleKind,
) {
    let rules = if kind == RuleKind::EarlyAction {
        &frame.catalog.early_actions
    } else {
        &frame.catalog.actions
    };
    for rule in rules {
        // Inserts always fire: a freshly computed identity cannot collide
        // with an earlier firing for a different logical instance.
        let first = ctx.record_fired(frame.entity, rule.name);
        if !first && frame.verb != Verb::Insert {
            trace!(entity = %frame.entity, rule = rule.name, "action already fired, skipped");
            continue;
        }
        engine.observe_before(frame.entity, rule.name, kind);
        (rule.body)(current, prior, frame.verb);
        engine.stats_registry().record_ran(rule.name);
        engine.observe_after(&RuleObservation {
            entity: frame.entity.clone(),
            rule: rule.name,
            kind,
            attribute: None,
            old: None,
            new: None,
            recomputed: false,
        });
    }
}

/// Head of the formulas phase: refreshes every attribute defined as a copy of
/// a parent attribute. An unset role copies as `Null`.
fn refresh_parent_copies(
    engine: &Engine,
    ctx: &TxContext,
    store: &mut dyn Substrate,
    frame: &Frame<'_>,
    current: &mut EntitySnapshot,
) -> Result<(), EngineError> {
    for rule in &frame.catalog.parent_copies {
        engine.observe_before(frame.entity, rule.name, RuleKind::ParentCopy);
        let old = current.get(rule.child_attribute);
        let new = match current.to_one(rule.role) {
            // A parent deleted earlier in this transaction severs the link:
            // the copy reads as unset, not as a missing entity.
            Some(parent) if ctx.is_deleted(parent) => Value::Null,
            Some(parent) => live_view(ctx, store, parent)
                .ok_or_else(|| EngineError::MissingEntity(parent.clone()))?
                .get(rule.parent_attribute),
            None => Value::Null,
        };
        let recomputed = new != old;
        if recomputed {
            current.set_attr(rule.child_attribute, new.clone());
        }
        let stats = engine.stats_registry();
        stats.record_ran(rule.name);
        if recomputed {
            stats.record_recomputed(rule.name);
        }
        engine.observe_after(&RuleObservation {
            entity: frame.entity.clone(),
            rule: rule.name,
            kind: RuleKind::ParentCopy,
            attribute: Some(rule.child_attribute),
            old: Some(old),
            new: Some(new),
            recomputed,
        });
    }
    Ok(())
}

/// Formulas in the externally supplied dependency order. Each body decides
/// internally whether it actually recomputes; "ran" and "recomputed" are
/// distinct observations.
fn run_formulas(
    engine: &Engine,
    frame: &Frame<'_>,
    current: &mut EntitySnapshot,
    prior: Option<&EntitySnapshot>,
) {
    for rule in &frame.catalog.formulas {
        engine.observe_before(frame.entity, rule.name, RuleKind::Formula);
        let old = rule.attribute.map(|a| current.get(a));
        let recomputed = (rule.body)(current, prior);
        let new = rule.attribute.map(|a| current.get(a));
        let stats = engine.stats_registry();
        stats.record_ran(rule.name);
        if recomputed {
            stats.record_recomputed(rule.name);
        }
        engine.observe_after(&RuleObservation {
            entity: frame.entity.clone(),
            rule: rule.name,
            kind: RuleKind::Formula,
            attribute: rule.attribute,
            old,
            new,
            recomputed,
        });
    }
}

/// Runs every constraint applicable to `verb`, collecting all violations
/// into one failure tagged with the entity. Shared by the per-runner
/// Constraints phase and the commit-scoped pass.
pub(crate) fn check_constraints(
    engine: &Engine,
    entity: &EntityRef,
    verb: Verb,
    current: &EntitySnapshot,
    prior: Option<&EntitySnapshot>,
    rules: &[ConstraintRule],
    kind: RuleKind,
) -> Result<(), ConstraintFailure> {
    let mut violations = Vec::new();
    for rule in rules {
        if !rule.verbs.contains(verb) {
            continue;
        }
        engine.observe_before(entity, rule.name, kind);
        let outcome = (rule.body)(current, prior, verb);
        engine.stats_registry().record_ran(rule.name);
        if let Err(violation) = outcome {
            engine.stats_registry().record_failed(rule.name);
            violations.push(violation);
        }
        engine.observe_after(&RuleObservation {
            entity: entity.clone(),
            rule: rule.name,
            kind,
            attribute: None,
            old: None,
            new: None,
            recomputed: false,
        });
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConstraintFailure::new(entity.clone(), violations))
    }
}
