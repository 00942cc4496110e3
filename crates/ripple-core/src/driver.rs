// SPDX-License-Identifier: Apache-2.0
//! Transaction driver: drains the queue to fixpoint, then runs commit-scoped
//! rules once per touched entity against its final state.

use tracing::{debug, error, trace, warn};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::listener::RuleObservation;
use crate::pipeline;
use crate::rule::RuleKind;
use crate::runner::{RunnerId, RunnerState};
use crate::snapshot::EntitySnapshot;
use crate::substrate::Substrate;
use crate::txctx::TxContext;
use crate::verb::Verb;

/// Ceiling on drain rounds. Exceeding it almost certainly means a rule cycle
/// that never reaches a fixpoint; fatal, never retried.
pub(crate) const MAX_DRAIN_ROUNDS: u32 = 10_000;

/// Runs the full transaction: FIFO rounds over the queue, flush refills,
/// then the commit-scoped pass and the listener summary.
pub(crate) fn drain(
    engine: &Engine,
    ctx: &mut TxContext,
    store: &mut dyn Substrate,
) -> Result<(), EngineError> {
    let mut rounds: u32 = 0;
    while !ctx.queue_is_empty() {
        rounds = rounds.saturating_add(1);
        if rounds > MAX_DRAIN_ROUNDS {
            error!(rounds, "drain loop exceeded its iteration ceiling");
            return Err(EngineError::FixpointCeiling(MAX_DRAIN_ROUNDS));
        }
        trace!(round = rounds, "drain round started");
        for id in ctx.take_round() {
            pipeline::run(engine, ctx, store, id)?;
        }
        // The substrate's flush may perform writes of its own (its delete
        // cascades), which re-populate the queue for the next round.
        for event in store.flush()? {
            engine.submit(ctx, event)?;
        }
    }
    debug!(rounds, "fixpoint reached");
    commit_scoped(engine, ctx, store)?;
    engine.notify_summary(ctx.summary());
    Ok(())
}

/// Commit-scoped actions, then commit-scoped constraints, each exactly once
/// per touched entity via the latest-runner map. No further cascading.
fn commit_scoped(
    engine: &Engine,
    ctx: &mut TxContext,
    store: &mut dyn Substrate,
) -> Result<(), EngineError> {
    let ids = ctx.latest_runners();
    for &id in &ids {
        if ctx.runner(id).state() != RunnerState::Completed {
            continue;
        }
        run_commit_actions(engine, ctx, store, id)?;
    }

    // Every failing entity registers its own abort guard; the first failure
    // is the one reported.
    let mut first: Option<EngineError> = None;
    for &id in &ids {
        let runner = ctx.runner(id);
        if runner.state() != RunnerState::Completed {
            continue;
        }
        let catalog = engine.catalog(runner.entity().ty)?;
        if catalog.commit_constraints.is_empty() {
            continue;
        }
        let outcome = pipeline::check_constraints(
            engine,
            runner.entity(),
            runner.verb(),
            runner.current(),
            runner.prior(),
            &catalog.commit_constraints,
            RuleKind::CommitConstraint,
        );
        if let Err(failure) = outcome {
            warn!(entity = %failure.entity, "commit constraints failed");
            store.register_abort_guard(&failure);
            if first.is_none() {
                first = Some(failure.into());
            }
        }
    }
    first.map_or(Ok(()), Err)
}

fn run_commit_actions(
    engine: &Engine,
    ctx: &mut TxContext,
    store: &mut dyn Substrate,
    id: RunnerId,
) -> Result<(), EngineError> {
    let catalog = engine.catalog(ctx.runner(id).entity().ty)?;
    if catalog.commit_actions.is_empty() {
        return Ok(());
    }
    let (entity, verb, user_submitted, mut current, prior) = {
        let runner = ctx.runner_mut(id);
        let placeholder = EntitySnapshot::new(runner.entity.clone());
        (
            runner.entity.clone(),
            runner.verb,
            runner.user_submitted,
            core::mem::replace(&mut runner.current, placeholder),
            runner.prior.take(),
        )
    };
    for rule in &catalog.commit_actions {
        engine.observe_before(&entity, rule.name, RuleKind::CommitAction);
        (rule.body)(&mut current, prior.as_ref(), verb);
        engine.stats_registry().record_ran(rule.name);
        engine.observe_after(&RuleObservation {
            entity: entity.clone(),
            rule: rule.name,
            kind: RuleKind::CommitAction,
            attribute: None,
            old: None,
            new: None,
            recomputed: false,
        });
    }
    let runner = ctx.runner_mut(id);
    runner.current = current;
    runner.prior = prior;
    if !user_submitted && verb != Verb::Delete {
        store.persist(&ctx.runner(id).current)?;
    }
    Ok(())
}
