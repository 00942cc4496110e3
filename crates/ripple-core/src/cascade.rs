// SPDX-License-Identifier: Apache-2.0
//! Cascade-to-children: forward-chaining to child entities when a parent
//! attribute they depend on changes (or on a delete-cascade signal).

use tracing::{error, trace};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::pipeline::{self, Frame};
use crate::runner::{Cause, RunnerState};
use crate::snapshot::EntitySnapshot;
use crate::substrate::Substrate;
use crate::txctx::{RunnerSpec, TxContext};
use crate::verb::Verb;

/// Update-verb phase: for every to-many child role whose watched-attribute
/// set is non-empty, compare prior vs current values of each watched parent
/// attribute; when any differ (or the runner carries the delete-cascade
/// flag), forward-chain an update runner to every live child, tagged with the
/// traversed role.
///
/// Before chaining, the child's own back-reference role must resolve to this
/// parent. A mismatch means the graph cannot be safely reasoned about and is
/// fatal, never a soft failure.
pub(crate) fn cascade_to_children(
    engine: &Engine,
    ctx: &mut TxContext,
    store: &mut dyn Substrate,
    frame: &Frame<'_>,
    current: &EntitySnapshot,
    prior: Option<&EntitySnapshot>,
) -> Result<(), EngineError> {
    for child_role in &frame.catalog.child_roles {
        if child_role.watched.is_empty() {
            continue;
        }
        let triggered = frame.cascade_delete
            || child_role
                .watched
                .iter()
                .any(|attr| prior.is_none_or(|p| p.get(attr) != current.get(attr)));
        if !triggered {
            continue;
        }
        trace!(entity = %frame.entity, role = child_role.role, "cascading to children");
        for child in store.children(frame.entity, child_role.role) {
            if ctx.is_deleted(&child) {
                continue;
            }
            // A child whose runner is mid-flight is already reacting further
            // up this call stack; the latest-runner map dedups the cascade.
            if let Some(id) = ctx.latest_runner(&child) {
                if ctx.runner(id).state() == RunnerState::Running {
                    continue;
                }
            }
            let Some(snapshot) = pipeline::live_view(ctx, store, &child) else {
                return Err(EngineError::MissingEntity(child));
            };
            if snapshot.to_one(child_role.inverse) != Some(frame.entity) {
                error!(
                    child = %child,
                    role = child_role.inverse,
                    parent = %frame.entity,
                    "child back-reference does not resolve to the traversed parent"
                );
                return Err(EngineError::ReferentialIntegrity {
                    child,
                    role: child_role.inverse,
                    parent: frame.entity.clone(),
                });
            }
            let prior_copy = snapshot.duplicate();
            pipeline::chain(
                engine,
                ctx,
                store,
                RunnerSpec {
                    entity: child,
                    verb: Verb::Update,
                    cascade_delete: frame.cascade_delete,
                    user_submitted: false,
                    current: snapshot,
                    prior: Some(prior_copy),
                    cause: Some(Cause {
                        parent: frame.id,
                        role: child_role.role,
                    }),
                    depth: frame.depth.saturating_add(1),
                },
            )?;
        }
    }
    Ok(())
}
