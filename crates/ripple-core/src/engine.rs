// SPDX-License-Identifier: Apache-2.0
//! Engine facade.
//!
//! The engine owns the sealed rule catalogs plus the two cross-transaction
//! registries (listeners, statistics). It is cheap to share behind an `Arc`;
//! each transaction gets its own [`TxContext`] and substrate handle, so
//! transactions on different threads never contend except on those
//! registries.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::catalog::{AggregateDefault, CatalogRegistry, RuleCatalog};
use crate::driver;
use crate::error::EngineError;
use crate::event::{ChangeEvent, ChangeSummary};
use crate::ident::{EntityRef, EntityType};
use crate::listener::{EngineListener, ListenerRegistry, RuleObservation};
use crate::rule::RuleKind;
use crate::runner::{PhaseMarker, RunnerId};
use crate::stats::{RuleCounters, StatsRegistry};
use crate::substrate::Substrate;
use crate::txctx::{RunnerSpec, TxContext};
use crate::verb::Verb;

/// The incremental rule-evaluation engine.
pub struct Engine {
    catalogs: CatalogRegistry,
    listeners: ListenerRegistry,
    stats: StatsRegistry,
}

impl Engine {
    /// Builds an engine from a catalog registry, sealing it.
    ///
    /// # Errors
    /// Returns catalog validation errors from [`CatalogRegistry::seal`].
    pub fn new(mut catalogs: CatalogRegistry) -> Result<Self, EngineError> {
        catalogs.seal()?;
        Ok(Self {
            catalogs,
            listeners: ListenerRegistry::default(),
            stats: StatsRegistry::default(),
        })
    }

    /// Begins a new transaction context.
    #[must_use]
    pub fn begin(&self) -> TxContext {
        TxContext::new()
    }

    /// Submits one substrate-level write ("onChange").
    ///
    /// Submission is a pure enqueue — no rule executes until
    /// [`Engine::before_commit`] drains the queue. Called once per write,
    /// during a sub-phase that must not itself trigger rule execution.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownCatalog`] when no catalog covers the
    /// entity type, or [`EngineError::DuplicateQueuedRunner`] when the caller
    /// already submitted an event for the same entity that is still queued.
    pub fn submit(
        &self,
        ctx: &mut TxContext,
        event: ChangeEvent,
    ) -> Result<RunnerId, EngineError> {
        self.catalogs.get(event.entity.ty)?;
        debug!(entity = %event.entity, verb = %event.verb, "change event submitted");
        ctx.enqueue(RunnerSpec {
            entity: event.entity,
            verb: event.verb,
            cascade_delete: event.cascade_delete,
            user_submitted: true,
            current: event.current,
            prior: event.prior,
            cause: None,
            depth: 0,
        })
    }

    /// Runs the transaction driver: drains the queue to fixpoint, then runs
    /// commit-scoped actions and constraints once per touched entity.
    ///
    /// The substrate invokes this immediately before making the transaction
    /// durable.
    ///
    /// # Errors
    /// Propagates constraint failures (which also register an abort guard
    /// with the substrate), referential-integrity errors, and system errors
    /// such as [`EngineError::FixpointCeiling`].
    pub fn before_commit(
        &self,
        ctx: &mut TxContext,
        store: &mut dyn Substrate,
    ) -> Result<(), EngineError> {
        driver::drain(self, ctx, store)
    }

    /// Registers a lifecycle listener.
    pub fn register_listener(&self, listener: Arc<dyn EngineListener>) {
        self.listeners.register(listener);
    }

    /// Point-in-time copy of the rule-execution statistics.
    #[must_use]
    pub fn stats(&self) -> BTreeMap<&'static str, RuleCounters> {
        self.stats.snapshot()
    }

    pub(crate) fn catalog(&self, ty: EntityType) -> Result<Arc<RuleCatalog>, EngineError> {
        self.catalogs.get(ty)
    }

    pub(crate) fn aggregate_defaults(&self, ty: EntityType) -> &[AggregateDefault] {
        self.catalogs.aggregate_defaults(ty)
    }

    pub(crate) fn stats_registry(&self) -> &StatsRegistry {
        &self.stats
    }

    pub(crate) fn observe_phase(&self, entity: &EntityRef, verb: Verb, phase: PhaseMarker) {
        self.listeners
            .notify(|l| l.phase_started(entity, verb, phase));
    }

    pub(crate) fn observe_before(&self, entity: &EntityRef, rule: &'static str, kind: RuleKind) {
        self.listeners.notify(|l| l.before_rule(entity, rule, kind));
    }

    pub(crate) fn observe_after(&self, observation: &RuleObservation) {
        self.listeners.notify(|l| l.after_rule(observation));
    }

    pub(crate) fn notify_summary(&self, summary: &ChangeSummary) {
        self.listeners.notify(|l| l.transaction_summary(summary));
    }
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("catalogs", &self.catalogs)
            .finish_non_exhaustive()
    }
}
