// SPDX-License-Identifier: Apache-2.0
//! ripple-core: incremental rule-evaluation engine over a persistent object
//! graph.
//!
//! The engine reacts to entity change events (insert/update/delete) by
//! running a per-entity phase pipeline — defaults, early actions, parent
//! copies and formulas, constraints, actions, cascade to children, aggregate
//! adjustment of parents — and forward-chains the consequences until the
//! transaction reaches a fixpoint. Constraint failures abort the transaction
//! through a two-layer defense: a typed error and a deferred abort guard
//! registered with the persistence substrate.
//!
//! Within one transaction execution is strictly single-threaded; concurrency
//! exists only across transactions, which share nothing mutable but the rule
//! catalogs (read-only once sealed), the listener registry, and the rule
//! statistics.

mod adjust;
mod cascade;
mod catalog;
mod driver;
mod engine;
mod error;
mod event;
mod ident;
mod listener;
mod pipeline;
mod rule;
mod runner;
mod snapshot;
mod stats;
mod store;
mod substrate;
mod txctx;
mod value;
mod verb;

// Re-exports for stable public API
/// Rule catalogs: per-type rule lists, role declarations, and the sealed
/// process-wide registry.
pub use catalog::{AggregateDefault, CatalogRegistry, ChildRole, ParentRole, RuleCatalog};
/// The engine facade.
pub use engine::Engine;
/// Error taxonomy.
pub use error::{ConstraintFailure, EngineError, Violation};
/// Change events and per-transaction summaries.
pub use event::{ChangeEvent, ChangeSummary};
/// Entity identity.
pub use ident::{EntityKey, EntityRef, EntityType};
/// Lifecycle listeners.
pub use listener::{EngineListener, RuleObservation};
/// Rule descriptors and bodies.
pub use rule::{
    ActionFn, ActionRule, AggregateKind, AggregateRule, ConstraintFn, ConstraintRule, FormulaFn,
    FormulaRule, ParentCopyRule, RuleKind,
};
/// The computation unit and its lifecycle markers.
pub use runner::{Cause, PhaseMarker, Runner, RunnerId, RunnerState};
/// Entity snapshots (live working copies and frozen priors).
pub use snapshot::EntitySnapshot;
/// Rule-execution statistics.
pub use stats::RuleCounters;
/// In-memory substrate for tests and embedding without real storage.
pub use store::{MemStore, RolePair};
/// The persistence-substrate seam.
pub use substrate::Substrate;
/// Per-transaction state.
pub use txctx::TxContext;
/// Typed attribute values.
pub use value::{Value, ValueKind};
/// Change verbs.
pub use verb::{Verb, VerbSet};
