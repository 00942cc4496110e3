// SPDX-License-Identifier: Apache-2.0
//! Lifecycle listeners.
//!
//! Listeners observe phase transitions, per-rule before/after notifications
//! with old and new values, and the per-transaction change summary at
//! commit. Delivery is best-effort and synchronous on the transaction's
//! thread; listener registration is synchronized, reads are concurrent.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::event::ChangeSummary;
use crate::ident::EntityRef;
use crate::rule::RuleKind;
use crate::runner::PhaseMarker;
use crate::value::Value;
use crate::verb::Verb;

/// One rule execution as observed by listeners.
#[derive(Clone, Debug)]
pub struct RuleObservation {
    /// Entity the rule ran against.
    pub entity: EntityRef,
    /// Rule name.
    pub rule: &'static str,
    /// Rule kind.
    pub kind: RuleKind,
    /// Attribute the rule maintains, when it maintains exactly one.
    pub attribute: Option<&'static str>,
    /// Value of that attribute before the rule ran.
    pub old: Option<Value>,
    /// Value of that attribute after the rule ran.
    pub new: Option<Value>,
    /// For formulas: whether the body reported an actual recomputation.
    pub recomputed: bool,
}

/// Observer of engine lifecycle events. All methods default to no-ops.
///
/// Implementations must be `Send + Sync`: one listener list serves every
/// concurrently running transaction.
pub trait EngineListener: Send + Sync {
    /// A runner entered a phase.
    fn phase_started(&self, entity: &EntityRef, verb: Verb, phase: PhaseMarker) {
        let _ = (entity, verb, phase);
    }

    /// A rule is about to run.
    fn before_rule(&self, entity: &EntityRef, rule: &'static str, kind: RuleKind) {
        let _ = (entity, rule, kind);
    }

    /// A rule ran.
    fn after_rule(&self, observation: &RuleObservation) {
        let _ = observation;
    }

    /// A transaction's drain loop completed; `summary` holds the latest verb
    /// per touched identity.
    fn transaction_summary(&self, summary: &ChangeSummary) {
        let _ = summary;
    }
}

/// Registry of listeners, shared by all transactions of one engine.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: RwLock<Vec<Arc<dyn EngineListener>>>,
}

impl ListenerRegistry {
    pub(crate) fn register(&self, listener: Arc<dyn EngineListener>) {
        self.listeners.write().push(listener);
    }

    pub(crate) fn notify(&self, f: impl Fn(&dyn EngineListener)) {
        for listener in self.listeners.read().iter() {
            f(listener.as_ref());
        }
    }
}

impl core::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("len", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl EngineListener for Counting {
        fn phase_started(&self, _entity: &EntityRef, _verb: Verb, _phase: PhaseMarker) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn notify_reaches_every_listener() {
        use crate::ident::EntityType;

        let registry = ListenerRegistry::default();
        let a = Arc::new(Counting(AtomicUsize::new(0)));
        let b = Arc::new(Counting(AtomicUsize::new(0)));
        registry.register(a.clone());
        registry.register(b.clone());

        let entity = EntityRef::new(EntityType("Order"), 1);
        registry.notify(|l| l.phase_started(&entity, Verb::Insert, PhaseMarker::Logic));
        assert_eq!(a.0.load(Ordering::Relaxed), 1);
        assert_eq!(b.0.load(Ordering::Relaxed), 1);
    }
}
