// SPDX-License-Identifier: Apache-2.0
//! Recording listener: captures phase transitions, rule observations, and
//! commit summaries for assertions.

use parking_lot::Mutex;

use ripple_core::{
    ChangeSummary, EngineListener, EntityRef, PhaseMarker, RuleObservation, Verb,
};

/// Listener that records everything it sees.
#[derive(Debug, Default)]
pub struct RecordingListener {
    phases: Mutex<Vec<(EntityRef, Verb, PhaseMarker)>>,
    rules: Mutex<Vec<RuleObservation>>,
    summaries: Mutex<Vec<ChangeSummary>>,
}

impl RecordingListener {
    /// Number of runners dispatched for `entity` with `verb` (counted by
    /// their first phase transition).
    #[must_use]
    pub fn runner_starts(&self, entity: &EntityRef, verb: Verb) -> usize {
        self.phases
            .lock()
            .iter()
            .filter(|(e, v, p)| e == entity && *v == verb && *p == PhaseMarker::EarlyActions)
            .count()
    }

    /// Phase transitions recorded for one entity, in execution order.
    #[must_use]
    pub fn phases_for(&self, entity: &EntityRef) -> Vec<PhaseMarker> {
        self.phases
            .lock()
            .iter()
            .filter(|(e, _, _)| e == entity)
            .map(|(_, _, p)| *p)
            .collect()
    }

    /// Number of recorded executions of a rule.
    #[must_use]
    pub fn rule_runs(&self, rule: &str) -> usize {
        self.rules.lock().iter().filter(|o| o.rule == rule).count()
    }

    /// Rule observations in execution order, for a single rule.
    #[must_use]
    pub fn observations_for(&self, rule: &str) -> Vec<RuleObservation> {
        self.rules
            .lock()
            .iter()
            .filter(|o| o.rule == rule)
            .cloned()
            .collect()
    }

    /// Commit summaries, one per drained transaction.
    #[must_use]
    pub fn summaries(&self) -> Vec<ChangeSummary> {
        self.summaries.lock().clone()
    }
}

impl EngineListener for RecordingListener {
    fn phase_started(&self, entity: &EntityRef, verb: Verb, phase: PhaseMarker) {
        self.phases.lock().push((entity.clone(), verb, phase));
    }

    fn after_rule(&self, observation: &RuleObservation) {
        self.rules.lock().push(observation.clone());
    }

    fn transaction_summary(&self, summary: &ChangeSummary) {
        self.summaries.lock().push(summary.clone());
    }
}
