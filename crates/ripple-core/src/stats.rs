// SPDX-License-Identifier: Apache-2.0
//! Rule-execution statistics.
//!
//! The registry is shared by every transaction the engine drives, so it is
//! the one place (with the listener list) that crosses threads: a read lock
//! on the cell map, atomics inside the cells.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Counters observed for one rule.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RuleCounters {
    /// Times the rule executed.
    pub ran: u64,
    /// Times a formula reported it actually recomputed ("ran" and
    /// "recomputed" are distinct observations).
    pub recomputed: u64,
    /// Times a constraint reported a violation.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct CounterCell {
    ran: AtomicU64,
    recomputed: AtomicU64,
    failed: AtomicU64,
}

/// Concurrent per-rule counter registry.
#[derive(Debug, Default)]
pub(crate) struct StatsRegistry {
    cells: RwLock<FxHashMap<&'static str, Arc<CounterCell>>>,
}

impl StatsRegistry {
    fn cell(&self, rule: &'static str) -> Arc<CounterCell> {
        if let Some(cell) = self.cells.read().get(rule) {
            return Arc::clone(cell);
        }
        Arc::clone(self.cells.write().entry(rule).or_default())
    }

    pub(crate) fn record_ran(&self, rule: &'static str) {
        self.cell(rule).ran.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recomputed(&self, rule: &'static str) {
        self.cell(rule).recomputed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self, rule: &'static str) {
        self.cell(rule).failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter, in rule-name order.
    pub(crate) fn snapshot(&self) -> BTreeMap<&'static str, RuleCounters> {
        self.cells
            .read()
            .iter()
            .map(|(rule, cell)| {
                (
                    *rule,
                    RuleCounters {
                        ran: cell.ran.load(Ordering::Relaxed),
                        recomputed: cell.recomputed.load(Ordering::Relaxed),
                        failed: cell.failed.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }
}
