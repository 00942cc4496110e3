// SPDX-License-Identifier: Apache-2.0
//! Change verbs and verb sets.

/// Nature of a change to a persistent entity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Verb {
    /// The entity was created.
    Insert,
    /// One or more attributes or roles changed.
    Update,
    /// The entity was removed.
    Delete,
}

impl Verb {
    const fn bit(self) -> u8 {
        match self {
            Self::Insert => 1,
            Self::Update => 2,
            Self::Delete => 4,
        }
    }

    /// Verb escalation for merged runners: a queued runner absorbs a second
    /// event for the same entity. Delete dominates; Insert absorbs Update
    /// (the insert pipeline already recomputes everything).
    #[must_use]
    pub const fn escalate(self, other: Self) -> Self {
        match (self, other) {
            (Self::Delete, _) | (_, Self::Delete) => Self::Delete,
            (Self::Insert, _) | (_, Self::Insert) => Self::Insert,
            (Self::Update, Self::Update) => Self::Update,
        }
    }
}

impl core::fmt::Display for Verb {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Set of verbs a rule applies to, packed as a bitmask.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct VerbSet(u8);

impl VerbSet {
    /// All three verbs.
    pub const ALL: Self = Self(1 | 2 | 4);
    /// Insert and update (the common constraint shape).
    pub const WRITES: Self = Self(1 | 2);
    /// The empty set.
    pub const NONE: Self = Self(0);

    /// Builds a set from a slice of verbs.
    #[must_use]
    pub const fn of(verbs: &[Verb]) -> Self {
        let mut bits = 0u8;
        let mut i = 0;
        while i < verbs.len() {
            bits |= verbs[i].bit();
            i += 1;
        }
        Self(bits)
    }

    /// Returns `true` when the set contains `verb`.
    #[must_use]
    pub const fn contains(self, verb: Verb) -> bool {
        self.0 & verb.bit() != 0
    }
}
