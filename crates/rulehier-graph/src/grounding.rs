//! Body grounding: turning a relational path into `(start, end)` endpoint pairs.

use crate::Pair;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::hash::Hash;

/// Which way an edge is traversed when following a path step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// `current -[predicate]-> next`
    Outgoing,
    /// `next -[predicate]-> current`
    Incoming,
}

/// One hop of a rule body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep<'a> {
    pub predicate: &'a str,
    pub direction: Direction,
}

impl<'a> PathStep<'a> {
    pub fn new(predicate: &'a str, direction: Direction) -> Self {
        Self {
            predicate,
            direction,
        }
    }
}

/// Why a body is being grounded.
///
/// Learning keeps walks that return to their start entity (a rule may still
/// be scored on them); application drops them because a self-loop is never a
/// useful prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundingMode {
    Learn,
    Apply,
}

/// A multiset: distinct elements plus how many times each was inserted.
#[derive(Debug, Clone)]
pub struct CountedSet<T: Hash + Eq> {
    counts: AHashMap<T, usize>,
}

impl<T: Hash + Eq> CountedSet<T> {
    pub fn new() -> Self {
        Self {
            counts: AHashMap::new(),
        }
    }

    pub fn insert(&mut self, value: T) {
        *self.counts.entry(value).or_insert(0) += 1;
    }

    /// Number of times `value` was inserted.
    pub fn count(&self, value: &T) -> usize {
        self.counts.get(value).copied().unwrap_or(0)
    }

    pub fn contains(&self, value: &T) -> bool {
        self.counts.contains_key(value)
    }

    /// Number of distinct elements.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total number of insertions.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Distinct elements, in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.counts.keys()
    }
}

impl<T: Hash + Eq> Default for CountedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Hash + Eq> FromIterator<T> for CountedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut out = Self::new();
        for value in iter {
            out.insert(value);
        }
        out
    }
}

/// Keep only the endpoints a grounding mode allows.
pub(crate) fn admit(mode: GroundingMode, pair: Pair) -> bool {
    match mode {
        GroundingMode::Learn => true,
        GroundingMode::Apply => !pair.is_self_loop(),
    }
}
