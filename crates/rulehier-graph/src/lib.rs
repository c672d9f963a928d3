//! In-memory knowledge graph store for rule mining.
//!
//! The miner never talks to a concrete database. It sees two seams:
//!
//! 1. [`GraphStore`]: something that can open a scoped read transaction.
//! 2. [`GraphTxn`]: the transaction itself, answering entity-name lookups and
//!    grounding a rule body into `(start, end)` endpoint pairs.
//!
//! [`TripleGraph`] is the in-memory implementation used by the CLI and the
//! tests. It follows the layout of a columnar edge store:
//!
//! - **String Interning**: entity and predicate names stored once, referenced by `StrId`
//! - **Adjacency Indexes**: `(entity, predicate) -> RoaringBitmap` in both directions
//! - **Predicate Index**: `predicate -> source entities`, used to seed walks
//!
//! Once built, a graph is read-only; workers hold one read transaction each
//! for a whole specialization pass.

pub mod grounding;
pub mod io;
pub mod pair;
pub mod store;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

pub use grounding::{CountedSet, Direction, GroundingMode, PathStep};
pub use pair::Pair;
pub use store::{GraphReadTxn, GraphStore, GraphTxn, TripleGraph};

/// Entity identifier inside a graph.
pub type EntityId = u32;

// ============================================================================
// String Interning
// ============================================================================

/// Interned string ID (4 bytes instead of 24+ for String)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StrId(u32);

impl StrId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// String interner: maps strings to compact IDs
pub struct StringInterner {
    str_to_id: DashMap<String, StrId>,
    id_to_str: DashMap<StrId, String>,
    next_id: AtomicU32,
}

impl StringInterner {
    pub fn new() -> Self {
        Self {
            str_to_id: DashMap::new(),
            id_to_str: DashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    /// Intern a string, returning its ID.
    ///
    /// Concurrent callers interning the same string observe the same ID.
    pub fn intern(&self, s: &str) -> StrId {
        if let Some(id) = self.str_to_id.get(s) {
            return *id;
        }

        let id = *self
            .str_to_id
            .entry(s.to_string())
            .or_insert_with(|| StrId(self.next_id.fetch_add(1, Ordering::SeqCst)));
        self.id_to_str.entry(id).or_insert_with(|| s.to_string());
        id
    }

    /// Look up an existing ID for a string without inserting.
    pub fn id_of(&self, s: &str) -> Option<StrId> {
        self.str_to_id.get(s).map(|id| *id)
    }

    /// Look up string by ID
    pub fn lookup(&self, id: StrId) -> Option<String> {
        self.id_to_str.get(&id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.str_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.str_to_id.is_empty()
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}
