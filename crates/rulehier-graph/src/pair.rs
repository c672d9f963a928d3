//! Ordered entity pairs.

use crate::EntityId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered `(subject, object)` edge instance.
///
/// Used both as a grounding endpoint pair and as a prediction key; equality
/// and hashing only look at the two ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    pub sub: EntityId,
    pub obj: EntityId,
}

impl Pair {
    pub const fn new(sub: EntityId, obj: EntityId) -> Self {
        Self { sub, obj }
    }

    /// The same pair with subject and object swapped.
    pub const fn reversed(self) -> Self {
        Self {
            sub: self.obj,
            obj: self.sub,
        }
    }

    pub const fn is_self_loop(self) -> bool {
        self.sub == self.obj
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.sub, self.obj)
    }
}

impl From<(EntityId, EntityId)> for Pair {
    fn from((sub, obj): (EntityId, EntityId)) -> Self {
        Self { sub, obj }
    }
}
