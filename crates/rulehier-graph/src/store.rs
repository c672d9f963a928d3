//! Graph store seam and the in-memory triple graph.

use crate::grounding::{admit, CountedSet, Direction, GroundingMode, PathStep};
use crate::{EntityId, Pair, StrId, StringInterner};
use ahash::AHashMap;
use parking_lot::{RwLock, RwLockReadGuard};
use roaring::RoaringBitmap;

/// A graph that can hand out scoped read transactions.
///
/// Each worker opens exactly one transaction for the duration of a search
/// pass; transactions are never nested and never shared across threads.
pub trait GraphStore: Sync {
    type Txn<'a>: GraphTxn
    where
        Self: 'a;

    fn read_txn(&self) -> Self::Txn<'_>;
}

/// Read-only view of a graph for the lifetime of a transaction.
pub trait GraphTxn {
    /// Name of an entity, by internal id.
    fn entity_name(&self, id: EntityId) -> Option<String>;

    /// Internal id of a named entity.
    fn entity_id(&self, name: &str) -> Option<EntityId>;

    /// Ground a body path into its `(start, end)` endpoint pairs.
    ///
    /// `cancel` is polled between start entities; once it returns `true` the
    /// groundings collected so far are returned.
    fn ground_body(
        &self,
        path: &[PathStep<'_>],
        mode: GroundingMode,
        cancel: &dyn Fn() -> bool,
    ) -> CountedSet<Pair>;
}

// ============================================================================
// In-memory triple graph
// ============================================================================

#[derive(Debug, Default)]
struct GraphData {
    /// entity_id -> interned name
    entity_names: Vec<StrId>,
    /// interned name -> entity_id
    entity_index: AHashMap<StrId, EntityId>,
    /// (source, predicate) -> targets
    forward: AHashMap<(EntityId, StrId), RoaringBitmap>,
    /// (target, predicate) -> sources
    backward: AHashMap<(EntityId, StrId), RoaringBitmap>,
    /// predicate -> entities with an outgoing edge of that predicate
    pred_sources: AHashMap<StrId, RoaringBitmap>,
    /// predicate -> entities with an incoming edge of that predicate
    pred_targets: AHashMap<StrId, RoaringBitmap>,
    edge_count: usize,
}

impl GraphData {
    fn entity(&mut self, name: StrId) -> EntityId {
        if let Some(&id) = self.entity_index.get(&name) {
            return id;
        }
        let id = self.entity_names.len() as EntityId;
        self.entity_names.push(name);
        self.entity_index.insert(name, id);
        id
    }

    fn neighbours(&self, entity: EntityId, predicate: StrId, direction: Direction) -> Option<&RoaringBitmap> {
        match direction {
            Direction::Outgoing => self.forward.get(&(entity, predicate)),
            Direction::Incoming => self.backward.get(&(entity, predicate)),
        }
    }

    fn seeds(&self, predicate: StrId, direction: Direction) -> Option<&RoaringBitmap> {
        match direction {
            Direction::Outgoing => self.pred_sources.get(&predicate),
            Direction::Incoming => self.pred_targets.get(&predicate),
        }
    }

    /// Depth-first walk along `steps`.
    ///
    /// Intermediate entities are pairwise distinct and distinct from the
    /// start; the final entity may close the walk back onto the start.
    fn walk(
        &self,
        start: EntityId,
        current: EntityId,
        steps: &[(StrId, Direction)],
        visited: &mut Vec<EntityId>,
        mode: GroundingMode,
        out: &mut CountedSet<Pair>,
    ) {
        let Some((&(predicate, direction), rest)) = steps.split_first() else {
            let pair = Pair::new(start, current);
            if admit(mode, pair) {
                out.insert(pair);
            }
            return;
        };
        let Some(next) = self.neighbours(current, predicate, direction) else {
            return;
        };
        for entity in next.iter() {
            if rest.is_empty() {
                if visited[1..].contains(&entity) {
                    continue;
                }
            } else if visited.contains(&entity) {
                continue;
            }
            visited.push(entity);
            self.walk(start, entity, rest, visited, mode, out);
            visited.pop();
        }
    }
}

/// In-memory knowledge graph of `(subject, predicate, object)` triples.
pub struct TripleGraph {
    interner: StringInterner,
    data: RwLock<GraphData>,
}

impl TripleGraph {
    pub fn new() -> Self {
        Self {
            interner: StringInterner::new(),
            data: RwLock::new(GraphData::default()),
        }
    }

    /// Build a graph from `(subject, predicate, object)` name triples.
    pub fn from_triples<'a, I>(triples: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    {
        let graph = Self::new();
        for (sub, pred, obj) in triples {
            graph.add_triple(sub, pred, obj);
        }
        graph
    }

    /// Register an entity without any edge, returning its id.
    pub fn add_entity(&self, name: &str) -> EntityId {
        let name = self.interner.intern(name);
        self.data.write().entity(name)
    }

    /// Add an edge `sub -[pred]-> obj`, creating entities as needed.
    pub fn add_triple(&self, sub: &str, pred: &str, obj: &str) -> Pair {
        let sub = self.interner.intern(sub);
        let obj = self.interner.intern(obj);
        let pred = self.interner.intern(pred);

        let mut data = self.data.write();
        let sub = data.entity(sub);
        let obj = data.entity(obj);

        let inserted = data
            .forward
            .entry((sub, pred))
            .or_insert_with(RoaringBitmap::new)
            .insert(obj);
        if inserted {
            data.backward
                .entry((obj, pred))
                .or_insert_with(RoaringBitmap::new)
                .insert(sub);
            data.pred_sources
                .entry(pred)
                .or_insert_with(RoaringBitmap::new)
                .insert(sub);
            data.pred_targets
                .entry(pred)
                .or_insert_with(RoaringBitmap::new)
                .insert(obj);
            data.edge_count += 1;
        }
        Pair::new(sub, obj)
    }

    pub fn entity_count(&self) -> usize {
        self.data.read().entity_names.len()
    }

    pub fn edge_count(&self) -> usize {
        self.data.read().edge_count
    }

    /// Number of distinct predicates with at least one edge.
    pub fn predicate_count(&self) -> usize {
        self.data.read().pred_sources.len()
    }
}

impl Default for TripleGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore for TripleGraph {
    type Txn<'a> = GraphReadTxn<'a>;

    fn read_txn(&self) -> GraphReadTxn<'_> {
        GraphReadTxn {
            interner: &self.interner,
            data: self.data.read(),
        }
    }
}

/// Scoped read transaction over a [`TripleGraph`].
pub struct GraphReadTxn<'a> {
    interner: &'a StringInterner,
    data: RwLockReadGuard<'a, GraphData>,
}

impl GraphTxn for GraphReadTxn<'_> {
    fn entity_name(&self, id: EntityId) -> Option<String> {
        let name = *self.data.entity_names.get(id as usize)?;
        self.interner.lookup(name)
    }

    fn entity_id(&self, name: &str) -> Option<EntityId> {
        let name = self.interner.id_of(name)?;
        self.data.entity_index.get(&name).copied()
    }

    fn ground_body(
        &self,
        path: &[PathStep<'_>],
        mode: GroundingMode,
        cancel: &dyn Fn() -> bool,
    ) -> CountedSet<Pair> {
        let mut out = CountedSet::new();

        let mut steps = Vec::with_capacity(path.len());
        for step in path {
            // Unknown predicate: nothing can ground.
            let Some(predicate) = self.interner.id_of(step.predicate) else {
                return out;
            };
            steps.push((predicate, step.direction));
        }
        let Some(&(first_pred, first_dir)) = steps.first() else {
            return out;
        };
        let Some(seeds) = self.data.seeds(first_pred, first_dir) else {
            return out;
        };

        let mut visited = Vec::with_capacity(steps.len() + 1);
        for start in seeds.iter() {
            if cancel() {
                break;
            }
            visited.clear();
            visited.push(start);
            self.data
                .walk(start, start, &steps, &mut visited, mode, &mut out);
        }
        out
    }
}
