//! Per-target shared search state.

use crate::rule::TemplateId;
use crate::stats::Measures;
use ahash::AHashMap;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rulehier_graph::Pair;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

// ============================================================================
// Rule -> prediction relation
// ============================================================================

/// A rule applied to the graph, with the pairs it predicts.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedRule {
    /// Rule text, for reporting.
    pub label: String,
    pub measures: Measures,
    /// Test hits over filtered predictions; set once application finishes.
    pub precision: f64,
    /// Distinct predictions in the order they were first made.
    pub predictions: Vec<Pair>,
}

impl AppliedRule {
    pub fn new(label: impl Into<String>, measures: Measures) -> Self {
        Self {
            label: label.into(),
            measures,
            precision: 0.0,
            predictions: Vec::new(),
        }
    }
}

/// Many-to-many relation between applied rules and predicted pairs.
///
/// Rules keep insertion order; that order breaks ties in model selection.
#[derive(Debug, Default, Clone)]
pub struct RulePredictions {
    rules: Vec<AppliedRule>,
    by_pair: AHashMap<Pair, Vec<usize>>,
    total: usize,
}

impl RulePredictions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: AppliedRule) -> usize {
        let idx = self.rules.len();
        for &pair in &rule.predictions {
            self.by_pair.entry(pair).or_default().push(idx);
            self.total += 1;
        }
        self.rules.push(rule);
        idx
    }

    /// Record that `rule` predicts `pair`; repeated calls are ignored.
    pub fn put(&mut self, rule: usize, pair: Pair) -> bool {
        let Some(applied) = self.rules.get_mut(rule) else {
            return false;
        };
        let owners = self.by_pair.entry(pair).or_default();
        if owners.contains(&rule) {
            return false;
        }
        owners.push(rule);
        applied.predictions.push(pair);
        self.total += 1;
        true
    }

    pub fn set_precision(&mut self, rule: usize, precision: f64) {
        if let Some(applied) = self.rules.get_mut(rule) {
            applied.precision = precision;
        }
    }

    pub fn rules(&self) -> &[AppliedRule] {
        &self.rules
    }

    /// Rules predicting `pair`, in insertion order.
    pub fn rules_for(&self, pair: &Pair) -> &[usize] {
        self.by_pair.get(pair).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of (rule, pair) entries.
    pub fn total_predictions(&self) -> usize {
        self.total
    }

    /// Number of distinct predicted pairs.
    pub fn distinct_pairs(&self) -> usize {
        self.by_pair.len()
    }

    /// Distinct predicted pairs, in no particular order.
    pub fn pairs(&self) -> impl Iterator<Item = &Pair> {
        self.by_pair.keys()
    }
}

// ============================================================================
// Context
// ============================================================================

/// State shared by every worker while one target is mined and applied.
#[derive(Debug)]
pub struct Context {
    ins_rule_cap: usize,
    suggestion_cap: usize,
    total_ins_rules: AtomicUsize,
    specialized: DashSet<TemplateId>,
    index_ids: DashMap<TemplateId, u32>,
    next_index: AtomicU32,
    predictions: Mutex<RulePredictions>,
}

impl Context {
    pub fn new(ins_rule_cap: usize, suggestion_cap: usize) -> Self {
        Self {
            ins_rule_cap,
            suggestion_cap,
            total_ins_rules: AtomicUsize::new(0),
            specialized: DashSet::new(),
            index_ids: DashMap::new(),
            next_index: AtomicU32::new(0),
            predictions: Mutex::new(RulePredictions::new()),
        }
    }

    /// Has the instantiated-rule counter reached its cap?
    pub fn check_ins_rule_cap(&self) -> bool {
        self.total_ins_rules.load(Ordering::Relaxed) >= self.ins_rule_cap
    }

    /// Count one more qualified instantiated rule, returning the new total.
    pub fn update_total_ins_rules(&self) -> usize {
        self.total_ins_rules.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn total_ins_rules(&self) -> usize {
        self.total_ins_rules.load(Ordering::Relaxed)
    }

    pub fn add_specialized(&self, template: TemplateId) -> bool {
        self.specialized.insert(template)
    }

    pub fn specialized_count(&self) -> usize {
        self.specialized.len()
    }

    /// Stable id of a template in the persisted index, assigned on first use.
    pub fn index_id(&self, template: TemplateId) -> u32 {
        *self
            .index_ids
            .entry(template)
            .or_insert_with(|| self.next_index.fetch_add(1, Ordering::SeqCst))
    }

    pub fn suggestion_cap(&self) -> usize {
        self.suggestion_cap
    }

    /// Has rule application recorded as many predictions as allowed?
    pub fn check_suggestion_cap(&self) -> bool {
        self.predictions.lock().total_predictions() >= self.suggestion_cap
    }

    pub fn with_predictions<R>(&self, f: impl FnOnce(&mut RulePredictions) -> R) -> R {
        f(&mut self.predictions.lock())
    }

    pub fn take_predictions(&self) -> RulePredictions {
        std::mem::take(&mut *self.predictions.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_ids_are_stable_and_unique() {
        let context = Context::new(10, 10);
        let ids: Vec<u32> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| (0..20).map(|t| context.index_id(t)).collect::<Vec<_>>()))
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });
        for t in 0..20 {
            assert!(ids.chunks(20).all(|chunk| chunk[t] == ids[t]));
        }
        let mut distinct = ids[..20].to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(distinct.len(), 20);
    }

    #[test]
    fn ins_rule_cap() {
        let context = Context::new(2, 10);
        assert!(!context.check_ins_rule_cap());
        context.update_total_ins_rules();
        assert!(!context.check_ins_rule_cap());
        assert_eq!(context.update_total_ins_rules(), 2);
        assert!(context.check_ins_rule_cap());
    }

    #[test]
    fn predictions_dedupe_per_rule() {
        let context = Context::new(10, 3);
        context.with_predictions(|p| {
            let a = p.add_rule(AppliedRule::new("a", Measures::default()));
            let b = p.add_rule(AppliedRule::new("b", Measures::default()));
            assert!(p.put(a, Pair::new(1, 2)));
            assert!(!p.put(a, Pair::new(1, 2)));
            assert!(p.put(b, Pair::new(1, 2)));
            assert_eq!(p.rules_for(&Pair::new(1, 2)), &[a, b]);
            assert_eq!(p.distinct_pairs(), 1);
        });
        assert!(!context.check_suggestion_cap());
        context.with_predictions(|p| p.put(0, Pair::new(2, 3)));
        assert!(context.check_suggestion_cap());

        let taken = context.take_predictions();
        assert_eq!(taken.total_predictions(), 3);
        assert_eq!(context.with_predictions(|p| p.len()), 0);
    }
}
