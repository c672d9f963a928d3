//! Rule application: turn persisted rules into predicted pairs.

use crate::context::{AppliedRule, Context};
use crate::filter::FilterSet;
use crate::persist::IndexEntry;
use crate::rule::{Anchoring, InsRuleSummary, Template};
use crate::stats::QualityMeasure;
use ahash::{AHashMap, AHashSet};
use rulehier_graph::{EntityId, GraphTxn, GroundingMode, Pair};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplicationReport {
    /// Rules that predicted at least one pair.
    pub rules: usize,
    /// (rule, pair) entries recorded.
    pub predictions: usize,
    /// Application stopped at the prediction cap.
    pub capped: bool,
}

/// Apply every entry of a rule index, recording predictions in `context`.
///
/// Closed templates predict their groundings. Open templates predict through
/// their instantiations, best first under `measure`.
pub fn apply_rules<T: GraphTxn>(
    txn: &T,
    entries: &[IndexEntry],
    filter: &FilterSet,
    context: &Context,
    measure: QualityMeasure,
) -> ApplicationReport {
    let mut report = ApplicationReport::default();
    let stop = || context.check_suggestion_cap();

    'entries: for entry in entries {
        if stop() {
            report.capped = true;
            break;
        }
        let template = &entry.template;
        let steps = template.path_steps();
        let groundings = txn.ground_body(&steps, GroundingMode::Apply, &stop);

        if template.is_closed() {
            let predictions: Vec<Pair> = groundings.iter().map(|g| template.prediction(*g)).collect();
            report.record(context, filter, AppliedRule::new(template.to_string(), entry.measures), predictions);
            continue;
        }

        let mut starts: Vec<EntityId> = Vec::new();
        let mut tail_to_original: AHashMap<EntityId, Vec<EntityId>> = AHashMap::new();
        let mut seen_starts: AHashSet<EntityId> = AHashSet::new();
        for grounding in groundings.iter() {
            if seen_starts.insert(grounding.sub) {
                starts.push(grounding.sub);
            }
            tail_to_original.entry(grounding.obj).or_default().push(grounding.sub);
        }

        let mut summaries: Vec<&InsRuleSummary> = entry.ins_rules.iter().collect();
        summaries.sort_by(|a, b| {
            b.measures
                .quality(measure)
                .total_cmp(&a.measures.quality(measure))
        });

        for summary in summaries {
            if stop() {
                report.capped = true;
                break 'entries;
            }
            let head = summary.anchoring.head_anchor();
            let originals: &[EntityId] = match summary.anchoring {
                Anchoring::Head { .. } => &starts,
                Anchoring::Both { tail, .. } => tail_to_original.get(&tail).map(Vec::as_slice).unwrap_or(&[]),
            };
            let predictions: Vec<Pair> = originals
                .iter()
                .map(|&original| template.anchored_prediction(original, head))
                .filter(|pair| !pair.is_self_loop())
                .collect();
            let label = instantiated_label(txn, template, &summary.anchoring);
            report.record(context, filter, AppliedRule::new(label, summary.measures), predictions);
        }
    }

    if report.capped {
        tracing::debug!(predictions = report.predictions, "rule application reached prediction cap");
    }
    report
}

impl ApplicationReport {
    fn record(&mut self, context: &Context, filter: &FilterSet, rule: AppliedRule, predictions: Vec<Pair>) {
        if predictions.is_empty() {
            return;
        }
        let precision = rule_precision(filter, &predictions);
        let cap = context.suggestion_cap();
        let added = context.with_predictions(|relation| {
            let idx = relation.add_rule(rule);
            let before = relation.total_predictions();
            for pair in predictions {
                if relation.total_predictions() >= cap {
                    break;
                }
                relation.put(idx, pair);
            }
            relation.set_precision(idx, precision);
            relation.total_predictions() - before
        });
        self.rules += 1;
        self.predictions += added;
    }
}

/// Test hits over predictions that are not already known.
pub fn rule_precision(filter: &FilterSet, predictions: &[Pair]) -> f64 {
    let mut filtered = 0usize;
    let mut hits = 0usize;
    let distinct: AHashSet<&Pair> = predictions.iter().collect();
    for pair in distinct {
        if filter.is_known(pair) {
            continue;
        }
        filtered += 1;
        if filter.in_test_set(pair) {
            hits += 1;
        }
    }
    crate::stats::ratio(hits as f64, filtered as f64)
}

fn instantiated_label<T: GraphTxn>(txn: &T, template: &Template, anchoring: &Anchoring) -> String {
    let name = |id: EntityId| txn.entity_name(id).unwrap_or_else(|| id.to_string());
    match *anchoring {
        Anchoring::Head { anchor } => template.instantiated_text(&name(anchor), None),
        Anchoring::Both { head, tail } => template.instantiated_text(&name(head), Some(&name(tail))),
    }
}
