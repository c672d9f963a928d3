//! Specialization search: evaluate templates and their instantiations.
//!
//! A fixed set of workers drains a shared [`WorkQueue`] of templates. Each
//! evaluation grounds the template body once and then:
//!
//! - **Prior pruning** (optional): bounds the support any descendant could
//!   reach. A template at or below the threshold is dropped with its whole
//!   subtree; otherwise its hierarchy children join the queue.
//! - **Closed templates** are scored on all groundings at once.
//! - **Open templates** are scored per head anchor, and per (head, tail)
//!   anchor pair reachable through the groundings. With **post pruning** a
//!   both-anchored rule must beat its head-anchored sibling to be kept.
//!
//! Qualified rules go to two [`RuleWriter`]s: the target's rule index and the
//! shared rules file.

use crate::config::MinerConfig;
use crate::context::Context;
use crate::error::MineError;
use crate::filter::FilterSet;
use crate::hierarchy::RuleHierarchy;
use crate::metrics::RuleMetrics;
use crate::persist::{index_line, open_index_entry, rules_line};
use crate::pool::{WorkQueue, WorkerPool};
use crate::rule::{Anchoring, InsRuleSummary, RuleKind, Template, TemplateId};
use crate::stats::{QualificationGate, RuleStats};
use crate::timer::SearchTimer;
use crate::writer::{RuleSink, RuleWriter};
use ahash::{AHashMap, AHashSet};
use rulehier_graph::{CountedSet, EntityId, GraphStore, GraphTxn, GroundingMode, Pair};
use std::path::PathBuf;

// ============================================================================
// Anchor index
// ============================================================================

/// Anchor entity -> the "original" entities it is paired with in a split.
#[derive(Debug, Default)]
pub struct AnchorIndex {
    by_anchor: AHashMap<EntityId, AHashSet<EntityId>>,
}

impl AnchorIndex {
    /// Index pairs by object: `obj -> {sub}`.
    pub fn by_object<'p>(pairs: impl IntoIterator<Item = &'p Pair>) -> Self {
        Self::build(pairs.into_iter().map(|p| (p.obj, p.sub)))
    }

    /// Index pairs by subject: `sub -> {obj}`.
    pub fn by_subject<'p>(pairs: impl IntoIterator<Item = &'p Pair>) -> Self {
        Self::build(pairs.into_iter().map(|p| (p.sub, p.obj)))
    }

    fn build(entries: impl Iterator<Item = (EntityId, EntityId)>) -> Self {
        let mut by_anchor: AHashMap<EntityId, AHashSet<EntityId>> = AHashMap::new();
        for (anchor, original) in entries {
            by_anchor.entry(anchor).or_default().insert(original);
        }
        Self { by_anchor }
    }

    pub fn get(&self, anchor: EntityId) -> Option<&AHashSet<EntityId>> {
        self.by_anchor.get(&anchor)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &AHashSet<EntityId>)> {
        self.by_anchor.iter().map(|(a, o)| (*a, o))
    }

    pub fn len(&self) -> usize {
        self.by_anchor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_anchor.is_empty()
    }
}

/// Number of (anchor, original) training entries whose original starts at
/// least one grounding. Never grows as a body is extended.
pub fn support_bound(groundings: &CountedSet<Pair>, anchoring: &AnchorIndex) -> u64 {
    let starts: AHashSet<EntityId> = groundings.iter().map(|g| g.sub).collect();
    anchoring
        .iter()
        .map(|(_, originals)| originals.iter().filter(|o| starts.contains(o)).count() as u64)
        .sum()
}

// ============================================================================
// Job
// ============================================================================

/// Everything one target's specialization pass reads.
pub struct SpecializationJob<'a> {
    pub target: &'a str,
    pub templates: &'a [Template],
    pub hierarchy: &'a RuleHierarchy,
    pub filter: &'a FilterSet,
    pub config: &'a MinerConfig,
    pub context: &'a Context,
    pub metrics: &'a RuleMetrics,
    pub timer: &'a SearchTimer,
}

/// Output paths of a pass.
#[derive(Debug, Clone)]
pub struct OutputFiles {
    pub index: PathBuf,
    pub rules: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Templates taken off the queue.
    pub evaluated: usize,
    pub index_lines: usize,
    pub rule_lines: usize,
}

struct RuleSinks {
    index: RuleSink,
    rules: RuleSink,
}

/// Run the specialization pass for one target and wait until every rule is
/// on disk.
pub fn specialize<G: GraphStore>(
    store: &G,
    job: &SpecializationJob<'_>,
    files: &OutputFiles,
) -> Result<PassReport, MineError> {
    let search = Search::new(job);
    search.queue.extend(search.initial_frontier());
    tracing::debug!(
        predicate = job.target,
        templates = job.templates.len(),
        frontier = search.queue.len(),
        "specialization started"
    );

    let capacity = job.config.writer_queue_capacity;
    let (index_sink, index_writer) = RuleWriter::channel(&files.index, capacity);
    let (rules_sink, rules_writer) = RuleWriter::channel(&files.rules, capacity);
    let tasks: Vec<RuleSinks> = (0..job.config.thread_number)
        .map(|_| RuleSinks {
            index: index_sink.clone(),
            rules: rules_sink.clone(),
        })
        .collect();
    drop(index_sink);
    drop(rules_sink);

    let write = |writer: RuleWriter| writer.run();
    let work = |sinks: RuleSinks| search.run_worker(store, &sinks);

    std::thread::scope(|scope| -> Result<PassReport, MineError> {
        let writers = WorkerPool::start(scope, "rule-writer", vec![index_writer, rules_writer], &write)?;
        let workers = WorkerPool::start(scope, "specializer", tasks, &work)?;

        let worker_result = workers.join();
        let lines = writers.join()?;
        let evaluated = worker_result?.into_iter().sum();
        Ok(PassReport {
            evaluated,
            index_lines: lines.first().copied().unwrap_or(0),
            rule_lines: lines.get(1).copied().unwrap_or(0),
        })
    })
}

// ============================================================================
// Search state
// ============================================================================

struct Search<'a> {
    job: &'a SpecializationJob<'a>,
    gate: QualificationGate,
    queue: WorkQueue<TemplateId>,
    train_subjects: AHashSet<EntityId>,
    sub_to_objs: AnchorIndex,
    obj_to_subs: AnchorIndex,
    valid_sub_to_objs: AnchorIndex,
    valid_obj_to_subs: AnchorIndex,
}

impl<'a> Search<'a> {
    fn new(job: &'a SpecializationJob<'a>) -> Self {
        let config = job.config;
        let train = job.filter.train();
        let valid = job.filter.valid();
        Self {
            job,
            gate: QualificationGate {
                support: config.support,
                conf: config.conf,
                head_coverage: config.head_coverage,
                measure: config.quality_measure,
            },
            queue: WorkQueue::with_capacity(job.templates.len()),
            train_subjects: train.iter().map(|p| p.sub).collect(),
            sub_to_objs: AnchorIndex::by_subject(train),
            obj_to_subs: AnchorIndex::by_object(train),
            valid_sub_to_objs: AnchorIndex::by_subject(valid),
            valid_obj_to_subs: AnchorIndex::by_object(valid),
        }
    }

    /// Root children under prior pruning, otherwise every template, shortest first.
    fn initial_frontier(&self) -> Vec<TemplateId> {
        if self.job.config.use_prior_prune {
            return self.job.hierarchy.init_query_map();
        }
        let templates = self.job.templates;
        let mut all: Vec<TemplateId> = (0..templates.len()).collect();
        all.sort_by_cached_key(|&id| (templates[id].len(), templates[id].index_string()));
        all
    }

    fn should_stop(&self) -> bool {
        self.job.context.check_ins_rule_cap() || self.job.timer.stop_spec()
    }

    /// Training and validation anchor indexes for a body anchored on one side.
    ///
    /// A body starting at `X` grounds subjects, so the anchor is the object.
    fn anchoring(&self, from_subject: bool) -> (&AnchorIndex, &AnchorIndex) {
        if from_subject {
            (&self.obj_to_subs, &self.valid_obj_to_subs)
        } else {
            (&self.sub_to_objs, &self.valid_sub_to_objs)
        }
    }

    fn run_worker<G: GraphStore>(&self, store: &G, sinks: &RuleSinks) -> Result<usize, MineError> {
        let txn = store.read_txn();
        let mut evaluated = 0;
        loop {
            if self.queue.is_empty() || self.should_stop() {
                break;
            }
            let Some(template) = self.queue.poll() else {
                continue;
            };
            let evaluator = TemplateEvaluator {
                search: self,
                txn: &txn,
                sinks,
            };
            if let Err(err) = evaluator.evaluate(template) {
                tracing::warn!(predicate = self.job.target, template, error = %err, "specialization worker failed");
                self.job.timer.cancel();
                return Err(err);
            }
            evaluated += 1;
        }
        Ok(evaluated)
    }
}

// ============================================================================
// Template evaluation
// ============================================================================

struct TemplateEvaluator<'s, 'a, T> {
    search: &'s Search<'a>,
    txn: &'s T,
    sinks: &'s RuleSinks,
}

impl<T: GraphTxn> TemplateEvaluator<'_, '_, T> {
    fn evaluate(&self, id: TemplateId) -> Result<(), MineError> {
        let search = self.search;
        let job = search.job;
        let config = job.config;
        let template = &job.templates[id];

        let steps = template.path_steps();
        let timer = job.timer;
        let groundings = self
            .txn
            .ground_body(&steps, GroundingMode::Learn, &|| timer.stop_spec());

        if config.use_prior_prune {
            let (anchoring, _) = search.anchoring(template.from_subject);
            let bound = support_bound(&groundings, anchoring);
            if bound <= config.prior_th {
                let skipped = job.hierarchy.size(id)? + 1;
                job.metrics.prior_pruned(skipped);
                tracing::trace!(rule = %template, bound, skipped, "prior pruned");
                return Ok(());
            }
            search.queue.extend(job.hierarchy.children(id)?);
        }

        if search.should_stop() {
            return Ok(());
        }

        if template.is_closed() {
            self.evaluate_closed(id, template, &groundings)
        } else {
            self.evaluate_open(id, template, &groundings)
        }
    }

    fn evaluate_closed(
        &self,
        id: TemplateId,
        template: &Template,
        groundings: &CountedSet<Pair>,
    ) -> Result<(), MineError> {
        let search = self.search;
        let job = search.job;
        let train = job.filter.train();
        let valid = job.filter.valid();

        let mut stats = RuleStats::new();
        stats.ground_truth = train.len() as u64;
        for grounding in groundings.iter() {
            let prediction = template.prediction(*grounding);
            if search.train_subjects.contains(&prediction.sub) {
                stats.pca_total_predictions += 1;
            }
            if train.contains(&prediction) {
                stats.support += 1;
            } else {
                stats.valid_total_predictions += 1;
                if valid.contains(&prediction) {
                    stats.valid_predictions += 1;
                }
            }
            stats.total_predictions += 1;
        }
        stats.compute(job.config.confidence_offset);

        if !search.gate.admits(&stats) {
            job.metrics.unqualified_template();
            return Ok(());
        }
        job.context.add_specialized(id);
        job.metrics.qualified_template();
        let index_id = job.context.index_id(id);
        self.sinks
            .index
            .send(index_line(index_id, template, &stats.measures))?;
        self.sinks.rules.send(rules_line(
            RuleKind::Closed,
            &template.to_string(),
            &stats,
            job.config.quality_measure,
        ))
    }

    fn evaluate_open(
        &self,
        id: TemplateId,
        template: &Template,
        groundings: &CountedSet<Pair>,
    ) -> Result<(), MineError> {
        let search = self.search;
        let job = search.job;
        let config = job.config;
        let measure = config.quality_measure;
        let (anchoring, valid_anchoring) = search.anchoring(template.from_subject);

        let mut original_to_tail: AHashMap<EntityId, AHashSet<EntityId>> = AHashMap::new();
        let mut tail_to_original: AHashMap<EntityId, AHashSet<EntityId>> = AHashMap::new();
        for grounding in groundings.iter() {
            original_to_tail.entry(grounding.sub).or_default().insert(grounding.obj);
            tail_to_original.entry(grounding.obj).or_default().insert(grounding.sub);
        }

        let mut aggregate = RuleStats::new();
        aggregate.ground_truth = job.filter.train().len() as u64;
        let mut records = Vec::new();

        'anchors: for (anchor, originals) in anchoring.iter() {
            if search.should_stop() {
                break;
            }
            let valid_originals = valid_anchoring.get(anchor);

            let head = self.score_instantiation(
                template.from_subject,
                originals,
                valid_originals,
                original_to_tail.keys().copied(),
            );
            aggregate.accumulate(&head);
            let head_quality = head.quality(measure);
            if search.gate.admits(&head) {
                self.emit(template, Anchoring::Head { anchor }, &head, &mut records)?;
            } else {
                job.metrics.unqualified_ins_rule();
            }

            let mut visited: AHashSet<EntityId> = AHashSet::new();
            for original in originals {
                if search.should_stop() {
                    break 'anchors;
                }
                let Some(tails) = original_to_tail.get(original) else {
                    continue;
                };
                for &tail in tails {
                    if search.should_stop() {
                        break 'anchors;
                    }
                    if visited.contains(&tail)
                        || (!config.allow_ins_reverse && template.is_trivial_instantiation(anchor, tail))
                    {
                        continue;
                    }
                    visited.insert(tail);

                    let Some(tail_originals) = tail_to_original.get(&tail) else {
                        continue;
                    };
                    let both = self.score_instantiation(
                        template.from_subject,
                        originals,
                        valid_originals,
                        tail_originals.iter().copied(),
                    );
                    if !search.gate.admits(&both) {
                        job.metrics.unqualified_ins_rule();
                        continue;
                    }
                    if config.use_post_prune && both.quality(measure) <= head_quality {
                        job.metrics.post_pruned();
                        continue;
                    }
                    self.emit(template, Anchoring::Both { head: anchor, tail }, &both, &mut records)?;
                }
            }
        }

        aggregate.compute(config.confidence_offset);
        if records.is_empty() {
            job.metrics.unqualified_template();
            return Ok(());
        }
        job.context.add_specialized(id);
        job.metrics.qualified_template();
        tracing::trace!(rule = %template, instantiations = records.len(), "open template qualified");
        let index_id = job.context.index_id(id);
        self.sinks.index.send(open_index_entry(
            index_id,
            template,
            &aggregate.measures,
            &records,
        ))
    }

    /// Score an instantiation that predicts `(original, anchor)` for every
    /// grounding original it reaches.
    fn score_instantiation(
        &self,
        from_subject: bool,
        originals: &AHashSet<EntityId>,
        valid_originals: Option<&AHashSet<EntityId>>,
        predicted: impl Iterator<Item = EntityId>,
    ) -> RuleStats {
        let mut stats = RuleStats::new();
        for original in predicted {
            stats.total_predictions += 1;
            if originals.contains(&original) {
                stats.support += 1;
            } else {
                stats.valid_total_predictions += 1;
                if valid_originals.is_some_and(|v| v.contains(&original)) {
                    stats.valid_predictions += 1;
                }
            }
        }
        stats.pca_total_predictions = if from_subject {
            stats.support
        } else {
            stats.total_predictions
        };
        stats.ground_truth = originals.len() as u64;
        stats.compute(self.search.job.config.confidence_offset);
        stats
    }

    fn emit(
        &self,
        template: &Template,
        anchoring: Anchoring,
        stats: &RuleStats,
        records: &mut Vec<InsRuleSummary>,
    ) -> Result<(), MineError> {
        let job = self.search.job;
        job.metrics.qualified_ins_rule();
        job.context.update_total_ins_rules();
        records.push(InsRuleSummary::new(anchoring, stats.measures));

        let text = match anchoring {
            Anchoring::Head { anchor } => template.instantiated_text(&self.name(anchor), None),
            Anchoring::Both { head, tail } => {
                template.instantiated_text(&self.name(head), Some(&self.name(tail)))
            }
        };
        self.sinks.rules.send(rules_line(
            RuleKind::Open,
            &text,
            stats,
            job.config.quality_measure,
        ))
    }

    fn name(&self, entity: EntityId) -> String {
        self.txn
            .entity_name(entity)
            .unwrap_or_else(|| entity.to_string())
    }
}
