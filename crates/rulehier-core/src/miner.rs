//! Per-target driver: learn rules for a predicate, then apply and select them.

use crate::application::{apply_rules, ApplicationReport};
use crate::config::MinerConfig;
use crate::context::{Context, RulePredictions};
use crate::error::MineError;
use crate::filter::FilterSet;
use crate::hierarchy::RuleHierarchy;
use crate::metrics::{RuleMetrics, TargetAnalysis};
use crate::persist::{order_rule_index_file, read_rule_index};
use crate::rule::Template;
use crate::selection::{Coverage, ModelSelection};
use crate::specialize::{specialize, OutputFiles, SpecializationJob};
use crate::timer::SearchTimer;
use rulehier_graph::GraphStore;
use std::fs::File;
use std::path::Path;

/// Result of the apply phase for one target.
#[derive(Debug)]
pub struct TargetPredictions {
    pub report: ApplicationReport,
    pub predictions: RulePredictions,
    /// `None` when no size grid was evaluated.
    pub selection: Option<ModelSelection>,
    /// Coverage of the elected model, when there is one.
    pub coverage: Option<Coverage>,
}

/// Mines and applies rules for one target at a time against a shared graph.
pub struct TargetMiner<'g, G> {
    store: &'g G,
    config: MinerConfig,
    timer: SearchTimer,
}

impl<'g, G: GraphStore> TargetMiner<'g, G> {
    pub fn new(store: &'g G, config: MinerConfig) -> Self {
        let timer = SearchTimer::new(config.spec_time_limit());
        Self {
            store,
            config,
            timer,
        }
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    pub fn timer(&self) -> &SearchTimer {
        &self.timer
    }

    /// Specialize `templates` for `target`, leaving a sorted rule index at
    /// `files.index` and appending qualified rules to `files.rules`.
    pub fn learn(
        &self,
        target: &str,
        templates: &[Template],
        filter: &FilterSet,
        files: &OutputFiles,
    ) -> Result<TargetAnalysis, MineError> {
        self.timer.start_spec();
        if let Some(parent) = files.index.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MineError::io(parent, e))?;
        }
        File::create(&files.index).map_err(|e| MineError::io(&files.index, e))?;

        let hierarchy = RuleHierarchy::build(templates)?;
        let context = Context::new(self.config.ins_rule_cap, self.config.suggestion_cap);
        let metrics = RuleMetrics::new(templates.len());
        let job = SpecializationJob {
            target,
            templates,
            hierarchy: &hierarchy,
            filter,
            config: &self.config,
            context: &context,
            metrics: &metrics,
            timer: &self.timer,
        };

        let pass = specialize(self.store, &job, files)?;
        let entries = order_rule_index_file(&files.index, self.config.quality_measure)?;

        let analysis = metrics.snapshot(target, self.timer.spec_elapsed());
        tracing::info!(
            predicate = target,
            templates = analysis.templates,
            evaluated = pass.evaluated,
            qualified_templates = analysis.qualified_templates,
            prior_pruned = analysis.prior_pruned,
            ins_rules = analysis.qualified_ins_rules,
            post_pruned = analysis.post_pruned,
            index_entries = entries,
            constrained = analysis.constraints_triggered(),
            duration_ms = analysis.duration.as_millis() as u64,
            "target learned"
        );
        Ok(analysis)
    }

    /// Apply the rules of a sorted index and elect the best rule subset.
    pub fn apply(
        &self,
        target: &str,
        index: &Path,
        filter: &FilterSet,
    ) -> Result<TargetPredictions, MineError> {
        let entries = read_rule_index(index)?;
        let context = Context::new(self.config.ins_rule_cap, self.config.suggestion_cap);
        let report = {
            let txn = self.store.read_txn();
            apply_rules(&txn, &entries, filter, &context, self.config.quality_measure)
        };
        let predictions = context.take_predictions();
        tracing::info!(
            predicate = target,
            entries = entries.len(),
            rules = report.rules,
            predictions = report.predictions,
            distinct = predictions.distinct_pairs(),
            capped = report.capped,
            "rules applied"
        );

        let selection = ModelSelection::select(
            &predictions,
            filter,
            &self.config.model_selection_sizes(),
            self.config.quality_measure,
        );
        let coverage = selection
            .as_ref()
            .map(|selection| selection.coverage(&predictions, filter));
        Ok(TargetPredictions {
            report,
            predictions,
            selection,
            coverage,
        })
    }
}
