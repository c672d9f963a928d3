//! Model selection: pick the rule subset that best predicts the test split.
//!
//! Candidates are the top-`n` applied rules under each ranking measure, for
//! every size in the configured grid. Each candidate pools the distinct pairs
//! its rules predict and is scored by recall and precision against the
//! filter set. The candidate with the highest F1 wins; among equals the one
//! evaluated first is kept.

use crate::context::{AppliedRule, RulePredictions};
use crate::filter::FilterSet;
use crate::stats::{ratio, QualityMeasure};
use ahash::AHashSet;
use rayon::prelude::*;
use rulehier_graph::Pair;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RankingMeasure {
    Confidence,
    ValidPrecision,
    LocalF1,
}

impl RankingMeasure {
    pub const ALL: [RankingMeasure; 3] = [
        RankingMeasure::Confidence,
        RankingMeasure::ValidPrecision,
        RankingMeasure::LocalF1,
    ];

    fn score(self, rule: &AppliedRule, quality: QualityMeasure) -> f64 {
        match self {
            RankingMeasure::Confidence => rule.measures.quality(quality),
            RankingMeasure::ValidPrecision => rule.measures.valid_precision,
            RankingMeasure::LocalF1 => rule.measures.local_f1(),
        }
    }

    /// Rule indices sorted by descending score; ties keep insertion order.
    pub fn order(self, rules: &[AppliedRule], quality: QualityMeasure) -> Vec<usize> {
        let mut order: Vec<usize> = (0..rules.len()).collect();
        order.sort_by(|&a, &b| {
            self.score(&rules[b], quality)
                .total_cmp(&self.score(&rules[a], quality))
        });
        order
    }
}

impl fmt::Display for RankingMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RankingMeasure::Confidence => "Confidence",
            RankingMeasure::ValidPrecision => "validPrecision",
            RankingMeasure::LocalF1 => "localF1",
        })
    }
}

/// One evaluated candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Model {
    pub ranking: RankingMeasure,
    /// Configured maximum number of rules.
    pub size: usize,
    /// Indices of the rules taken, best first.
    pub rules: Vec<usize>,
    pub test_support: usize,
    pub filtered_predictions: usize,
    /// Distinct predictions that are neither known nor in the test split.
    pub inferred: usize,
    /// Distinct predictions minus inferred ones.
    pub known: usize,
    pub recall: f64,
    pub precision: f64,
}

impl Model {
    /// Score the first `size` rules of `order`.
    pub fn evaluate(
        ranking: RankingMeasure,
        size: usize,
        order: &[usize],
        predictions: &RulePredictions,
        filter: &FilterSet,
    ) -> Self {
        let rules: Vec<usize> = order.iter().take(size).copied().collect();
        let mut visited = AHashSet::new();
        let mut test_support = 0;
        let mut filtered_predictions = 0;
        let mut inferred = 0;

        for &idx in &rules {
            for pair in &predictions.rules()[idx].predictions {
                if !visited.insert(*pair) || filter.is_known(pair) {
                    continue;
                }
                filtered_predictions += 1;
                if filter.in_test_set(pair) {
                    test_support += 1;
                } else {
                    inferred += 1;
                }
            }
        }

        Self {
            ranking,
            size,
            rules,
            test_support,
            filtered_predictions,
            inferred,
            known: visited.len() - inferred,
            recall: ratio(test_support as f64, filter.test_set_size() as f64),
            precision: ratio(test_support as f64, filtered_predictions as f64),
        }
    }

    pub fn f1(&self) -> f64 {
        ratio(
            2.0 * self.recall * self.precision,
            self.recall + self.precision,
        )
    }

    /// F-measure leaning towards recall.
    pub fn weighted_f1(&self) -> f64 {
        ratio(
            1.7 * self.recall * self.precision,
            0.7 * self.precision + self.recall,
        )
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rules sorted by {}: recall={:.4} precision={:.4} f1={:.4} weighted_f1={:.4} inferred={} known={}",
            self.rules.len(),
            self.ranking,
            self.recall,
            self.precision,
            self.f1(),
            self.weighted_f1(),
            self.inferred,
            self.known
        )
    }
}

/// All evaluated candidates and the elected one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSelection {
    pub models: Vec<Model>,
    best: usize,
}

impl ModelSelection {
    /// Evaluate every (size, ranking) candidate; `None` when `sizes` is empty.
    pub fn select(
        predictions: &RulePredictions,
        filter: &FilterSet,
        sizes: &[usize],
        quality: QualityMeasure,
    ) -> Option<Self> {
        let orders: Vec<(RankingMeasure, Vec<usize>)> = RankingMeasure::ALL
            .iter()
            .map(|&ranking| (ranking, ranking.order(predictions.rules(), quality)))
            .collect();
        let candidates: Vec<(usize, &(RankingMeasure, Vec<usize>))> = sizes
            .iter()
            .flat_map(|&size| orders.iter().map(move |order| (size, order)))
            .collect();

        let models: Vec<Model> = candidates
            .par_iter()
            .map(|(size, (ranking, order))| Model::evaluate(*ranking, *size, order, predictions, filter))
            .collect();

        let mut best: Option<usize> = None;
        for (i, model) in models.iter().enumerate() {
            tracing::debug!(model = %model, "model evaluated");
            if best.map_or(true, |b| model.f1() > models[b].f1()) {
                best = Some(i);
            }
        }
        let best = best?;
        tracing::info!(model = %models[best], "best model");
        Some(Self { models, best })
    }

    pub fn best(&self) -> &Model {
        &self.models[self.best]
    }

    /// How much of the known facts the predictions explain, and how many new
    /// facts the elected model adds.
    pub fn coverage(&self, predictions: &RulePredictions, filter: &FilterSet) -> Coverage {
        let explained: AHashSet<Pair> = predictions
            .pairs()
            .filter(|pair| filter.is_known_with_test(pair))
            .copied()
            .collect();
        let mut inferred = AHashSet::new();
        for &idx in &self.best().rules {
            for pair in &predictions.rules()[idx].predictions {
                if !explained.contains(pair) {
                    inferred.insert(*pair);
                }
            }
        }
        let coverage = Coverage {
            rules: self.best().rules.len(),
            known_all: filter.size(),
            explained: explained.len(),
            inferred_all: predictions.distinct_pairs(),
            inferred_quality: inferred.len(),
        };
        tracing::info!(
            rules = coverage.rules,
            known_all = coverage.known_all,
            explained = coverage.explained,
            explained_ratio = coverage.explained_ratio(),
            inferred_all = coverage.inferred_all,
            inferred_quality = coverage.inferred_quality,
            inferred_ratio = coverage.inferred_ratio(),
            "model coverage"
        );
        coverage
    }
}

// ============================================================================
// Coverage
// ============================================================================

/// Prediction coverage of an elected model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Coverage {
    /// Rules in the elected model.
    pub rules: usize,
    /// Known facts of the target (train and valid).
    pub known_all: usize,
    /// Distinct predictions that are known, test facts included.
    pub explained: usize,
    /// Distinct predictions of every applied rule.
    pub inferred_all: usize,
    /// Predictions of the elected model outside the explained set.
    pub inferred_quality: usize,
}

impl Coverage {
    pub fn explained_ratio(&self) -> f64 {
        ratio(self.explained as f64, self.known_all as f64)
    }

    pub fn inferred_ratio(&self) -> f64 {
        ratio(self.inferred_quality as f64, self.inferred_all as f64)
    }
}
