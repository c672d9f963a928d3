//! Rule statistics and quality measures.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Confidence measure used to rank and gate rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityMeasure {
    #[serde(rename = "standardConf")]
    StandardConf,
    #[default]
    #[serde(rename = "smoothedConf")]
    SmoothedConf,
    #[serde(rename = "pcaConf")]
    PcaConf,
    #[serde(rename = "apcaConf")]
    ApcaConf,
}

impl QualityMeasure {
    pub const ALL: [QualityMeasure; 4] = [
        QualityMeasure::StandardConf,
        QualityMeasure::SmoothedConf,
        QualityMeasure::PcaConf,
        QualityMeasure::ApcaConf,
    ];

    pub fn name(self) -> &'static str {
        match self {
            QualityMeasure::StandardConf => "standardConf",
            QualityMeasure::SmoothedConf => "smoothedConf",
            QualityMeasure::PcaConf => "pcaConf",
            QualityMeasure::ApcaConf => "apcaConf",
        }
    }
}

impl fmt::Display for QualityMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QualityMeasure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| format!("unknown quality measure {s:?}"))
    }
}

/// `num / den`, or 0 when the denominator is 0.
pub fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// The derived measures of a rule, as persisted in the rule index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measures {
    pub standard_conf: f64,
    pub smoothed_conf: f64,
    pub pca_conf: f64,
    pub apca_conf: f64,
    pub head_coverage: f64,
    pub valid_precision: f64,
}

impl Measures {
    pub fn quality(&self, measure: QualityMeasure) -> f64 {
        match measure {
            QualityMeasure::StandardConf => self.standard_conf,
            QualityMeasure::SmoothedConf => self.smoothed_conf,
            QualityMeasure::PcaConf => self.pca_conf,
            QualityMeasure::ApcaConf => self.apca_conf,
        }
    }

    /// Harmonic mean of head coverage and standard confidence.
    pub fn local_f1(&self) -> f64 {
        ratio(
            2.0 * self.head_coverage * self.standard_conf,
            self.head_coverage + self.standard_conf,
        )
    }

    /// The six measures in index-file column order.
    pub fn columns(&self) -> [f64; 6] {
        [
            self.standard_conf,
            self.smoothed_conf,
            self.pca_conf,
            self.apca_conf,
            self.head_coverage,
            self.valid_precision,
        ]
    }

    pub fn from_columns(c: [f64; 6]) -> Self {
        Self {
            standard_conf: c[0],
            smoothed_conf: c[1],
            pca_conf: c[2],
            apca_conf: c[3],
            head_coverage: c[4],
            valid_precision: c[5],
        }
    }
}

/// Prediction counts of one rule evaluation plus the measures derived from them.
///
/// Counts only grow during a pass; `measures` is stale until [`RuleStats::compute`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleStats {
    pub support: u64,
    pub total_predictions: u64,
    pub pca_total_predictions: u64,
    pub ground_truth: u64,
    pub valid_total_predictions: u64,
    pub valid_predictions: u64,
    pub measures: Measures,
}

impl RuleStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold another evaluation's prediction counts into this one.
    ///
    /// `ground_truth` belongs to the head predicate and is left alone.
    pub fn accumulate(&mut self, other: &RuleStats) {
        self.support += other.support;
        self.total_predictions += other.total_predictions;
        self.pca_total_predictions += other.pca_total_predictions;
        self.valid_total_predictions += other.valid_total_predictions;
        self.valid_predictions += other.valid_predictions;
    }

    pub fn compute(&mut self, confidence_offset: f64) {
        let support = self.support as f64;
        let total = self.total_predictions as f64;
        let pca_total = self.pca_total_predictions as f64;
        self.measures = Measures {
            standard_conf: ratio(support, total),
            smoothed_conf: ratio(support, total + confidence_offset),
            pca_conf: ratio(support, pca_total),
            apca_conf: ratio(support, pca_total + confidence_offset),
            head_coverage: ratio(support, self.ground_truth as f64),
            valid_precision: ratio(
                self.valid_predictions as f64,
                self.valid_total_predictions as f64,
            ),
        };
    }

    pub fn quality(&self, measure: QualityMeasure) -> f64 {
        self.measures.quality(measure)
    }
}

/// Minimum thresholds a rule must meet to be kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualificationGate {
    pub support: u64,
    pub conf: f64,
    pub head_coverage: f64,
    pub measure: QualityMeasure,
}

impl QualificationGate {
    pub fn admits(&self, stats: &RuleStats) -> bool {
        stats.support >= self.support
            && stats.quality(self.measure) >= self.conf
            && stats.measures.head_coverage >= self.head_coverage
    }
}
