//! Miner configuration.
//!
//! Every field is optional in the JSON file; missing values take the
//! defaults below.

use crate::error::ConfigError;
use crate::stats::QualityMeasure;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Result-set sizes tried by model selection when none are configured.
pub const DEFAULT_MS_SIZES: [usize; 8] = [500, 1000, 3000, 5000, 10000, 20000, 30000, 50000];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Minimum support (correct predictions) for a rule to qualify.
    pub support: u64,
    /// Minimum confidence under `quality_measure`.
    pub conf: f64,
    /// Minimum head coverage.
    pub head_coverage: f64,
    /// Per-target cap on qualified instantiated rules.
    pub ins_rule_cap: usize,
    /// Specialization worker threads.
    pub thread_number: usize,
    /// Allow both-anchored rules of the form `R(e,Y) <- R(Y,e)`.
    pub allow_ins_reverse: bool,
    pub quality_measure: QualityMeasure,
    /// Additive offset in the smoothed confidence denominators.
    pub confidence_offset: f64,
    /// Branch-and-bound pruning over the rule hierarchy.
    pub use_prior_prune: bool,
    /// Support bound at or below which a template subtree is pruned.
    pub prior_th: u64,
    /// Drop both-anchored rules that do not beat their head-anchored sibling.
    pub use_post_prune: bool,
    /// Wall-clock budget for one target's specialization pass.
    pub spec_time_limit_secs: Option<u64>,
    /// Per-target cap on predictions recorded during rule application.
    pub suggestion_cap: usize,
    /// Capacity of each rule writer queue.
    pub writer_queue_capacity: usize,
    /// Drop valid/test pairs whose entities never appear in training.
    pub filter_unsolvable: bool,
    /// Result-set sizes tried by model selection.
    pub ms_sizes: Option<Vec<usize>>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            support: 10,
            conf: 0.0001,
            head_coverage: 0.0001,
            ins_rule_cap: 15_000_000,
            thread_number: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            allow_ins_reverse: false,
            quality_measure: QualityMeasure::default(),
            confidence_offset: 5.0,
            use_prior_prune: false,
            prior_th: 10,
            use_post_prune: false,
            spec_time_limit_secs: None,
            suggestion_cap: 10_000_000,
            writer_queue_capacity: 1_000_000,
            filter_unsolvable: false,
            ms_sizes: None,
        }
    }
}

impl MinerConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_number == 0 {
            return Err(ConfigError::Invalid("thread_number must be at least 1".into()));
        }
        if self.writer_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "writer_queue_capacity must be at least 1".into(),
            ));
        }
        for (name, value) in [("conf", self.conf), ("head_coverage", self.head_coverage)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if !(self.confidence_offset >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "confidence_offset must be non-negative, got {}",
                self.confidence_offset
            )));
        }
        if let Some(sizes) = &self.ms_sizes {
            if sizes.contains(&0) {
                return Err(ConfigError::Invalid("ms_sizes entries must be positive".into()));
            }
        }
        Ok(())
    }

    /// Model-selection grid; an absent or empty list falls back to [`DEFAULT_MS_SIZES`].
    pub fn model_selection_sizes(&self) -> Vec<usize> {
        match &self.ms_sizes {
            Some(sizes) if !sizes.is_empty() => sizes.clone(),
            _ => DEFAULT_MS_SIZES.to_vec(),
        }
    }

    pub fn spec_time_limit(&self) -> Option<std::time::Duration> {
        self.spec_time_limit_secs.map(std::time::Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = MinerConfig::from_json(r#"{"support": 3, "use_prior_prune": true}"#).unwrap();
        assert_eq!(config.support, 3);
        assert!(config.use_prior_prune);
        assert_eq!(config.prior_th, 10);
        assert_eq!(config.quality_measure, QualityMeasure::SmoothedConf);
        assert_eq!(config.model_selection_sizes(), DEFAULT_MS_SIZES.to_vec());
    }

    #[test]
    fn empty_size_grid_falls_back_to_default() {
        let config = MinerConfig::from_json(r#"{"ms_sizes": []}"#).unwrap();
        assert_eq!(config.model_selection_sizes().len(), 8);

        let config = MinerConfig::from_json(r#"{"ms_sizes": [1, 2]}"#).unwrap();
        assert_eq!(config.model_selection_sizes(), vec![1, 2]);
    }

    #[test]
    fn quality_measure_is_read_by_name() {
        let config = MinerConfig::from_json(r#"{"quality_measure": "pcaConf"}"#).unwrap();
        assert_eq!(config.quality_measure, QualityMeasure::PcaConf);

        assert!(matches!(
            MinerConfig::from_json(r#"{"quality_measure": "bogus"}"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            MinerConfig::from_json(r#"{"thread_number": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            MinerConfig::from_json(r#"{"conf": 1.5}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            MinerConfig::from_json(r#"{"ms_sizes": [10, 0]}"#),
            Err(ConfigError::Invalid(_))
        ));
    }
}
