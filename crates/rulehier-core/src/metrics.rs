//! Search metrics.
//!
//! A [`RuleMetrics`] is created for each target and shared by reference with
//! the worker pool. Workers bump its counters; once the pass is over the
//! driver takes a [`TargetAnalysis`] snapshot, and snapshots of all targets
//! are merged into a [`GlobalAnalysis`].

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct RuleMetrics {
    templates: AtomicUsize,
    qualified_templates: AtomicUsize,
    unqualified_templates: AtomicUsize,
    prior_pruned: AtomicUsize,
    qualified_ins_rules: AtomicUsize,
    unqualified_ins_rules: AtomicUsize,
    post_pruned: AtomicUsize,
}

impl RuleMetrics {
    pub fn new(templates: usize) -> Self {
        Self {
            templates: AtomicUsize::new(templates),
            ..Self::default()
        }
    }

    pub fn qualified_template(&self) {
        self.qualified_templates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unqualified_template(&self) {
        self.unqualified_templates.fetch_add(1, Ordering::Relaxed);
    }

    /// A pruning decision skipped `count` templates.
    pub fn prior_pruned(&self, count: usize) {
        self.prior_pruned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn qualified_ins_rule(&self) {
        self.qualified_ins_rules.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unqualified_ins_rule(&self) {
        self.unqualified_ins_rules.fetch_add(1, Ordering::Relaxed);
    }

    pub fn post_pruned(&self) {
        self.post_pruned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, target: &str, duration: Duration) -> TargetAnalysis {
        let load = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        TargetAnalysis {
            target: target.to_string(),
            templates: load(&self.templates),
            qualified_templates: load(&self.qualified_templates),
            unqualified_templates: load(&self.unqualified_templates),
            prior_pruned: load(&self.prior_pruned),
            qualified_ins_rules: load(&self.qualified_ins_rules),
            unqualified_ins_rules: load(&self.unqualified_ins_rules),
            post_pruned: load(&self.post_pruned),
            duration,
        }
    }
}

/// Counters of one target's specialization pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TargetAnalysis {
    pub target: String,
    pub templates: usize,
    pub qualified_templates: usize,
    pub unqualified_templates: usize,
    pub prior_pruned: usize,
    pub qualified_ins_rules: usize,
    pub unqualified_ins_rules: usize,
    pub post_pruned: usize,
    pub duration: Duration,
}

impl TargetAnalysis {
    /// Templates accounted for: evaluated or skipped by pruning.
    pub fn specialized(&self) -> usize {
        self.qualified_templates + self.unqualified_templates + self.prior_pruned
    }

    /// Instantiated rules considered.
    pub fn instantiated(&self) -> usize {
        self.qualified_ins_rules + self.unqualified_ins_rules + self.post_pruned
    }

    /// A cap, deadline or orphan template left some templates unvisited.
    pub fn constraints_triggered(&self) -> bool {
        self.templates != self.specialized()
    }
}

/// Totals over all mined targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GlobalAnalysis {
    pub targets: Vec<TargetAnalysis>,
}

impl GlobalAnalysis {
    pub fn add(&mut self, analysis: TargetAnalysis) {
        self.targets.push(analysis);
    }

    pub fn total(&self, field: impl Fn(&TargetAnalysis) -> usize) -> usize {
        self.targets.iter().map(field).sum()
    }

    pub fn average(&self, field: impl Fn(&TargetAnalysis) -> usize) -> f64 {
        if self.targets.is_empty() {
            return 0.0;
        }
        self.total(field) as f64 / self.targets.len() as f64
    }

    pub fn constrained_targets(&self) -> usize {
        self.targets.iter().filter(|t| t.constraints_triggered()).count()
    }

    pub fn duration(&self) -> Duration {
        self.targets.iter().map(|t| t.duration).sum()
    }
}
