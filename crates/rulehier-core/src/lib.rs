//! Rulehier core: rule hierarchy specialization search for link prediction.
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────────────────┐
//! │  templates   │───►│   Rule       │───►│   Specialization engine  │
//! │ (abstract    │    │  Hierarchy   │    │  workers + work queue    │
//! │  rules)      │    └──────────────┘    │  Context, SearchTimer    │
//! └──────────────┘                        └────────────┬─────────────┘
//!                                                      │ serialized lines
//!                                          ┌───────────▼────────────┐
//!                                          │  RuleWriter x2         │
//!                                          │  index/<target>.txt    │
//!                                          │  rules.txt             │
//!                                          └───────────┬────────────┘
//!                                                      │ re-sorted index
//!                       ┌──────────────────┐   ┌───────▼────────┐
//!                       │  ModelSelection  │◄──│ rule application│
//!                       └──────────────────┘   └────────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Prefix hierarchy**: templates form a tree by body prefix, so one
//!   support bound can prune a whole subtree
//! - **Anchored instantiation**: open templates are bound to one or two
//!   entities and scored per anchor
//! - **Backpressure**: workers block on bounded writer queues, never drop rules
//! - **Cooperative cancellation**: rule caps and a wall-clock budget are
//!   polled throughout the search
//! - **Model selection**: a size x ranking grid is scored by F1 on the test split

pub mod application;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod hierarchy;
pub mod metrics;
pub mod miner;
pub mod persist;
pub mod pool;
pub mod rule;
pub mod selection;
pub mod specialize;
pub mod stats;
pub mod timer;
pub mod writer;

pub use application::ApplicationReport;
pub use config::MinerConfig;
pub use context::{AppliedRule, Context, RulePredictions};
pub use error::{ConfigError, HierarchyError, MineError, RuleParseError};
pub use filter::FilterSet;
pub use hierarchy::{subsumes, RuleHierarchy};
pub use metrics::{GlobalAnalysis, RuleMetrics, TargetAnalysis};
pub use miner::{TargetMiner, TargetPredictions};
pub use rule::{Anchoring, InsRuleSummary, RuleKind, Template, TemplateId};
pub use selection::{Coverage, Model, ModelSelection, RankingMeasure};
pub use stats::{Measures, QualificationGate, QualityMeasure, RuleStats};
pub use timer::SearchTimer;
