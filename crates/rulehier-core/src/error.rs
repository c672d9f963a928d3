//! Error types for the rule miner.
//!
//! Hierarchy contract violations are ordinary values here; whether they end
//! the process is up to the driver.

use crate::rule::TemplateId;
use std::path::PathBuf;

/// Contract violations in the rule hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    #[error("template {template} was specialized before being reached through its parent")]
    NotDiscovered { template: TemplateId },

    #[error("template {template} is not part of this hierarchy")]
    UnknownTemplate { template: TemplateId },

    #[error("subsumption expects the shorter rule first: left has {left} body atoms, right has {right}")]
    SubsumptionOrder { left: usize, right: usize },
}

/// Malformed rule text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleParseError {
    #[error("expected `<id>\\t<CAR|OAR>\\t<rule>`, got {0:?}")]
    MissingFields(String),

    #[error("unknown rule header {0:?} (expected CAR or OAR)")]
    UnknownHeader(String),

    #[error("expected `<head> <- <body>`, got {0:?}")]
    MissingArrow(String),

    #[error("malformed atom {0:?}")]
    MalformedAtom(String),

    #[error("head atom must be `pred(X,Y)`, got {0:?}")]
    BadHead(String),

    #[error("rule body is empty")]
    EmptyBody,

    #[error("body atom {index} does not continue the path at {expected:?}")]
    BrokenChain { index: usize, expected: String },

    #[error("rule body must end at {expected}, ends at {found:?}")]
    BadTail { expected: String, found: String },

    #[error("malformed instantiation record {0:?}")]
    BadRecord(String),
}

/// Invalid miner configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures of a mining pass.
#[derive(Debug, thiserror::Error)]
pub enum MineError {
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error(transparent)]
    Parse(#[from] RuleParseError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Index {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("rule writer for {0} stopped before all rules were written")]
    WriterClosed(PathBuf),

    #[error("worker thread {0} panicked")]
    WorkerPanicked(usize),
}

impl MineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MineError::Io {
            path: path.into(),
            source,
        }
    }
}
