//! Dataset layout and run configuration.
//!
//! A dataset home holds:
//!
//! ```text
//! <home>/data/train.txt     subject<TAB>predicate<TAB>object
//! <home>/data/valid.txt
//! <home>/data/test.txt
//! <home>/templates.txt      <id><TAB><CAR|OAR><TAB><rule>
//! ```
//!
//! The graph is built from the training split only; validation and test
//! entities are registered without edges so their pairs can be classified.

use ahash::{AHashMap, AHashSet};
use anyhow::{Context, Result};
use rulehier_core::{FilterSet, MinerConfig, Template};
use rulehier_graph::io::{read_triples, Triple};
use rulehier_graph::{EntityId, Pair, TripleGraph};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

// ============================================================================
// Run configuration
// ============================================================================

/// JSON run file: dataset location, outputs, targets and miner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub home: PathBuf,
    /// Defaults to `<home>/out`.
    #[serde(default)]
    pub out: Option<PathBuf>,
    /// Defaults to every predicate of the test split.
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(flatten)]
    pub miner: MinerConfig,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config
            .miner
            .validate()
            .with_context(|| format!("validating config {}", path.display()))?;

        // Relative paths are taken from the config file's directory.
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        if config.home.is_relative() {
            config.home = base.join(&config.home);
        }
        if let Some(out) = config.out.as_mut() {
            if out.is_relative() {
                *out = base.join(&*out);
            }
        }
        Ok(config)
    }

    pub fn out_dir(&self) -> PathBuf {
        self.out.clone().unwrap_or_else(|| self.home.join("out"))
    }

    pub fn rules_file(&self) -> PathBuf {
        self.out_dir().join("rules.txt")
    }

    pub fn index_file(&self, target: &str) -> PathBuf {
        self.out_dir()
            .join("index")
            .join(format!("{}.txt", file_stem(target)))
    }

    pub fn selection_file(&self, target: &str) -> PathBuf {
        self.out_dir()
            .join("selection")
            .join(format!("{}.json", file_stem(target)))
    }
}

/// Predicate names may contain path separators (`/film/genre`).
pub fn file_stem(target: &str) -> String {
    let stem: String = target
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    stem.trim_start_matches('.').to_string()
}

// ============================================================================
// Splits
// ============================================================================

/// One split's pairs, grouped by predicate.
#[derive(Debug, Default)]
pub struct Split {
    by_predicate: AHashMap<String, Vec<Pair>>,
}

impl Split {
    fn push(&mut self, predicate: &str, pair: Pair) {
        self.by_predicate
            .entry(predicate.to_string())
            .or_default()
            .push(pair);
    }

    pub fn pairs<'a>(&'a self, predicate: &str) -> impl Iterator<Item = Pair> + 'a {
        self.by_predicate
            .get(predicate)
            .into_iter()
            .flatten()
            .copied()
    }

    pub fn predicates(&self) -> BTreeSet<&str> {
        self.by_predicate.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.by_predicate.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_predicate.is_empty()
    }
}

// ============================================================================
// Dataset
// ============================================================================

pub struct Dataset {
    pub graph: TripleGraph,
    pub train: Split,
    pub valid: Split,
    pub test: Split,
    train_entities: AHashSet<EntityId>,
    templates: BTreeMap<String, Vec<Template>>,
}

impl Dataset {
    pub fn load(home: &Path) -> Result<Self> {
        let data = home.join("data");
        let graph = TripleGraph::new();

        let mut train = Split::default();
        let mut train_entities = AHashSet::new();
        for triple in read_triples(&data.join("train.txt"))? {
            let pair = graph.add_triple(&triple.sub, &triple.pred, &triple.obj);
            train_entities.insert(pair.sub);
            train_entities.insert(pair.obj);
            train.push(&triple.pred, pair);
        }
        let valid = Self::register(&graph, read_triples(&data.join("valid.txt"))?);
        let test = Self::register(&graph, read_triples(&data.join("test.txt"))?);
        let templates = load_templates(&home.join("templates.txt"))?;
        if test.is_empty() {
            tracing::warn!(home = %home.display(), "test split is empty");
        }

        tracing::info!(
            entities = graph.entity_count(),
            edges = graph.edge_count(),
            predicates = graph.predicate_count(),
            valid = valid.len(),
            test = test.len(),
            templates = templates.values().map(Vec::len).sum::<usize>(),
            "dataset loaded"
        );
        Ok(Self {
            graph,
            train,
            valid,
            test,
            train_entities,
            templates,
        })
    }

    fn register(graph: &TripleGraph, triples: Vec<Triple>) -> Split {
        let mut split = Split::default();
        for triple in triples {
            let pair = Pair::new(graph.add_entity(&triple.sub), graph.add_entity(&triple.obj));
            split.push(&triple.pred, pair);
        }
        split
    }

    /// Configured targets, or every predicate of the test split.
    pub fn targets(&self, configured: &[String]) -> Vec<String> {
        if !configured.is_empty() {
            return configured.to_vec();
        }
        self.test.predicates().into_iter().map(str::to_string).collect()
    }

    pub fn templates(&self, target: &str) -> &[Template] {
        self.templates.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn filter_set(&self, target: &str, config: &MinerConfig) -> FilterSet {
        let mut filter = FilterSet::build_filter_set(
            self.train.pairs(target),
            self.valid.pairs(target),
            self.test.pairs(target),
        );
        if config.filter_unsolvable {
            let removed = filter.filter_unsolvable(&self.train_entities);
            if removed > 0 {
                tracing::info!(predicate = target, removed, "dropped unsolvable pairs");
            }
        }
        tracing::debug!(
            predicate = target,
            train = filter.train().len(),
            valid = filter.valid().len(),
            test = filter.test_set_size(),
            functional = filter.is_target_functional(),
            "filter set built"
        );
        filter
    }
}

/// Templates grouped by head predicate.
pub fn load_templates(path: &Path) -> Result<BTreeMap<String, Vec<Template>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading templates {}", path.display()))?;
    let mut out: BTreeMap<String, Vec<Template>> = BTreeMap::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let template = Template::parse_line(line)
            .with_context(|| format!("{}:{}", path.display(), lineno + 1))?;
        out.entry(template.head_predicate.clone())
            .or_default()
            .push(template);
    }
    Ok(out)
}
