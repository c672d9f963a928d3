//! Integration tests for the complete Rulehier pipeline
//!
//! These tests run learning and application end to end:
//! - Triple files → graph → filter sets
//! - Templates → hierarchy → rule index and rules file
//! - Rule index → predictions → model selection
//!
//! Run with: cargo test --test integration_tests

use approx::assert_abs_diff_eq;
use rulehier_core::persist::{order_rule_file, read_rule_index, IndexEntry};
use rulehier_core::specialize::OutputFiles;
use rulehier_core::*;
use rulehier_graph::io::read_triples;
use rulehier_graph::{Pair, TripleGraph};
use std::path::Path;
use tempfile::tempdir;

struct Loaded {
    graph: TripleGraph,
    filter: FilterSet,
}

/// Build the graph from `train.txt` and the `p` filter set from all splits.
fn load(dir: &Path) -> Loaded {
    let graph = TripleGraph::new();
    let mut train = Vec::new();
    for t in read_triples(&dir.join("train.txt")).unwrap() {
        let pair = graph.add_triple(&t.sub, &t.pred, &t.obj);
        if t.pred == "p" {
            train.push(pair);
        }
    }
    let split = |name: &str| -> Vec<Pair> {
        read_triples(&dir.join(name))
            .unwrap()
            .into_iter()
            .filter(|t| t.pred == "p")
            .map(|t| Pair::new(graph.add_entity(&t.sub), graph.add_entity(&t.obj)))
            .collect()
    };
    let valid = split("valid.txt");
    let test = split("test.txt");
    Loaded {
        filter: FilterSet::build_filter_set(train, valid, test),
        graph,
    }
}

/// `p` mirrors `q` on 30 of 40 subjects; `r` runs backwards on even subjects below 36.
fn write_dataset(dir: &Path) {
    let mut train = String::new();
    for i in 0..40 {
        train.push_str(&format!("s{i}\tq\to{i}\n"));
        if i % 2 == 0 && i < 36 {
            train.push_str(&format!("o{i}\tr\ts{i}\n"));
        }
    }
    for i in 0..30 {
        train.push_str(&format!("s{i}\tp\to{i}\n"));
    }
    std::fs::write(dir.join("train.txt"), train).unwrap();
    std::fs::write(dir.join("valid.txt"), "s30\tp\to30\ns31\tp\to31\n").unwrap();
    std::fs::write(dir.join("test.txt"), "s32\tp\to32\ns33\tp\to33\ns34\tp\to34\n").unwrap();
}

fn templates() -> Vec<Template> {
    vec![
        Template::parse_rule(RuleKind::Closed, "p(X,Y) <- q(X,Y)").unwrap(),
        Template::parse_rule(RuleKind::Closed, "p(X,Y) <- r(Y,X)").unwrap(),
        Template::parse_rule(RuleKind::Open, "p(X,Y) <- q(X,A)").unwrap(),
    ]
}

fn config() -> MinerConfig {
    MinerConfig {
        support: 2,
        conf: 0.0,
        head_coverage: 0.0,
        thread_number: 2,
        quality_measure: QualityMeasure::StandardConf,
        ms_sizes: Some(vec![1, 2, 5]),
        ..MinerConfig::default()
    }
}

// ============================================================================
// Learn → Apply
// ============================================================================

#[test]
fn test_learn_then_apply_recovers_test_facts() {
    let dir = tempdir().unwrap();
    write_dataset(dir.path());
    let Loaded { graph, filter } = load(dir.path());
    assert_eq!(filter.test_set_size(), 3);

    let files = OutputFiles {
        index: dir.path().join("out").join("index").join("p.txt"),
        rules: dir.path().join("out").join("rules.txt"),
    };
    let miner = TargetMiner::new(&graph, config());
    let analysis = miner.learn("p", &templates(), &filter, &files).unwrap();
    assert_eq!(analysis.templates, 3);
    assert!(!analysis.constraints_triggered());

    // Both closed templates qualify; the open one has no anchor reaching
    // support 2 since every q object is distinct. r is sorted first.
    let index = read_rule_index(&files.index).unwrap();
    let closed: Vec<&IndexEntry> = index.iter().filter(|e| e.template.is_closed()).collect();
    assert_eq!(closed.len(), 2);
    assert_eq!(closed[0].template.to_string(), "p(X,Y) <- r(Y,X)");
    assert_abs_diff_eq!(closed[0].measures.standard_conf, 15.0 / 18.0, epsilon = 1e-5);
    assert_abs_diff_eq!(closed[1].measures.standard_conf, 0.75, epsilon = 1e-5);

    let applied = miner.apply("p", &files.index, &filter).unwrap();
    assert_eq!(applied.report.rules, 2);

    // r alone predicts 18 pairs: 16 known, s32 and s34 both in test.
    // Adding q reaches all three test facts but only at precision 3/8.
    let selection = applied.selection.as_ref().unwrap();
    assert_eq!(selection.models.len(), 9);
    let best = selection.best();
    assert_eq!(best.size, 1);
    assert_eq!(best.ranking, RankingMeasure::Confidence);
    assert_eq!(best.test_support, 2);
    assert_eq!(best.inferred, 2);
    assert_eq!(best.known, 16);
    assert_abs_diff_eq!(best.recall, 2.0 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(best.precision, 1.0);
    assert_abs_diff_eq!(best.f1(), 0.8, epsilon = 1e-12);

    let full = selection
        .models
        .iter()
        .find(|m| m.size == 2 && m.ranking == RankingMeasure::Confidence)
        .unwrap();
    assert_eq!(full.inferred, 8);
    assert_abs_diff_eq!(full.recall, 1.0);
    assert_abs_diff_eq!(full.precision, 3.0 / 8.0);

    // Every pair r predicts is a train, valid or test fact.
    let coverage = applied.coverage.unwrap();
    assert_eq!(coverage.known_all, 32);
    assert_eq!(coverage.explained, 35);
    assert_eq!(coverage.inferred_all, 40);
    assert_eq!(coverage.inferred_quality, 0);

    assert!(order_rule_file(&files.rules).unwrap() >= 2);
}

#[test]
fn test_rerunning_a_target_is_idempotent_on_the_index() {
    let dir = tempdir().unwrap();
    write_dataset(dir.path());
    let Loaded { graph, filter } = load(dir.path());
    let files = OutputFiles {
        index: dir.path().join("index").join("p.txt"),
        rules: dir.path().join("rules.txt"),
    };
    let miner = TargetMiner::new(
        &graph,
        MinerConfig {
            thread_number: 1,
            ..config()
        },
    );

    miner.learn("p", &templates(), &filter, &files).unwrap();
    let first = std::fs::read_to_string(&files.index).unwrap();
    miner.learn("p", &templates(), &filter, &files).unwrap();
    let second = std::fs::read_to_string(&files.index).unwrap();
    assert_eq!(first, second);
}
