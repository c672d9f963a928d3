//! Triple graph and grounding tests

use rulehier_graph::io::{read_triples, Triple};
use rulehier_graph::*;
use std::io::Write;

fn family() -> TripleGraph {
    TripleGraph::from_triples([
        ("alice", "parent", "bob"),
        ("bob", "parent", "carol"),
        ("alice", "parent", "dave"),
        ("dave", "parent", "erin"),
        ("bob", "sibling", "dave"),
        ("dave", "sibling", "bob"),
        ("erin", "likes", "erin"),
    ])
}

fn id(txn: &GraphReadTxn<'_>, name: &str) -> EntityId {
    txn.entity_id(name).unwrap()
}

fn never() -> bool {
    false
}

// ============================================================================
// String Interning Tests
// ============================================================================

#[test]
fn test_string_interning() {
    let interner = StringInterner::new();

    let id1 = interner.intern("hello");
    let id2 = interner.intern("world");
    let id3 = interner.intern("hello");

    assert_eq!(id1, id3);
    assert_ne!(id1, id2);
    assert_eq!(interner.len(), 2);
    assert_eq!(interner.lookup(id1), Some("hello".to_string()));
    assert_eq!(interner.id_of("world"), Some(id2));
    assert_eq!(interner.id_of("missing"), None);
}

#[test]
fn test_concurrent_interning_agrees() {
    use std::sync::Arc;
    use std::thread;

    let interner = Arc::new(StringInterner::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let interner = Arc::clone(&interner);
            thread::spawn(move || {
                (0..50)
                    .map(|i| interner.intern(&format!("e{i}")))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let results: Vec<Vec<StrId>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for ids in &results[1..] {
        assert_eq!(ids, &results[0]);
    }
    assert_eq!(interner.len(), 50);
}

// ============================================================================
// Graph Construction Tests
// ============================================================================

#[test]
fn test_graph_counts() {
    let graph = family();
    assert_eq!(graph.entity_count(), 5);
    assert_eq!(graph.edge_count(), 7);
    assert_eq!(graph.predicate_count(), 3);

    // Duplicate edges are ignored
    graph.add_triple("alice", "parent", "bob");
    assert_eq!(graph.edge_count(), 7);
}

#[test]
fn test_entity_lookup_roundtrip() {
    let graph = family();
    let isolated = graph.add_entity("zed");
    let txn = graph.read_txn();

    assert_eq!(txn.entity_name(isolated), Some("zed".to_string()));
    let bob = id(&txn, "bob");
    assert_eq!(txn.entity_name(bob), Some("bob".to_string()));
    assert_eq!(txn.entity_id("nobody"), None);
    assert_eq!(txn.entity_name(999), None);
}

// ============================================================================
// Grounding Tests
// ============================================================================

#[test]
fn test_single_step_grounding() {
    let graph = family();
    let txn = graph.read_txn();
    let path = [PathStep::new("parent", Direction::Outgoing)];

    let groundings = txn.ground_body(&path, GroundingMode::Learn, &never);
    assert_eq!(groundings.len(), 4);
    assert!(groundings.contains(&Pair::new(id(&txn, "alice"), id(&txn, "bob"))));
    assert!(groundings.contains(&Pair::new(id(&txn, "dave"), id(&txn, "erin"))));
}

#[test]
fn test_incoming_step_reverses_endpoints() {
    let graph = family();
    let txn = graph.read_txn();
    let path = [PathStep::new("parent", Direction::Incoming)];

    let groundings = txn.ground_body(&path, GroundingMode::Learn, &never);
    assert_eq!(groundings.len(), 4);
    assert!(groundings.contains(&Pair::new(id(&txn, "bob"), id(&txn, "alice"))));
    assert!(!groundings.contains(&Pair::new(id(&txn, "alice"), id(&txn, "bob"))));
}

#[test]
fn test_two_step_grounding_counts_walks() {
    let graph = family();
    let txn = graph.read_txn();
    // grandparent: parent(X,V1), parent(V1,Y)
    let path = [
        PathStep::new("parent", Direction::Outgoing),
        PathStep::new("parent", Direction::Outgoing),
    ];

    let groundings = txn.ground_body(&path, GroundingMode::Learn, &never);
    let alice = id(&txn, "alice");
    assert_eq!(groundings.len(), 2);
    assert!(groundings.contains(&Pair::new(alice, id(&txn, "carol"))));
    assert!(groundings.contains(&Pair::new(alice, id(&txn, "erin"))));
    assert_eq!(groundings.total(), 2);
}

#[test]
fn test_walks_do_not_revisit_intermediates() {
    let graph = family();
    let txn = graph.read_txn();
    // sibling(X,V1), sibling(V1,V2), sibling(V2,Y) would bounce bob->dave->bob->dave
    let path = [
        PathStep::new("sibling", Direction::Outgoing),
        PathStep::new("sibling", Direction::Outgoing),
        PathStep::new("sibling", Direction::Outgoing),
    ];
    let groundings = txn.ground_body(&path, GroundingMode::Learn, &never);
    assert!(groundings.is_empty());
}

#[test]
fn test_self_loops_kept_in_learn_dropped_in_apply() {
    let graph = family();
    let txn = graph.read_txn();
    let bob = id(&txn, "bob");
    let round_trip = [
        PathStep::new("sibling", Direction::Outgoing),
        PathStep::new("sibling", Direction::Outgoing),
    ];

    let learn = txn.ground_body(&round_trip, GroundingMode::Learn, &never);
    assert!(learn.contains(&Pair::new(bob, bob)));

    let apply = txn.ground_body(&round_trip, GroundingMode::Apply, &never);
    assert!(apply.is_empty());

    let likes = [PathStep::new("likes", Direction::Outgoing)];
    assert_eq!(txn.ground_body(&likes, GroundingMode::Learn, &never).len(), 1);
    assert_eq!(txn.ground_body(&likes, GroundingMode::Apply, &never).len(), 0);
}

#[test]
fn test_unknown_predicate_grounds_nothing() {
    let graph = family();
    let txn = graph.read_txn();
    let path = [
        PathStep::new("parent", Direction::Outgoing),
        PathStep::new("employs", Direction::Outgoing),
    ];
    assert!(txn
        .ground_body(&path, GroundingMode::Learn, &never)
        .is_empty());
    assert!(txn.ground_body(&[], GroundingMode::Learn, &never).is_empty());
}

#[test]
fn test_cancelled_grounding_stops_early() {
    let graph = family();
    let txn = graph.read_txn();
    let path = [PathStep::new("parent", Direction::Outgoing)];

    let groundings = txn.ground_body(&path, GroundingMode::Learn, &|| true);
    assert!(groundings.is_empty());
}

#[test]
fn test_counted_set() {
    let mut set: CountedSet<Pair> = CountedSet::new();
    set.insert(Pair::new(1, 2));
    set.insert(Pair::new(1, 2));
    set.insert(Pair::new(2, 3));

    assert_eq!(set.len(), 2);
    assert_eq!(set.total(), 3);
    assert_eq!(set.count(&Pair::new(1, 2)), 2);
    assert_eq!(set.count(&Pair::new(9, 9)), 0);
}

// ============================================================================
// Concurrent Access Tests
// ============================================================================

#[test]
fn test_concurrent_read_transactions() {
    let graph = family();
    let path = [
        PathStep::new("parent", Direction::Outgoing),
        PathStep::new("parent", Direction::Outgoing),
    ];

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let txn = graph.read_txn();
                    txn.ground_body(&path, GroundingMode::Learn, &never).len()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 2);
        }
    });
}

// ============================================================================
// File Reading Tests
// ============================================================================

#[test]
fn test_read_triples_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "alice\tparent\tbob").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "bob\tparent\tcarol").unwrap();

    let triples = read_triples(file.path()).unwrap();
    assert_eq!(
        triples,
        vec![
            Triple::new("alice", "parent", "bob"),
            Triple::new("bob", "parent", "carol"),
        ]
    );
}

#[test]
fn test_malformed_triple_line_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "alice parent").unwrap();

    let err = read_triples(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains(":1"));
}
