//! Rule hierarchy tests

use proptest::prelude::*;
use rulehier_core::*;
use rulehier_graph::Direction;
use std::collections::BTreeSet;

fn closed(text: &str) -> Template {
    Template::parse_rule(RuleKind::Closed, text).unwrap()
}

fn open(text: &str) -> Template {
    Template::parse_rule(RuleKind::Open, text).unwrap()
}

/// Every template reachable from the root by repeated child queries.
fn reachable(hierarchy: &RuleHierarchy) -> Vec<TemplateId> {
    let mut out = Vec::new();
    let mut stack = hierarchy.init_query_map();
    while let Some(t) = stack.pop() {
        out.push(t);
        stack.extend(hierarchy.children(t).unwrap());
    }
    out
}

// ============================================================================
// Build Tests
// ============================================================================

#[test]
fn test_two_length_one_templates_hang_under_root() {
    let templates = vec![closed("p(X,Y) <- q(X,Y)"), closed("p(X,Y) <- r(X,Y)")];
    let hierarchy = RuleHierarchy::build(&templates).unwrap();

    assert_eq!(hierarchy.len(), 2);
    assert_eq!(hierarchy.size_root(), 2);
    assert_eq!(hierarchy.parent(0), None);
    assert!(hierarchy.orphans().is_empty());

    let mut roots = hierarchy.init_query_map();
    roots.sort_unstable();
    assert_eq!(roots, vec![0, 1]);
}

#[test]
fn test_children_before_discovery_is_a_contract_violation() {
    let templates = vec![closed("p(X,Y) <- q(X,Y)"), closed("p(X,Y) <- r(X,Y)")];
    let hierarchy = RuleHierarchy::build(&templates).unwrap();

    assert_eq!(
        hierarchy.children(0),
        Err(HierarchyError::NotDiscovered { template: 0 })
    );
    assert_eq!(
        hierarchy.children(7),
        Err(HierarchyError::UnknownTemplate { template: 7 })
    );

    hierarchy.init_query_map();
    assert!(hierarchy.is_discovered(0));
    assert_eq!(hierarchy.children(0), Ok(vec![]));
}

#[test]
fn test_longer_templates_attach_to_their_prefix() {
    let templates = vec![
        closed("p(X,Y) <- q(X,A), r(A,Y)"),
        open("p(X,Y) <- q(X,A)"),
        open("p(X,Y) <- q(X,A), s(A,B)"),
        open("p(X,Y) <- t(Y,A)"),
        closed("p(X,Y) <- t(Y,A), u(A,X)"),
    ];
    let hierarchy = RuleHierarchy::build(&templates).unwrap();

    assert_eq!(hierarchy.parent(0), Some(1));
    assert_eq!(hierarchy.parent(2), Some(1));
    assert_eq!(hierarchy.parent(4), Some(3));
    assert_eq!(hierarchy.size(1), Ok(2));
    assert_eq!(hierarchy.size(3), Ok(1));
    assert_eq!(hierarchy.size_root(), 5);

    hierarchy.init_query_map();
    let mut children = hierarchy.children(1).unwrap();
    children.sort_unstable();
    assert_eq!(children, vec![0, 2]);
    assert!(hierarchy.is_discovered(0));
    assert!(!hierarchy.is_discovered(4));
}

#[test]
fn test_template_without_prefix_is_orphaned() {
    let templates = vec![
        open("p(X,Y) <- q(X,A)"),
        closed("p(X,Y) <- r(X,A), q(A,Y)"),
    ];
    let hierarchy = RuleHierarchy::build(&templates).unwrap();

    assert_eq!(hierarchy.orphans(), vec![1]);
    assert_eq!(hierarchy.size_root(), 1);
    assert_eq!(reachable(&hierarchy), vec![0]);
}

#[test]
fn test_parent_choice_ignores_input_order() {
    let a = vec![
        open("p(X,Y) <- q(X,A)"),
        open("p(X,Y) <- q(X,A), r(A,B)"),
        open("p(X,Y) <- q(X,A), s(A,B)"),
    ];
    let mut b = a.clone();
    b.reverse();
    let ha = RuleHierarchy::build(&a).unwrap();
    let hb = RuleHierarchy::build(&b).unwrap();
    assert_eq!(ha.parent(1), Some(0));
    assert_eq!(hb.parent(1), Some(2));
    assert_eq!(ha.size(0), hb.size(2));
}

// ============================================================================
// Subsumption Tests
// ============================================================================

#[test]
fn test_subsumption_is_positional_prefix() {
    let short = open("p(X,Y) <- q(X,A)");
    let long = closed("p(X,Y) <- q(X,A), r(A,Y)");
    let other = closed("p(X,Y) <- r(X,A), q(A,Y)");

    assert_eq!(subsumes(&short, &long), Ok(true));
    assert_eq!(subsumes(&short, &other), Ok(false));
    assert_eq!(subsumes(&short, &short), Ok(true));
}

#[test]
fn test_subsumption_rejects_longer_left_rule() {
    let short = open("p(X,Y) <- q(X,A)");
    let long = closed("p(X,Y) <- q(X,A), r(A,Y)");
    assert_eq!(
        subsumes(&long, &short),
        Err(HierarchyError::SubsumptionOrder { left: 2, right: 1 })
    );
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[test]
fn test_concurrent_children_queries_agree() {
    let templates = vec![
        open("p(X,Y) <- q(X,A)"),
        open("p(X,Y) <- q(X,A), r(A,B)"),
        open("p(X,Y) <- q(X,A), s(A,B)"),
        closed("p(X,Y) <- q(X,A), r(A,Y)"),
    ];
    let hierarchy = RuleHierarchy::build(&templates).unwrap();
    hierarchy.init_query_map();
    let size_before = hierarchy.size_root();

    let results: Vec<BTreeSet<TemplateId>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| hierarchy.children(0).unwrap().into_iter().collect()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(results[0].len(), 3);
    assert_eq!(hierarchy.size_root(), size_before);
}

// ============================================================================
// Property Tests
// ============================================================================

fn template_strategy() -> impl Strategy<Value = Template> {
    (
        any::<bool>(),
        any::<bool>(),
        prop::collection::vec((0usize..3, any::<bool>()), 1..=3),
    )
        .prop_map(|(is_closed, from_subject, hops)| {
            let kind = if is_closed { RuleKind::Closed } else { RuleKind::Open };
            let steps = hops.into_iter().map(|(pred, out)| {
                let direction = if out { Direction::Outgoing } else { Direction::Incoming };
                (["q", "r", "s"][pred].to_string(), direction)
            });
            Template::new(kind, "p", from_subject, steps)
        })
}

fn templates_strategy() -> impl Strategy<Value = Vec<Template>> {
    prop::collection::vec(template_strategy(), 1..24).prop_map(|templates| {
        let mut seen = BTreeSet::new();
        templates
            .into_iter()
            .filter(|t| seen.insert(t.index_string()))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn children_extend_their_parent_by_one_atom(templates in templates_strategy()) {
        let hierarchy = RuleHierarchy::build(&templates).unwrap();
        for (id, template) in templates.iter().enumerate() {
            if let Some(parent) = hierarchy.parent(id) {
                let parent = &templates[parent];
                prop_assert_eq!(parent.len() + 1, template.len());
                prop_assert_eq!(&template.body[..parent.len()], &parent.body[..]);
            }
        }
    }

    #[test]
    fn root_size_counts_reachable_templates(templates in templates_strategy()) {
        let hierarchy = RuleHierarchy::build(&templates).unwrap();
        let size = hierarchy.size_root();
        let reached = reachable(&hierarchy);
        prop_assert_eq!(reached.len(), size);
        prop_assert_eq!(hierarchy.size_root(), size);
    }

    #[test]
    fn subtree_sizes_add_up(templates in templates_strategy()) {
        let hierarchy = RuleHierarchy::build(&templates).unwrap();
        let roots = hierarchy.init_query_map();
        let total: usize = roots.iter().map(|&t| hierarchy.size(t).unwrap() + 1).sum();
        prop_assert_eq!(total, hierarchy.size_root());
    }

    #[test]
    fn subsumption_matches_prefix((a, b) in (template_strategy(), template_strategy())) {
        let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
        let expected = short.body.iter().zip(&long.body).all(|(x, y)| x == y);
        prop_assert_eq!(subsumes(short, long), Ok(expected));
        if short.len() < long.len() {
            prop_assert!(subsumes(long, short).is_err());
        }
    }
}
