//! Best-first search over the reference worlds: solution discovery,
//! duplicate handling under each parent-discarding policy, and agreement
//! between inline and pooled evaluation.

use std::collections::BTreeSet;
use std::sync::Arc;

use arbor_harness::worlds::synthetic_tree::SyntheticTree;
use arbor_harness::worlds::weighted_grid::WeightedGrid;
use arbor_kernel::contract::{GraphContract, Successor};
use arbor_search::best_first::{BestFirst, SearchStatus};
use arbor_search::evaluator::{DynEvaluator, EvalNode, FnEvaluator};
use arbor_search::graph::{SuccessorOutcome, TerminationReason};
use arbor_search::policy::{ParentDiscarding, SearchPolicy};
use lock_tests::{drain, drain_checked, inline_policy};

const POLICIES: [ParentDiscarding; 3] = [
    ParentDiscarding::None,
    ParentDiscarding::OpenOnly,
    ParentDiscarding::All,
];

#[test]
fn tree_yields_every_leaf_once_cheapest_first() {
    let tree = Arc::new(SyntheticTree::new(3, 3));
    let mut search = BestFirst::new(
        tree,
        SyntheticTree::accumulated_cost_evaluator(),
        inline_policy(ParentDiscarding::None),
    )
    .unwrap();
    let solutions = drain_checked(&mut search);

    assert_eq!(solutions.len(), 27);
    assert!(solutions[0].score.abs() < f64::EPSILON);
    assert_eq!(solutions[0].path.head(), &vec![0, 0, 0]);
    let distinct: BTreeSet<Vec<u8>> = solutions.iter().map(|s| s.path.head().clone()).collect();
    assert_eq!(distinct.len(), 27);
    for s in &solutions {
        assert!((s.score - SyntheticTree::cost(s.path.head())).abs() < f64::EPSILON);
    }

    let stats = search.stats();
    assert_eq!(stats.expanded, 13);
    assert_eq!(stats.created, 40);
    assert_eq!(search.status(), SearchStatus::Exhausted);
    assert_eq!(search.search_graph().metadata.termination, TerminationReason::Exhausted);
}

#[test]
fn grid_reaches_optimal_cost_under_every_policy() {
    let grid = WeightedGrid::new(4, 4);
    let optimal = grid.optimal_cost();
    for policy in POLICIES {
        let mut search = BestFirst::new(
            Arc::new(WeightedGrid::new(4, 4)),
            WeightedGrid::path_cost_evaluator(),
            inline_policy(policy),
        )
        .unwrap();
        let solutions = drain_checked(&mut search);
        let best = solutions.iter().map(|s| s.score).min().unwrap();
        assert_eq!(best, optimal, "{policy:?}");
        for s in &solutions {
            assert_eq!(s.score, WeightedGrid::path_cost(&s.path), "{policy:?}");
        }
        // Uniform-cost order pops every cell at its cheapest cost first, so
        // no cell is expanded twice and nothing is reopened.
        let stats = search.stats();
        assert_eq!(stats.expanded, 15, "{policy:?}");
        assert_eq!(stats.reopened, 0, "{policy:?}");
        // Each of the 8 inner non-goal cells is generated twice.
        assert_eq!(stats.discarded + stats.replaced, 8, "{policy:?}");
        assert_eq!(solutions.len(), 2, "{policy:?}");
    }
}

/// `s → a → c → t` and `s → b → c → t`. Arc labels are costs. The
/// heuristic overrates `a`, so `c` is first expanded via `b` at cost 6 and
/// only later reached via `a` at cost 2.
struct Detour;

impl GraphContract<&'static str, u32> for Detour {
    fn graph_id(&self) -> &str {
        "detour"
    }

    fn roots(&self) -> Vec<&'static str> {
        vec!["s"]
    }

    fn successors(&self, point: &&'static str) -> Vec<Successor<&'static str, u32>> {
        match *point {
            "s" => vec![Successor::new(1, "a"), Successor::new(5, "b")],
            "a" => vec![Successor::new(1, "c")],
            "b" => vec![Successor::new(1, "c")],
            "c" => vec![Successor::new(1, "t")],
            _ => Vec::new(),
        }
    }

    fn is_goal(&self, point: &&'static str) -> bool {
        *point == "t"
    }
}

fn detour_evaluator() -> DynEvaluator<&'static str, u32, u32> {
    Arc::new(FnEvaluator::new(|node: &EvalNode<&'static str, u32, u32>| {
        let g: u32 = node.path.arcs().iter().sum();
        let h = if *node.head() == "a" { 10 } else { 0 };
        Some(g + h)
    }))
}

#[test]
fn reopening_finds_cheaper_route_only_with_all() {
    let mut all = BestFirst::new(Arc::new(Detour), detour_evaluator(), inline_policy(ParentDiscarding::All)).unwrap();
    let scores: Vec<u32> = drain_checked(&mut all).iter().map(|s| s.score).collect();
    assert_eq!(scores, vec![7, 3]);
    assert_eq!(all.stats().reopened, 1);
    assert_eq!(all.parent_of(&"c"), Some("a"));
    assert!(all
        .search_graph()
        .outcomes()
        .any(|o| matches!(o, SuccessorOutcome::Reopened { score, .. } if (*score - 2.0).abs() < f64::EPSILON)));

    for policy in [ParentDiscarding::None, ParentDiscarding::OpenOnly] {
        let mut search = BestFirst::new(Arc::new(Detour), detour_evaluator(), inline_policy(policy)).unwrap();
        let scores: Vec<u32> = drain_checked(&mut search).iter().map(|s| s.score).collect();
        assert_eq!(scores, vec![7], "{policy:?}");
        assert_eq!(search.stats().reopened, 0);
        assert_eq!(search.parent_of(&"c"), Some("b"), "{policy:?}");
    }
}

#[test]
fn pool_finds_the_same_solutions_as_inline() {
    let leaves = |workers: usize| {
        let policy = SearchPolicy {
            worker_threads: workers,
            ..SearchPolicy::default()
        };
        let mut search = BestFirst::new(
            Arc::new(SyntheticTree::new(3, 3)),
            SyntheticTree::accumulated_cost_evaluator(),
            policy,
        )
        .unwrap();
        drain(&mut search)
            .into_iter()
            .map(|s| s.path.head().clone())
            .collect::<BTreeSet<Vec<u8>>>()
    };
    let inline = leaves(0);
    assert_eq!(inline.len(), 27);
    assert_eq!(leaves(4), inline);
}

#[test]
fn inspection_reflects_search_state() {
    let mut search = BestFirst::new(
        Arc::new(SyntheticTree::new(2, 2)),
        SyntheticTree::accumulated_cost_evaluator(),
        inline_policy(ParentDiscarding::None),
    )
    .unwrap();
    search.initialize().unwrap();
    assert_eq!(search.open_points(), vec![Vec::<u8>::new()]);

    let first = search.next_solution().unwrap().unwrap();
    assert_eq!(first.path.head(), &vec![0, 0]);
    assert!(search.is_expanded(&vec![]));
    assert!(search.is_expanded(&vec![0]));
    assert!(search.is_open(&vec![1]));
    assert_eq!(search.parent_of(&vec![1]), Some(vec![]));
    assert_eq!(search.path_to(&vec![0, 1]).unwrap().depth(), 2);
    assert!(search.score_of(&vec![1]).is_some());
    let annotations = search.annotations_of(&vec![1]).unwrap();
    assert!(annotations.contains(arbor_kernel::annotation::F));
    assert!(annotations.contains(arbor_kernel::annotation::F_TIME));
}
