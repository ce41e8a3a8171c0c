//! Evaluator decorators composed under a running best-first search.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arbor_harness::worlds::dead_end::DeadEndTree;
use arbor_harness::worlds::synthetic_tree::SyntheticTree;
use arbor_kernel::annotation::F_ERROR;
use arbor_kernel::path::LabeledPath;
use arbor_search::best_first::BestFirst;
use arbor_search::evaluator::{
    AlternativeEvaluator, DelayingEvaluator, DynEvaluator, EvalNode, FnEvaluator,
    RandomizedDepthFirstEvaluator, SkippingEvaluator, TimeLoggingEvaluator,
};
use arbor_search::graph::SuccessorOutcome;
use arbor_search::policy::{ParentDiscarding, SearchPolicy};
use lock_tests::{drain, inline_policy};

type Tree = Vec<u8>;

#[test]
fn time_logging_sees_every_evaluation() {
    let logger = Arc::new(TimeLoggingEvaluator::new(SyntheticTree::accumulated_cost_evaluator()));
    let eval: DynEvaluator<Tree, u8, f64> = logger.clone();
    let mut search = BestFirst::new(Arc::new(SyntheticTree::new(2, 3)), eval, inline_policy(ParentDiscarding::None)).unwrap();
    assert_eq!(drain(&mut search).len(), 8);
    // Root plus 14 successors.
    assert_eq!(logger.logged_count(), 15);
    assert!(logger.time_for(&LabeledPath::root(Vec::new())).is_some());
}

#[test]
fn alternative_falls_back_to_secondary() {
    // Primary only knows the left half of the tree.
    let primary: DynEvaluator<Tree, u8, f64> = Arc::new(FnEvaluator::new(|node: &EvalNode<Tree, u8, f64>| {
        (node.head().first() != Some(&1)).then_some(0.0)
    }));
    let secondary_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&secondary_calls);
    let secondary: DynEvaluator<Tree, u8, f64> = Arc::new(FnEvaluator::new(move |node: &EvalNode<Tree, u8, f64>| {
        counter.fetch_add(1, Ordering::Relaxed);
        Some(SyntheticTree::cost(node.head()))
    }));
    let eval: DynEvaluator<Tree, u8, f64> = Arc::new(AlternativeEvaluator::new(primary, secondary));
    let mut search = BestFirst::new(Arc::new(SyntheticTree::new(2, 2)), eval, inline_policy(ParentDiscarding::None)).unwrap();
    assert_eq!(drain(&mut search).len(), 4);
    // [1], [1, 0], [1, 1].
    assert_eq!(secondary_calls.load(Ordering::Relaxed), 3);
}

#[test]
fn skipping_with_certainty_reuses_parent_scores() {
    let skipper = Arc::new(SkippingEvaluator::new(SyntheticTree::accumulated_cost_evaluator(), 1.0, 7).unwrap());
    let eval: DynEvaluator<Tree, u8, f64> = skipper.clone();
    let mut search = BestFirst::new(Arc::new(SyntheticTree::new(2, 2)), eval, inline_policy(ParentDiscarding::None)).unwrap();
    let solutions = drain(&mut search);
    assert_eq!(solutions.len(), 4);
    // Only the root is scored; everything below inherits 0.
    assert!(solutions.iter().all(|s| s.score.abs() < f64::EPSILON));
    assert_eq!(skipper.skipped(), 6);
    assert!(SkippingEvaluator::<Tree, u8, f64>::new(SyntheticTree::accumulated_cost_evaluator(), 1.5, 0).is_err());
}

#[test]
fn node_timeout_uses_fallback_without_losing_the_search() {
    let slow: DynEvaluator<Tree, u8, f64> = Arc::new(DelayingEvaluator::new(
        SyntheticTree::accumulated_cost_evaluator(),
        Duration::from_millis(200),
    ));
    let fallback: DynEvaluator<Tree, u8, f64> = Arc::new(FnEvaluator::new(|node: &EvalNode<Tree, u8, f64>| {
        Some(100.0 + SyntheticTree::cost(node.head()))
    }));
    let policy = SearchPolicy {
        node_timeout: Some(Duration::from_millis(20)),
        ..inline_policy(ParentDiscarding::None)
    };
    let mut search = BestFirst::builder(Arc::new(SyntheticTree::new(2, 1)), slow)
        .policy(policy)
        .timeout_fallback(fallback)
        .build()
        .unwrap();
    let solutions = drain(&mut search);
    assert_eq!(solutions.len(), 2);
    assert!(solutions.iter().all(|s| s.score >= 100.0));
    // The root also times out, but only successors are counted.
    assert_eq!(search.stats().timed_out, 2);
    assert!(search.score_of(&vec![]).is_some_and(|s| s >= 100.0));
    let annotations = search.annotations_of(&vec![0]).unwrap();
    assert_eq!(annotations.get(F_ERROR).and_then(|v| v.as_str()), Some("timeout"));
}

#[test]
fn randomized_depth_first_dives() {
    let eval: DynEvaluator<Tree, u8, f64> = Arc::new(RandomizedDepthFirstEvaluator::new(1));
    let mut search = BestFirst::new(Arc::new(DeadEndTree::new(5)), eval, inline_policy(ParentDiscarding::None)).unwrap();
    let first = search.next_solution().unwrap().unwrap();
    assert_eq!(first.path.head(), &vec![1; 5]);
    // 31 inner nodes and 31 dead-end leaves at most.
    assert!(search.stats().expanded <= 62);
    assert!(!search
        .search_graph()
        .outcomes()
        .any(|o| matches!(o, SuccessorOutcome::Failed { .. })));
}
