//! Best-first search driven by the random-completion evaluator.

use std::sync::Arc;

use arbor_harness::runner::completions_digest;
use arbor_harness::worlds::dead_end::DeadEndTree;
use arbor_harness::worlds::synthetic_tree::SyntheticTree;
use arbor_harness::worlds::weighted_grid::{Cell, Move, WeightedGrid};
use arbor_kernel::annotation::{F_SAMPLES, TIME_TO_SOLUTION};
use arbor_search::best_first::BestFirst;
use arbor_search::error::SearchError;
use arbor_search::evaluator::{DynEvaluator, RandomCompletionEvaluator, RolloutConfig};
use arbor_search::listener::CollectingListener;
use arbor_search::policy::ParentDiscarding;
use lock_tests::{drain, drain_checked, inline_policy};

fn rollout(seed: u64) -> Arc<RandomCompletionEvaluator<Vec<u8>, u8, f64>> {
    let config = RolloutConfig {
        samples: 2,
        max_samples: 8,
        seed,
        ..RolloutConfig::default()
    };
    Arc::new(RandomCompletionEvaluator::new(SyntheticTree::leaf_cost_evaluator(), config).unwrap())
}

#[test]
fn rollout_search_reports_every_leaf_with_its_cost() {
    let eval = rollout(11);
    let dyn_eval: DynEvaluator<Vec<u8>, u8, f64> = eval.clone();
    let mut search = BestFirst::new(
        Arc::new(SyntheticTree::new(2, 3)),
        dyn_eval,
        inline_policy(ParentDiscarding::None),
    )
    .unwrap();
    let solutions = drain_checked(&mut search);

    assert_eq!(solutions.len(), 8);
    for s in &solutions {
        assert!((s.score - SyntheticTree::cost(s.path.head())).abs() < f64::EPSILON);
    }
    assert!(solutions.iter().any(|s| s.score.abs() < f64::EPSILON));
    // The root's score is the best of its samples.
    let root_samples = search.annotations_of(&vec![]).unwrap();
    assert!(root_samples.contains(F_SAMPLES));
    assert!(eval.posted_count() <= 8);
}

#[test]
fn evaluator_reported_solutions_reach_listeners() {
    let eval = rollout(3);
    let mut search = BestFirst::new(
        Arc::new(SyntheticTree::new(2, 4)),
        eval as DynEvaluator<Vec<u8>, u8, f64>,
        inline_policy(ParentDiscarding::None),
    )
    .unwrap();
    let listener: Arc<CollectingListener<Vec<u8>, u8, f64>> = Arc::new(CollectingListener::new());
    search.register_listener(listener.clone());
    let solutions = drain(&mut search);

    let heard = listener.found();
    assert_eq!(heard.len(), solutions.len());
    assert_eq!(heard.len(), 16);
    // Rollout timings follow as annotation events after each found event.
    let annotated = listener.annotations();
    assert!(annotated.iter().any(|(_, key, _)| key == TIME_TO_SOLUTION));
    for (path, _, _) in &annotated {
        assert!(heard.iter().any(|s| s.path.points() == path.points()));
    }
    // Solutions still queued when their timings arrive carry them when pulled.
    assert!(solutions.iter().any(|s| s.annotations.contains(TIME_TO_SOLUTION)));
}

#[test]
fn rollouts_over_a_lattice_never_prune_reachable_cells() {
    // Every cell of the grid reaches the goal, but most are entered from two
    // parents; later parents must still find completions through arcs the
    // earlier ones explored.
    let grid = Arc::new(WeightedGrid::new(4, 4));
    let config = RolloutConfig {
        samples: 2,
        max_samples: 4,
        seed: 3,
        ..RolloutConfig::default()
    };
    let eval = Arc::new(RandomCompletionEvaluator::new(WeightedGrid::path_cost_solution_evaluator(), config).unwrap());
    let dyn_eval: DynEvaluator<Cell, Move, u32> = eval.clone();
    let mut search = BestFirst::new(grid.clone(), dyn_eval, inline_policy(ParentDiscarding::All)).unwrap();
    let solutions = drain(&mut search);

    assert_eq!(search.stats().pruned, 0);
    assert!(!solutions.is_empty());
    let distinct: std::collections::HashSet<Vec<Cell>> =
        solutions.iter().map(|s| s.path.points().to_vec()).collect();
    assert_eq!(distinct.len(), solutions.len());
    for s in &solutions {
        assert_eq!(s.path.head(), &grid.goal());
        assert_eq!(s.score, WeightedGrid::path_cost(&s.path));
        assert!(s.score >= grid.optimal_cost());
    }
    assert!(eval.posted_count() > 0);
}

#[test]
fn hopeless_root_is_not_evaluable() {
    let eval = rollout(0);
    let mut search = BestFirst::new(
        Arc::new(DeadEndTree::hopeless(3)),
        eval as DynEvaluator<Vec<u8>, u8, f64>,
        inline_policy(ParentDiscarding::None),
    )
    .unwrap();
    let err = search.next_solution().unwrap_err();
    assert!(matches!(err, SearchError::RootNotEvaluable { .. }), "{err:?}");
    // The failure is sticky.
    assert_eq!(search.next_solution().unwrap_err(), err);
}

#[test]
fn sparse_goals_are_found_through_dead_ends() {
    let eval = rollout(5);
    let mut search = BestFirst::new(
        Arc::new(DeadEndTree::new(4)),
        eval as DynEvaluator<Vec<u8>, u8, f64>,
        inline_policy(ParentDiscarding::None),
    )
    .unwrap();
    let solutions = drain(&mut search);
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].path.head(), &vec![1, 1, 1, 1]);
    // Subtrees without a goal have no viable completion and are pruned.
    assert!(search.stats().pruned > 0);
}

#[test]
fn same_seed_draws_same_completions() {
    let sampled = |seed: u64| {
        let eval = rollout(seed);
        let dyn_eval: DynEvaluator<Vec<u8>, u8, f64> = eval.clone();
        let mut search = BestFirst::new(
            Arc::new(SyntheticTree::new(3, 3)),
            dyn_eval,
            inline_policy(ParentDiscarding::None),
        )
        .unwrap();
        let order: Vec<Vec<u8>> = drain(&mut search).into_iter().map(|s| s.path.head().clone()).collect();
        (completions_digest(&eval.sampled_completions()).unwrap(), order)
    };
    let (digest_a, order_a) = sampled(42);
    let (digest_b, order_b) = sampled(42);
    assert_eq!(digest_a, digest_b);
    assert_eq!(order_a, order_b);
}

#[test]
fn invalid_rollout_config_is_rejected() {
    let config = RolloutConfig {
        samples: 4,
        max_samples: 2,
        ..RolloutConfig::default()
    };
    let err = RandomCompletionEvaluator::<Vec<u8>, u8, f64>::new(SyntheticTree::leaf_cost_evaluator(), config)
        .err()
        .unwrap();
    assert!(matches!(err, SearchError::Configuration { .. }));
}
