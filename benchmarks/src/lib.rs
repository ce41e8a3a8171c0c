//! Shared helpers for the arbor benchmark suites.

use std::sync::Arc;
use std::time::Duration;

use arbor_harness::worlds::synthetic_tree::SyntheticTree;
use arbor_kernel::contract::{EdgeLabel, Point};
use arbor_kernel::score::Score;
use arbor_search::best_first::BestFirst;
use arbor_search::evaluator::{DelayingEvaluator, DynEvaluator, RandomCompletionEvaluator, RolloutConfig};
use arbor_search::policy::{ParentDiscarding, SearchPolicy};

/// Policy with `workers` evaluation threads (0 = inline).
#[must_use]
pub fn policy(parent_discarding: ParentDiscarding, workers: usize) -> SearchPolicy {
    SearchPolicy {
        parent_discarding,
        worker_threads: workers,
        ..SearchPolicy::default()
    }
}

/// Accumulated-cost evaluator that sleeps `delay` per node, standing in for
/// an expensive heuristic.
#[must_use]
pub fn slow_tree_evaluator(delay: Duration) -> DynEvaluator<Vec<u8>, u8, f64> {
    Arc::new(DelayingEvaluator::new(SyntheticTree::accumulated_cost_evaluator(), delay))
}

/// Seeded random-completion evaluator over [`SyntheticTree`] leaves.
///
/// # Panics
///
/// Panics if the sample configuration is rejected. Benchmark setup failures
/// are fatal.
#[must_use]
pub fn rollout_evaluator(samples: usize, seed: u64) -> DynEvaluator<Vec<u8>, u8, f64> {
    let config = RolloutConfig {
        samples,
        max_samples: samples * 4,
        seed,
        ..RolloutConfig::default()
    };
    Arc::new(
        RandomCompletionEvaluator::new(SyntheticTree::leaf_cost_evaluator(), config)
            .expect("valid rollout config"),
    )
}

/// Pull up to `limit` solutions and return how many were found.
///
/// # Panics
///
/// Panics on any search error.
pub fn pull_solutions<T: Point, A: EdgeLabel, V: Score>(search: &mut BestFirst<T, A, V>, limit: usize) -> usize {
    let mut found = 0;
    while found < limit {
        match search.next_solution().expect("search failed") {
            Some(_) => found += 1,
            None => break,
        }
    }
    found
}
