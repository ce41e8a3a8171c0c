//! Cancellation and timeouts: a canceled or timed-out search returns a
//! distinguished error instead of hanging, for inline and pooled evaluation
//! and for the rollout evaluator's nested search.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use arbor_harness::worlds::nested_dichotomy::NestedDichotomy;
use arbor_harness::worlds::synthetic_tree::SyntheticTree;
use arbor_kernel::contract::{GraphContract, Successor};
use arbor_kernel::control::{CancelToken, Control, Deadline};
use arbor_kernel::path::LabeledPath;
use arbor_search::and_or::AndOrSearch;
use arbor_search::best_first::{BestFirst, SearchStatus};
use arbor_search::error::{EvalError, SearchError};
use arbor_search::evaluator::{
    DelayingEvaluator, DynEvaluator, EvalNode, FnEvaluator, FnSolutionEvaluator, RandomCompletionEvaluator,
    RolloutConfig,
};
use arbor_search::graph::TerminationReason;
use arbor_search::policy::{ParentDiscarding, SearchPolicy};

fn slow_tree_evaluator(delay: Duration) -> DynEvaluator<Vec<u8>, u8, f64> {
    Arc::new(DelayingEvaluator::new(SyntheticTree::accumulated_cost_evaluator(), delay))
}

fn run_until_error(search: &mut BestFirst<Vec<u8>, u8, f64>) -> SearchError {
    loop {
        match search.next_solution() {
            Ok(Some(_)) => {}
            Ok(None) => panic!("search space exhausted before interruption"),
            Err(e) => return e,
        }
    }
}

#[test]
fn cancel_from_another_thread_with_pool() {
    let policy = SearchPolicy {
        worker_threads: 2,
        ..SearchPolicy::default()
    };
    let mut search = BestFirst::new(
        Arc::new(SyntheticTree::new(4, 8)),
        slow_tree_evaluator(Duration::from_millis(2)),
        policy,
    )
    .unwrap();
    let handle = search.handle();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        handle.cancel();
    });

    let started = Instant::now();
    let err = run_until_error(&mut search);
    canceller.join().unwrap();

    assert_eq!(err, SearchError::Canceled);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(search.status(), SearchStatus::Canceled);
    assert_eq!(search.search_graph().metadata.termination, TerminationReason::Canceled);
    // Repeated calls keep reporting cancellation.
    assert_eq!(search.next_solution().unwrap_err(), SearchError::Canceled);
}

/// A chain whose successor generator stalls below the root and never looks
/// at any control.
struct StallingChain {
    stall: Duration,
}

impl GraphContract<u32, ()> for StallingChain {
    fn graph_id(&self) -> &str {
        "stalling_chain"
    }
    fn roots(&self) -> Vec<u32> {
        vec![0]
    }
    fn successors(&self, point: &u32) -> Vec<Successor<u32, ()>> {
        if *point > 0 {
            thread::sleep(self.stall);
        }
        vec![Successor::new((), point + 1)]
    }
    fn is_goal(&self, _point: &u32) -> bool {
        false
    }
}

fn depth_evaluator() -> DynEvaluator<u32, (), u64> {
    Arc::new(FnEvaluator::new(|node: &EvalNode<u32, (), u64>| {
        Some(node.path.depth() as u64)
    }))
}

#[test]
fn cancel_returns_while_successor_generation_blocks() {
    let policy = SearchPolicy {
        worker_threads: 0,
        ..SearchPolicy::default()
    };
    let graph = Arc::new(StallingChain {
        stall: Duration::from_secs(3),
    });
    let mut search = BestFirst::new(graph, depth_evaluator(), policy).unwrap();
    let handle = search.handle();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        handle.cancel();
    });

    let started = Instant::now();
    let err = search.next_solution().unwrap_err();
    canceller.join().unwrap();

    assert_eq!(err, SearchError::Canceled);
    assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());
    assert_eq!(search.status(), SearchStatus::Canceled);
}

#[test]
fn timeout_returns_while_successor_generation_blocks() {
    let policy = SearchPolicy {
        worker_threads: 0,
        timeout: Some(Duration::from_millis(60)),
        ..SearchPolicy::default()
    };
    let graph = Arc::new(StallingChain {
        stall: Duration::from_secs(3),
    });
    let mut search = BestFirst::new(graph, depth_evaluator(), policy).unwrap();
    let started = Instant::now();
    assert_eq!(search.next_solution().unwrap_err(), SearchError::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());
    // The stalled node goes back on OPEN for a resumed search.
    assert_eq!(search.open_points().len(), 1);
}

#[test]
fn global_timeout_inline() {
    let policy = SearchPolicy {
        parent_discarding: ParentDiscarding::None,
        worker_threads: 0,
        timeout: Some(Duration::from_millis(80)),
        ..SearchPolicy::default()
    };
    let mut search = BestFirst::new(
        Arc::new(SyntheticTree::new(4, 8)),
        slow_tree_evaluator(Duration::from_millis(1)),
        policy,
    )
    .unwrap();
    let started = Instant::now();
    let err = run_until_error(&mut search);
    assert_eq!(err, SearchError::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(search.search_graph().metadata.termination, TerminationReason::TimedOut);
}

#[test]
fn cancel_reaches_rollout_sampling() {
    // Every solution evaluation sleeps, so sampling is always in flight.
    let slow = Arc::new(FnSolutionEvaluator(|path: &LabeledPath<Vec<u8>, u8>| {
        thread::sleep(Duration::from_millis(5));
        Ok::<f64, EvalError>(SyntheticTree::cost(path.head()))
    }));
    let config = RolloutConfig {
        samples: 4,
        max_samples: 8,
        seed: 9,
        ..RolloutConfig::default()
    };
    let eval: DynEvaluator<Vec<u8>, u8, f64> = Arc::new(RandomCompletionEvaluator::new(slow, config).unwrap());
    let mut search = BestFirst::new(Arc::new(SyntheticTree::new(4, 8)), eval, SearchPolicy::default()).unwrap();
    let handle = search.handle();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        handle.cancel();
    });
    let err = run_until_error(&mut search);
    canceller.join().unwrap();
    assert!(
        matches!(err, SearchError::Canceled | SearchError::RootNotEvaluable { .. }),
        "{err:?}"
    );
    assert!(search.handle().is_canceled());
}

#[test]
fn and_or_search_honors_control() {
    let token = CancelToken::new();
    token.cancel();
    let canceled = Control::new(token, Deadline::none());
    let mut search = AndOrSearch::new(Arc::new(NestedDichotomy::new(5)));
    assert_eq!(search.solve(&canceled), Err(SearchError::Canceled));

    let expired = Control::new(CancelToken::new(), Deadline::at(Instant::now()));
    let mut search = AndOrSearch::new(Arc::new(NestedDichotomy::new(5)));
    assert_eq!(search.expand_all(&expired), Err(SearchError::TimedOut));
}
