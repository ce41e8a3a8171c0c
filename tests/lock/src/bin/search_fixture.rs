//! Runs each engine over a reference world and prints deterministic
//! `key=value` lines for cross-process verification.
//!
//! Usage: `search_fixture`
//!
//! Logs go to stderr and follow `RUST_LOG`; stdout carries only digests
//! and counters.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use arbor_harness::runner::{completions_digest, run_and_or, run_best_first};
use arbor_harness::worlds::nested_dichotomy::NestedDichotomy;
use arbor_harness::worlds::synthetic_tree::SyntheticTree;
use arbor_harness::worlds::weighted_grid::WeightedGrid;
use arbor_kernel::control::Control;
use arbor_search::and_or::LabelingStrategy;
use arbor_search::best_first::BestFirst;
use arbor_search::evaluator::{DynEvaluator, RandomCompletionEvaluator, RolloutConfig};
use arbor_search::policy::{ParentDiscarding, SearchPolicy};

fn inline(parent_discarding: ParentDiscarding) -> SearchPolicy {
    SearchPolicy {
        parent_discarding,
        worker_threads: 0,
        ..SearchPolicy::default()
    }
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .try_init();

    let tree = run_best_first(
        Arc::new(SyntheticTree::new(3, 3)),
        SyntheticTree::accumulated_cost_evaluator(),
        inline(ParentDiscarding::None),
        usize::MAX,
    )
    .expect("tree run failed");
    println!("tree_report_digest={}", tree.digest().expect("tree digest"));
    println!(
        "tree_search_graph_digest={}",
        tree.search_graph_digest.as_deref().expect("tree search graph digest")
    );
    println!("tree_solutions={}", tree.solutions.len());
    println!("tree_termination={}", tree.termination);

    let grid = run_best_first(
        Arc::new(WeightedGrid::new(5, 5)),
        WeightedGrid::path_cost_evaluator(),
        inline(ParentDiscarding::All),
        4,
    )
    .expect("grid run failed");
    println!("grid_report_digest={}", grid.digest().expect("grid digest"));
    println!("grid_expanded={}", grid.counter("expanded"));

    let dichotomy = run_and_or(
        Arc::new(NestedDichotomy::new(4)),
        LabelingStrategy::BottomUp,
        true,
        &Control::unbounded(),
    )
    .expect("and-or run failed");
    println!("dichotomy_report_digest={}", dichotomy.digest().expect("dichotomy digest"));
    println!("dichotomy_solution_graphs={}", dichotomy.counter("solution_graphs"));

    let config = RolloutConfig {
        samples: 2,
        max_samples: 8,
        seed: 17,
        ..RolloutConfig::default()
    };
    let rollout = Arc::new(
        RandomCompletionEvaluator::new(SyntheticTree::leaf_cost_evaluator(), config).expect("rollout config"),
    );
    let eval: DynEvaluator<Vec<u8>, u8, f64> = rollout.clone();
    let mut search = BestFirst::new(Arc::new(SyntheticTree::new(3, 3)), eval, inline(ParentDiscarding::None))
        .expect("rollout search");
    let mut found = 0usize;
    while search.next_solution().expect("rollout search failed").is_some() {
        found += 1;
    }
    println!(
        "rollout_completions_digest={}",
        completions_digest(&rollout.sampled_completions()).expect("completions digest")
    );
    println!("rollout_solutions={found}");
}
