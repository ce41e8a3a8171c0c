//! Shared helpers for the lock tests.
//!
//! Everything here panics on unexpected errors; these are test-only
//! invariants.

use std::collections::HashSet;

use arbor_kernel::contract::{EdgeLabel, Point};
use arbor_kernel::score::Score;
use arbor_search::best_first::BestFirst;
use arbor_search::listener::EvaluatedPath;
use arbor_search::policy::{ParentDiscarding, SearchPolicy};

/// Inline evaluation with the given duplicate policy.
#[must_use]
pub fn inline_policy(parent_discarding: ParentDiscarding) -> SearchPolicy {
    SearchPolicy {
        parent_discarding,
        worker_threads: 0,
        ..SearchPolicy::default()
    }
}

/// Pull solutions until the search reports exhaustion.
///
/// # Panics
///
/// Panics on any search error.
pub fn drain<T: Point, A: EdgeLabel, V: Score>(search: &mut BestFirst<T, A, V>) -> Vec<EvaluatedPath<T, A, V>> {
    let mut out = Vec::new();
    while let Some(found) = search.next_solution().unwrap() {
        out.push(found);
    }
    out
}

/// Same as [`drain`], checking [`assert_search_invariants`] after every step.
///
/// # Panics
///
/// Panics on any search error or violated invariant.
pub fn drain_checked<T: Point, A: EdgeLabel, V: Score>(
    search: &mut BestFirst<T, A, V>,
) -> Vec<EvaluatedPath<T, A, V>> {
    let mut out = Vec::new();
    while let Some(found) = search.next_solution().unwrap() {
        assert_search_invariants(search);
        out.push(found);
    }
    assert_search_invariants(search);
    out
}

/// OPEN and EXPANDED are disjoint, OPEN holds no goal, and every OPEN node
/// hangs below an expanded parent.
///
/// Only meaningful for inline searches, where no evaluation runs between
/// the snapshots taken here.
///
/// # Panics
///
/// Panics with the offending point when an invariant fails.
pub fn assert_search_invariants<T: Point, A: EdgeLabel, V: Score>(search: &BestFirst<T, A, V>) {
    let open = search.open_points();
    let expanded: HashSet<T> = search.expanded_points().into_iter().collect();
    for point in &open {
        assert!(!expanded.contains(point), "{point:?} is both open and expanded");
        if let Some(parent) = search.parent_of(point) {
            assert!(expanded.contains(&parent), "parent {parent:?} of open {point:?} not expanded");
        }
        assert!(search.score_of(point).is_some(), "open {point:?} has no score");
    }
    assert!(!search.goal_on_open(), "goal node on OPEN");
}
