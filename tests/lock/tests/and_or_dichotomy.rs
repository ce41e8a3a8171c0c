//! AND-OR search over nested dichotomies, whose number of complete
//! decompositions is known in closed form.

use std::collections::BTreeSet;
use std::sync::Arc;

use arbor_harness::runner::run_and_or;
use arbor_harness::worlds::nested_dichotomy::{DichotomyPoint, NestedDichotomy};
use arbor_kernel::control::Control;
use arbor_search::and_or::{AndOrSearch, LabelingStrategy, LeastCostSelector, NodeKind};

const STRATEGIES: [LabelingStrategy; 3] = [
    LabelingStrategy::Simple,
    LabelingStrategy::Exhaustive,
    LabelingStrategy::BottomUp,
];

#[test]
fn enumeration_matches_double_factorial() {
    for classes in 2..=5u8 {
        for labeling in STRATEGIES {
            let mut search = AndOrSearch::new(Arc::new(NestedDichotomy::new(classes))).with_labeling(labeling);
            assert!(search.expand_all(&Control::unbounded()).unwrap());
            let all = search.enumerate_solutions();
            let expected = NestedDichotomy::decomposition_count(classes);
            assert_eq!(all.len() as u64, expected, "n={classes} {labeling:?}");
        }
    }
}

#[test]
fn best_solution_is_a_complete_decomposition() {
    for labeling in STRATEGIES {
        let mut search = AndOrSearch::new(Arc::new(NestedDichotomy::new(4))).with_labeling(labeling);
        let solution = search.solve(&Control::unbounded()).unwrap().unwrap();
        assert_eq!(solution.root, DichotomyPoint::Classes(vec![0, 1, 2, 3]));

        // Leaves are exactly the singleton classes.
        let leaves: BTreeSet<DichotomyPoint> = solution.leaves().into_iter().cloned().collect();
        let singletons: BTreeSet<DichotomyPoint> = (0..4).map(|c| DichotomyPoint::Classes(vec![c])).collect();
        assert_eq!(leaves, singletons, "{labeling:?}");

        // Every OR node chose exactly one split; every AND node kept both halves.
        for point in &solution.points {
            let out = solution.edges.iter().filter(|e| &e.from == point).count();
            match search.kind_of(point) {
                Some(NodeKind::Or) if !leaves.contains(point) => assert_eq!(out, 1),
                Some(NodeKind::And) => assert_eq!(out, 2),
                _ => assert_eq!(out, 0),
            }
        }
        assert!(search.is_solved(&solution.root));
    }
}

#[test]
fn selectors_agree_on_solvability() {
    let cost = |p: &DichotomyPoint| match p {
        // Prefer balanced splits.
        DichotomyPoint::Split(l, r) => f64::from(u8::try_from(l.len().abs_diff(r.len())).unwrap_or(u8::MAX)),
        DichotomyPoint::Classes(set) => f64::from(u8::try_from(set.len()).unwrap_or(u8::MAX)),
    };
    let mut search = AndOrSearch::new(Arc::new(NestedDichotomy::new(5)))
        .with_selector(Box::new(LeastCostSelector::new(cost)));
    let solution = search.solve(&Control::unbounded()).unwrap().unwrap();
    assert_eq!(solution.leaves().len(), 5);
    assert!(search.created_count() > 0);
    assert!(search.edge_count() >= solution.edges.len());
}

#[test]
fn run_report_is_reproducible() {
    let run = || {
        run_and_or(
            Arc::new(NestedDichotomy::new(4)),
            LabelingStrategy::Exhaustive,
            true,
            &Control::unbounded(),
        )
        .unwrap()
    };
    let a = run();
    let b = run();
    assert_eq!(a.digest().unwrap(), b.digest().unwrap());
    assert_eq!(a.counter("solution_graphs"), 15);
}
