//! `SyntheticTree`: a uniform tree of fixed branching factor and depth.
//!
//! Points are the label sequences leading to them (`Vec<u8>`), so the tree
//! never revisits a point. Every leaf at full depth is a goal. The cost of a
//! leaf is the sum of its labels, which makes the all-zero leaf the unique
//! optimum and lets tests compute the expected answer directly.

use std::sync::Arc;

use arbor_kernel::contract::{GraphContract, Successor};
use arbor_kernel::path::LabeledPath;
use arbor_search::error::EvalError;
use arbor_search::evaluator::{DynEvaluator, EvalNode, FnEvaluator, FnSolutionEvaluator, SolutionEvaluator};

pub struct SyntheticTree {
    branching: u8,
    depth: usize,
}

impl SyntheticTree {
    #[must_use]
    pub fn new(branching: u8, depth: usize) -> Self {
        Self { branching, depth }
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        usize::from(self.branching).pow(u32::try_from(self.depth).unwrap_or(u32::MAX))
    }

    /// Sum of the labels along `point`.
    #[must_use]
    pub fn cost(point: &[u8]) -> f64 {
        point.iter().map(|&b| f64::from(b)).sum()
    }

    /// Scores every node by the cost accumulated so far. Labels are
    /// non-negative, so this never overestimates a completion.
    #[must_use]
    pub fn accumulated_cost_evaluator() -> DynEvaluator<Vec<u8>, u8, f64> {
        Arc::new(FnEvaluator::new(|node: &EvalNode<Vec<u8>, u8, f64>| {
            Some(Self::cost(node.head()))
        }))
    }

    /// Scores a completed leaf by its cost.
    #[must_use]
    pub fn leaf_cost_evaluator() -> Arc<dyn SolutionEvaluator<Vec<u8>, u8, f64>> {
        Arc::new(FnSolutionEvaluator(|path: &LabeledPath<Vec<u8>, u8>| {
            Ok::<f64, EvalError>(Self::cost(path.head()))
        }))
    }
}

impl GraphContract<Vec<u8>, u8> for SyntheticTree {
    #[allow(clippy::unnecessary_literal_bound)]
    fn graph_id(&self) -> &str {
        "synthetic_tree"
    }

    fn roots(&self) -> Vec<Vec<u8>> {
        vec![Vec::new()]
    }

    fn successors(&self, point: &Vec<u8>) -> Vec<Successor<Vec<u8>, u8>> {
        if point.len() >= self.depth {
            return Vec::new();
        }
        (0..self.branching)
            .map(|label| {
                let mut next = point.clone();
                next.push(label);
                Successor::new(label, next)
            })
            .collect()
    }

    fn is_goal(&self, point: &Vec<u8>) -> bool {
        point.len() == self.depth
    }
}
