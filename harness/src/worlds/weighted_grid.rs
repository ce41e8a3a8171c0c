//! `WeightedGrid`: a `width × height` lattice DAG with right and down moves.
//!
//! Many paths reach each cell, so duplicate detection matters here: with
//! `ParentDiscarding::None` the search discards re-generated cells, with
//! `All` it reopens cells reached more cheaply. Edge weights are a fixed
//! arithmetic function of the source cell, in `1..=5`.

use std::sync::Arc;

use arbor_kernel::contract::{GraphContract, Successor};
use arbor_kernel::path::LabeledPath;
use arbor_search::error::EvalError;
use arbor_search::evaluator::{DynEvaluator, EvalNode, FnEvaluator, FnSolutionEvaluator, SolutionEvaluator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    Right,
    Down,
}

pub type Cell = (u16, u16);

pub struct WeightedGrid {
    width: u16,
    height: u16,
}

impl WeightedGrid {
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn goal(&self) -> Cell {
        (self.width.saturating_sub(1), self.height.saturating_sub(1))
    }

    #[must_use]
    pub fn weight(from: Cell, mv: Move) -> u32 {
        let (x, y) = (u32::from(from.0), u32::from(from.1));
        match mv {
            Move::Right => 1 + (x * 7 + y * 13) % 5,
            Move::Down => 1 + (x * 11 + y * 3) % 5,
        }
    }

    /// Sum of edge weights along `path`.
    #[must_use]
    pub fn path_cost(path: &LabeledPath<Cell, Move>) -> u32 {
        path.points()
            .iter()
            .zip(path.arcs())
            .map(|(&from, &mv)| Self::weight(from, mv))
            .sum()
    }

    /// Cheapest cost from the origin to the goal, by dynamic programming.
    #[must_use]
    pub fn optimal_cost(&self) -> u32 {
        let (w, h) = (usize::from(self.width), usize::from(self.height));
        let mut best = vec![vec![u32::MAX; w]; h];
        if w == 0 || h == 0 {
            return 0;
        }
        best[0][0] = 0;
        for y in 0..h {
            for x in 0..w {
                let here = best[y][x];
                let cell = (cell_coord(x), cell_coord(y));
                if x + 1 < w {
                    best[y][x + 1] = best[y][x + 1].min(here + Self::weight(cell, Move::Right));
                }
                if y + 1 < h {
                    best[y + 1][x] = best[y + 1][x].min(here + Self::weight(cell, Move::Down));
                }
            }
        }
        best[h - 1][w - 1]
    }

    /// Uniform-cost scoring: the accumulated path cost.
    #[must_use]
    pub fn path_cost_evaluator() -> DynEvaluator<Cell, Move, u32> {
        Arc::new(FnEvaluator::new(|node: &EvalNode<Cell, Move, u32>| {
            Some(Self::path_cost(&node.path))
        }))
    }

    /// Complete paths scored by their cost, for rollout evaluation.
    #[must_use]
    pub fn path_cost_solution_evaluator() -> Arc<dyn SolutionEvaluator<Cell, Move, u32>> {
        Arc::new(FnSolutionEvaluator(|path: &LabeledPath<Cell, Move>| {
            Ok::<u32, EvalError>(Self::path_cost(path))
        }))
    }
}

fn cell_coord(i: usize) -> u16 {
    u16::try_from(i).unwrap_or(u16::MAX)
}

impl GraphContract<Cell, Move> for WeightedGrid {
    #[allow(clippy::unnecessary_literal_bound)]
    fn graph_id(&self) -> &str {
        "weighted_grid"
    }

    fn roots(&self) -> Vec<Cell> {
        vec![(0, 0)]
    }

    fn successors(&self, point: &Cell) -> Vec<Successor<Cell, Move>> {
        let (x, y) = *point;
        let mut out = Vec::with_capacity(2);
        if x + 1 < self.width {
            out.push(Successor::new(Move::Right, (x + 1, y)));
        }
        if y + 1 < self.height {
            out.push(Successor::new(Move::Down, (x, y + 1)));
        }
        out
    }

    fn is_goal(&self, point: &Cell) -> bool {
        *point == self.goal()
    }
}
