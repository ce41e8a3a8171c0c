//! `DeadEndTree`: a binary tree where most leaves are dead ends.
//!
//! Only leaves listed in `goals` are goals; every other leaf has no
//! successors and fails the goal test. With no goals at all the tree is
//! hopeless, which exercises rollout root errors and exhaustion reporting.

use arbor_kernel::contract::{GraphContract, Successor};

pub struct DeadEndTree {
    depth: usize,
    goals: Vec<Vec<u8>>,
}

impl DeadEndTree {
    /// Tree of `depth` whose only goal is the all-ones leaf.
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self::with_goals(depth, vec![vec![1; depth]])
    }

    #[must_use]
    pub fn with_goals(depth: usize, goals: Vec<Vec<u8>>) -> Self {
        Self { depth, goals }
    }

    #[must_use]
    pub fn hopeless(depth: usize) -> Self {
        Self::with_goals(depth, Vec::new())
    }
}

impl GraphContract<Vec<u8>, u8> for DeadEndTree {
    #[allow(clippy::unnecessary_literal_bound)]
    fn graph_id(&self) -> &str {
        "dead_end_tree"
    }

    fn roots(&self) -> Vec<Vec<u8>> {
        vec![Vec::new()]
    }

    fn successors(&self, point: &Vec<u8>) -> Vec<Successor<Vec<u8>, u8>> {
        if point.len() >= self.depth {
            return Vec::new();
        }
        [0u8, 1]
            .into_iter()
            .map(|bit| {
                let mut next = point.clone();
                next.push(bit);
                Successor::new(bit, next)
            })
            .collect()
    }

    fn is_goal(&self, point: &Vec<u8>) -> bool {
        self.goals.contains(point)
    }
}
