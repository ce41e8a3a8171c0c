//! `NestedDichotomy`: recursive binary splits of a class set, as an AND-OR
//! space.
//!
//! An OR node is a sorted set of classes; its successors are the AND nodes
//! for each unordered split `{L, R}` (the half containing the smallest class
//! is `L`). An AND node has the two halves as OR successors. Singletons are
//! goals. The number of distinct complete decompositions of `n ≥ 2` classes
//! is `(2n − 3)!!`: 1, 3, 15, 105, ...

use arbor_search::and_or::{AndOrGraph, AndOrSuccessor};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DichotomyPoint {
    Classes(Vec<u8>),
    Split(Vec<u8>, Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decomposition {
    Split,
    Left,
    Right,
}

pub struct NestedDichotomy {
    classes: u8,
}

impl NestedDichotomy {
    #[must_use]
    pub fn new(classes: u8) -> Self {
        Self { classes }
    }

    /// `(2n − 3)!!` for `n ≥ 2`, else 1.
    #[must_use]
    pub fn decomposition_count(classes: u8) -> u64 {
        (1..u64::from(classes.max(2)) * 2 - 2)
            .step_by(2)
            .product()
    }

    fn splits(set: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let Some((&first, rest)) = set.split_first() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        // Each mask over `rest` picks the members joining `first` on the left;
        // the full mask would leave the right side empty.
        let masks = 1u32 << rest.len();
        for mask in 0..masks - 1 {
            let mut left = vec![first];
            let mut right = Vec::new();
            for (i, &c) in rest.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    left.push(c);
                } else {
                    right.push(c);
                }
            }
            out.push((left, right));
        }
        out
    }
}

impl AndOrGraph<DichotomyPoint, Decomposition> for NestedDichotomy {
    #[allow(clippy::unnecessary_literal_bound)]
    fn graph_id(&self) -> &str {
        "nested_dichotomy"
    }

    fn root(&self) -> DichotomyPoint {
        DichotomyPoint::Classes((0..self.classes).collect())
    }

    fn successors(&self, point: &DichotomyPoint) -> Vec<AndOrSuccessor<DichotomyPoint, Decomposition>> {
        match point {
            DichotomyPoint::Classes(set) if set.len() >= 2 => Self::splits(set)
                .into_iter()
                .map(|(l, r)| AndOrSuccessor::and(Decomposition::Split, DichotomyPoint::Split(l, r)))
                .collect(),
            DichotomyPoint::Classes(_) => Vec::new(),
            DichotomyPoint::Split(l, r) => vec![
                AndOrSuccessor::or(Decomposition::Left, DichotomyPoint::Classes(l.clone())),
                AndOrSuccessor::or(Decomposition::Right, DichotomyPoint::Classes(r.clone())),
            ],
        }
    }

    fn is_goal(&self, point: &DichotomyPoint) -> bool {
        matches!(point, DichotomyPoint::Classes(set) if set.len() == 1)
    }
}
