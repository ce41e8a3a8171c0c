//! Cheap evaluator that makes best-first behave like a randomized dive.

use arbor_kernel::contract::{EdgeLabel, Point};
use arbor_kernel::control::Control;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{EvalNode, NodeEvaluator};
use crate::error::EvalError;

/// Scores `-depth + jitter` with `jitter` drawn from `[0, 1)`.
///
/// Deeper nodes always win; siblings are ordered randomly.
pub struct RandomizedDepthFirstEvaluator {
    rng: Mutex<StdRng>,
}

impl RandomizedDepthFirstEvaluator {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl<T: Point, A: EdgeLabel> NodeEvaluator<T, A, f64> for RandomizedDepthFirstEvaluator {
    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, node: &mut EvalNode<T, A, f64>, ctl: &Control) -> Result<Option<f64>, EvalError> {
        ctl.check()?;
        let jitter: f64 = self.rng.lock().gen();
        Ok(Some(-(node.path.depth() as f64) + jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::node_at;
    use super::*;

    #[test]
    fn deeper_nodes_always_score_better() {
        let eval = RandomizedDepthFirstEvaluator::new(3);
        let ctl = Control::unbounded();
        for _ in 0..50 {
            let shallow = eval.evaluate(&mut node_at(&[0], 4), &ctl).unwrap().unwrap();
            let deep = eval.evaluate(&mut node_at(&[0, 1], 4), &ctl).unwrap().unwrap();
            assert!(deep < shallow, "{deep} vs {shallow}");
        }
    }

    #[test]
    fn same_seed_same_scores() {
        let ctl = Control::unbounded();
        let draw = |seed| {
            let eval = RandomizedDepthFirstEvaluator::new(seed);
            (0..5)
                .map(|_| eval.evaluate(&mut node_at(&[1], 3), &ctl).unwrap().unwrap())
                .collect::<Vec<f64>>()
        };
        assert_eq!(draw(11), draw(11));
        assert_ne!(draw(11), draw(12));
    }
}
