//! Budgeted evaluation with a fallback on overrun.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arbor_kernel::annotation::F_ERROR;
use arbor_kernel::contract::{EdgeLabel, Point};
use arbor_kernel::control::{run_with_timeout, Control, ControlSignal, TimeBudget, TimedRunError};
use arbor_kernel::score::Score;

use super::{DynEvaluator, EvalNode, NodeEvaluator, NullEvaluator};
use crate::error::EvalError;

/// Runs the wrapped evaluator under a hard interruption timeout.
///
/// The granted budget is `min(node_timeout, remaining search time) - margin`;
/// the evaluation is interrupted `slack` after that. On overrun the fallback
/// evaluator (by default [`NullEvaluator`], which prunes) scores the node and
/// `fError = "timeout"` is recorded. Cancellation is never masked.
pub struct TimeAwareEvaluator<T, A, V> {
    inner: DynEvaluator<T, A, V>,
    fallback: DynEvaluator<T, A, V>,
    node_timeout: Option<Duration>,
    margin: Duration,
    slack: Duration,
    timeouts: AtomicU64,
}

impl<T: Point, A: EdgeLabel, V: Score> TimeAwareEvaluator<T, A, V> {
    #[must_use]
    pub fn new(inner: DynEvaluator<T, A, V>, node_timeout: Option<Duration>) -> Self {
        Self {
            inner,
            fallback: Arc::new(NullEvaluator),
            node_timeout,
            margin: Duration::ZERO,
            slack: Duration::from_millis(10),
            timeouts: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: DynEvaluator<T, A, V>) -> Self {
        self.fallback = fallback;
        self
    }

    #[must_use]
    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    #[must_use]
    pub fn with_interrupt_slack(mut self, slack: Duration) -> Self {
        self.slack = slack;
        self
    }

    /// Evaluations that overran their budget.
    #[must_use]
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    fn fall_back(
        &self,
        node: &mut EvalNode<T, A, V>,
        ctl: &Control,
        budget: TimeBudget,
    ) -> Result<Option<V>, EvalError> {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            depth = node.path.depth(),
            granted = ?budget.granted,
            "node evaluation timed out, using fallback"
        );
        node.annotations.set(F_ERROR, "timeout");
        self.fallback.evaluate(node, ctl)
    }
}

impl<T: Point, A: EdgeLabel, V: Score> NodeEvaluator<T, A, V> for TimeAwareEvaluator<T, A, V> {
    fn evaluate(&self, node: &mut EvalNode<T, A, V>, ctl: &Control) -> Result<Option<V>, EvalError> {
        ctl.check()?;
        let budget = TimeBudget::compute(self.node_timeout, ctl.deadline(), self.margin, self.slack);
        let inner = Arc::clone(&self.inner);
        let mut detached = node.clone();
        let outcome = run_with_timeout(budget.interrupt_after, ctl, move |child| {
            let score = inner.evaluate(&mut detached, child);
            (score, detached.annotations)
        });
        match outcome {
            Ok((Err(EvalError::Interrupted(ControlSignal::DeadlineExceeded)), _))
                if !ctl.deadline().is_expired() && budget.interrupt_after.is_some() =>
            {
                // The inner evaluator noticed its own child deadline first.
                self.fall_back(node, ctl, budget)
            }
            Ok((score, annotations)) => {
                node.annotations.merge(&annotations);
                score
            }
            Err(TimedRunError::TimedOut { .. }) => self.fall_back(node, ctl, budget),
            Err(err) => Err(err.into()),
        }
    }

    forward_capabilities!(inner);
}
