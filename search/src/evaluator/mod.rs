//! Node evaluators: the scoring seam of the best-first engine.
//!
//! An evaluator maps a node's root path to `Some(score)`, to `None` (prune
//! the node) or to an [`EvalError`]. Evaluators compose by explicit wrapping;
//! capabilities a wrapper does not understand are forwarded to the wrapped
//! evaluator through the capability methods of [`NodeEvaluator`].

/// Forward every capability method to the evaluator stored in `$field`.
macro_rules! forward_capabilities {
    ($field:ident) => {
        fn requires_graph(&self) -> bool {
            self.$field.requires_graph()
        }

        fn set_graph(
            &self,
            graph: std::sync::Arc<dyn arbor_kernel::contract::GraphContract<T, A>>,
        ) -> Result<(), crate::error::EvalError> {
            self.$field.set_graph(graph)
        }

        fn reports_solutions(&self) -> bool {
            self.$field.reports_solutions()
        }

        fn register_solution_listener(
            &self,
            listener: std::sync::Arc<dyn crate::listener::SolutionListener<T, A, V>>,
        ) {
            self.$field.register_solution_listener(listener);
        }

        fn is_cancelable(&self) -> bool {
            self.$field.is_cancelable()
        }

        fn cancel_active_tasks(&self) {
            self.$field.cancel_active_tasks();
        }
    };
}

pub mod decorators;
pub mod depth_first;
pub mod rollout;
pub mod time_aware;

use std::marker::PhantomData;
use std::sync::Arc;

use arbor_kernel::annotation::Annotations;
use arbor_kernel::contract::{EdgeLabel, GraphContract, Point};
use arbor_kernel::control::Control;
use arbor_kernel::path::LabeledPath;
use arbor_kernel::score::Score;

use crate::error::EvalError;
use crate::listener::SolutionListener;

pub use decorators::{AlternativeEvaluator, DelayingEvaluator, SkippingEvaluator, TimeLoggingEvaluator};
pub use depth_first::RandomizedDepthFirstEvaluator;
pub use rollout::{
    FnSolutionEvaluator, RandomCompletionEvaluator, RolloutConfig, ScoreSpread, SolutionEvaluator, UncertaintySource,
};
pub use time_aware::TimeAwareEvaluator;

/// What an evaluator sees of a node.
///
/// Evaluators may write annotations; the engine copies them onto the node.
#[derive(Debug, Clone)]
pub struct EvalNode<T, A, V> {
    pub path: LabeledPath<T, A>,
    pub goal: bool,
    /// Score of the parent node, if it has one.
    pub parent_score: Option<V>,
    pub annotations: Annotations,
}

impl<T, A, V> EvalNode<T, A, V> {
    #[must_use]
    pub fn new(path: LabeledPath<T, A>, goal: bool, parent_score: Option<V>) -> Self {
        Self {
            path,
            goal,
            parent_score,
            annotations: Annotations::new(),
        }
    }

    #[must_use]
    pub fn head(&self) -> &T {
        self.path.head()
    }
}

/// Scores nodes for best-first search. Lower is better.
pub trait NodeEvaluator<T, A, V>: Send + Sync {
    /// Score `node`, or return `Ok(None)` to prune it.
    ///
    /// # Errors
    ///
    /// [`EvalError::Interrupted`] must be returned (not swallowed) when `ctl`
    /// is canceled mid-evaluation. Other errors prune the node, except at a
    /// root where they are fatal.
    fn evaluate(&self, node: &mut EvalNode<T, A, V>, ctl: &Control) -> Result<Option<V>, EvalError>;

    /// Whether [`NodeEvaluator::set_graph`] must be called before evaluation.
    fn requires_graph(&self) -> bool {
        false
    }

    /// Inject the graph being searched.
    ///
    /// # Errors
    ///
    /// Implementations fail when the graph is unusable to them (no roots).
    fn set_graph(&self, _graph: Arc<dyn GraphContract<T, A>>) -> Result<(), EvalError> {
        Ok(())
    }

    /// Whether this evaluator posts solutions it discovers on its own.
    fn reports_solutions(&self) -> bool {
        false
    }

    fn register_solution_listener(&self, _listener: Arc<dyn SolutionListener<T, A, V>>) {}

    fn is_cancelable(&self) -> bool {
        false
    }

    /// Abort any in-flight work started by this evaluator.
    fn cancel_active_tasks(&self) {}
}

/// Shared evaluator handle.
pub type DynEvaluator<T, A, V> = Arc<dyn NodeEvaluator<T, A, V>>;

/// Evaluator from a plain function of the node.
pub struct FnEvaluator<F, T, A, V> {
    f: F,
    _marker: PhantomData<fn(T, A) -> V>,
}

impl<F, T, A, V> FnEvaluator<F, T, A, V>
where
    F: Fn(&EvalNode<T, A, V>) -> Option<V> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F, T, A, V> NodeEvaluator<T, A, V> for FnEvaluator<F, T, A, V>
where
    T: Point,
    A: EdgeLabel,
    V: Score,
    F: Fn(&EvalNode<T, A, V>) -> Option<V> + Send + Sync,
{
    fn evaluate(&self, node: &mut EvalNode<T, A, V>, ctl: &Control) -> Result<Option<V>, EvalError> {
        ctl.check()?;
        Ok((self.f)(node))
    }
}

/// Always prunes. The default timeout fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEvaluator;

impl<T: Point, A: EdgeLabel, V: Score> NodeEvaluator<T, A, V> for NullEvaluator {
    fn evaluate(&self, _node: &mut EvalNode<T, A, V>, _ctl: &Control) -> Result<Option<V>, EvalError> {
        Ok(None)
    }
}

/// Scores a node by its depth. Useful as a uniform-cost baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathLengthEvaluator;

impl<T: Point, A: EdgeLabel> NodeEvaluator<T, A, usize> for PathLengthEvaluator {
    fn evaluate(&self, node: &mut EvalNode<T, A, usize>, ctl: &Control) -> Result<Option<usize>, EvalError> {
        ctl.check()?;
        Ok(Some(node.path.depth()))
    }
}
