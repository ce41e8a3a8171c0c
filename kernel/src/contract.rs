//! The graph contract consumed by every search in the workspace.
//!
//! A search space is never materialized up front. Worlds expose a root
//! generator, a successor generator and a goal tester over an opaque point
//! type; the engines discover the graph lazily through this trait.

use std::fmt::Debug;
use std::hash::Hash;

use crate::path::LabeledPath;

/// An external state description.
///
/// Equality and hashing define node identity for deduplication, so every
/// point type carries both. Points are shared with worker threads and cached
/// in evaluator maps, hence `Send + Sync + 'static`.
pub trait Point: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> Point for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// An opaque action label attached to a successor relation.
pub trait EdgeLabel: Clone + Debug + Send + Sync + 'static {}

impl<A> EdgeLabel for A where A: Clone + Debug + Send + Sync + 'static {}

/// One generated successor: the label of the arc and the point it leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Successor<T, A> {
    pub label: A,
    pub point: T,
}

impl<T, A> Successor<T, A> {
    #[must_use]
    pub fn new(label: A, point: T) -> Self {
        Self { label, point }
    }
}

/// Root generator, successor generator and goal tester over points `T`
/// connected by labels `A`.
///
/// Implementations must be deterministic: the same point yields the same
/// successors in the same order. Engines rely on generation order for
/// tie-breaking.
pub trait GraphContract<T, A>: Send + Sync {
    /// Stable identifier used in reports.
    fn graph_id(&self) -> &str;

    /// One or many root points.
    fn roots(&self) -> Vec<T>;

    /// Ordered successors of `point`. An empty list marks a dead end.
    fn successors(&self, point: &T) -> Vec<Successor<T, A>>;

    /// Single-point goal test.
    fn is_goal(&self, point: &T) -> bool;

    /// Whole-path goal test. Defaults to testing the head of the path.
    ///
    /// Worlds whose goal condition depends on how a point was reached
    /// override this; engines always call the path variant.
    fn is_goal_path(&self, path: &LabeledPath<T, A>) -> bool {
        self.is_goal(path.head())
    }
}
