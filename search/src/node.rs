//! Arena nodes and the OPEN ordering key.

use std::cmp::Ordering;

use arbor_kernel::annotation::Annotations;
use arbor_kernel::score::Score;

/// Stable index of a node in a search arena.
///
/// Parent links are ids, so re-attaching a node to a new parent during
/// reopening is a single index write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Id for arena slot `index`. Only meaningful to the arena that owns it.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A point wrapped with search bookkeeping.
///
/// The point never changes. Parent, arc, score and depth change only when an
/// expanded node is reopened under a cheaper parent.
#[derive(Debug, Clone)]
pub struct SearchNode<T, A, V> {
    pub id: NodeId,
    pub point: T,
    /// `None` for roots.
    pub parent: Option<NodeId>,
    /// Label of the arc from `parent`; `None` for roots.
    pub arc: Option<A>,
    pub score: V,
    pub goal: bool,
    /// Root = 0.
    pub depth: usize,
    /// Global counter, assigned once at creation.
    pub creation_order: u64,
    pub annotations: Annotations,
}

/// OPEN ordering: lower score first, ties broken by older insertion.
#[derive(Debug, Clone)]
pub struct FrontierKey<V> {
    pub score: V,
    pub insertion_order: u64,
}

impl<V: Score> PartialEq for FrontierKey<V> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<V: Score> Eq for FrontierKey<V> {}

impl<V: Score> PartialOrd for FrontierKey<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<V: Score> Ord for FrontierKey<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then(self.insertion_order.cmp(&other.insertion_order))
    }
}
