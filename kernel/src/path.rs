//! Root-to-head paths through a lazily discovered graph.

/// A non-empty sequence of points from a root to a head, with the label of
/// every arc in between.
///
/// Invariant: `arcs.len() + 1 == points.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabeledPath<T, A> {
    points: Vec<T>,
    arcs: Vec<A>,
}

impl<T, A> LabeledPath<T, A> {
    /// A path consisting of a single root point.
    #[must_use]
    pub fn root(point: T) -> Self {
        Self {
            points: vec![point],
            arcs: Vec::new(),
        }
    }

    /// Assemble a path from its parts.
    ///
    /// Returns `None` unless there is exactly one arc less than points.
    #[must_use]
    pub fn from_parts(points: Vec<T>, arcs: Vec<A>) -> Option<Self> {
        if points.is_empty() || arcs.len() + 1 != points.len() {
            return None;
        }
        Some(Self { points, arcs })
    }

    /// The last point of the path.
    #[must_use]
    pub fn head(&self) -> &T {
        // Non-empty by construction.
        &self.points[self.points.len() - 1]
    }

    /// The first point of the path.
    #[must_use]
    pub fn root_point(&self) -> &T {
        &self.points[0]
    }

    #[must_use]
    pub fn points(&self) -> &[T] {
        &self.points
    }

    #[must_use]
    pub fn arcs(&self) -> &[A] {
        &self.arcs
    }

    /// Number of arcs (root-only path has depth 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.arcs.len()
    }

    /// Number of points on the path.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.arcs.is_empty()
    }

    /// Append one arc in place.
    pub fn push(&mut self, label: A, point: T) {
        self.arcs.push(label);
        self.points.push(point);
    }

    /// Remove the head and the arc leading to it.
    ///
    /// Returns `None` (and leaves the path untouched) on a root-only path.
    pub fn pop(&mut self) -> Option<(A, T)> {
        if self.arcs.is_empty() {
            return None;
        }
        let label = self.arcs.pop()?;
        let point = self.points.pop()?;
        Some((label, point))
    }

    /// Consume the path, returning its parts.
    #[must_use]
    pub fn into_parts(self) -> (Vec<T>, Vec<A>) {
        (self.points, self.arcs)
    }
}

impl<T: Clone, A: Clone> LabeledPath<T, A> {
    /// A copy of this path extended by one arc.
    #[must_use]
    pub fn extended(&self, label: A, point: T) -> Self {
        let mut next = self.clone();
        next.push(label, point);
        next
    }

    /// The path without its head, or `None` for a root-only path.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        self.prefix(self.points.len() - 1)
    }

    /// The first `point_count` points of this path.
    #[must_use]
    pub fn prefix(&self, point_count: usize) -> Option<Self> {
        if point_count == 0 || point_count > self.points.len() {
            return None;
        }
        Some(Self {
            points: self.points[..point_count].to_vec(),
            arcs: self.arcs[..point_count - 1].to_vec(),
        })
    }
}

impl<T: PartialEq, A> LabeledPath<T, A> {
    /// Whether `point` occurs anywhere on the path.
    #[must_use]
    pub fn contains(&self, point: &T) -> bool {
        self.points.contains(point)
    }
}
