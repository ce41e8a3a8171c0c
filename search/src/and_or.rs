//! AND-OR graph search.
//!
//! OR nodes are solved when one successor is solved, AND nodes when every
//! successor is. Points are deduplicated exactly like the best-first
//! ext→int map, so the explored structure is a DAG. Three labeling
//! strategies share the monotone `solved` and `exhausted` sets:
//!
//! - simple: recursive recomputation from the root;
//! - exhaustive: like simple, but also marks subgraphs that can no longer
//!   change and never descends into them again;
//! - bottom-up: after each expansion, propagate from the expanded node to
//!   its predecessors.
//!
//! Best-solution extraction walks breadth-first from the root, descends into
//! every successor of an AND node and into the first solved successor (in
//! generation order) of an OR node.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use arbor_kernel::contract::{EdgeLabel, Point};
use arbor_kernel::control::{Control, ControlSignal};

use crate::error::SearchError;
use crate::frontier::OpenList;
use crate::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndOrSuccessor<T, A> {
    pub label: A,
    pub point: T,
    pub kind: NodeKind,
}

impl<T, A> AndOrSuccessor<T, A> {
    #[must_use]
    pub fn or(label: A, point: T) -> Self {
        Self {
            label,
            point,
            kind: NodeKind::Or,
        }
    }

    #[must_use]
    pub fn and(label: A, point: T) -> Self {
        Self {
            label,
            point,
            kind: NodeKind::And,
        }
    }
}

/// A decomposition space with conjunctive and disjunctive nodes.
pub trait AndOrGraph<T, A>: Send + Sync {
    fn graph_id(&self) -> &str;

    fn root(&self) -> T;

    fn root_kind(&self) -> NodeKind {
        NodeKind::Or
    }

    /// Ordered successors, each tagged with the kind of node it creates.
    fn successors(&self, point: &T) -> Vec<AndOrSuccessor<T, A>>;

    /// Goal points are solved leaves and are never expanded.
    fn is_goal(&self, point: &T) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelingStrategy {
    Simple,
    Exhaustive,
    #[default]
    BottomUp,
}

/// What a selector sees of an unexpanded node.
#[derive(Debug, Clone, Copy)]
pub struct FrontierEntry<'a, T> {
    pub id: NodeId,
    pub point: &'a T,
    pub kind: NodeKind,
    pub depth: usize,
}

/// Orders the frontier. The lowest priority is expanded first, the older
/// node among equals.
pub trait NodeSelector<T>: Send {
    /// Called once per node, when it enters the frontier.
    fn priority(&mut self, entry: &FrontierEntry<'_, T>) -> f64;
}

/// Shallowest first, oldest first among equals.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreadthFirstSelector;

impl<T> NodeSelector<T> for BreadthFirstSelector {
    #[allow(clippy::cast_precision_loss)]
    fn priority(&mut self, entry: &FrontierEntry<'_, T>) -> f64 {
        entry.depth as f64
    }
}

/// Lowest `cost(point)` first.
pub struct LeastCostSelector<F> {
    cost: F,
}

impl<F> LeastCostSelector<F> {
    pub fn new(cost: F) -> Self {
        Self { cost }
    }
}

impl<T, F> NodeSelector<T> for LeastCostSelector<F>
where
    F: Fn(&T) -> f64 + Send,
{
    fn priority(&mut self, entry: &FrontierEntry<'_, T>) -> f64 {
        (self.cost)(entry.point)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionEdge<T, A> {
    pub from: T,
    pub label: A,
    pub to: T,
}

/// A solution subgraph: the root, every included point in breadth-first
/// order, and the arcs chosen between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionGraph<T, A> {
    pub root: T,
    pub points: Vec<T>,
    pub edges: Vec<SolutionEdge<T, A>>,
}

impl<T: PartialEq, A> SolutionGraph<T, A> {
    #[must_use]
    pub fn contains(&self, point: &T) -> bool {
        self.points.contains(point)
    }

    /// Included points without outgoing arcs.
    #[must_use]
    pub fn leaves(&self) -> Vec<&T> {
        self.points
            .iter()
            .filter(|p| !self.edges.iter().any(|e| &e.from == *p))
            .collect()
    }
}

struct AndOrNode<T> {
    point: T,
    kind: NodeKind,
    goal: bool,
    expanded: bool,
    depth: usize,
}

/// Edges chosen by one solution, as `(parent, successor index)` pairs.
type EdgeSet = BTreeSet<(NodeId, usize)>;

pub struct AndOrSearch<T, A> {
    graph: Arc<dyn AndOrGraph<T, A>>,
    selector: Box<dyn NodeSelector<T>>,
    labeling: LabelingStrategy,
    nodes: Vec<AndOrNode<T>>,
    ext2int: HashMap<T, NodeId>,
    succ: Vec<Vec<(A, NodeId)>>,
    pred: Vec<Vec<NodeId>>,
    solved: HashSet<NodeId>,
    exhausted: HashSet<NodeId>,
    frontier: OpenList<f64>,
    root: Option<NodeId>,
    edge_count: usize,
    expanded_count: usize,
}

impl<T: Point, A: EdgeLabel> AndOrSearch<T, A> {
    #[must_use]
    pub fn new(graph: Arc<dyn AndOrGraph<T, A>>) -> Self {
        Self {
            graph,
            selector: Box::new(BreadthFirstSelector),
            labeling: LabelingStrategy::default(),
            nodes: Vec::new(),
            ext2int: HashMap::new(),
            succ: Vec::new(),
            pred: Vec::new(),
            solved: HashSet::new(),
            exhausted: HashSet::new(),
            frontier: OpenList::new(),
            root: None,
            edge_count: 0,
            expanded_count: 0,
        }
    }

    #[must_use]
    pub fn with_selector(mut self, selector: Box<dyn NodeSelector<T>>) -> Self {
        self.selector = selector;
        let queued: Vec<NodeId> = self.frontier.iter().collect();
        self.frontier = OpenList::new();
        for id in queued {
            self.enqueue(id);
        }
        self
    }

    #[must_use]
    pub fn with_labeling(mut self, labeling: LabelingStrategy) -> Self {
        self.labeling = labeling;
        self
    }

    /// AND and OR nodes in the explicit graph.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.nodes.len()
    }

    /// Arcs in the explicit graph, both node kinds.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Nodes whose successors have been generated.
    #[must_use]
    pub fn expanded_count(&self) -> usize {
        self.expanded_count
    }

    /// OR node for `point`, created unless the point is already known.
    pub fn or_node(&mut self, point: T, depth: usize) -> NodeId {
        self.node(point, NodeKind::Or, depth)
    }

    /// AND node for `point`, created unless the point is already known.
    pub fn and_node(&mut self, point: T, depth: usize) -> NodeId {
        self.node(point, NodeKind::And, depth)
    }

    fn node(&mut self, point: T, kind: NodeKind, depth: usize) -> NodeId {
        if let Some(&id) = self.ext2int.get(&point) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        let goal = self.graph.is_goal(&point);
        self.ext2int.insert(point.clone(), id);
        self.nodes.push(AndOrNode {
            point,
            kind,
            goal,
            expanded: false,
            depth,
        });
        self.succ.push(Vec::new());
        self.pred.push(Vec::new());
        if goal {
            self.solved.insert(id);
            self.exhausted.insert(id);
        } else {
            self.enqueue(id);
        }
        id
    }

    fn enqueue(&mut self, id: NodeId) {
        let node = &self.nodes[id.index()];
        let priority = self.selector.priority(&FrontierEntry {
            id,
            point: &node.point,
            kind: node.kind,
            depth: node.depth,
        });
        self.frontier.push(id, priority);
    }

    fn ensure_root(&mut self) -> NodeId {
        if let Some(root) = self.root {
            return root;
        }
        let point = self.graph.root();
        let kind = self.graph.root_kind();
        let root = self.node(point, kind, 0);
        self.root = Some(root);
        tracing::info!(graph = self.graph.graph_id(), "and-or search initialized");
        root
    }

    pub fn is_solved(&self, point: &T) -> bool {
        self.ext2int
            .get(point)
            .is_some_and(|id| self.solved.contains(id))
    }

    pub fn is_exhausted(&self, point: &T) -> bool {
        self.ext2int
            .get(point)
            .is_some_and(|id| self.exhausted.contains(id))
    }

    pub fn kind_of(&self, point: &T) -> Option<NodeKind> {
        self.ext2int.get(point).map(|id| self.nodes[id.index()].kind)
    }

    /// Expand the best frontier node. False when nothing is left.
    fn step(&mut self) -> bool {
        while let Some((id, _)) = self.frontier.pop() {
            if self.solved.contains(&id) || self.nodes[id.index()].expanded {
                continue;
            }
            self.expand(id);
            return true;
        }
        false
    }

    fn expand(&mut self, id: NodeId) {
        let point = self.nodes[id.index()].point.clone();
        let depth = self.nodes[id.index()].depth + 1;
        self.nodes[id.index()].expanded = true;
        self.expanded_count += 1;
        for successor in self.graph.successors(&point) {
            let child = self.node(successor.point, successor.kind, depth);
            if child == id || self.succ[id.index()].iter().any(|(_, c)| *c == child) {
                continue;
            }
            self.succ[id.index()].push((successor.label, child));
            self.pred[child.index()].push(id);
            self.edge_count += 1;
        }
        tracing::trace!(node = %id, successors = self.succ[id.index()].len(), "and-or node expanded");
        if self.labeling == LabelingStrategy::BottomUp {
            self.bottom_up_labeling(id);
        }
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.succ[id.index()].iter().map(|(_, c)| *c).collect()
    }

    fn locally_solved(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.index()];
        if node.goal {
            return true;
        }
        let children = &self.succ[id.index()];
        if !node.expanded || children.is_empty() {
            return false;
        }
        match node.kind {
            NodeKind::Or => children.iter().any(|(_, c)| self.solved.contains(c)),
            NodeKind::And => children.iter().all(|(_, c)| self.solved.contains(c)),
        }
    }

    fn locally_exhausted(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.index()];
        node.goal
            || (node.expanded
                && self.succ[id.index()]
                    .iter()
                    .all(|(_, c)| self.exhausted.contains(c)))
    }

    /// Propagate solved and exhausted labels from `start` to its ancestors.
    pub fn bottom_up_labeling(&mut self, start: NodeId) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let mut changed = false;
            if !self.solved.contains(&id) && self.locally_solved(id) {
                self.solved.insert(id);
                changed = true;
            }
            if !self.exhausted.contains(&id) && self.locally_exhausted(id) {
                self.exhausted.insert(id);
                changed = true;
            }
            if changed {
                stack.extend(self.pred[id.index()].iter().copied());
            }
        }
    }

    /// Recompute solved labels from the root. Returns whether the root is
    /// solved.
    pub fn simple_solved_labeling(&mut self) -> bool {
        let root = self.ensure_root();
        let mut visiting = HashSet::new();
        self.simple_label(root, &mut visiting)
    }

    fn simple_label(&mut self, id: NodeId, visiting: &mut HashSet<NodeId>) -> bool {
        if self.solved.contains(&id) {
            return true;
        }
        if !visiting.insert(id) {
            return false;
        }
        let node = &self.nodes[id.index()];
        let solved = if node.goal {
            true
        } else if !node.expanded || self.succ[id.index()].is_empty() {
            false
        } else {
            let kind = node.kind;
            let children = self.children(id);
            match kind {
                NodeKind::Or => children.into_iter().any(|c| self.simple_label(c, visiting)),
                NodeKind::And => children.into_iter().all(|c| self.simple_label(c, visiting)),
            }
        };
        if solved {
            self.solved.insert(id);
        }
        solved
    }

    /// Like [`Self::simple_solved_labeling`], additionally recording
    /// exhausted subgraphs and skipping them on later passes.
    pub fn exhaustive_solved_labeling(&mut self) -> bool {
        let root = self.ensure_root();
        let mut visiting = HashSet::new();
        self.exhaustive_label(root, &mut visiting)
    }

    fn exhaustive_label(&mut self, id: NodeId, visiting: &mut HashSet<NodeId>) -> bool {
        if self.solved.contains(&id) {
            return true;
        }
        if self.exhausted.contains(&id) || !visiting.insert(id) {
            return false;
        }
        let node = &self.nodes[id.index()];
        let (solved, exhausted) = if node.goal {
            (true, true)
        } else if !node.expanded {
            (false, false)
        } else {
            let kind = node.kind;
            let children = self.children(id);
            // Label every child, no short-circuit, so exhaustion is recorded.
            let labels: Vec<bool> = children
                .iter()
                .map(|&c| self.exhaustive_label(c, visiting))
                .collect();
            let solved = !labels.is_empty()
                && match kind {
                    NodeKind::Or => labels.iter().any(|&l| l),
                    NodeKind::And => labels.iter().all(|&l| l),
                };
            let exhausted = children.iter().all(|c| self.exhausted.contains(c));
            (solved, exhausted)
        };
        if solved {
            self.solved.insert(id);
        }
        if exhausted {
            self.exhausted.insert(id);
        }
        solved
    }

    fn label_root(&mut self, root: NodeId) -> bool {
        match self.labeling {
            LabelingStrategy::Simple => self.simple_solved_labeling(),
            LabelingStrategy::Exhaustive => self.exhaustive_solved_labeling(),
            LabelingStrategy::BottomUp => self.solved.contains(&root),
        }
    }

    fn check(ctl: &Control) -> Result<(), SearchError> {
        ctl.check().map_err(|signal| match signal {
            ControlSignal::Canceled => SearchError::Canceled,
            ControlSignal::DeadlineExceeded => SearchError::TimedOut,
        })
    }

    /// Expand until the root is solved and return its best solution graph.
    /// `Ok(None)` when the space is exhausted with the root unsolved.
    ///
    /// # Errors
    ///
    /// [`SearchError::Canceled`] or [`SearchError::TimedOut`] from `ctl`.
    pub fn solve(&mut self, ctl: &Control) -> Result<Option<SolutionGraph<T, A>>, SearchError> {
        let root = self.ensure_root();
        loop {
            if self.label_root(root) {
                tracing::info!(expanded = self.expanded_count, "and-or root solved");
                return Ok(self.best_solution_graph());
            }
            if self.labeling == LabelingStrategy::Exhaustive && self.exhausted.contains(&root) {
                break;
            }
            Self::check(ctl)?;
            if !self.step() {
                break;
            }
        }
        tracing::info!(expanded = self.expanded_count, "and-or search exhausted without solution");
        Ok(None)
    }

    /// Expand every reachable node, then label.
    ///
    /// # Errors
    ///
    /// [`SearchError::Canceled`] or [`SearchError::TimedOut`] from `ctl`.
    pub fn expand_all(&mut self, ctl: &Control) -> Result<bool, SearchError> {
        let root = self.ensure_root();
        loop {
            Self::check(ctl)?;
            if !self.step() {
                break;
            }
        }
        for index in (0..self.nodes.len()).rev() {
            self.bottom_up_labeling(NodeId(index));
        }
        Ok(self.solved.contains(&root))
    }

    /// Breadth-first extraction of one solution graph, or `None` if the root
    /// is not solved.
    pub fn best_solution_graph(&self) -> Option<SolutionGraph<T, A>> {
        let root = self.root?;
        if !self.solved.contains(&root) {
            return None;
        }
        let mut edges = EdgeSet::new();
        let mut queue = VecDeque::from([root]);
        let mut seen = HashSet::from([root]);
        while let Some(id) = queue.pop_front() {
            let children = &self.succ[id.index()];
            let chosen: Vec<usize> = match self.nodes[id.index()].kind {
                _ if self.nodes[id.index()].goal => Vec::new(),
                NodeKind::And => (0..children.len()).collect(),
                NodeKind::Or => children
                    .iter()
                    .position(|(_, c)| self.solved.contains(c))
                    .into_iter()
                    .collect(),
            };
            for i in chosen {
                edges.insert((id, i));
                let child = children[i].1;
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        Some(self.solution_from_edges(root, &edges))
    }

    /// Every distinct solution subgraph below the root. Meaningful after
    /// [`Self::expand_all`]; otherwise limited to the explored part.
    pub fn enumerate_solutions(&self) -> Vec<SolutionGraph<T, A>> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let mut memo = HashMap::new();
        let mut visiting = HashSet::new();
        self.solutions_below(root, &mut memo, &mut visiting)
            .iter()
            .map(|edges| self.solution_from_edges(root, edges))
            .collect()
    }

    fn solutions_below(
        &self,
        id: NodeId,
        memo: &mut HashMap<NodeId, Vec<EdgeSet>>,
        visiting: &mut HashSet<NodeId>,
    ) -> Vec<EdgeSet> {
        if let Some(known) = memo.get(&id) {
            return known.clone();
        }
        let node = &self.nodes[id.index()];
        if node.goal {
            return vec![EdgeSet::new()];
        }
        if !self.solved.contains(&id) || !visiting.insert(id) {
            return Vec::new();
        }
        let mut found: BTreeSet<EdgeSet> = BTreeSet::new();
        match node.kind {
            NodeKind::Or => {
                for (i, (_, child)) in self.succ[id.index()].iter().enumerate() {
                    for mut below in self.solutions_below(*child, memo, visiting) {
                        below.insert((id, i));
                        found.insert(below);
                    }
                }
            }
            NodeKind::And => {
                let mut partial = vec![EdgeSet::new()];
                for (i, (_, child)) in self.succ[id.index()].iter().enumerate() {
                    let below = self.solutions_below(*child, memo, visiting);
                    let mut next = Vec::with_capacity(partial.len() * below.len());
                    for acc in &partial {
                        for choice in &below {
                            let mut combined = acc.clone();
                            combined.extend(choice.iter().copied());
                            combined.insert((id, i));
                            next.push(combined);
                        }
                    }
                    partial = next;
                }
                found.extend(partial);
            }
        }
        visiting.remove(&id);
        let found: Vec<EdgeSet> = found.into_iter().collect();
        memo.insert(id, found.clone());
        found
    }

    fn solution_from_edges(&self, root: NodeId, edges: &EdgeSet) -> SolutionGraph<T, A> {
        let mut points = vec![self.nodes[root.index()].point.clone()];
        let mut seen = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);
        let mut chosen = Vec::new();
        while let Some(id) = queue.pop_front() {
            for (i, (label, child)) in self.succ[id.index()].iter().enumerate() {
                if !edges.contains(&(id, i)) {
                    continue;
                }
                chosen.push(SolutionEdge {
                    from: self.nodes[id.index()].point.clone(),
                    label: label.clone(),
                    to: self.nodes[child.index()].point.clone(),
                });
                if seen.insert(*child) {
                    points.push(self.nodes[child.index()].point.clone());
                    queue.push_back(*child);
                }
            }
        }
        SolutionGraph {
            root: self.nodes[root.index()].point.clone(),
            points,
            edges: chosen,
        }
    }
}
