//! Randomized completion of partial paths.
//!
//! The completer keeps its own explored graph over the searched graph. A
//! point reached from several parents keeps an arc from each of them, so
//! shared sub-plans stay reachable from every prefix that leads into them.
//!
//! Every draw walks from the head of a given path to a goal. Among the
//! successors that are not yet exhausted it follows those marked by the
//! priority predicate, and otherwise the one a [`RandomizedDepthFirstEvaluator`]
//! scores best. A goal that was returned once is marked exhausted, and
//! exhaustion propagates to every predecessor whose successors are all
//! exhausted, so the same goal is never drawn twice and a fully explored
//! region reports `None`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arbor_kernel::contract::{EdgeLabel, GraphContract, Point};
use arbor_kernel::control::{Control, ControlSignal};
use arbor_kernel::path::LabeledPath;

use crate::error::EvalError;
use crate::evaluator::{EvalNode, NodeEvaluator, RandomizedDepthFirstEvaluator};

/// Marks points the walk should steer towards.
pub type PriorityPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Step-backs allowed per draw while looking for a prioritized branch.
pub const MAX_STEP_BACKS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompleterError {
    #[error("completion interrupted: {0}")]
    Interrupted(#[from] ControlSignal),
    #[error("graph has no roots")]
    NoRoots,
    #[error("path does not start at a root of the graph")]
    UnknownRoot,
    #[error("successor scoring failed: {detail}")]
    Scoring { detail: String },
}

impl From<EvalError> for CompleterError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::Interrupted(signal) => Self::Interrupted(signal),
            other => Self::Scoring {
                detail: other.to_string(),
            },
        }
    }
}

pub struct RandomCompleter<T, A> {
    graph: Arc<dyn GraphContract<T, A>>,
    roots: Vec<T>,
    known: HashSet<T>,
    children: HashMap<T, Vec<(A, T)>>,
    preds: HashMap<T, HashSet<T>>,
    expanded: HashSet<T>,
    exhausted: HashSet<T>,
    prioritized: HashSet<T>,
    priority: Option<PriorityPredicate<T>>,
    scorer: RandomizedDepthFirstEvaluator,
    draws: u64,
}

impl<T: Point, A: EdgeLabel> RandomCompleter<T, A> {
    /// # Errors
    ///
    /// [`CompleterError::NoRoots`] if the graph produces no root.
    pub fn new(graph: Arc<dyn GraphContract<T, A>>, seed: u64) -> Result<Self, CompleterError> {
        let roots = graph.roots();
        if roots.is_empty() {
            return Err(CompleterError::NoRoots);
        }
        tracing::debug!(graph = graph.graph_id(), roots = roots.len(), "completer initialized");
        Ok(Self {
            graph,
            known: roots.iter().cloned().collect(),
            roots,
            children: HashMap::new(),
            preds: HashMap::new(),
            expanded: HashSet::new(),
            exhausted: HashSet::new(),
            prioritized: HashSet::new(),
            priority: None,
            scorer: RandomizedDepthFirstEvaluator::new(seed),
            draws: 0,
        })
    }

    #[must_use]
    pub fn with_priority(mut self, predicate: PriorityPredicate<T>) -> Self {
        for point in &self.known {
            if predicate(point) {
                self.prioritized.insert(point.clone());
            }
        }
        self.priority = Some(predicate);
        self
    }

    /// Whether `point` is part of the explored graph.
    #[must_use]
    pub fn knows(&self, point: &T) -> bool {
        self.known.contains(point)
    }

    /// Whether every root has been exhausted.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.roots.iter().all(|r| self.exhausted.contains(r))
    }

    /// Whether no further completion exists below `point`.
    #[must_use]
    pub fn is_exhausted_at(&self, point: &T) -> bool {
        self.exhausted.contains(point)
    }

    /// Successful draws so far.
    #[must_use]
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Successors of `point` attached to the explored graph so far.
    #[must_use]
    pub fn explored_successors(&self, point: &T) -> usize {
        self.children.get(point).map_or(0, Vec::len)
    }

    /// Explored points with an arc into `point`.
    #[must_use]
    pub fn explored_predecessors(&self, point: &T) -> usize {
        self.preds.get(point).map_or(0, HashSet::len)
    }

    /// Attach every arc of `path` that the explored graph does not hold yet.
    ///
    /// # Errors
    ///
    /// [`CompleterError::UnknownRoot`] when the path does not start at a root.
    pub fn append_path(&mut self, path: &LabeledPath<T, A>) -> Result<(), CompleterError> {
        if !self.roots.contains(path.root_point()) {
            return Err(CompleterError::UnknownRoot);
        }
        let points = path.points();
        for (i, label) in path.arcs().iter().enumerate() {
            self.attach(&points[i], label.clone(), points[i + 1].clone());
        }
        Ok(())
    }

    fn attach(&mut self, from: &T, label: A, to: T) {
        let arcs = self.children.entry(from.clone()).or_default();
        if arcs.iter().any(|(_, p)| *p == to) {
            return;
        }
        arcs.push((label, to.clone()));
        self.preds.entry(to.clone()).or_default().insert(from.clone());
        if self.known.insert(to.clone()) && self.priority.as_ref().is_some_and(|p| p(&to)) {
            self.prioritized.insert(to);
        }
    }

    fn expand(&mut self, point: &T) {
        for successor in self.graph.successors(point) {
            self.attach(point, successor.label, successor.point);
        }
        self.expanded.insert(point.clone());
        let has_prioritized_child = self
            .children
            .get(point)
            .is_some_and(|c| c.iter().any(|(_, p)| self.prioritized.contains(p)));
        if !has_prioritized_child {
            self.prioritized.remove(point);
        }
    }

    fn fully_exhausted(&self, point: &T) -> bool {
        self.expanded.contains(point)
            && self
                .children
                .get(point)
                .map_or(true, |c| c.iter().all(|(_, p)| self.exhausted.contains(p)))
    }

    fn mark_exhausted(&mut self, point: &T) {
        let mut pending = vec![point.clone()];
        while let Some(p) = pending.pop() {
            if !self.exhausted.insert(p.clone()) {
                continue;
            }
            self.prioritized.remove(&p);
            if let Some(preds) = self.preds.get(&p) {
                pending.extend(
                    preds
                        .iter()
                        .filter(|q| !self.exhausted.contains(*q) && self.fully_exhausted(q))
                        .cloned(),
                );
            }
        }
    }

    /// Index of the successor in `open` the depth-first scorer ranks best.
    fn choose(&self, current: &LabeledPath<T, A>, open: &[(A, T)], ctl: &Control) -> Result<usize, CompleterError> {
        let mut best: Option<(usize, f64)> = None;
        for (i, (label, point)) in open.iter().enumerate() {
            let mut node = EvalNode::<T, A, f64>::new(current.extended(label.clone(), point.clone()), false, None);
            let score = self.scorer.evaluate(&mut node, ctl)?.unwrap_or(f64::INFINITY);
            if best.map_or(true, |(_, b)| score < b) {
                best = Some((i, score));
            }
        }
        Ok(best.map_or(0, |(i, _)| i))
    }

    /// Draw a random completion of `path` into a goal path.
    ///
    /// Never backtracks above the head of `path`, and never revisits a point
    /// already on the walk. Returns `Ok(None)` when no further goal is
    /// reachable below the head.
    ///
    /// # Errors
    ///
    /// [`CompleterError::Interrupted`] when `ctl` is canceled or out of time,
    /// [`CompleterError::UnknownRoot`] when `path` is not rooted in the graph.
    pub fn next_solution_under(
        &mut self,
        path: &LabeledPath<T, A>,
        ctl: &Control,
    ) -> Result<Option<LabeledPath<T, A>>, CompleterError> {
        self.append_path(path)?;
        if self.exhausted.contains(path.head()) {
            return Ok(None);
        }
        let floor = path.point_count();
        let mut current = path.clone();
        let mut chasing = self.priority.is_some();
        let mut step_backs = 0;
        // Points whose live successors all loop back into the walk.
        let mut blocked: HashSet<T> = HashSet::new();

        while !self.graph.is_goal_path(&current) {
            ctl.check()?;
            let head = current.head().clone();
            if !self.expanded.contains(&head) {
                self.expand(&head);
            }
            let live: Vec<(A, T)> = self
                .children
                .get(&head)
                .map(|c| {
                    c.iter()
                        .filter(|(_, p)| !self.exhausted.contains(p))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            if live.is_empty() {
                self.mark_exhausted(&head);
                if current.point_count() <= floor {
                    return Ok(None);
                }
                current.pop();
                continue;
            }
            let open: Vec<(A, T)> = live
                .into_iter()
                .filter(|(_, p)| !blocked.contains(p) && !current.contains(p))
                .collect();
            if open.is_empty() {
                blocked.insert(head);
                if current.point_count() <= floor {
                    return Ok(None);
                }
                current.pop();
                continue;
            }

            let preferred = open.iter().position(|(_, p)| self.prioritized.contains(p));
            let pick = match preferred {
                Some(i) if chasing => i,
                _ => {
                    let may_step_back = chasing
                        && !self.prioritized.is_empty()
                        && current.point_count() > floor
                        && step_backs < MAX_STEP_BACKS;
                    if may_step_back {
                        step_backs += 1;
                        current.pop();
                        continue;
                    }
                    chasing = false;
                    self.choose(&current, &open, ctl)?
                }
            };
            let (label, point) = open[pick].clone();
            current.push(label, point);
        }

        let goal = current.head().clone();
        self.mark_exhausted(&goal);
        self.draws += 1;
        tracing::trace!(depth = current.depth(), draws = self.draws, "completion drawn");
        Ok(Some(current))
    }

    /// Goal paths below the head of `path` that run only through arcs the
    /// explored graph already holds, exhausted regions included.
    ///
    /// Used once a draw reports `None` for a prefix that merges into a region
    /// other prefixes already explored. At most `limit` paths are returned and
    /// at most [`MAX_REROUTE_VISITS`] arcs are followed.
    ///
    /// # Errors
    ///
    /// [`CompleterError::Interrupted`] when `ctl` is canceled or out of time,
    /// [`CompleterError::UnknownRoot`] when `path` is not rooted in the graph.
    pub fn explored_completions(
        &mut self,
        path: &LabeledPath<T, A>,
        limit: usize,
        ctl: &Control,
    ) -> Result<Vec<LabeledPath<T, A>>, CompleterError> {
        self.append_path(path)?;
        let mut found = Vec::new();
        let mut visits = 0usize;
        // Each frame holds the index of the next arc to try below the head.
        let mut current = path.clone();
        let mut cursor = vec![0usize];
        while let Some(next) = cursor.last_mut() {
            if found.len() >= limit || visits >= MAX_REROUTE_VISITS {
                break;
            }
            ctl.check()?;
            let head = current.head().clone();
            let arc = self
                .children
                .get(&head)
                .and_then(|c| c.get(*next))
                .cloned();
            let Some((label, point)) = arc else {
                cursor.pop();
                if current.point_count() > path.point_count() {
                    current.pop();
                }
                continue;
            };
            *next += 1;
            if current.contains(&point) {
                continue;
            }
            visits += 1;
            current.push(label, point);
            if self.graph.is_goal_path(&current) {
                found.push(current.clone());
                current.pop();
            } else {
                cursor.push(0);
            }
        }
        tracing::trace!(rerouted = found.len(), visits, "explored completions collected");
        Ok(found)
    }
}

/// Arcs followed per call to [`RandomCompleter::explored_completions`].
pub const MAX_REROUTE_VISITS: usize = 10_000;
