//! Best-first OR-graph search.
//!
//! The engine owns an arena of [`SearchNode`]s, an OPEN list ordered by score
//! and the set of expanded points. All of it lives behind one mutex; the
//! stepping thread pops and expands, and successor evaluations either run
//! inline or as jobs on a bounded rayon pool. A job takes the lock only to
//! insert its finished node, so OPEN and EXPANDED never see a half-inserted
//! node.
//!
//! Solutions are queued FIFO and handed out one per
//! [`BestFirst::next_solution`] call. Goals never enter OPEN.

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use arbor_kernel::annotation::{Annotations, F, F_ERROR, F_TIME};
use arbor_kernel::contract::{EdgeLabel, GraphContract, Point, Successor};
use arbor_kernel::control::{
    panic_detail, run_interruptible, CancelToken, Control, ControlSignal, Deadline, TimedRunError,
};
use arbor_kernel::path::LabeledPath;
use arbor_kernel::score::Score;
use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde_json::Value;

use crate::error::{EvalError, SearchError};
use crate::evaluator::{DynEvaluator, EvalNode, TimeAwareEvaluator};
use crate::frontier::OpenList;
use crate::graph::{
    ExpandEvent, SearchGraph, SearchGraphMetadata, SuccessorOutcome, SuccessorRecord, TerminationReason,
};
use crate::listener::{EvaluatedPath, ListenerSet, SolutionListener};
use crate::node::{NodeId, SearchNode};
use crate::policy::{ParentDiscarding, SearchPolicy};

/// Lifecycle of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    Uninitialized,
    Active,
    /// The global deadline passed.
    Interrupted,
    Canceled,
    /// OPEN is empty and no evaluation is outstanding.
    Exhausted,
    /// A root could not be evaluated.
    Failed,
}

/// Counters over the lifetime of a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Nodes built: roots plus every evaluated successor.
    pub created: u64,
    /// Nodes taken off OPEN and handed to the successor generator.
    pub expanded: u64,
    /// Successors the evaluator scored as `None`.
    pub pruned: u64,
    /// Successors whose evaluation failed for a reason other than interruption.
    pub failed: u64,
    /// Successors whose evaluation ran out of its per-node budget.
    pub timed_out: u64,
    /// Duplicates of an OPEN or expanded point that were dropped.
    pub discarded: u64,
    /// OPEN nodes superseded by a better-scored node for the same point.
    pub replaced: u64,
    /// Expanded points put back on OPEN after a better route was found.
    pub reopened: u64,
    /// Distinct solutions queued for [`BestFirst::next_solution`].
    pub solutions: u64,
}

struct SearchState<T, A, V> {
    status: SearchStatus,
    failure: Option<SearchError>,
    nodes: Vec<SearchNode<T, A, V>>,
    ext2int: HashMap<T, NodeId>,
    open: OpenList<V>,
    on_open: HashMap<T, Vec<NodeId>>,
    expanded: HashSet<T>,
    solutions: VecDeque<EvaluatedPath<T, A, V>>,
    seen_solutions: HashSet<Vec<T>>,
    active_jobs: usize,
    stats: SearchStats,
    trace: Vec<ExpandEvent>,
}

/// A successor waiting for evaluation.
struct Job<T, A, V> {
    parent: NodeId,
    expansion: usize,
    index: usize,
    path: LabeledPath<T, A>,
    goal: bool,
    parent_score: V,
}

/// A successor whose evaluation finished.
struct Evaluated<T, A, V> {
    parent: NodeId,
    expansion: usize,
    index: usize,
    path: LabeledPath<T, A>,
    goal: bool,
    result: Result<Option<V>, EvalError>,
    annotations: Annotations,
    took: Duration,
}

struct Expansion<T, A> {
    id: NodeId,
    order: usize,
    path: LabeledPath<T, A>,
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl<T: Point, A: EdgeLabel, V: Score> SearchState<T, A, V> {
    fn new() -> Self {
        Self {
            status: SearchStatus::Uninitialized,
            failure: None,
            nodes: Vec::new(),
            ext2int: HashMap::new(),
            open: OpenList::new(),
            on_open: HashMap::new(),
            expanded: HashSet::new(),
            solutions: VecDeque::new(),
            seen_solutions: HashSet::new(),
            active_jobs: 0,
            stats: SearchStats::default(),
            trace: Vec::new(),
        }
    }

    fn create(
        &mut self,
        point: T,
        parent: Option<NodeId>,
        arc: Option<A>,
        score: V,
        goal: bool,
        annotations: Annotations,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let depth = parent.map_or(0, |p| self.nodes[p.index()].depth + 1);
        self.nodes.push(SearchNode {
            id,
            point,
            parent,
            arc,
            score,
            goal,
            depth,
            creation_order: id.index() as u64,
            annotations,
        });
        id
    }

    fn push_open(&mut self, id: NodeId) {
        let node = &self.nodes[id.index()];
        let point = node.point.clone();
        self.open.push(id, node.score.clone());
        self.on_open.entry(point.clone()).or_default().push(id);
        self.ext2int.insert(point, id);
    }

    fn detach_open(&mut self, id: NodeId) {
        let point = &self.nodes[id.index()].point;
        if let Some(ids) = self.on_open.get_mut(point) {
            ids.retain(|&other| other != id);
            if ids.is_empty() {
                self.on_open.remove(point);
            }
        }
    }

    fn remove_open(&mut self, id: NodeId) {
        self.open.remove(id);
        self.detach_open(id);
    }

    fn path_to(&self, id: NodeId) -> LabeledPath<T, A> {
        let mut chain = vec![id];
        let mut cursor = self.nodes[id.index()].parent;
        while let Some(parent) = cursor {
            chain.push(parent);
            cursor = self.nodes[parent.index()].parent;
        }
        let mut ids = chain.into_iter().rev();
        let root = ids.next().unwrap_or(id);
        let mut path = LabeledPath::root(self.nodes[root.index()].point.clone());
        for next in ids {
            let node = &self.nodes[next.index()];
            if let Some(arc) = &node.arc {
                path.push(arc.clone(), node.point.clone());
            }
        }
        path
    }

    fn record(&mut self, expansion: usize, index: usize, point: &T, outcome: SuccessorOutcome) {
        if let Some(event) = self.trace.get_mut(expansion) {
            event.successors.push(SuccessorRecord {
                index,
                point: format!("{point:?}"),
                outcome,
            });
        }
    }

    /// Queue `solution` unless its path was queued before.
    fn enqueue_solution(&mut self, solution: &EvaluatedPath<T, A, V>) -> bool {
        if !self.seen_solutions.insert(solution.path.points().to_vec()) {
            return false;
        }
        self.solutions.push_back(solution.clone());
        self.stats.solutions += 1;
        true
    }

    /// Undo [`Self::pop_for_expansion`] for an expansion that was interrupted
    /// before producing successors, so a resumed search expands it again.
    fn requeue(&mut self, expansion: &Expansion<T, A>) {
        let point = self.nodes[expansion.id.index()].point.clone();
        self.expanded.remove(&point);
        self.stats.expanded -= 1;
        if self.trace.len() == expansion.order + 1 {
            self.trace.pop();
        }
        self.push_open(expansion.id);
    }

    /// Late annotations still reach a solution nobody has pulled yet.
    fn annotate_queued(&mut self, path: &LabeledPath<T, A>, key: &str, value: &Value) {
        if let Some(queued) = self
            .solutions
            .iter_mut()
            .find(|s| s.path.points() == path.points())
        {
            queued.annotations.set(key, value.clone());
        }
    }

    fn pop_for_expansion(&mut self) -> Option<Expansion<T, A>> {
        let (id, score) = self.open.pop()?;
        self.detach_open(id);
        let point = self.nodes[id.index()].point.clone();
        if self.expanded.contains(&point) {
            self.stats.discarded += 1;
            return None;
        }
        self.expanded.insert(point.clone());
        // Other OPEN nodes for the same point can never be expanded now.
        for stale in self.on_open.remove(&point).unwrap_or_default() {
            self.open.remove(stale);
            self.stats.discarded += 1;
        }
        self.stats.expanded += 1;
        let order = self.trace.len();
        self.trace.push(ExpandEvent {
            expansion_order: order as u64,
            node: id,
            point: format!("{point:?}"),
            depth: self.nodes[id.index()].depth,
            score: score.to_f64(),
            successors: Vec::new(),
        });
        Some(Expansion {
            id,
            order,
            path: self.path_to(id),
        })
    }

    /// Apply the parent-discarding policy to a finished evaluation. Returns
    /// the solution to announce, if the node was a fresh goal.
    fn insert(&mut self, discarding: ParentDiscarding, done: Evaluated<T, A, V>) -> Option<EvaluatedPath<T, A, V>> {
        let Evaluated {
            parent,
            expansion,
            index,
            path,
            goal,
            result,
            mut annotations,
            took,
        } = done;
        let point = path.head().clone();
        self.stats.created += 1;
        annotations.set(F_TIME, duration_ms(took));
        let timed_out = annotations.get(F_ERROR).and_then(Value::as_str) == Some("timeout");
        if timed_out {
            self.stats.timed_out += 1;
        }

        let score = match result {
            Ok(Some(score)) => score,
            Ok(None) => {
                let outcome = if timed_out {
                    SuccessorOutcome::TimedOut
                } else {
                    self.stats.pruned += 1;
                    SuccessorOutcome::Pruned
                };
                tracing::debug!(point = ?point, "successor pruned");
                self.record(expansion, index, &point, outcome);
                return None;
            }
            Err(err) => {
                if !err.is_interrupt() {
                    self.stats.failed += 1;
                    tracing::debug!(point = ?point, error = %err, "successor evaluation failed");
                }
                self.record(expansion, index, &point, SuccessorOutcome::Failed {
                    detail: err.annotation(),
                });
                return None;
            }
        };
        annotations.set(F, score.to_json());
        let arc = path.arcs().last().cloned();
        let score_f64 = score.to_f64();

        if goal {
            let id = self.create(point.clone(), Some(parent), arc, score.clone(), true, annotations.clone());
            self.ext2int.insert(point.clone(), id);
            self.record(expansion, index, &point, SuccessorOutcome::Goal {
                node: id,
                score: score_f64,
            });
            let solution = EvaluatedPath::new(path, score).with_annotations(&annotations);
            return self.enqueue_solution(&solution).then_some(solution);
        }

        if self.expanded.contains(&point) {
            let existing = self.ext2int.get(&point).copied();
            if let Some(existing) = existing {
                let improves = score.is_better_than(&self.nodes[existing.index()].score);
                if discarding == ParentDiscarding::All && improves && !self.path_to(parent).contains(&point) {
                    let previous = self.nodes[existing.index()].score.to_f64();
                    let depth = self.nodes[parent.index()].depth + 1;
                    let node = &mut self.nodes[existing.index()];
                    node.parent = Some(parent);
                    node.arc = arc;
                    node.score = score;
                    node.depth = depth;
                    node.annotations = annotations;
                    self.expanded.remove(&point);
                    self.push_open(existing);
                    self.stats.reopened += 1;
                    tracing::debug!(point = ?point, previous, score = score_f64, "expanded node reopened");
                    self.record(expansion, index, &point, SuccessorOutcome::Reopened {
                        node: existing,
                        previous,
                        score: score_f64,
                    });
                    return None;
                }
                self.stats.discarded += 1;
                self.record(expansion, index, &point, SuccessorOutcome::Discarded { existing });
            }
            return None;
        }

        if discarding != ParentDiscarding::None {
            let existing = self.on_open.get(&point).and_then(|ids| ids.first()).copied();
            if let Some(existing) = existing {
                if score.is_better_than(&self.nodes[existing.index()].score) {
                    self.remove_open(existing);
                    let id = self.create(point.clone(), Some(parent), arc, score, false, annotations);
                    self.push_open(id);
                    self.stats.replaced += 1;
                    tracing::debug!(point = ?point, old = %existing, new = %id, "open duplicate replaced");
                    self.record(expansion, index, &point, SuccessorOutcome::Replaced {
                        old: existing,
                        new: id,
                        score: score_f64,
                    });
                } else {
                    self.stats.discarded += 1;
                    self.record(expansion, index, &point, SuccessorOutcome::Discarded { existing });
                }
                return None;
            }
        }

        let id = self.create(point.clone(), Some(parent), arc, score, false, annotations);
        self.push_open(id);
        self.record(expansion, index, &point, SuccessorOutcome::Inserted {
            node: id,
            score: score_f64,
        });
        None
    }
}

struct Shared<T, A, V> {
    graph: Arc<dyn GraphContract<T, A>>,
    evaluator: DynEvaluator<T, A, V>,
    policy: SearchPolicy,
    state: Mutex<SearchState<T, A, V>>,
    changed: Condvar,
    cancel: CancelToken,
    deadline: Mutex<Deadline>,
    listeners: ListenerSet<T, A, V>,
}

impl<T: Point, A: EdgeLabel, V: Score> Shared<T, A, V> {
    fn control(&self) -> Control {
        Control::new(self.cancel.clone(), *self.deadline.lock())
    }

    fn evaluate_node(&self, node: &mut EvalNode<T, A, V>) -> Result<Option<V>, EvalError> {
        let ctl = self.control();
        ctl.check()?;
        catch_unwind(AssertUnwindSafe(|| self.evaluator.evaluate(node, &ctl)))
            .unwrap_or_else(|payload| Err(EvalError::failed(panic_detail(&*payload))))
    }

    fn evaluate(&self, job: Job<T, A, V>) -> Evaluated<T, A, V> {
        let mut node = EvalNode::new(job.path, job.goal, Some(job.parent_score));
        let started = Instant::now();
        let result = self.evaluate_node(&mut node);
        Evaluated {
            parent: job.parent,
            expansion: job.expansion,
            index: job.index,
            path: node.path,
            goal: node.goal,
            result,
            annotations: node.annotations,
            took: started.elapsed(),
        }
    }

    fn complete(&self, done: Evaluated<T, A, V>, release_permit: bool) {
        let solution = {
            let mut state = self.state.lock();
            if release_permit {
                state.active_jobs = state.active_jobs.saturating_sub(1);
            }
            let solution = state.insert(self.policy.parent_discarding, done);
            self.changed.notify_all();
            solution
        };
        if let Some(solution) = solution {
            tracing::debug!(depth = solution.path.depth(), "solution found");
            self.listeners.found(&solution);
        }
    }

    fn cancel(&self) {
        if self.cancel.is_canceled() {
            return;
        }
        self.cancel.cancel();
        if self.evaluator.is_cancelable() {
            self.evaluator.cancel_active_tasks();
        }
        let _state = self.state.lock();
        self.changed.notify_all();
        tracing::info!(graph = self.graph.graph_id(), "search canceled");
    }
}

/// Forwards solutions an evaluator discovers on its own into the queue.
struct EngineListener<T, A, V> {
    shared: Weak<Shared<T, A, V>>,
}

impl<T: Point, A: EdgeLabel, V: Score> SolutionListener<T, A, V> for EngineListener<T, A, V> {
    fn on_solution_found(&self, solution: &EvaluatedPath<T, A, V>) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let fresh = {
            let mut state = shared.state.lock();
            let fresh = state.enqueue_solution(solution);
            if fresh {
                shared.changed.notify_all();
            }
            fresh
        };
        if fresh {
            tracing::debug!(depth = solution.path.depth(), "solution reported by evaluator");
            shared.listeners.found(solution);
        }
    }

    fn on_solution_annotated(&self, path: &LabeledPath<T, A>, key: &str, value: &Value) {
        if let Some(shared) = self.shared.upgrade() {
            shared.state.lock().annotate_queued(path, key, value);
            shared.listeners.annotated(path, key, value);
        }
    }
}

/// Cancels a running search from another thread.
pub struct SearchHandle<T, A, V> {
    shared: Arc<Shared<T, A, V>>,
}

impl<T, A, V> Clone for SearchHandle<T, A, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Point, A: EdgeLabel, V: Score> SearchHandle<T, A, V> {
    /// Terminal: stops expansion, drops queued evaluation jobs, cancels a
    /// cancelable evaluator and wakes a blocked [`BestFirst::next_solution`].
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.shared.cancel.is_canceled()
    }
}

/// Configures a [`BestFirst`] search.
pub struct BestFirstBuilder<T, A, V> {
    graph: Arc<dyn GraphContract<T, A>>,
    evaluator: DynEvaluator<T, A, V>,
    policy: SearchPolicy,
    fallback: Option<DynEvaluator<T, A, V>>,
}

impl<T: Point, A: EdgeLabel, V: Score> BestFirstBuilder<T, A, V> {
    #[must_use]
    pub fn policy(mut self, policy: SearchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Evaluator scoring nodes whose evaluation overran `node_timeout`.
    /// Without one, such nodes are pruned.
    #[must_use]
    pub fn timeout_fallback(mut self, fallback: DynEvaluator<T, A, V>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// # Errors
    ///
    /// [`SearchError::Configuration`] for an invalid policy, an evaluator
    /// that rejects the graph, or a worker pool that cannot be started.
    pub fn build(self) -> Result<BestFirst<T, A, V>, SearchError> {
        let Self {
            graph,
            evaluator,
            policy,
            fallback,
        } = self;
        policy.validate()?;

        let evaluator: DynEvaluator<T, A, V> = match policy.node_timeout {
            Some(node_timeout) => {
                let mut timed = TimeAwareEvaluator::new(evaluator, Some(node_timeout)).with_margin(policy.timeout_margin);
                if let Some(fallback) = fallback {
                    timed = timed.with_fallback(fallback);
                }
                Arc::new(timed)
            }
            None => evaluator,
        };
        if evaluator.requires_graph() {
            evaluator
                .set_graph(Arc::clone(&graph))
                .map_err(|e| SearchError::configuration(format!("evaluator rejected graph: {e}")))?;
        }

        let pool = if policy.worker_threads > 0 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(policy.worker_threads)
                .thread_name(|i| format!("arbor-eval-{i}"))
                .build()
                .map_err(|e| SearchError::configuration(format!("worker pool: {e}")))?;
            Some(pool)
        } else {
            None
        };

        tracing::info!(
            graph = graph.graph_id(),
            discarding = policy.parent_discarding.as_str(),
            workers = policy.worker_threads,
            "best-first search configured"
        );
        let shared = Arc::new(Shared {
            graph,
            evaluator,
            policy,
            state: Mutex::new(SearchState::new()),
            changed: Condvar::new(),
            cancel: CancelToken::new(),
            deadline: Mutex::new(Deadline::none()),
            listeners: ListenerSet::new(),
        });
        if shared.evaluator.reports_solutions() {
            shared.evaluator.register_solution_listener(Arc::new(EngineListener {
                shared: Arc::downgrade(&shared),
            }));
        }
        Ok(BestFirst { shared, pool })
    }
}

/// Anytime best-first search over a [`GraphContract`].
pub struct BestFirst<T, A, V> {
    shared: Arc<Shared<T, A, V>>,
    pool: Option<ThreadPool>,
}

impl<T: Point, A: EdgeLabel, V: Score> BestFirst<T, A, V> {
    #[must_use]
    pub fn builder(graph: Arc<dyn GraphContract<T, A>>, evaluator: DynEvaluator<T, A, V>) -> BestFirstBuilder<T, A, V> {
        BestFirstBuilder {
            graph,
            evaluator,
            policy: SearchPolicy::default(),
            fallback: None,
        }
    }

    /// # Errors
    ///
    /// See [`BestFirstBuilder::build`].
    pub fn new(
        graph: Arc<dyn GraphContract<T, A>>,
        evaluator: DynEvaluator<T, A, V>,
        policy: SearchPolicy,
    ) -> Result<Self, SearchError> {
        Self::builder(graph, evaluator).policy(policy).build()
    }

    /// Evaluate the roots and put them on OPEN. Called by the first
    /// [`Self::next_solution`] if not called explicitly.
    ///
    /// # Errors
    ///
    /// [`SearchError::RootNotEvaluable`] when a root gets no score or its
    /// evaluation fails, [`SearchError::Canceled`] / [`SearchError::TimedOut`]
    /// when interrupted.
    pub fn initialize(&mut self) -> Result<(), SearchError> {
        {
            let state = self.shared.state.lock();
            match state.status {
                SearchStatus::Uninitialized => {}
                SearchStatus::Failed => {
                    return Err(state.failure.clone().unwrap_or(SearchError::Interrupted));
                }
                _ => return Ok(()),
            }
        }
        {
            let mut deadline = self.shared.deadline.lock();
            if !deadline.is_set() {
                *deadline = Deadline::within(self.shared.policy.timeout);
            }
        }

        let roots = self.shared.graph.roots();
        if roots.is_empty() {
            return Err(self.fail(SearchError::configuration("graph produced no root")));
        }
        let mut announced = Vec::new();
        for root in roots {
            let path = LabeledPath::root(root.clone());
            let goal = self.shared.graph.is_goal_path(&path);
            let mut node = EvalNode::new(path, goal, None);
            let started = Instant::now();
            let score = match self.shared.evaluate_node(&mut node) {
                Ok(Some(score)) => score,
                Ok(None) => {
                    return Err(self.fail(SearchError::RootNotEvaluable {
                        source: EvalError::failed("root evaluated to no score"),
                    }));
                }
                Err(EvalError::Interrupted(ControlSignal::Canceled)) => return Err(SearchError::Canceled),
                Err(EvalError::Interrupted(ControlSignal::DeadlineExceeded)) => return Err(SearchError::TimedOut),
                Err(source) => return Err(self.fail(SearchError::RootNotEvaluable { source })),
            };
            node.annotations.set(F, score.to_json());
            node.annotations.set(F_TIME, duration_ms(started.elapsed()));

            let mut state = self.shared.state.lock();
            state.stats.created += 1;
            let id = state.create(root.clone(), None, None, score.clone(), goal, node.annotations.clone());
            if goal {
                state.ext2int.insert(root, id);
                let solution = EvaluatedPath::new(node.path, score).with_annotations(&node.annotations);
                if state.enqueue_solution(&solution) {
                    announced.push(solution);
                }
            } else {
                state.push_open(id);
            }
        }
        {
            let mut state = self.shared.state.lock();
            state.status = SearchStatus::Active;
            tracing::info!(
                graph = self.shared.graph.graph_id(),
                open = state.open.len(),
                "search initialized"
            );
        }
        for solution in &announced {
            self.shared.listeners.found(solution);
        }
        Ok(())
    }

    fn fail(&self, err: SearchError) -> SearchError {
        tracing::warn!(error = %err, "search initialization failed");
        let mut state = self.shared.state.lock();
        state.status = SearchStatus::Failed;
        state.failure = Some(err.clone());
        err
    }

    /// Next solution in discovery order, or `Ok(None)` once the search space
    /// is exhausted.
    ///
    /// Blocks while OPEN is empty but evaluations are outstanding.
    ///
    /// # Errors
    ///
    /// [`SearchError::Canceled`] after [`Self::cancel`];
    /// [`SearchError::TimedOut`] once the deadline passed and every queued
    /// solution was delivered; initialization errors on the first call.
    pub fn next_solution(&mut self) -> Result<Option<EvaluatedPath<T, A, V>>, SearchError> {
        self.initialize()?;
        loop {
            if self.shared.cancel.is_canceled() {
                self.shared.state.lock().status = SearchStatus::Canceled;
                return Err(SearchError::Canceled);
            }
            let deadline = *self.shared.deadline.lock();
            let mut state = self.shared.state.lock();
            if let Some(solution) = state.solutions.pop_front() {
                return Ok(Some(solution));
            }
            if deadline.is_expired() {
                if state.status != SearchStatus::Interrupted {
                    tracing::info!(expanded = state.stats.expanded, "search timed out");
                }
                state.status = SearchStatus::Interrupted;
                return Err(SearchError::TimedOut);
            }
            state.status = SearchStatus::Active;
            if state.open.is_empty() {
                if state.active_jobs == 0 {
                    tracing::info!(expanded = state.stats.expanded, "search space exhausted");
                    state.status = SearchStatus::Exhausted;
                    return Ok(None);
                }
                let poll = self.shared.policy.poll_interval;
                let wait = deadline.remaining().map_or(poll, |left| left.min(poll));
                tracing::trace!(jobs = state.active_jobs, "waiting for outstanding evaluations");
                self.shared.changed.wait_for(&mut state, wait);
                continue;
            }
            let Some(expansion) = state.pop_for_expansion() else {
                continue;
            };
            drop(state);
            self.expand(&expansion);
        }
    }

    fn expand(&self, expansion: &Expansion<T, A>) {
        let graph = &self.shared.graph;
        let head = expansion.path.head();
        // Generation runs off this thread so cancel and timeout stay prompt
        // even when the generator blocks.
        let generator = Arc::clone(graph);
        let point = head.clone();
        let successors = match run_interruptible(&self.shared.control(), move |_| generator.successors(&point)) {
            Ok(successors) => successors,
            Err(TimedRunError::Canceled | TimedRunError::TimedOut { .. }) => {
                tracing::debug!(node = %expansion.id, "successor generation interrupted");
                self.shared.state.lock().requeue(expansion);
                return;
            }
            Err(err) => {
                tracing::warn!(
                    point = ?head,
                    error = %err,
                    "successor generation failed, treating node as dead end"
                );
                Vec::new()
            }
        };
        tracing::trace!(node = %expansion.id, successors = successors.len(), "node expanded");
        let parent_score = self.shared.state.lock().nodes[expansion.id.index()].score.clone();

        for (index, Successor { label, point }) in successors.into_iter().enumerate() {
            if self.shared.cancel.is_canceled() {
                return;
            }
            if expansion.path.contains(&point) {
                self.shared
                    .state
                    .lock()
                    .record(expansion.order, index, &point, SuccessorOutcome::OnPath);
                continue;
            }
            let path = expansion.path.extended(label, point);
            let goal = graph.is_goal_path(&path);
            self.dispatch(Job {
                parent: expansion.id,
                expansion: expansion.order,
                index,
                path,
                goal,
                parent_score: parent_score.clone(),
            });
        }
    }

    fn dispatch(&self, job: Job<T, A, V>) {
        let Some(pool) = &self.pool else {
            let done = self.shared.evaluate(job);
            self.shared.complete(done, false);
            return;
        };
        if !self.acquire_permit() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        pool.spawn(move || {
            let done = shared.evaluate(job);
            shared.complete(done, true);
        });
    }

    /// Counting semaphore over the pool: waits until fewer than
    /// `worker_threads` jobs are outstanding. False when canceled meanwhile.
    fn acquire_permit(&self) -> bool {
        let limit = self.shared.policy.worker_threads;
        let mut state = self.shared.state.lock();
        while state.active_jobs >= limit {
            if self.shared.cancel.is_canceled() {
                return false;
            }
            tracing::trace!(jobs = state.active_jobs, "evaluation pool saturated");
            self.shared
                .changed
                .wait_for(&mut state, self.shared.policy.poll_interval);
        }
        state.active_jobs += 1;
        true
    }

    /// See [`SearchHandle::cancel`].
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    #[must_use]
    pub fn handle(&self) -> SearchHandle<T, A, V> {
        SearchHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Bound the remaining search to `timeout` from now.
    pub fn set_timeout(&self, timeout: Duration) {
        *self.shared.deadline.lock() = Deadline::after(timeout);
        let _state = self.shared.state.lock();
        self.shared.changed.notify_all();
    }

    pub fn register_listener(&self, listener: Arc<dyn SolutionListener<T, A, V>>) {
        self.shared.listeners.register(listener);
    }

    #[must_use]
    pub fn status(&self) -> SearchStatus {
        self.shared.state.lock().status
    }

    #[must_use]
    pub fn expanded_count(&self) -> u64 {
        self.shared.state.lock().stats.expanded
    }

    #[must_use]
    pub fn created_count(&self) -> u64 {
        self.shared.state.lock().stats.created
    }

    #[must_use]
    pub fn stats(&self) -> SearchStats {
        self.shared.state.lock().stats
    }

    /// Points on OPEN, best first.
    #[must_use]
    pub fn open_points(&self) -> Vec<T> {
        let state = self.shared.state.lock();
        state
            .open
            .iter()
            .map(|id| state.nodes[id.index()].point.clone())
            .collect()
    }

    /// Expanded points, unordered.
    #[must_use]
    pub fn expanded_points(&self) -> Vec<T> {
        self.shared.state.lock().expanded.iter().cloned().collect()
    }

    #[must_use]
    pub fn is_open(&self, point: &T) -> bool {
        self.shared.state.lock().on_open.contains_key(point)
    }

    #[must_use]
    pub fn is_expanded(&self, point: &T) -> bool {
        self.shared.state.lock().expanded.contains(point)
    }

    /// Score of the current node for `point`.
    #[must_use]
    pub fn score_of(&self, point: &T) -> Option<V> {
        let state = self.shared.state.lock();
        let id = state.ext2int.get(point)?;
        Some(state.nodes[id.index()].score.clone())
    }

    /// Parent point of the current node for `point`.
    #[must_use]
    pub fn parent_of(&self, point: &T) -> Option<T> {
        let state = self.shared.state.lock();
        let id = state.ext2int.get(point)?;
        let parent = state.nodes[id.index()].parent?;
        Some(state.nodes[parent.index()].point.clone())
    }

    #[must_use]
    pub fn path_to(&self, point: &T) -> Option<LabeledPath<T, A>> {
        let state = self.shared.state.lock();
        let id = *state.ext2int.get(point)?;
        Some(state.path_to(id))
    }

    #[must_use]
    pub fn annotations_of(&self, point: &T) -> Option<Annotations> {
        let state = self.shared.state.lock();
        let id = state.ext2int.get(point)?;
        Some(state.nodes[id.index()].annotations.clone())
    }

    /// True if any node on OPEN is a goal. Never expected to hold.
    #[must_use]
    pub fn goal_on_open(&self) -> bool {
        let state = self.shared.state.lock();
        let any = state.open.iter().any(|id| state.nodes[id.index()].goal);
        any
    }

    /// Snapshot of the expansion audit trail.
    #[must_use]
    pub fn search_graph(&self) -> SearchGraph {
        let state = self.shared.state.lock();
        let stats = state.stats;
        let termination = match state.status {
            SearchStatus::Uninitialized | SearchStatus::Active => TerminationReason::Running,
            SearchStatus::Interrupted => TerminationReason::TimedOut,
            SearchStatus::Canceled => TerminationReason::Canceled,
            SearchStatus::Exhausted => TerminationReason::Exhausted,
            SearchStatus::Failed => TerminationReason::RootNotEvaluable,
        };
        SearchGraph {
            expansions: state.trace.clone(),
            metadata: SearchGraphMetadata {
                graph_id: self.shared.graph.graph_id().to_string(),
                parent_discarding: self.shared.policy.parent_discarding,
                worker_threads: self.shared.policy.worker_threads,
                total_expansions: stats.expanded,
                total_created: stats.created,
                total_solutions: stats.solutions,
                total_pruned: stats.pruned,
                total_failed: stats.failed,
                total_discarded: stats.discarded,
                total_reopened: stats.reopened,
                total_timed_out: stats.timed_out,
                frontier_high_water: u64::try_from(state.open.high_water()).unwrap_or(u64::MAX),
                termination,
            },
        }
    }
}

impl<T, A, V> Drop for BestFirst<T, A, V> {
    fn drop(&mut self) {
        // Queued pool jobs see the token and return without evaluating.
        self.shared.cancel.cancel();
    }
}
