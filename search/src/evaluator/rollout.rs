//! Random-completion (rollout) node evaluation.
//!
//! A partial path is scored by completing it at random into full solutions,
//! scoring each solution with a [`SolutionEvaluator`] and reporting the best
//! score ever seen below the path. Completions come from a single
//! [`RandomCompleter`] shared by all evaluations and guarded by its own
//! mutex. Every solution scored along the way is posted once to the
//! registered [`SolutionListener`]s.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use arbor_kernel::annotation::{F_SAMPLES, F_TIME, F_UNCERTAINTY, NODES_EVALUATED_TO_SOLUTION, TIME_TO_SOLUTION};
use arbor_kernel::contract::{EdgeLabel, GraphContract, Point};
use arbor_kernel::control::{run_with_timeout, CancelToken, Control, ControlSignal, Deadline, TimeBudget, TimedRunError};
use arbor_kernel::path::LabeledPath;
use arbor_kernel::score::Score;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::{EvalNode, NodeEvaluator};
use crate::completer::{CompleterError, PriorityPredicate, RandomCompleter};
use crate::error::{EvalError, SearchError};
use crate::listener::{EvaluatedPath, ListenerSet, SolutionListener};

/// Scores complete solution paths. May fail for domain reasons.
pub trait SolutionEvaluator<T, A, V>: Send + Sync {
    /// # Errors
    ///
    /// Domain-specific failures as [`EvalError::Failed`]; interruption when
    /// `ctl` is canceled.
    fn evaluate(&self, path: &LabeledPath<T, A>, ctl: &Control) -> Result<V, EvalError>;
}

/// Adapts a closure into a [`SolutionEvaluator`].
pub struct FnSolutionEvaluator<F>(pub F);

impl<T, A, V, F> SolutionEvaluator<T, A, V> for FnSolutionEvaluator<F>
where
    F: Fn(&LabeledPath<T, A>) -> Result<V, EvalError> + Send + Sync,
{
    fn evaluate(&self, path: &LabeledPath<T, A>, ctl: &Control) -> Result<V, EvalError> {
        ctl.check()?;
        (self.0)(path)
    }
}

/// Derives an uncertainty estimate for a node from its rollout samples.
pub trait UncertaintySource<T, A, V>: Send + Sync {
    fn estimate(&self, node: &LabeledPath<T, A>, samples: &[LabeledPath<T, A>], scores: &[V]) -> f64;
}

/// Population standard deviation of the sampled scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreSpread;

impl<T, A, V: Score> UncertaintySource<T, A, V> for ScoreSpread {
    #[allow(clippy::cast_precision_loss)]
    fn estimate(&self, _node: &LabeledPath<T, A>, _samples: &[LabeledPath<T, A>], scores: &[V]) -> f64 {
        if scores.len() < 2 {
            return 0.0;
        }
        let n = scores.len() as f64;
        let mean = scores.iter().map(Score::to_f64).sum::<f64>() / n;
        let var = scores
            .iter()
            .map(|s| (s.to_f64() - mean).powi(2))
            .sum::<f64>()
            / n;
        var.sqrt()
    }
}

/// Rollout configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutConfig {
    /// Successful samples wanted per node (`k`).
    pub samples: usize,
    /// Completions drawn per node at most, successful or not.
    pub max_samples: usize,
    /// Budget for scoring one completion.
    pub sample_timeout: Option<Duration>,
    /// Budget for all sampling at one node.
    pub node_timeout: Option<Duration>,
    /// Reuse the parent's score when the node is its parent's only successor.
    /// Only sound when the arc into such a node cannot change the final score.
    pub inherit_from_only_child: bool,
    pub seed: u64,
}

impl RolloutConfig {
    /// # Errors
    ///
    /// [`SearchError::Configuration`] when `samples` is zero or exceeds
    /// `max_samples`, or a timeout is zero.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.samples == 0 {
            return Err(SearchError::configuration("rollout samples must be positive"));
        }
        if self.max_samples < self.samples {
            return Err(SearchError::configuration(format!(
                "max_samples ({}) below samples ({})",
                self.max_samples, self.samples
            )));
        }
        if self.sample_timeout.is_some_and(|t| t.is_zero()) || self.node_timeout.is_some_and(|t| t.is_zero()) {
            return Err(SearchError::configuration("rollout timeouts must be positive"));
        }
        Ok(())
    }
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            samples: 3,
            max_samples: 10,
            sample_timeout: None,
            node_timeout: None,
            inherit_from_only_child: false,
            seed: 0,
        }
    }
}

struct RolloutCache<T, V> {
    /// Scores returned for nodes.
    f_values: HashMap<Vec<T>, V>,
    /// Scores of evaluated solutions.
    solutions: HashMap<Vec<T>, V>,
    /// Solutions whose evaluation failed; never retried.
    failed: HashSet<Vec<T>>,
    /// Best solution score seen below each prefix.
    best_under: HashMap<Vec<T>, V>,
    posted: HashSet<Vec<T>>,
    successor_counts: HashMap<T, usize>,
}

impl<T, V> Default for RolloutCache<T, V> {
    fn default() -> Self {
        Self {
            f_values: HashMap::new(),
            solutions: HashMap::new(),
            failed: HashSet::new(),
            best_under: HashMap::new(),
            posted: HashSet::new(),
            successor_counts: HashMap::new(),
        }
    }
}

/// Monte-Carlo node evaluator over a nested random completer.
pub struct RandomCompletionEvaluator<T, A, V> {
    config: RolloutConfig,
    solution_evaluator: Arc<dyn SolutionEvaluator<T, A, V>>,
    uncertainty: Option<Arc<dyn UncertaintySource<T, A, V>>>,
    priority: Option<PriorityPredicate<T>>,
    graph: RwLock<Option<Arc<dyn GraphContract<T, A>>>>,
    completer: Mutex<Option<RandomCompleter<T, A>>>,
    cache: Mutex<RolloutCache<T, V>>,
    sampled: Mutex<Vec<Vec<T>>>,
    listeners: ListenerSet<T, A, V>,
    cancel: CancelToken,
    first_evaluation: OnceLock<Instant>,
    evaluations: AtomicU64,
}

impl<T: Point, A: EdgeLabel, V: Score> RandomCompletionEvaluator<T, A, V> {
    /// # Errors
    ///
    /// [`SearchError::Configuration`] if `config` is invalid.
    pub fn new(
        solution_evaluator: Arc<dyn SolutionEvaluator<T, A, V>>,
        config: RolloutConfig,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        Ok(Self {
            config,
            solution_evaluator,
            uncertainty: None,
            priority: None,
            graph: RwLock::new(None),
            completer: Mutex::new(None),
            cache: Mutex::new(RolloutCache::default()),
            sampled: Mutex::new(Vec::new()),
            listeners: ListenerSet::new(),
            cancel: CancelToken::new(),
            first_evaluation: OnceLock::new(),
            evaluations: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn with_uncertainty(mut self, source: Arc<dyn UncertaintySource<T, A, V>>) -> Self {
        self.uncertainty = Some(source);
        self
    }

    /// Steer the completer towards points matching `predicate`.
    #[must_use]
    pub fn with_priority(mut self, predicate: PriorityPredicate<T>) -> Self {
        self.priority = Some(predicate);
        self
    }

    #[must_use]
    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    /// Heads of all completions drawn so far, in draw order.
    #[must_use]
    pub fn sampled_completions(&self) -> Vec<Vec<T>> {
        self.sampled.lock().clone()
    }

    /// Best solution score seen below the path with these points.
    #[must_use]
    pub fn best_under(&self, points: &[T]) -> Option<V> {
        self.cache.lock().best_under.get(points).cloned()
    }

    /// Distinct solutions posted to listeners.
    #[must_use]
    pub fn posted_count(&self) -> usize {
        self.cache.lock().posted.len()
    }

    fn draw(&self, path: &LabeledPath<T, A>, ctl: &Control) -> Result<Option<LabeledPath<T, A>>, EvalError> {
        let mut guard = self.completer.lock();
        let Some(completer) = guard.as_mut() else {
            return Err(EvalError::MissingGraph);
        };
        match completer.next_solution_under(path, ctl) {
            Ok(Some(completion)) => {
                self.sampled.lock().push(completion.points().to_vec());
                Ok(Some(completion))
            }
            Ok(None) => Ok(None),
            Err(CompleterError::Interrupted(signal)) => Err(EvalError::Interrupted(signal)),
            Err(other) => Err(EvalError::failed(other.to_string())),
        }
    }

    /// Score a complete solution, memoized. `Ok(None)` for failed solutions.
    fn score_solution(&self, path: &LabeledPath<T, A>, ctl: &Control) -> Result<Option<V>, EvalError> {
        let key = path.points().to_vec();
        {
            let cache = self.cache.lock();
            if let Some(score) = cache.solutions.get(&key) {
                return Ok(Some(score.clone()));
            }
            if cache.failed.contains(&key) {
                return Ok(None);
            }
        }

        let budget = TimeBudget::compute(self.config.sample_timeout, ctl.deadline(), Duration::ZERO, Duration::ZERO);
        let evaluator = Arc::clone(&self.solution_evaluator);
        let detached = path.clone();
        let started = Instant::now();
        let outcome = run_with_timeout(budget.granted, ctl, move |child| evaluator.evaluate(&detached, child));
        if ctl.is_canceled() {
            return Err(EvalError::Interrupted(ControlSignal::Canceled));
        }
        let failure = match outcome {
            Ok(Ok(score)) => {
                self.cache.lock().solutions.insert(key, score.clone());
                self.post_solution(path, &score, started.elapsed());
                return Ok(Some(score));
            }
            Ok(Err(err)) => err,
            Err(TimedRunError::Canceled) => return Err(EvalError::Interrupted(ControlSignal::Canceled)),
            Err(err) => EvalError::from(err),
        };
        tracing::debug!(error = %failure, depth = path.depth(), "solution evaluation failed");
        self.cache.lock().failed.insert(key);
        Ok(None)
    }

    /// Post a newly scored solution, then its timing annotations as separate
    /// events so listeners see the found event as early as possible.
    fn post_solution(&self, path: &LabeledPath<T, A>, score: &V, took: Duration) {
        if !self.cache.lock().posted.insert(path.points().to_vec()) {
            return;
        }
        self.listeners.found(&EvaluatedPath::new(path.clone(), score.clone()));
        let since_start = self
            .first_evaluation
            .get()
            .map_or(Duration::ZERO, Instant::elapsed);
        let timings = [
            (F_TIME, duration_ms(took)),
            (TIME_TO_SOLUTION, duration_ms(since_start)),
            (NODES_EVALUATED_TO_SOLUTION, self.evaluations.load(Ordering::Relaxed)),
        ];
        for (key, value) in timings {
            self.listeners.annotated(path, key, &Value::from(value));
        }
    }

    /// Completions of `path` through arcs already explored from other
    /// prefixes. Not recorded as drawn samples.
    fn rerouted(
        &self,
        path: &LabeledPath<T, A>,
        limit: usize,
        ctl: &Control,
    ) -> Result<Vec<LabeledPath<T, A>>, EvalError> {
        let mut guard = self.completer.lock();
        let Some(completer) = guard.as_mut() else {
            return Err(EvalError::MissingGraph);
        };
        completer.explored_completions(path, limit, ctl).map_err(|err| match err {
            CompleterError::Interrupted(signal) => EvalError::Interrupted(signal),
            other => EvalError::failed(other.to_string()),
        })
    }

    /// Propagate `score` to every prefix of `completion` it improves.
    fn record_best(&self, completion: &LabeledPath<T, A>, score: &V) {
        let points = completion.points();
        let mut cache = self.cache.lock();
        for n in (1..=points.len()).rev() {
            let prefix = &points[..n];
            let improves = cache
                .best_under
                .get(prefix)
                .map_or(true, |best| score.is_better_than(best));
            if !improves {
                break;
            }
            cache.best_under.insert(prefix.to_vec(), score.clone());
        }
    }

    fn inherited_score(&self, node: &EvalNode<T, A, V>, graph: &dyn GraphContract<T, A>) -> Option<V> {
        let points = node.path.points();
        if points.len() < 2 {
            return None;
        }
        let parent_points = &points[..points.len() - 1];
        let parent = &points[points.len() - 2];
        let known = self.cache.lock().successor_counts.get(parent).copied();
        let count = known.unwrap_or_else(|| {
            let count = graph.successors(parent).len();
            self.cache.lock().successor_counts.insert(parent.clone(), count);
            count
        });
        if count != 1 {
            return None;
        }
        let cached = self.cache.lock().f_values.get(parent_points).cloned();
        cached.or_else(|| node.parent_score.clone())
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl<T: Point, A: EdgeLabel, V: Score> NodeEvaluator<T, A, V> for RandomCompletionEvaluator<T, A, V> {
    fn evaluate(&self, node: &mut EvalNode<T, A, V>, ctl: &Control) -> Result<Option<V>, EvalError> {
        let graph = self.graph.read().clone().ok_or(EvalError::MissingGraph)?;
        self.first_evaluation.get_or_init(Instant::now);
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        ctl.check()?;

        let key = node.path.points().to_vec();
        if let Some(score) = self.cache.lock().f_values.get(&key) {
            return Ok(Some(score.clone()));
        }

        if node.goal {
            let score = self.score_solution(&node.path, ctl)?;
            if let Some(v) = &score {
                self.record_best(&node.path, v);
                self.cache.lock().f_values.insert(key, v.clone());
            }
            return Ok(score);
        }

        if self.config.inherit_from_only_child {
            if let Some(inherited) = self.inherited_score(node, graph.as_ref()) {
                tracing::trace!(depth = node.path.depth(), "score inherited from only-child parent");
                self.cache.lock().f_values.insert(key, inherited.clone());
                return Ok(Some(inherited));
            }
        }

        let node_deadline = ctl.deadline().min(Deadline::within(self.config.node_timeout));
        let node_ctl = Control::new(ctl.cancel_token().joined(&self.cancel), node_deadline);
        let mut drawn = 0;
        let mut failed = 0;
        let mut samples = Vec::new();
        let mut scores = Vec::new();
        let mut pending: Vec<LabeledPath<T, A>> = Vec::new();
        let mut reroute_tried = false;
        while scores.len() < self.config.samples && drawn < self.config.max_samples {
            if node_ctl.is_canceled() {
                return Err(EvalError::Interrupted(ControlSignal::Canceled));
            }
            if node_deadline.is_expired() {
                tracing::debug!(drawn, "rollout budget exhausted");
                break;
            }
            let next = match pending.pop() {
                Some(completion) => Ok(Some(completion)),
                None if reroute_tried => Ok(None),
                None => self.draw(&node.path, &node_ctl),
            };
            let completion = match next {
                Ok(Some(completion)) => completion,
                Ok(None) if !reroute_tried => {
                    // Fresh draws are used up below this node, but it may merge
                    // into a region other prefixes explored.
                    reroute_tried = true;
                    let limit = self.config.max_samples - drawn;
                    match self.rerouted(&node.path, limit, &node_ctl) {
                        Ok(found) => {
                            tracing::trace!(
                                found = found.len(),
                                depth = node.path.depth(),
                                "rerouting through explored arcs"
                            );
                            pending = found;
                            pending.reverse();
                            continue;
                        }
                        Err(EvalError::Interrupted(ControlSignal::DeadlineExceeded)) => break,
                        Err(err) => return Err(err),
                    }
                }
                Ok(None) | Err(EvalError::Interrupted(ControlSignal::DeadlineExceeded)) => break,
                Err(err) => return Err(err),
            };
            drawn += 1;
            match self.score_solution(&completion, &node_ctl)? {
                Some(score) => {
                    self.record_best(&completion, &score);
                    samples.push(completion);
                    scores.push(score);
                }
                None => failed += 1,
            }
        }

        let Some(best) = self.best_under(&key) else {
            if node.path.is_root() {
                return Err(EvalError::NoViableCandidate { drawn, failed });
            }
            tracing::debug!(drawn, failed, depth = node.path.depth(), "no viable completion, pruning");
            return Ok(None);
        };
        node.annotations.set(F_SAMPLES, scores.len());
        if let Some(source) = &self.uncertainty {
            node.annotations
                .set(F_UNCERTAINTY, source.estimate(&node.path, &samples, &scores));
        }
        self.cache.lock().f_values.insert(key, best.clone());
        Ok(Some(best))
    }

    fn requires_graph(&self) -> bool {
        true
    }

    fn set_graph(&self, graph: Arc<dyn GraphContract<T, A>>) -> Result<(), EvalError> {
        let completer = RandomCompleter::new(Arc::clone(&graph), self.config.seed)
            .map_err(|e| EvalError::failed(e.to_string()))?;
        let completer = match &self.priority {
            Some(predicate) => completer.with_priority(Arc::clone(predicate)),
            None => completer,
        };
        tracing::info!(graph = graph.graph_id(), samples = self.config.samples, "rollout completer built");
        *self.completer.lock() = Some(completer);
        *self.graph.write() = Some(graph);
        Ok(())
    }

    fn reports_solutions(&self) -> bool {
        true
    }

    fn register_solution_listener(&self, listener: Arc<dyn SolutionListener<T, A, V>>) {
        self.listeners.register(listener);
    }

    fn is_cancelable(&self) -> bool {
        true
    }

    fn cancel_active_tasks(&self) {
        tracing::debug!("rollout evaluator canceled");
        self.cancel.cancel();
    }
}
