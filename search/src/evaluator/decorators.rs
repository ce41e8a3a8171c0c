//! Evaluator decorators.
//!
//! Each decorator wraps one (or, for [`AlternativeEvaluator`], two) shared
//! evaluators and forwards graph injection, listener registration and
//! cancellation to them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arbor_kernel::contract::{EdgeLabel, GraphContract, Point};
use arbor_kernel::control::Control;
use arbor_kernel::path::LabeledPath;
use arbor_kernel::score::Score;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{DynEvaluator, EvalNode, NodeEvaluator};
use crate::error::{EvalError, SearchError};
use crate::listener::SolutionListener;

/// `primary` if it scores the node, otherwise `secondary`.
///
/// Typical use: a cheap dead-end recognizer as primary, which returns `None`
/// for everything it cannot classify.
pub struct AlternativeEvaluator<T, A, V> {
    primary: DynEvaluator<T, A, V>,
    secondary: DynEvaluator<T, A, V>,
}

impl<T, A, V> AlternativeEvaluator<T, A, V> {
    #[must_use]
    pub fn new(primary: DynEvaluator<T, A, V>, secondary: DynEvaluator<T, A, V>) -> Self {
        Self { primary, secondary }
    }
}

impl<T: Point, A: EdgeLabel, V: Score> NodeEvaluator<T, A, V> for AlternativeEvaluator<T, A, V> {
    fn evaluate(&self, node: &mut EvalNode<T, A, V>, ctl: &Control) -> Result<Option<V>, EvalError> {
        if let Some(score) = self.primary.evaluate(node, ctl)? {
            return Ok(Some(score));
        }
        self.secondary.evaluate(node, ctl)
    }

    fn requires_graph(&self) -> bool {
        self.primary.requires_graph() || self.secondary.requires_graph()
    }

    fn set_graph(&self, graph: Arc<dyn GraphContract<T, A>>) -> Result<(), EvalError> {
        if self.primary.requires_graph() {
            self.primary.set_graph(Arc::clone(&graph))?;
        }
        if self.secondary.requires_graph() {
            self.secondary.set_graph(graph)?;
        }
        Ok(())
    }

    fn reports_solutions(&self) -> bool {
        self.primary.reports_solutions() || self.secondary.reports_solutions()
    }

    fn register_solution_listener(&self, listener: Arc<dyn SolutionListener<T, A, V>>) {
        if self.primary.reports_solutions() {
            self.primary.register_solution_listener(Arc::clone(&listener));
        }
        if self.secondary.reports_solutions() {
            self.secondary.register_solution_listener(listener);
        }
    }

    fn is_cancelable(&self) -> bool {
        self.primary.is_cancelable() || self.secondary.is_cancelable()
    }

    fn cancel_active_tasks(&self) {
        self.primary.cancel_active_tasks();
        self.secondary.cancel_active_tasks();
    }
}

/// Sleeps for a fixed time after every evaluation. Benchmarks use it to
/// simulate expensive scoring.
pub struct DelayingEvaluator<T, A, V> {
    inner: DynEvaluator<T, A, V>,
    delay: Duration,
}

impl<T, A, V> DelayingEvaluator<T, A, V> {
    #[must_use]
    pub fn new(inner: DynEvaluator<T, A, V>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl<T: Point, A: EdgeLabel, V: Score> NodeEvaluator<T, A, V> for DelayingEvaluator<T, A, V> {
    fn evaluate(&self, node: &mut EvalNode<T, A, V>, ctl: &Control) -> Result<Option<V>, EvalError> {
        let score = self.inner.evaluate(node, ctl)?;
        ctl.sleep(self.delay)?;
        Ok(score)
    }

    forward_capabilities!(inner);
}

/// With probability `p`, reuses the parent's score instead of evaluating.
/// The parent's score comes from this evaluator's per-path cache, or from the
/// node itself when the parent was scored elsewhere.
pub struct SkippingEvaluator<T, A, V> {
    inner: DynEvaluator<T, A, V>,
    probability: f64,
    rng: Mutex<StdRng>,
    cache: Mutex<HashMap<Vec<T>, Option<V>>>,
    skipped: AtomicU64,
}

impl<T, A, V> SkippingEvaluator<T, A, V> {
    /// # Errors
    ///
    /// [`SearchError::Configuration`] unless `0 <= probability <= 1`.
    pub fn new(
        inner: DynEvaluator<T, A, V>,
        probability: f64,
        seed: u64,
    ) -> Result<Self, SearchError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(SearchError::configuration(format!(
                "skip probability {probability} outside [0, 1]"
            )));
        }
        Ok(Self {
            inner,
            probability,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            cache: Mutex::new(HashMap::new()),
            skipped: AtomicU64::new(0),
        })
    }

    /// Number of evaluations answered from the parent's score.
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

impl<T: Point, A: EdgeLabel, V: Score> NodeEvaluator<T, A, V> for SkippingEvaluator<T, A, V> {
    fn evaluate(&self, node: &mut EvalNode<T, A, V>, ctl: &Control) -> Result<Option<V>, EvalError> {
        let points = node.path.points();
        if let Some(cached) = self.cache.lock().get(points) {
            return Ok(cached.clone());
        }
        if points.len() > 1 {
            let cached = self
                .cache
                .lock()
                .get(&points[..points.len() - 1])
                .cloned()
                .flatten();
            let parent = cached.or_else(|| node.parent_score.clone());
            if let Some(parent_score) = parent {
                if self.rng.lock().gen_bool(self.probability) {
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                    self.cache
                        .lock()
                        .insert(points.to_vec(), Some(parent_score.clone()));
                    return Ok(Some(parent_score));
                }
            }
        }
        let score = self.inner.evaluate(node, ctl)?;
        self.cache
            .lock()
            .insert(node.path.points().to_vec(), score.clone());
        Ok(score)
    }

    forward_capabilities!(inner);
}

/// Records wall-clock evaluation time per path. Never alters the result.
pub struct TimeLoggingEvaluator<T, A, V> {
    inner: DynEvaluator<T, A, V>,
    times: Mutex<HashMap<Vec<T>, Duration>>,
}

impl<T: Point, A, V> TimeLoggingEvaluator<T, A, V> {
    #[must_use]
    pub fn new(inner: DynEvaluator<T, A, V>) -> Self {
        Self {
            inner,
            times: Mutex::new(HashMap::new()),
        }
    }

    /// Time of the most recent evaluation of `path`.
    #[must_use]
    pub fn time_for(&self, path: &LabeledPath<T, A>) -> Option<Duration> {
        self.times.lock().get(path.points()).copied()
    }

    #[must_use]
    pub fn logged_count(&self) -> usize {
        self.times.lock().len()
    }
}

impl<T: Point, A: EdgeLabel, V: Score> NodeEvaluator<T, A, V> for TimeLoggingEvaluator<T, A, V> {
    fn evaluate(&self, node: &mut EvalNode<T, A, V>, ctl: &Control) -> Result<Option<V>, EvalError> {
        let started = Instant::now();
        let result = self.inner.evaluate(node, ctl);
        self.times
            .lock()
            .insert(node.path.points().to_vec(), started.elapsed());
        result
    }

    forward_capabilities!(inner);
}
