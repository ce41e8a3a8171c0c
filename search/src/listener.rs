//! Solution events and their subscribers.

use std::sync::Arc;

use arbor_kernel::annotation::{Annotations, F};
use arbor_kernel::path::LabeledPath;
use arbor_kernel::score::Score;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

/// A root-to-goal path with its score and annotations.
///
/// The score is always mirrored under the `"f"` annotation.
#[derive(Debug, Clone)]
pub struct EvaluatedPath<T, A, V> {
    pub path: LabeledPath<T, A>,
    pub score: V,
    pub annotations: Annotations,
}

impl<T, A, V: Score> EvaluatedPath<T, A, V> {
    #[must_use]
    pub fn new(path: LabeledPath<T, A>, score: V) -> Self {
        let mut annotations = Annotations::new();
        annotations.set(F, score.to_json());
        Self {
            path,
            score,
            annotations,
        }
    }

    #[must_use]
    pub fn with_annotations(mut self, extra: &Annotations) -> Self {
        self.annotations.merge(extra);
        self.annotations.set(F, self.score.to_json());
        self
    }
}

/// Receives solution events from engines and solution-reporting evaluators.
///
/// Callbacks run synchronously on the thread that found the solution and must
/// not block for long.
pub trait SolutionListener<T, A, V>: Send + Sync {
    /// At most once per distinct path.
    fn on_solution_found(&self, solution: &EvaluatedPath<T, A, V>);

    /// Any number of times after the corresponding found event.
    fn on_solution_annotated(&self, _path: &LabeledPath<T, A>, _key: &str, _value: &Value) {}
}

/// Registered listeners, notified in registration order.
pub struct ListenerSet<T, A, V> {
    listeners: RwLock<Vec<Arc<dyn SolutionListener<T, A, V>>>>,
}

impl<T, A, V> ListenerSet<T, A, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, listener: Arc<dyn SolutionListener<T, A, V>>) {
        self.listeners.write().push(listener);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    // Snapshot first so a callback may register further listeners.
    fn snapshot(&self) -> Vec<Arc<dyn SolutionListener<T, A, V>>> {
        self.listeners.read().clone()
    }

    pub fn found(&self, solution: &EvaluatedPath<T, A, V>) {
        for listener in self.snapshot() {
            listener.on_solution_found(solution);
        }
    }

    pub fn annotated(&self, path: &LabeledPath<T, A>, key: &str, value: &Value) {
        for listener in self.snapshot() {
            listener.on_solution_annotated(path, key, value);
        }
    }
}

impl<T, A, V> Default for ListenerSet<T, A, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener that records every event; handy for callers that poll.
pub struct CollectingListener<T, A, V> {
    found: Mutex<Vec<EvaluatedPath<T, A, V>>>,
    annotated: Mutex<Vec<(LabeledPath<T, A>, String, Value)>>,
}

impl<T: Clone, A: Clone, V: Clone> CollectingListener<T, A, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            found: Mutex::new(Vec::new()),
            annotated: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn found(&self) -> Vec<EvaluatedPath<T, A, V>> {
        self.found.lock().clone()
    }

    #[must_use]
    pub fn annotations(&self) -> Vec<(LabeledPath<T, A>, String, Value)> {
        self.annotated.lock().clone()
    }
}

impl<T: Clone, A: Clone, V: Clone> Default for CollectingListener<T, A, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A, V> SolutionListener<T, A, V> for CollectingListener<T, A, V>
where
    T: Clone + Send + Sync,
    A: Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn on_solution_found(&self, solution: &EvaluatedPath<T, A, V>) {
        self.found.lock().push(solution.clone());
    }

    fn on_solution_annotated(&self, path: &LabeledPath<T, A>, key: &str, value: &Value) {
        self.annotated
            .lock()
            .push((path.clone(), key.to_string(), value.clone()));
    }
}
