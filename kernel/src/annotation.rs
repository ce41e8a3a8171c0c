//! String-keyed annotation maps attached to nodes and solutions.

use std::collections::BTreeMap;

use serde_json::Value;

/// Score of a node or solution.
pub const F: &str = "f";
/// Wall-clock evaluation time in milliseconds.
pub const F_TIME: &str = "fTime";
/// Reason a node was pruned instead of inserted.
pub const F_ERROR: &str = "fError";
/// Uncertainty estimate derived from rollout samples.
pub const F_UNCERTAINTY: &str = "fUncertainty";
/// Number of successful rollout samples behind a score.
pub const F_SAMPLES: &str = "fRPSamples";
/// Milliseconds from the first evaluation until a solution was found.
pub const TIME_TO_SOLUTION: &str = "timeToSolution";
/// Number of node evaluations performed before a solution was found.
pub const NODES_EVALUATED_TO_SOLUTION: &str = "nodesEvaluatedToSolution";

/// Ordered annotation map. `BTreeMap` keeps serialization order stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    entries: BTreeMap<String, Value>,
}

impl Annotations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing any previous value.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.entries.insert(key.to_string(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Copy every entry of `other` into `self`, overwriting on collision.
    pub fn merge(&mut self, other: &Annotations) {
        for (k, v) in &other.entries {
            self.entries.insert(k.clone(), v.clone());
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// JSON object view, used by reports.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}
