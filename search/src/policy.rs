//! Search policy types.

use std::time::Duration;

use crate::error::SearchError;

/// How duplicate points reached via different parents are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParentDiscarding {
    /// Every generated successor becomes a new node. Assumes a tree.
    #[default]
    None,
    /// Two nodes for the same point on OPEN: keep the better one.
    OpenOnly,
    /// Like `OpenOnly`, and an expanded point reached with a strictly better
    /// score is reopened under its new parent.
    All,
}

impl ParentDiscarding {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::OpenOnly => "open_only",
            Self::All => "all",
        }
    }
}

/// Best-first configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPolicy {
    pub parent_discarding: ParentDiscarding,
    /// Size of the evaluation pool. `0` evaluates successors inline on the
    /// stepping thread.
    pub worker_threads: usize,
    /// Budget for a single node evaluation. On overrun the search's fallback
    /// evaluator decides the score (by default the node is pruned).
    pub node_timeout: Option<Duration>,
    /// Subtracted from every granted evaluation budget.
    pub timeout_margin: Duration,
    /// Wall-clock bound on the whole search.
    pub timeout: Option<Duration>,
    /// Upper bound on a single wait for OPEN while jobs are outstanding.
    pub poll_interval: Duration,
}

impl SearchPolicy {
    /// Check the policy before any node is evaluated.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Configuration`] for a zero poll interval, a zero
    /// node timeout or a margin that consumes the whole node timeout.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.poll_interval.is_zero() {
            return Err(SearchError::configuration("poll_interval must be positive"));
        }
        if let Some(node_timeout) = self.node_timeout {
            if node_timeout.is_zero() {
                return Err(SearchError::configuration("node_timeout must be positive"));
            }
            if self.timeout_margin >= node_timeout {
                return Err(SearchError::configuration(
                    "timeout_margin must be smaller than node_timeout",
                ));
            }
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(SearchError::configuration("timeout must be positive"));
        }
        Ok(())
    }
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            parent_discarding: ParentDiscarding::None,
            worker_threads: 0,
            node_timeout: None,
            timeout_margin: Duration::ZERO,
            timeout: None,
            poll_interval: Duration::from_millis(50),
        }
    }
}
