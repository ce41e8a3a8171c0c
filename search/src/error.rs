//! Typed search and evaluation errors.
//!
//! Evaluation errors are mostly local: a timed-out or failing evaluation
//! prunes its node and is recorded in the node's annotations. Only
//! interruption escapes an evaluation unchanged. `SearchError` is what a
//! caller of the engines sees.

use std::time::Duration;

use arbor_kernel::control::{ControlSignal, TimedRunError};

/// Failure of a single node or solution evaluation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// Canceled or out of time. Never swallowed by decorators.
    #[error("evaluation interrupted: {0}")]
    Interrupted(#[from] ControlSignal),
    /// The evaluation exceeded its granted budget and no fallback applied.
    #[error("evaluation exceeded its budget of {after:?}")]
    TimedOut { after: Duration },
    /// Any other failure, including panics inside the evaluator.
    #[error("evaluation failed: {detail}")]
    Failed { detail: String },
    /// Rollout at a root drew no successfully evaluated completion.
    #[error("no viable candidate: {drawn} completions drawn, {failed} failed")]
    NoViableCandidate { drawn: usize, failed: usize },
    /// A graph-dependent evaluator was used before a graph was injected.
    #[error("evaluator requires a graph but none was injected")]
    MissingGraph,
}

impl EvalError {
    #[must_use]
    pub fn failed(detail: impl Into<String>) -> Self {
        Self::Failed {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }

    /// Short reason recorded under the `fError` annotation.
    #[must_use]
    pub fn annotation(&self) -> String {
        match self {
            Self::Interrupted(_) => "interrupted".into(),
            Self::TimedOut { .. } => "timeout".into(),
            Self::Failed { detail } => detail.clone(),
            Self::NoViableCandidate { .. } => "no viable candidate".into(),
            Self::MissingGraph => "missing graph".into(),
        }
    }
}

impl From<TimedRunError> for EvalError {
    fn from(err: TimedRunError) -> Self {
        match err {
            TimedRunError::Canceled => Self::Interrupted(ControlSignal::Canceled),
            TimedRunError::TimedOut { after } => Self::TimedOut { after },
            TimedRunError::Panicked { detail } | TimedRunError::Spawn { detail } => {
                Self::Failed { detail }
            }
        }
    }
}

/// Error surfaced by the search engines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    /// Invalid policy or wiring, detected before any expansion.
    #[error("invalid search configuration: {detail}")]
    Configuration { detail: String },
    /// A root produced no score or its evaluation failed.
    #[error("root cannot be evaluated: {source}")]
    RootNotEvaluable {
        #[source]
        source: EvalError,
    },
    /// The search was canceled; no further solutions will be produced.
    #[error("search canceled")]
    Canceled,
    /// The global deadline passed; queued solutions were delivered first.
    #[error("search timed out")]
    TimedOut,
    /// An evaluation was interrupted outside of a cancel or timeout.
    #[error("search interrupted")]
    Interrupted,
}

impl SearchError {
    #[must_use]
    pub fn configuration(detail: impl Into<String>) -> Self {
        Self::Configuration {
            detail: detail.into(),
        }
    }
}
