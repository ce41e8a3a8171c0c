//! Arbor Search: best-first and AND-OR search over lazily discovered graphs.
//!
//! Depends only on `arbor_kernel`; the harness and the lock tests sit on top.
//!
//! # Crate dependency graph
//!
//! ```text
//! arbor_kernel  ←  arbor_search  ←  arbor_harness
//! (contracts)      (engines)        (worlds, runner, reports)
//! ```
//!
//! # Key types
//!
//! - [`BestFirst`] -- OR-graph search with OPEN/EXPANDED bookkeeping,
//!   parent discarding and a parallel evaluation pool
//! - [`evaluator::NodeEvaluator`] -- the scoring contract, with decorators
//!   for alternatives, delays, skipping, timing and time budgets
//! - [`evaluator::RandomCompletionEvaluator`] -- rollout scoring through
//!   [`completer::RandomCompleter`]
//! - [`AndOrSearch`] -- AND-OR search with solved labeling and solution
//!   graph extraction
//! - [`graph::SearchGraph`] -- expansion-event audit log of a best-first run

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod and_or;
pub mod best_first;
pub mod completer;
pub mod error;
pub mod evaluator;
pub mod frontier;
pub mod graph;
pub mod listener;
pub mod node;
pub mod policy;

pub use and_or::{AndOrGraph, AndOrSearch, AndOrSuccessor, LabelingStrategy, NodeKind, SolutionGraph};
pub use best_first::{BestFirst, BestFirstBuilder, SearchHandle, SearchStats, SearchStatus};
pub use error::{EvalError, SearchError};
pub use listener::{CollectingListener, EvaluatedPath, SolutionListener};
pub use policy::{ParentDiscarding, SearchPolicy};
