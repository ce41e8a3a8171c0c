//! Harness runner: drives a world through one of the search engines and
//! condenses the run into a canonical [`RunReport`].
//!
//! The runner owns no search logic. It builds the engine, pulls solutions,
//! and projects the result into JSON that contains nothing
//! timing-dependent, so that two inline runs with the same inputs produce
//! byte-identical reports and equal digests.
//!
//! # Pipeline
//!
//! ```text
//! BestFirst::new(policy) → [next_solution() × N] → search_graph().digest()
//!   → RunReport::to_json() → canonical bytes → sha256 digest
//! ```

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use serde_json::{json, Value};

use arbor_kernel::contract::{EdgeLabel, GraphContract, Point};
use arbor_kernel::control::Control;
use arbor_kernel::digest::{canonical_bytes, digest_json, ContentDigest, DigestDomain, DigestError};
use arbor_kernel::score::Score;
use arbor_search::and_or::{AndOrGraph, AndOrSearch, LabelingStrategy, SolutionGraph};
use arbor_search::best_first::BestFirst;
use arbor_search::error::SearchError;
use arbor_search::evaluator::DynEvaluator;
use arbor_search::policy::SearchPolicy;

/// Error during a harness run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("search failed: {0}")]
    Search(#[from] SearchError),
    #[error("report digest failed: {0}")]
    Digest(#[from] DigestError),
}

/// Deterministic summary of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// `"best_first"` or `"and_or"`.
    pub engine: &'static str,
    pub graph_id: String,
    /// One JSON object per solution, in discovery order.
    pub solutions: Vec<Value>,
    pub counters: BTreeMap<String, u64>,
    pub termination: String,
    /// Digest of the best-first expansion audit graph.
    pub search_graph_digest: Option<String>,
}

impl RunReport {
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "counters": self.counters,
            "engine": self.engine,
            "graph_id": self.graph_id,
            "schema_version": "run_report.v1",
            "search_graph_digest": self.search_graph_digest,
            "solutions": self.solutions,
            "termination": self.termination,
        })
    }

    /// # Errors
    ///
    /// [`DigestError`] if the report nests too deeply.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, DigestError> {
        canonical_bytes(&self.to_json())
    }

    /// # Errors
    ///
    /// Same as [`Self::to_canonical_json_bytes`].
    pub fn digest(&self) -> Result<ContentDigest, DigestError> {
        digest_json(DigestDomain::RunReport, &self.to_json())
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

fn points_json<T: Debug>(points: &[T]) -> Value {
    Value::Array(points.iter().map(|p| Value::String(format!("{p:?}"))).collect())
}

/// Run best-first search until `max_solutions` solutions are found, the space
/// is exhausted, or the policy timeout passes.
///
/// # Errors
///
/// [`RunError::Search`] for configuration errors and unevaluable roots.
/// Timeouts and cancellation end the run normally; the report's
/// `termination` says which.
pub fn run_best_first<T: Point, A: EdgeLabel, V: Score>(
    graph: Arc<dyn GraphContract<T, A>>,
    evaluator: DynEvaluator<T, A, V>,
    policy: SearchPolicy,
    max_solutions: usize,
) -> Result<RunReport, RunError> {
    let graph_id = graph.graph_id().to_string();
    let mut search = BestFirst::new(graph, evaluator, policy)?;
    let mut solutions = Vec::new();
    while solutions.len() < max_solutions {
        match search.next_solution() {
            Ok(Some(found)) => solutions.push(json!({
                "path": points_json(found.path.points()),
                "score": found.score.to_json(),
            })),
            Ok(None) | Err(SearchError::TimedOut | SearchError::Canceled) => break,
            Err(e) => return Err(e.into()),
        }
    }

    let audit = search.search_graph();
    let stats = search.stats();
    let counters = BTreeMap::from([
        ("created".to_string(), stats.created),
        ("discarded".to_string(), stats.discarded),
        ("expanded".to_string(), stats.expanded),
        ("failed".to_string(), stats.failed),
        ("pruned".to_string(), stats.pruned),
        ("reopened".to_string(), stats.reopened),
        ("replaced".to_string(), stats.replaced),
        ("solutions".to_string(), stats.solutions),
        ("timed_out".to_string(), stats.timed_out),
    ]);
    tracing::info!(graph = %graph_id, solutions = solutions.len(), "best-first run finished");
    Ok(RunReport {
        engine: "best_first",
        graph_id,
        solutions,
        counters,
        termination: audit.metadata.termination.as_str().to_string(),
        search_graph_digest: Some(audit.digest()?.to_string()),
    })
}

fn solution_graph_json<T: Debug, A: Debug>(g: &SolutionGraph<T, A>) -> Value {
    json!({
        "edges": g
            .edges
            .iter()
            .map(|e| json!([format!("{:?}", e.from), format!("{:?}", e.label), format!("{:?}", e.to)]))
            .collect::<Vec<_>>(),
        "points": points_json(&g.points),
        "root": format!("{:?}", g.root),
    })
}

/// Solve an AND-OR space. With `enumerate`, expand it completely and record
/// the number of distinct solution graphs.
///
/// # Errors
///
/// [`RunError::Search`] when `ctl` interrupts the run.
pub fn run_and_or<T: Point, A: EdgeLabel>(
    graph: Arc<dyn AndOrGraph<T, A>>,
    labeling: LabelingStrategy,
    enumerate: bool,
    ctl: &Control,
) -> Result<RunReport, RunError> {
    let graph_id = graph.graph_id().to_string();
    let mut search = AndOrSearch::new(graph).with_labeling(labeling);
    let best = search.solve(ctl)?;
    let mut counters = BTreeMap::new();
    if enumerate {
        search.expand_all(ctl)?;
        let all = search.enumerate_solutions();
        counters.insert("solution_graphs".to_string(), u64::try_from(all.len()).unwrap_or(u64::MAX));
    }
    counters.insert("created".to_string(), u64::try_from(search.created_count()).unwrap_or(u64::MAX));
    counters.insert("edges".to_string(), u64::try_from(search.edge_count()).unwrap_or(u64::MAX));
    counters.insert("expanded".to_string(), u64::try_from(search.expanded_count()).unwrap_or(u64::MAX));
    let termination = if best.is_some() { "solved" } else { "exhausted" };
    Ok(RunReport {
        engine: "and_or",
        graph_id,
        solutions: best.iter().map(solution_graph_json).collect(),
        counters,
        termination: termination.to_string(),
        search_graph_digest: None,
    })
}

/// Digest of a sequence of sampled completions, each rendered point by point.
///
/// # Errors
///
/// [`DigestError`] if canonicalization fails.
pub fn completions_digest<T: Debug>(completions: &[Vec<T>]) -> Result<ContentDigest, DigestError> {
    let value = Value::Array(completions.iter().map(|c| points_json(c)).collect());
    digest_json(DigestDomain::Completions, &value)
}
