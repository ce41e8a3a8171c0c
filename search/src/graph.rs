//! Expansion-event audit log for best-first runs.
//!
//! The ordered list of [`ExpandEvent`]s is the decision surface of a run:
//! which node was popped, and what happened to each of its successors.
//! Successor records are appended as evaluations complete, which with a
//! worker pool is not generation order; serialization orders them by
//! generation index so that the JSON form is stable.

use arbor_kernel::digest::{canonical_bytes, digest_json, ContentDigest, DigestDomain, DigestError};
use serde_json::{json, Value};

use crate::node::NodeId;
use crate::policy::ParentDiscarding;

/// The complete audit trail of one best-first run.
#[derive(Debug, Clone)]
pub struct SearchGraph {
    pub expansions: Vec<ExpandEvent>,
    pub metadata: SearchGraphMetadata,
}

/// One OPEN pop followed by successor generation.
#[derive(Debug, Clone)]
pub struct ExpandEvent {
    /// Total order of pops.
    pub expansion_order: u64,
    pub node: NodeId,
    /// `Debug` rendering of the expanded point.
    pub point: String,
    pub depth: usize,
    /// Score at pop time.
    pub score: f64,
    pub successors: Vec<SuccessorRecord>,
}

impl ExpandEvent {
    /// True when the expansion generated no successor at all.
    #[must_use]
    pub fn is_dead_end(&self) -> bool {
        self.successors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuccessorRecord {
    /// Position in generation order.
    pub index: usize,
    pub point: String,
    pub outcome: SuccessorOutcome,
}

/// What happened to a generated successor.
#[derive(Debug, Clone, PartialEq)]
pub enum SuccessorOutcome {
    /// Evaluated and put on OPEN.
    Inserted { node: NodeId, score: f64 },
    /// Evaluated goal; queued as a solution.
    Goal { node: NodeId, score: f64 },
    /// The evaluator returned no score.
    Pruned,
    /// The evaluation overran its budget and the fallback pruned the node.
    TimedOut,
    /// The evaluator failed; the node is dropped.
    Failed { detail: String },
    /// The point already lies on the path to the expanded node.
    OnPath,
    /// A node with this point was already known and kept.
    Discarded { existing: NodeId },
    /// A worse node with this point was removed from OPEN.
    Replaced { old: NodeId, new: NodeId, score: f64 },
    /// The point was already expanded with a worse score; its node is
    /// reattached under the new parent and put back on OPEN.
    Reopened { node: NodeId, previous: f64, score: f64 },
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The run can still produce solutions.
    Running,
    Exhausted,
    Canceled,
    TimedOut,
    RootNotEvaluable,
}

impl TerminationReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Exhausted => "exhausted",
            Self::Canceled => "canceled",
            Self::TimedOut => "timed_out",
            Self::RootNotEvaluable => "root_not_evaluable",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchGraphMetadata {
    pub graph_id: String,
    pub parent_discarding: ParentDiscarding,
    pub worker_threads: usize,
    pub total_expansions: u64,
    pub total_created: u64,
    pub total_solutions: u64,
    pub total_pruned: u64,
    pub total_failed: u64,
    pub total_discarded: u64,
    pub total_reopened: u64,
    pub total_timed_out: u64,
    pub frontier_high_water: u64,
    pub termination: TerminationReason,
}

impl SearchGraph {
    /// # Errors
    ///
    /// [`DigestError`] if the JSON form nests too deeply.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, DigestError> {
        canonical_bytes(&self.to_json())
    }

    /// Content hash of the canonical JSON form.
    ///
    /// # Errors
    ///
    /// Same as [`Self::to_canonical_json_bytes`].
    pub fn digest(&self) -> Result<ContentDigest, DigestError> {
        digest_json(DigestDomain::SearchGraph, &self.to_json())
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "expansions": self.expansions.iter().map(expand_event_to_json).collect::<Vec<_>>(),
            "metadata": metadata_to_json(&self.metadata),
        })
    }

    /// Outcomes over all expansions, in expansion then generation order.
    pub fn outcomes(&self) -> impl Iterator<Item = &SuccessorOutcome> + '_ {
        self.expansions
            .iter()
            .flat_map(|e| e.successors.iter().map(|s| &s.outcome))
    }
}

fn expand_event_to_json(e: &ExpandEvent) -> Value {
    let mut successors: Vec<&SuccessorRecord> = e.successors.iter().collect();
    successors.sort_by_key(|s| s.index);
    json!({
        "depth": e.depth,
        "expansion_order": e.expansion_order,
        "node": e.node.index(),
        "point": e.point,
        "score": e.score,
        "successors": successors.into_iter().map(successor_to_json).collect::<Vec<_>>(),
    })
}

fn successor_to_json(s: &SuccessorRecord) -> Value {
    json!({
        "index": s.index,
        "outcome": outcome_to_json(&s.outcome),
        "point": s.point,
    })
}

fn outcome_to_json(o: &SuccessorOutcome) -> Value {
    match o {
        SuccessorOutcome::Inserted { node, score } => {
            json!({"node": node.index(), "score": score, "type": "inserted"})
        }
        SuccessorOutcome::Goal { node, score } => {
            json!({"node": node.index(), "score": score, "type": "goal"})
        }
        SuccessorOutcome::Pruned => json!({"type": "pruned"}),
        SuccessorOutcome::TimedOut => json!({"type": "timed_out"}),
        SuccessorOutcome::Failed { detail } => json!({"detail": detail, "type": "failed"}),
        SuccessorOutcome::OnPath => json!({"type": "on_path"}),
        SuccessorOutcome::Discarded { existing } => {
            json!({"existing": existing.index(), "type": "discarded"})
        }
        SuccessorOutcome::Replaced { old, new, score } => {
            json!({"new": new.index(), "old": old.index(), "score": score, "type": "replaced"})
        }
        SuccessorOutcome::Reopened { node, previous, score } => {
            json!({"node": node.index(), "previous": previous, "score": score, "type": "reopened"})
        }
    }
}

fn metadata_to_json(m: &SearchGraphMetadata) -> Value {
    json!({
        "frontier_high_water": m.frontier_high_water,
        "graph_id": m.graph_id,
        "parent_discarding": m.parent_discarding.as_str(),
        "termination": m.termination.as_str(),
        "total_created": m.total_created,
        "total_discarded": m.total_discarded,
        "total_expansions": m.total_expansions,
        "total_failed": m.total_failed,
        "total_pruned": m.total_pruned,
        "total_reopened": m.total_reopened,
        "total_solutions": m.total_solutions,
        "total_timed_out": m.total_timed_out,
        "worker_threads": m.worker_threads,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> SearchGraphMetadata {
        SearchGraphMetadata {
            graph_id: "test".into(),
            parent_discarding: ParentDiscarding::All,
            worker_threads: 0,
            total_expansions: 1,
            total_created: 3,
            total_solutions: 0,
            total_pruned: 1,
            total_failed: 0,
            total_discarded: 0,
            total_reopened: 0,
            total_timed_out: 0,
            frontier_high_water: 2,
            termination: TerminationReason::Exhausted,
        }
    }

    fn event(order: [usize; 2]) -> ExpandEvent {
        ExpandEvent {
            expansion_order: 0,
            node: NodeId(0),
            point: "[]".into(),
            depth: 0,
            score: 1.0,
            successors: order
                .iter()
                .map(|&index| SuccessorRecord {
                    index,
                    point: format!("[{index}]"),
                    outcome: if index == 0 {
                        SuccessorOutcome::Pruned
                    } else {
                        SuccessorOutcome::Inserted {
                            node: NodeId(index),
                            score: 2.0,
                        }
                    },
                })
                .collect(),
        }
    }

    #[test]
    fn canonical_json_ignores_completion_order() {
        let a = SearchGraph {
            expansions: vec![event([0, 1])],
            metadata: metadata(),
        };
        let b = SearchGraph {
            expansions: vec![event([1, 0])],
            metadata: metadata(),
        };
        assert_eq!(
            a.to_canonical_bytes().unwrap(),
            b.to_canonical_bytes().unwrap()
        );
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
    }

    #[test]
    fn outcome_json_is_tagged() {
        let reopened = outcome_to_json(&SuccessorOutcome::Reopened {
            node: NodeId(2),
            previous: 5.0,
            score: 3.0,
        });
        assert_eq!(reopened["type"], "reopened");
        assert_eq!(reopened["node"], 2);
        assert_eq!(reopened["previous"], 5.0);

        let graph = SearchGraph {
            expansions: vec![event([0, 1])],
            metadata: metadata(),
        };
        let value = graph.to_json();
        assert_eq!(value["metadata"]["parent_discarding"], "all");
        assert_eq!(value["metadata"]["termination"], "exhausted");
        assert_eq!(value["expansions"][0]["successors"][0]["outcome"]["type"], "pruned");
        assert!(!graph.expansions[0].is_dead_end());
    }
}
