//! Enumeration of every minimal Steiner tree of one piece.
//!
//! A candidate is *minimal* when it connects all terminals and no single pipe
//! can be dropped without disconnecting one. For two or more terminals that is
//! exactly a tree whose leaves are all terminals; for zero or one terminal the
//! only minimal candidate is the empty set.
//!
//! Every strategy honours the same contract. The search runs against a wall
//! clock [`Deadline`] polled at the top of every recursive call or queue pop.
//! Either the full set of minimal candidates is returned or
//! [`SteinerOutcome::TimedOut`]: a partial list would bias the cost selection
//! toward whatever the search order happened to visit first.
//!
//! Candidate order is not meaningful; it is sorted by pipe-id signature only so
//! that results compare equal across strategies.

mod backtrack;
mod frontier;
mod parallel;
mod registry;

pub use backtrack::Backtracking;
pub use frontier::FrontierMemo;
pub use parallel::ParallelQueue;
pub use registry::EnumerationStrategy;

pub(crate) use parallel::trim;

use std::time::Duration;

use pipenet_core::PipeId;
use web_time::Instant;

use crate::graph::SearchGraph;

/// One candidate: a set of local edge indices of a [`SearchGraph`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SteinerTree {
    edges: Vec<usize>,
}

impl SteinerTree {
    pub fn new(mut edges: Vec<usize>) -> Self {
        edges.sort_unstable();
        edges.dedup();
        Self { edges }
    }

    /// Local edge indices, ascending.
    pub fn edges(&self) -> &[usize] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn contains(&self, edge: usize) -> bool {
        self.edges.binary_search(&edge).is_ok()
    }

    pub fn mask(&self, graph: &SearchGraph) -> Vec<bool> {
        graph.mask_from(&self.edges)
    }

    /// Sorted pipe ids; the canonical identity of a candidate.
    pub fn signature(&self, graph: &SearchGraph) -> Vec<PipeId> {
        graph.signature(&self.edges)
    }
}

/// Result of one enumeration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SteinerOutcome {
    /// Every minimal candidate
    Solved(Vec<SteinerTree>),
    /// The deadline passed before the search finished; nothing is kept
    TimedOut,
    /// The terminals do not lie in one component, so no candidate exists
    Infeasible,
}

impl SteinerOutcome {
    pub fn is_solved(&self) -> bool {
        matches!(self, SteinerOutcome::Solved(_))
    }

    pub fn trees(&self) -> Option<&[SteinerTree]> {
        match self {
            SteinerOutcome::Solved(trees) => Some(trees),
            _ => None,
        }
    }

    /// Collapse to a plain list; timeouts and infeasible inputs both become empty.
    pub fn into_trees(self) -> Vec<SteinerTree> {
        match self {
            SteinerOutcome::Solved(trees) => trees,
            SteinerOutcome::TimedOut | SteinerOutcome::Infeasible => Vec::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SteinerOutcome::Solved(_) => "solved",
            SteinerOutcome::TimedOut => "timed-out",
            SteinerOutcome::Infeasible => "infeasible",
        }
    }
}

/// Wall-clock budget measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// True once the budget is used up. A zero budget is expired immediately.
    #[inline]
    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.limit
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.started.elapsed())
    }
}

/// A Steiner tree enumeration strategy.
///
/// Implementations must be interchangeable: on the same input and with enough
/// time they return the same set of candidates.
pub trait SteinerEnumerator: Send + Sync {
    /// Unique identifier (e.g., "backtracking", "frontier-memo")
    fn id(&self) -> &str;

    /// Enumerate every minimal candidate connecting `terminals` in `graph`.
    fn enumerate(
        &self,
        graph: &SearchGraph,
        terminals: &[usize],
        budget: Duration,
    ) -> SteinerOutcome;
}

/// Sorted, deduplicated terminals, or `None` if one lies outside the graph.
fn prepare_terminals(graph: &SearchGraph, terminals: &[usize]) -> Option<Vec<usize>> {
    let mut sorted = terminals.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.iter().any(|&t| t >= graph.node_count()) {
        return None;
    }
    Some(sorted)
}

/// Checks shared by every strategy before the search starts.
///
/// Infeasibility is decided before the clock is consulted, so a zero budget
/// on a disconnected terminal set still reports [`SteinerOutcome::Infeasible`].
fn precheck(graph: &SearchGraph, terminals: &[usize]) -> Result<Vec<usize>, SteinerOutcome> {
    let terminals = prepare_terminals(graph, terminals).ok_or(SteinerOutcome::Infeasible)?;
    if !graph.connects(&graph.full_mask(), &terminals) {
        return Err(SteinerOutcome::Infeasible);
    }
    Ok(terminals)
}

fn solved(trees: impl IntoIterator<Item = SteinerTree>) -> SteinerOutcome {
    let mut trees: Vec<SteinerTree> = trees.into_iter().collect();
    trees.sort();
    trees.dedup();
    SteinerOutcome::Solved(trees)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_is_normalized() {
        let tree = SteinerTree::new(vec![3, 1, 3]);
        assert_eq!(tree.edges(), &[1, 3]);
        assert!(tree.contains(3));
        assert!(!tree.contains(2));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_outcome_collapses_to_list() {
        let solved = SteinerOutcome::Solved(vec![SteinerTree::new(vec![0])]);
        assert!(solved.is_solved());
        assert_eq!(solved.clone().into_trees().len(), 1);
        assert!(SteinerOutcome::TimedOut.into_trees().is_empty());
        assert!(SteinerOutcome::Infeasible.trees().is_none());
        assert_eq!(SteinerOutcome::TimedOut.label(), "timed-out");
    }

    #[test]
    fn test_zero_deadline_is_expired() {
        let deadline = Deadline::new(Duration::ZERO);
        assert!(deadline.expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert!(!Deadline::new(Duration::from_secs(60)).expired());
    }

    #[test]
    fn test_precheck_detects_split_terminals() {
        let graph = SearchGraph::from_pairs(4, &[(0, 1), (2, 3)]).unwrap();
        assert_eq!(precheck(&graph, &[0, 3]), Err(SteinerOutcome::Infeasible));
        assert_eq!(precheck(&graph, &[1, 0, 1]), Ok(vec![0, 1]));
        assert_eq!(precheck(&graph, &[9]), Err(SteinerOutcome::Infeasible));
    }

    #[test]
    fn test_trait_is_object_safe() {
        fn _assert_send_sync<T: Send + Sync + ?Sized>() {}
        _assert_send_sync::<dyn SteinerEnumerator>();
        let strategies: Vec<Box<dyn SteinerEnumerator>> = vec![
            Box::new(Backtracking),
            Box::new(FrontierMemo),
            Box::new(ParallelQueue::default()),
        ];
        assert_eq!(strategies.len(), 3);
    }
}
