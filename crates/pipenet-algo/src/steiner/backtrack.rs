//! Exhaustive include/exclude search with a minimality post-check.

use std::time::Duration;

use super::{precheck, solved, Deadline, SteinerEnumerator, SteinerOutcome, SteinerTree};
use crate::graph::SearchGraph;

/// Depth-first search over every pipe in pipe-id order.
///
/// Each pipe is first excluded (only while the remaining pipes still connect
/// all terminals) and then included (only if it closes no cycle among the
/// included pipes). Complete assignments are kept when they connect the
/// terminals and are minimal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Backtracking;

struct Search<'a> {
    graph: &'a SearchGraph,
    terminals: &'a [usize],
    deadline: Deadline,
    timed_out: bool,
    found: Vec<SteinerTree>,
}

impl Search<'_> {
    fn recurse(&mut self, index: usize, available: &mut [bool], included: &mut [bool]) {
        if self.timed_out || self.deadline.expired() {
            self.timed_out = true;
            return;
        }

        if index == self.graph.edge_count() {
            if self.graph.connects(included, self.terminals)
                && self.graph.is_minimal(included, self.terminals)
            {
                self.found
                    .push(SteinerTree::new(SearchGraph::mask_edges(included)));
            }
            return;
        }

        available[index] = false;
        if self.graph.connects(available, self.terminals) {
            self.recurse(index + 1, available, included);
        }
        available[index] = true;

        let edge = self.graph.edge(index);
        if !self.graph.reachable(included, edge.a)[edge.b] {
            included[index] = true;
            self.recurse(index + 1, available, included);
            included[index] = false;
        }
    }
}

impl SteinerEnumerator for Backtracking {
    fn id(&self) -> &str {
        "backtracking"
    }

    fn enumerate(
        &self,
        graph: &SearchGraph,
        terminals: &[usize],
        budget: Duration,
    ) -> SteinerOutcome {
        let terminals = match precheck(graph, terminals) {
            Ok(terminals) => terminals,
            Err(outcome) => return outcome,
        };

        let mut search = Search {
            graph,
            terminals: &terminals,
            deadline: Deadline::new(budget),
            timed_out: false,
            found: Vec::new(),
        };
        let mut available = graph.full_mask();
        let mut included = vec![false; graph.edge_count()];
        search.recurse(0, &mut available, &mut included);

        if search.timed_out {
            return SteinerOutcome::TimedOut;
        }
        solved(search.found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDGET: Duration = Duration::from_secs(30);

    #[test]
    fn test_square_between_opposite_corners() {
        // 0-1-2-3-0, terminals 0 and 2: two paths
        let graph = SearchGraph::from_pairs(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]).unwrap();
        let trees = Backtracking.enumerate(&graph, &[0, 2], BUDGET).into_trees();
        assert_eq!(
            trees,
            vec![SteinerTree::new(vec![0, 1]), SteinerTree::new(vec![2, 3])]
        );
    }

    #[test]
    fn test_single_terminal_yields_empty_tree() {
        let graph = SearchGraph::from_pairs(3, &[(0, 1), (1, 2), (2, 0)]).unwrap();
        let outcome = Backtracking.enumerate(&graph, &[1], BUDGET);
        assert_eq!(outcome, SteinerOutcome::Solved(vec![SteinerTree::new(vec![])]));
    }

    #[test]
    fn test_zero_budget_times_out() {
        let graph = SearchGraph::from_pairs(3, &[(0, 1), (1, 2), (2, 0)]).unwrap();
        let outcome = Backtracking.enumerate(&graph, &[0, 2], Duration::ZERO);
        assert_eq!(outcome, SteinerOutcome::TimedOut);
    }

    #[test]
    fn test_disconnected_terminals_are_infeasible() {
        let graph = SearchGraph::from_pairs(4, &[(0, 1), (2, 3)]).unwrap();
        let outcome = Backtracking.enumerate(&graph, &[0, 3], BUDGET);
        assert_eq!(outcome, SteinerOutcome::Infeasible);
    }
}
