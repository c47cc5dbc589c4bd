//! Shrinking-state enumeration on a shared work queue.
//!
//! A state is a set of pipes that connects every terminal and has been
//! trimmed: no dangling branch ends in a non-terminal and no component lacks
//! a terminal. Dropping any non-bridge of a state keeps the terminals
//! connected, so each worker pops a state, and either records it (all pipes
//! are bridges, which makes it a minimal tree) or pushes one trimmed child per
//! non-bridge. Every minimal tree inside a state is reachable this way because
//! a state that is not yet a tree has a cycle pipe outside that tree.
//!
//! States are deduplicated by their sorted pipe list before they are queued.
//! Shared structures: the queue, the seen set, the result set, a pending
//! counter, and the timed-out flag. Each worker keeps its own masks. Idle
//! workers sleep on a condition variable tied to the queue lock and wake on
//! a new state, on quiescence (pending reaches zero), or at the deadline.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashSet;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::{precheck, solved, Deadline, SteinerEnumerator, SteinerOutcome, SteinerTree};
use crate::graph::{find_bridges, SearchGraph};

/// Work-queue enumerator running on the current rayon pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelQueue {
    /// Worker count; 0 uses one per pool thread
    pub workers: usize,
}

impl ParallelQueue {
    pub fn with_workers(workers: usize) -> Self {
        Self { workers }
    }
}

/// Remove dangling non-terminal branches and components without a terminal.
pub(crate) fn trim(graph: &SearchGraph, active: &mut [bool], is_terminal: &[bool]) {
    let mut degree = vec![0usize; graph.node_count()];
    for (edge, info) in graph.edges().iter().enumerate() {
        if active[edge] {
            degree[info.a] += 1;
            degree[info.b] += 1;
        }
    }

    let mut leaves: Vec<usize> = (0..graph.node_count())
        .filter(|&node| degree[node] == 1 && !is_terminal[node])
        .collect();
    while let Some(node) = leaves.pop() {
        if degree[node] != 1 {
            continue;
        }
        let Some(&(edge, neighbor)) = graph
            .incident(node)
            .iter()
            .find(|(edge, _)| active[*edge])
        else {
            continue;
        };
        active[edge] = false;
        degree[node] = 0;
        degree[neighbor] -= 1;
        if degree[neighbor] == 1 && !is_terminal[neighbor] {
            leaves.push(neighbor);
        }
    }

    // Components that hold no terminal
    let mut keep = vec![false; graph.node_count()];
    for (node, &terminal) in is_terminal.iter().enumerate() {
        if terminal && !keep[node] {
            for (reached, &seen) in graph.reachable(active, node).iter().enumerate() {
                keep[reached] |= seen;
            }
        }
    }
    for (edge, info) in graph.edges().iter().enumerate() {
        if active[edge] && !keep[info.a] {
            active[edge] = false;
        }
    }
}

struct Shared<'a> {
    graph: &'a SearchGraph,
    is_terminal: Vec<bool>,
    deadline: Deadline,
    queue: Mutex<VecDeque<Vec<usize>>>,
    wakeup: Condvar,
    seen: DashSet<Vec<usize>>,
    results: DashSet<Vec<usize>>,
    /// States queued or being expanded
    pending: AtomicUsize,
    timed_out: AtomicBool,
}

impl Shared<'_> {
    fn push(&self, state: Vec<usize>) {
        if self.seen.insert(state.clone()) {
            self.pending.fetch_add(1, Ordering::SeqCst);
            self.queue.lock().push_back(state);
            self.wakeup.notify_one();
        }
    }

    /// Mark one popped state as done, waking everyone once nothing is left.
    fn finish(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _queue = self.queue.lock();
            self.wakeup.notify_all();
        }
    }

    fn time_out(&self) {
        self.timed_out.store(true, Ordering::SeqCst);
        let _queue = self.queue.lock();
        self.wakeup.notify_all();
    }

    fn expand(&self, state: &[usize]) {
        let mask = self.graph.mask_from(state);
        let split = find_bridges(self.graph, &mask);
        if split.is_forest() {
            self.results.insert(state.to_vec());
            return;
        }
        for &edge in &split.non_bridges {
            if self.timed_out.load(Ordering::Relaxed) {
                return;
            }
            let mut child = mask.clone();
            child[edge] = false;
            trim(self.graph, &mut child, &self.is_terminal);
            self.push(SearchGraph::mask_edges(&child));
        }
    }

    /// Next state to expand, or `None` once the search is over.
    fn next(&self) -> Option<Vec<usize>> {
        let mut queue = self.queue.lock();
        loop {
            if self.timed_out.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(state) = queue.pop_front() {
                return Some(state);
            }
            if self.pending.load(Ordering::SeqCst) == 0 {
                return None;
            }
            if self.deadline.expired() {
                drop(queue);
                self.time_out();
                return None;
            }
            self.wakeup.wait_for(&mut queue, self.deadline.remaining());
        }
    }

    fn work(&self) {
        while let Some(state) = self.next() {
            if self.deadline.expired() {
                self.time_out();
                self.finish();
                return;
            }
            self.expand(&state);
            self.finish();
        }
    }
}

impl SteinerEnumerator for ParallelQueue {
    fn id(&self) -> &str {
        "parallel-queue"
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
        let mut is_terminal = vec![false; graph.node_count()];
        for &t in &terminals {
            is_terminal[t] = true;
        }

        let shared = Shared {
            graph,
            is_terminal,
            deadline: Deadline::new(budget),
            queue: Mutex::new(VecDeque::new()),
            wakeup: Condvar::new(),
            seen: DashSet::new(),
            results: DashSet::new(),
            pending: AtomicUsize::new(0),
            timed_out: AtomicBool::new(false),
        };
        if shared.deadline.expired() {
            return SteinerOutcome::TimedOut;
        }

        let mut start = graph.full_mask();
        trim(graph, &mut start, &shared.is_terminal);
        shared.push(SearchGraph::mask_edges(&start));

        let workers = if self.workers == 0 {
            rayon::current_num_threads()
        } else {
            self.workers
        };
        rayon::scope(|scope| {
            for _ in 0..workers.max(1) {
                let shared = &shared;
                scope.spawn(move |_| shared.work());
            }
        });

        // All workers have returned; nothing touches the sets any more.
        if shared.timed_out.load(Ordering::SeqCst) {
            return SteinerOutcome::TimedOut;
        }
        trace!(
            states = shared.seen.len(),
            solutions = shared.results.len(),
            workers,
            "parallel enumeration finished"
        );
        solved(shared.results.into_iter().map(SteinerTree::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steiner::Backtracking;

    const BUDGET: Duration = Duration::from_secs(30);

    #[test]
    fn test_trim_drops_dangling_branches() {
        // Path 0-1-2 with a spur 1-3 and a detached edge 4-5
        let graph =
            SearchGraph::from_pairs(6, &[(0, 1), (1, 2), (1, 3), (4, 5)]).unwrap();
        let mut is_terminal = vec![false; 6];
        is_terminal[0] = true;
        is_terminal[2] = true;
        let mut mask = graph.full_mask();
        trim(&graph, &mut mask, &is_terminal);
        assert_eq!(SearchGraph::mask_edges(&mask), vec![0, 1]);
    }

    #[test]
    fn test_matches_backtracking_on_wheel() {
        // Hub 0 with rim 1-2-3-4
        let graph = SearchGraph::from_pairs(
            5,
            &[(0, 1), (0, 2), (0, 3), (0, 4), (1, 2), (2, 3), (3, 4), (4, 1)],
        )
        .unwrap();
        let terminals = [1, 3];
        let queue = ParallelQueue::with_workers(4).enumerate(&graph, &terminals, BUDGET);
        let reference = Backtracking.enumerate(&graph, &terminals, BUDGET);
        assert!(queue.is_solved());
        assert_eq!(queue, reference);
    }

    #[test]
    fn test_single_terminal_trims_to_empty() {
        let graph = SearchGraph::from_pairs(3, &[(0, 1), (1, 2), (2, 0)]).unwrap();
        let trees = ParallelQueue::default().enumerate(&graph, &[2], BUDGET).into_trees();
        assert_eq!(trees, vec![SteinerTree::new(vec![])]);
    }

    #[test]
    fn test_zero_budget_times_out() {
        let graph = SearchGraph::from_pairs(3, &[(0, 1), (1, 2), (2, 0)]).unwrap();
        let outcome = ParallelQueue::default().enumerate(&graph, &[0, 1], Duration::ZERO);
        assert_eq!(outcome, SteinerOutcome::TimedOut);
    }

    #[test]
    fn test_more_workers_than_threads_terminates() {
        let graph = SearchGraph::from_pairs(
            5,
            &[(0, 1), (0, 2), (0, 3), (0, 4), (1, 2), (2, 3), (3, 4), (4, 1)],
        )
        .unwrap();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap();
        let queue = pool.install(|| {
            ParallelQueue::with_workers(8).enumerate(&graph, &[1, 3], BUDGET)
        });
        assert_eq!(queue, Backtracking.enumerate(&graph, &[1, 3], BUDGET));
    }
}
