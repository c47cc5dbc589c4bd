//! Include/exclude search over a union-find state with memoized completions.
//!
//! The state after deciding pipes `0..i` is the partition of junctions
//! induced by the included pipes plus, per junction, its included degree
//! clamped to 0, 1 or 2+. Whether a completion of pipes `i..` turns a state
//! into a minimal candidate depends on nothing else, so every state maps to
//! a fixed list of completions. That list is computed once and shared by
//! every prefix that reaches the same state.
//!
//! Pruning:
//! - including a pipe whose ends are already joined closes a cycle;
//! - once a junction's last pipe is decided its degree is final, so a
//!   non-terminal of degree 1 or an isolated terminal is a dead end;
//! - terminals that cannot be joined even with every undecided pipe are a
//!   dead end.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use super::{precheck, solved, Deadline, SteinerEnumerator, SteinerOutcome, SteinerTree};
use crate::graph::{SearchGraph, UnionFind};

#[derive(Debug, Clone, Copy, Default)]
pub struct FrontierMemo;

type Completions = Arc<Vec<Vec<usize>>>;

#[derive(Clone)]
struct State {
    sets: UnionFind,
    /// Included degree, clamped to 2
    degree: Vec<u8>,
}

struct Search<'a> {
    graph: &'a SearchGraph,
    terminals: &'a [usize],
    is_terminal: Vec<bool>,
    /// Highest incident pipe index per junction
    last_edge: Vec<Option<usize>>,
    deadline: Deadline,
    memo: HashMap<String, Completions>,
    hits: usize,
}

impl Search<'_> {
    fn key(&self, index: usize, state: &mut State) -> String {
        let mut key = String::with_capacity(8 + state.degree.len() * 4);
        let _ = write!(key, "{}|", index);
        for label in state.sets.canonical_labels() {
            let _ = write!(key, "{},", label);
        }
        key.push('|');
        for &class in &state.degree {
            key.push(char::from(b'0' + class));
        }
        key
    }

    /// Terminals joinable using the included pipes and every pipe from `index` on.
    fn still_joinable(&self, index: usize, state: &State) -> bool {
        if self.terminals.len() < 2 {
            return true;
        }
        let mut sets = state.sets.clone();
        for edge in &self.graph.edges()[index..] {
            sets.union(edge.a, edge.b);
        }
        let first = self.terminals[0];
        self.terminals[1..].iter().all(|&t| sets.same(first, t))
    }

    /// Junction whose degree just became final violates minimality.
    fn dead_end(&self, node: usize, degree: u8) -> bool {
        if self.is_terminal[node] {
            degree == 0 && self.terminals.len() >= 2
        } else {
            degree == 1
        }
    }

    fn closes(&self, index: usize, state: &State) -> bool {
        let edge = self.graph.edge(index);
        [edge.a, edge.b]
            .into_iter()
            .any(|node| {
                self.last_edge[node] == Some(index) && self.dead_end(node, state.degree[node])
            })
    }

    /// Final check once every pipe is decided.
    fn accepts(&self, state: &mut State) -> bool {
        let used: Vec<usize> = (0..state.degree.len())
            .filter(|&node| state.degree[node] > 0)
            .collect();
        if self.terminals.len() < 2 {
            return used.is_empty();
        }
        let root = self.terminals[0];
        self.terminals.iter().all(|&t| state.sets.same(root, t))
            && used.iter().all(|&node| {
                state.sets.same(root, node) && (state.degree[node] > 1 || self.is_terminal[node])
            })
    }

    /// Completions of pipes `index..` that make `state` minimal, or `None` on timeout.
    fn solve(&mut self, index: usize, mut state: State) -> Option<Completions> {
        if self.deadline.expired() {
            return None;
        }
        if index == self.graph.edge_count() {
            let done = if self.accepts(&mut state) {
                vec![Vec::new()]
            } else {
                Vec::new()
            };
            return Some(Arc::new(done));
        }

        let key = self.key(index, &mut state);
        if let Some(hit) = self.memo.get(&key) {
            self.hits += 1;
            return Some(Arc::clone(hit));
        }

        let mut completions: Vec<Vec<usize>> = Vec::new();

        // Exclude
        if !self.closes(index, &state) && self.still_joinable(index + 1, &state) {
            let rest = self.solve(index + 1, state.clone())?;
            completions.extend(rest.iter().cloned());
        }

        // Include
        let edge = *self.graph.edge(index);
        if !state.sets.same(edge.a, edge.b) {
            let mut next = state;
            next.sets.union(edge.a, edge.b);
            for node in [edge.a, edge.b] {
                next.degree[node] = (next.degree[node] + 1).min(2);
            }
            if !self.closes(index, &next) {
                let rest = self.solve(index + 1, next)?;
                completions.extend(rest.iter().map(|tail| {
                    let mut chosen = Vec::with_capacity(tail.len() + 1);
                    chosen.push(index);
                    chosen.extend_from_slice(tail);
                    chosen
                }));
            }
        }

        let completions = Arc::new(completions);
        self.memo.insert(key, Arc::clone(&completions));
        Some(completions)
    }
}

impl SteinerEnumerator for FrontierMemo {
    fn id(&self) -> &str {
        "frontier-memo"
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

        let n = graph.node_count();
        let mut is_terminal = vec![false; n];
        for &t in &terminals {
            is_terminal[t] = true;
        }
        let mut last_edge = vec![None; n];
        for (index, edge) in graph.edges().iter().enumerate() {
            last_edge[edge.a] = Some(index);
            last_edge[edge.b] = Some(index);
        }

        let mut search = Search {
            graph,
            terminals: &terminals,
            is_terminal,
            last_edge,
            deadline: Deadline::new(budget),
            memo: HashMap::new(),
            hits: 0,
        };
        let start = State {
            sets: UnionFind::new(n),
            degree: vec![0; n],
        };
        let Some(completions) = search.solve(0, start) else {
            return SteinerOutcome::TimedOut;
        };

        tracing::trace!(
            states = search.memo.len(),
            hits = search.hits,
            "frontier search finished"
        );
        solved(completions.iter().cloned().map(SteinerTree::new))
    }
}
