//! Bridge (cut-edge) detection.
//!
//! Uses the classic DFS low-link formulation (Tarjan 1974): a tree edge
//! `(p, v)` is a bridge iff no back edge from `v`'s subtree reaches `p` or
//! above, i.e. `low[v] > disc[p]`. The DFS is iterative so deep pipe chains
//! cannot overflow the stack, and the parent is skipped by *edge* index so
//! parallel pipes are correctly reported as non-bridges.

use super::search::SearchGraph;

/// Active edges split into bridges and non-bridges (both ascending).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeSplit {
    pub bridges: Vec<usize>,
    pub non_bridges: Vec<usize>,
}

impl BridgeSplit {
    /// True when every active edge is a bridge (the active subgraph is a forest).
    pub fn is_forest(&self) -> bool {
        self.non_bridges.is_empty()
    }
}

/// Find the bridges of the subgraph induced by the `active` edge mask.
///
/// O(V + E). Inactive edges are ignored entirely.
pub fn find_bridges(graph: &SearchGraph, active: &[bool]) -> BridgeSplit {
    assert_eq!(
        active.len(),
        graph.edge_count(),
        "edge mask does not match the search graph"
    );

    const UNSEEN: usize = usize::MAX;
    let n = graph.node_count();
    let mut disc = vec![UNSEEN; n];
    let mut low = vec![0usize; n];
    let mut is_bridge = vec![false; graph.edge_count()];
    let mut timer = 0usize;

    // (node, edge used to enter it, next incidence to scan)
    let mut stack: Vec<(usize, Option<usize>, usize)> = Vec::new();

    for start in 0..n {
        if disc[start] != UNSEEN {
            continue;
        }
        disc[start] = timer;
        low[start] = timer;
        timer += 1;
        stack.push((start, None, 0));

        while let Some(&(node, parent_edge, cursor)) = stack.last() {
            let incident = graph.incident(node);
            if cursor < incident.len() {
                let top = stack.len() - 1;
                stack[top].2 += 1;

                let (edge, neighbor) = incident[cursor];
                if !active[edge] || Some(edge) == parent_edge {
                    continue;
                }
                if disc[neighbor] == UNSEEN {
                    disc[neighbor] = timer;
                    low[neighbor] = timer;
                    timer += 1;
                    stack.push((neighbor, Some(edge), 0));
                } else {
                    low[node] = low[node].min(disc[neighbor]);
                }
            } else {
                stack.pop();
                if let Some(edge) = parent_edge {
                    let parent = graph.edge(edge).other(node);
                    low[parent] = low[parent].min(low[node]);
                    if low[node] > disc[parent] {
                        is_bridge[edge] = true;
                    }
                }
            }
        }
    }

    let mut split = BridgeSplit::default();
    for (edge, &on) in active.iter().enumerate() {
        if !on {
            continue;
        }
        if is_bridge[edge] {
            split.bridges.push(edge);
        } else {
            split.non_bridges.push(edge);
        }
    }
    split
}
