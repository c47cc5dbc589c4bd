//! Compact graph view used by every search algorithm.
//!
//! A [`SearchGraph`] renumbers the junctions of one piece to `0..n` and orders
//! its pipes by [`PipeId`], so edge index order is the stable, deterministic
//! order the enumerators branch in. It is immutable once built and
//! `Send + Sync`, which lets worker threads share it without copying.
//!
//! Edge subsets are represented as `&[bool]` masks indexed by local edge index.

use std::collections::VecDeque;

use pipenet_core::{EdgeIndex, PipeId, PipeNetError, PipeNetResult};

/// One pipe of a [`SearchGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchEdge {
    pub a: usize,
    pub b: usize,
    pub pipe: PipeId,
    /// Edge index of the pipe in the originating network graph
    pub origin: EdgeIndex,
}

impl SearchEdge {
    /// The endpoint opposite to `node`.
    #[inline]
    pub fn other(&self, node: usize) -> usize {
        if self.a == node {
            self.b
        } else {
            self.a
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchGraph {
    node_count: usize,
    edges: Vec<SearchEdge>,
    /// node -> [(edge, neighbor)]
    adjacency: Vec<Vec<(usize, usize)>>,
}

impl SearchGraph {
    /// Build a search graph, sorting edges by pipe id.
    ///
    /// Fails fast on endpoints outside `0..node_count` and on self-loops.
    pub fn new(node_count: usize, mut edges: Vec<SearchEdge>) -> PipeNetResult<Self> {
        for edge in &edges {
            if edge.a >= node_count || edge.b >= node_count {
                return Err(PipeNetError::structural(format!(
                    "{} references node {} but the graph has {} nodes",
                    edge.pipe,
                    edge.a.max(edge.b),
                    node_count
                )));
            }
            if edge.a == edge.b {
                return Err(PipeNetError::structural(format!(
                    "{} is a self-loop",
                    edge.pipe
                )));
            }
        }
        edges.sort_by_key(|edge| edge.pipe);

        let mut adjacency = vec![Vec::new(); node_count];
        for (index, edge) in edges.iter().enumerate() {
            adjacency[edge.a].push((index, edge.b));
            adjacency[edge.b].push((index, edge.a));
        }

        Ok(Self {
            node_count,
            edges,
            adjacency,
        })
    }

    /// Build from plain endpoint pairs; pipe ids and origins are the pair's position.
    pub fn from_pairs(node_count: usize, pairs: &[(usize, usize)]) -> PipeNetResult<Self> {
        let edges = pairs
            .iter()
            .enumerate()
            .map(|(i, &(a, b))| SearchEdge {
                a,
                b,
                pipe: PipeId::new(i),
                origin: EdgeIndex::new(i),
            })
            .collect();
        Self::new(node_count, edges)
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[inline]
    pub fn edge(&self, index: usize) -> &SearchEdge {
        &self.edges[index]
    }

    pub fn edges(&self) -> &[SearchEdge] {
        &self.edges
    }

    /// `(edge, neighbor)` pairs incident to `node`.
    #[inline]
    pub fn incident(&self, node: usize) -> &[(usize, usize)] {
        &self.adjacency[node]
    }

    #[inline]
    pub fn degree(&self, node: usize) -> usize {
        self.adjacency[node].len()
    }

    /// A mask with every edge active.
    pub fn full_mask(&self) -> Vec<bool> {
        vec![true; self.edges.len()]
    }

    /// Nodes reachable from `start` over active edges.
    pub fn reachable(&self, active: &[bool], start: usize) -> Vec<bool> {
        let mut seen = vec![false; self.node_count];
        let mut queue = VecDeque::new();
        seen[start] = true;
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            for &(edge, neighbor) in &self.adjacency[node] {
                if active[edge] && !seen[neighbor] {
                    seen[neighbor] = true;
                    queue.push_back(neighbor);
                }
            }
        }
        seen
    }

    /// True if all terminals lie in one component of the active subgraph.
    ///
    /// Zero or one terminal is trivially connected.
    pub fn connects(&self, active: &[bool], terminals: &[usize]) -> bool {
        let Some(&first) = terminals.first() else {
            return true;
        };
        if terminals.len() == 1 {
            return true;
        }
        let seen = self.reachable(active, first);
        terminals.iter().all(|&t| seen[t])
    }

    /// True if no single active edge can be dropped without disconnecting a terminal.
    pub fn is_minimal(&self, active: &[bool], terminals: &[usize]) -> bool {
        let mut probe = active.to_vec();
        for edge in 0..self.edges.len() {
            if !active[edge] {
                continue;
            }
            probe[edge] = false;
            let still_connected = self.connects(&probe, terminals);
            probe[edge] = true;
            if still_connected {
                return false;
            }
        }
        true
    }

    /// Local edge indices of an active mask, ascending.
    pub fn mask_edges(active: &[bool]) -> Vec<usize> {
        active
            .iter()
            .enumerate()
            .filter_map(|(edge, &on)| on.then_some(edge))
            .collect()
    }

    /// Build a mask from a list of local edge indices.
    pub fn mask_from(&self, edges: &[usize]) -> Vec<bool> {
        let mut mask = vec![false; self.edges.len()];
        for &edge in edges {
            mask[edge] = true;
        }
        mask
    }

    /// Sorted pipe ids of a set of local edges.
    pub fn signature(&self, edges: &[usize]) -> Vec<PipeId> {
        let mut ids: Vec<PipeId> = edges.iter().map(|&edge| self.edges[edge].pipe).collect();
        ids.sort();
        ids
    }
}
