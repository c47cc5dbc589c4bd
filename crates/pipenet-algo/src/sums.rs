//! Bottom-up accumulation of additive demand.
//!
//! [`propagate`] walks a tree-shaped graph from a root and writes, onto every
//! edge, the demand of everything on the far side of that edge:
//!
//! ```text
//! flow(edge into v) = base(edge) + Σ flow(child edges of v) + injected(v)
//! ```
//!
//! A node reached a second time over a non-tree edge contributes nothing and
//! that edge gets a zero total. This is only a sum over a tree when the
//! caller passes a tree: the metagraph (a tree of pieces by construction) or
//! an acyclic candidate inside one piece. Cycles in the raw network are never
//! summed directly.
//!
//! Injected sums let the metagraph pass feed a child piece's precomputed total
//! into the junction of the parent piece where its bridge attaches, so the
//! per-piece pass never re-traverses a child.

use std::collections::HashMap;

use pipenet_core::{Demand, DemandProperty, Network, NodeIndex};
use tracing::debug;

use crate::graph::{MetaGraph, SearchGraph};

/// A graph the propagator can walk and write totals onto.
pub trait SumGraph {
    fn node_count(&self) -> usize;

    /// `(edge, neighbor)` pairs incident to `node`.
    fn incident(&self, node: usize) -> &[(usize, usize)];

    /// Own value of `edge` for one property.
    fn base(&self, edge: usize, property: DemandProperty) -> f64;

    /// Receive the accumulated totals of `edge`, one per requested property.
    fn store(&mut self, edge: usize, totals: &[f64]);
}

/// Precomputed totals entering a graph at specific nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InjectedSums {
    values: HashMap<usize, Vec<f64>>,
}

impl InjectedSums {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `totals` to whatever is already injected at `node`.
    pub fn add(&mut self, node: usize, totals: &[f64]) {
        let slot = self
            .values
            .entry(node)
            .or_insert_with(|| vec![0.0; totals.len()]);
        for (acc, value) in slot.iter_mut().zip(totals) {
            *acc += value;
        }
    }

    pub fn get(&self, node: usize) -> Option<&[f64]> {
        self.values.get(&node).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

struct Frame {
    node: usize,
    parent_edge: Option<usize>,
    cursor: usize,
    acc: Vec<f64>,
}

/// Accumulate `properties` from the leaves toward `root`.
///
/// Returns the totals arriving at `root` (its children plus anything injected
/// there). Nodes not reachable from `root` are left untouched.
pub fn propagate<G: SumGraph + ?Sized>(
    graph: &mut G,
    root: usize,
    properties: &[DemandProperty],
    injected: &InjectedSums,
) -> Vec<f64> {
    let width = properties.len();
    let start = |node: usize| match injected.get(node) {
        Some(values) => values.to_vec(),
        None => vec![0.0; width],
    };

    let mut visited = vec![false; graph.node_count()];
    visited[root] = true;
    let mut stack = vec![Frame {
        node: root,
        parent_edge: None,
        cursor: 0,
        acc: start(root),
    }];
    let zeros = vec![0.0; width];

    loop {
        let Some(top) = stack.last_mut() else {
            return zeros;
        };
        let node = top.node;
        let cursor = top.cursor;
        let parent_edge = top.parent_edge;

        let next = graph.incident(node).get(cursor).copied();
        if let Some((edge, neighbor)) = next {
            top.cursor += 1;
            if Some(edge) == parent_edge {
                continue;
            }
            if visited[neighbor] {
                graph.store(edge, &zeros);
                continue;
            }
            visited[neighbor] = true;
            stack.push(Frame {
                node: neighbor,
                parent_edge: Some(edge),
                cursor: 0,
                acc: start(neighbor),
            });
            continue;
        }

        let Some(frame) = stack.pop() else {
            return zeros;
        };
        let Some(edge) = frame.parent_edge else {
            return frame.acc;
        };
        let totals: Vec<f64> = frame
            .acc
            .iter()
            .zip(properties)
            .map(|(acc, &property)| acc + graph.base(edge, property))
            .collect();
        graph.store(edge, &totals);
        if let Some(parent) = stack.last_mut() {
            for (acc, value) in parent.acc.iter_mut().zip(&totals) {
                *acc += value;
            }
        }
    }
}

/// Build a [`Demand`] from per-property totals.
pub fn demand_from(properties: &[DemandProperty], totals: &[f64]) -> Demand {
    let mut demand = Demand::default();
    for (&property, &value) in properties.iter().zip(totals) {
        property.set(&mut demand, value);
    }
    demand
}

/// True if any total is nonzero.
pub fn carries_flow(totals: &[f64]) -> bool {
    totals.iter().any(|&value| value != 0.0)
}

/// Sum view over the active edges of a [`SearchGraph`].
struct MaskedTree<'a> {
    loads: &'a [Demand],
    adjacency: Vec<Vec<(usize, usize)>>,
    totals: Vec<Option<Vec<f64>>>,
}

impl SumGraph for MaskedTree<'_> {
    fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    fn incident(&self, node: usize) -> &[(usize, usize)] {
        &self.adjacency[node]
    }

    fn base(&self, edge: usize, property: DemandProperty) -> f64 {
        property.get(&self.loads[edge])
    }

    fn store(&mut self, edge: usize, totals: &[f64]) {
        self.totals[edge] = Some(totals.to_vec());
    }
}

/// Accumulated flow on every active edge of a candidate tree.
///
/// `loads` holds the base load of each local edge. The result has one entry
/// per edge of `graph`; inactive edges and edges unreachable from `root` are
/// `None`.
pub fn tree_flows(
    graph: &SearchGraph,
    active: &[bool],
    loads: &[Demand],
    root: usize,
    properties: &[DemandProperty],
    injected: &InjectedSums,
) -> Vec<Option<Demand>> {
    let mut adjacency = vec![Vec::new(); graph.node_count()];
    for (edge, info) in graph.edges().iter().enumerate() {
        if active[edge] {
            adjacency[info.a].push((edge, info.b));
            adjacency[info.b].push((edge, info.a));
        }
    }
    let mut view = MaskedTree {
        loads,
        adjacency,
        totals: vec![None; graph.edge_count()],
    };
    propagate(&mut view, root, properties, injected);
    view.totals
        .into_iter()
        .map(|totals| totals.map(|t| demand_from(properties, &t)))
        .collect()
}

/// Sum view over the bridges of a [`MetaGraph`].
struct MetaSums<'a> {
    meta: &'a MetaGraph,
    network: &'a Network,
    totals: Vec<Vec<f64>>,
}

impl SumGraph for MetaSums<'_> {
    fn node_count(&self) -> usize {
        self.meta.subgraphs.len()
    }

    fn incident(&self, node: usize) -> &[(usize, usize)] {
        self.meta.incident(node)
    }

    fn base(&self, edge: usize, property: DemandProperty) -> f64 {
        property.get(&self.network.graph[self.meta.links[edge].bridge].load)
    }

    fn store(&mut self, edge: usize, totals: &[f64]) {
        self.totals[edge] = totals.to_vec();
    }
}

/// True if `demand` is nonzero in any of `properties`.
pub fn has_load(demand: &Demand, properties: &[DemandProperty]) -> bool {
    properties.iter().any(|property| property.get(demand) != 0.0)
}

/// Local indices of the loaded pipes of a piece, ascending.
///
/// These pipes serve buildings directly, so every layout of the piece must
/// keep them.
pub fn loaded_edges(
    graph: &SearchGraph,
    network: &Network,
    properties: &[DemandProperty],
) -> Vec<usize> {
    graph
        .edges()
        .iter()
        .enumerate()
        .filter(|(_, info)| has_load(&network.graph[info.origin].load, properties))
        .map(|(edge, _)| edge)
        .collect()
}

/// Metagraph pass: flows on every bridge, injected tables, and terminals.
///
/// Returns the accumulated totals per link (in [`MetaGraph::links`] order).
/// The load of every pipe inside a piece enters the pass at that piece, so
/// the bridges upstream carry it. Each piece's terminals become its root,
/// both ends of each of its loaded pipes, and every junction that receives
/// nonzero demand from a child piece. Attach points of bridges that carry
/// nothing are left out, so unloaded branches never pull pipes into a layout.
pub fn propagate_metagraph(
    meta: &mut MetaGraph,
    network: &Network,
    properties: &[DemandProperty],
) -> Vec<Vec<f64>> {
    let mut interior = InjectedSums::new();
    let mut loaded_ends: Vec<Vec<NodeIndex>> = vec![Vec::new(); meta.subgraphs.len()];
    for subgraph in &meta.subgraphs {
        let piece = subgraph.id.value();
        for &edge in &subgraph.edges {
            let load = &network.graph[edge].load;
            if !has_load(load, properties) {
                continue;
            }
            let values: Vec<f64> = properties.iter().map(|p| p.get(load)).collect();
            interior.add(piece, &values);
            if let Some((a, b)) = network.graph.edge_endpoints(edge) {
                loaded_ends[piece].extend([a, b]);
            }
        }
    }

    let mut view = MetaSums {
        meta: &*meta,
        network,
        totals: vec![vec![0.0; properties.len()]; meta.links.len()],
    };
    let root = meta.root.value();
    propagate(&mut view, root, properties, &interior);
    let totals = view.totals;

    for table in meta.injected.iter_mut() {
        table.clear();
    }
    for (link, values) in meta.links.iter().zip(&totals) {
        let slot = meta.injected[link.parent.value()]
            .entry(link.parent_node)
            .or_insert_with(|| vec![0.0; values.len()]);
        for (acc, value) in slot.iter_mut().zip(values) {
            *acc += value;
        }
    }

    for (subgraph, ends) in meta.subgraphs.iter_mut().zip(loaded_ends) {
        let mut terminals: Vec<NodeIndex> = meta.injected[subgraph.id.value()]
            .iter()
            .filter(|(_, values)| carries_flow(values))
            .map(|(&node, _)| node)
            .chain(ends)
            .collect();
        terminals.push(subgraph.root);
        terminals.sort_unstable();
        terminals.dedup();
        subgraph.terminals = terminals;
    }

    debug!(
        links = totals.len(),
        loaded = totals.iter().filter(|t| carries_flow(t)).count(),
        loaded_pieces = interior.len(),
        "metagraph sums propagated"
    );
    totals
}

/// Injected sums of one piece translated to its local node indices.
pub fn local_injected(meta: &MetaGraph, piece: usize) -> InjectedSums {
    let subgraph = &meta.subgraphs[piece];
    let mut local = InjectedSums::new();
    for (&node, values) in &meta.injected[piece] {
        if let Some(index) = subgraph.local_index(node) {
            local.add(index, values);
        }
    }
    local
}
