//! Bridge decomposition of a network into independently solvable pieces.
//!
//! Removing every bridge splits the network into maximal 2-edge-connected
//! pieces ([`Subgraph`]s). All cycles of the original graph live inside a
//! single piece, so the pieces, joined by the bridges, form a tree: the
//! [`MetaGraph`]. Rooting it at the supply junction gives every piece a
//! parent bridge (except the root piece) and a root junction, the junction
//! closest to the supply.
//!
//! The decomposer only builds structure. Terminals and injected sums are
//! filled in by [`crate::sums::propagate_metagraph`] once demand is known.

use std::collections::{HashMap, VecDeque};

use petgraph::visit::EdgeRef;
use pipenet_core::{EdgeIndex, Network, NodeIndex, PipeId, PipeNetError, PipeNetResult};
use tracing::{debug, warn};

use super::bridges::find_bridges;
use super::search::{SearchEdge, SearchGraph};

/// Index of a piece inside its [`MetaGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubgraphId(usize);

impl SubgraphId {
    #[inline]
    pub fn new(value: usize) -> Self {
        SubgraphId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for SubgraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Subgraph#{}", self.0)
    }
}

/// A maximal bridge-free piece of the network.
#[derive(Debug, Clone)]
pub struct Subgraph {
    pub id: SubgraphId,
    /// Junctions of the piece, ascending by node index
    pub nodes: Vec<NodeIndex>,
    /// Non-bridge pipes of the piece
    pub edges: Vec<EdgeIndex>,
    /// Junction closest to the supply
    pub root: NodeIndex,
    /// Junctions that must stay connected to `root` (root included)
    pub terminals: Vec<NodeIndex>,
}

impl Subgraph {
    /// Position of a junction in [`Subgraph::nodes`].
    pub fn local_index(&self, node: NodeIndex) -> Option<usize> {
        self.nodes.binary_search(&node).ok()
    }

    pub fn local_root(&self) -> PipeNetResult<usize> {
        self.local_index(self.root).ok_or_else(|| {
            PipeNetError::structural(format!("{} root is not one of its junctions", self.id))
        })
    }

    /// Terminals as local indices, ascending.
    pub fn local_terminals(&self) -> PipeNetResult<Vec<usize>> {
        let mut local = self
            .terminals
            .iter()
            .map(|&node| {
                self.local_index(node).ok_or_else(|| {
                    PipeNetError::structural(format!(
                        "{} terminal {} is not one of its junctions",
                        self.id,
                        node.index()
                    ))
                })
            })
            .collect::<PipeNetResult<Vec<_>>>()?;
        local.sort_unstable();
        local.dedup();
        Ok(local)
    }

    /// Compact search view of the piece, edges ordered by pipe id.
    pub fn search_graph(&self, network: &Network) -> PipeNetResult<SearchGraph> {
        let edges = self
            .edges
            .iter()
            .map(|&edge| {
                let (a, b) = network.graph.edge_endpoints(edge).ok_or_else(|| {
                    PipeNetError::structural(format!(
                        "{} references pipe index {} missing from the network",
                        self.id,
                        edge.index()
                    ))
                })?;
                let missing = |node: NodeIndex| {
                    PipeNetError::structural(format!(
                        "{} pipe {} leaves the piece at junction {}",
                        self.id,
                        network.graph[edge].id,
                        node.index()
                    ))
                };
                Ok(SearchEdge {
                    a: self.local_index(a).ok_or_else(|| missing(a))?,
                    b: self.local_index(b).ok_or_else(|| missing(b))?,
                    pipe: network.graph[edge].id,
                    origin: edge,
                })
            })
            .collect::<PipeNetResult<Vec<_>>>()?;
        SearchGraph::new(self.nodes.len(), edges)
    }
}

/// A bridge seen as a super-edge between two pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaLink {
    pub bridge: EdgeIndex,
    pub pipe: PipeId,
    /// Piece on the supply side
    pub parent: SubgraphId,
    pub parent_node: NodeIndex,
    /// Piece away from the supply
    pub child: SubgraphId,
    pub child_node: NodeIndex,
}

/// Tree of pieces rooted at the piece containing the supply.
#[derive(Debug, Clone)]
pub struct MetaGraph {
    pub root: SubgraphId,
    pub subgraphs: Vec<Subgraph>,
    pub links: Vec<MetaLink>,
    /// Per piece: demand flowing in from child pieces, keyed by the attaching junction
    pub injected: Vec<HashMap<NodeIndex, Vec<f64>>>,
    /// Junctions with no path to the supply; they are left out of every piece
    pub detached: Vec<NodeIndex>,
    /// Per piece: `(link, neighbor piece)` pairs
    adjacency: Vec<Vec<(usize, usize)>>,
    parent_link: Vec<Option<usize>>,
}

impl MetaGraph {
    pub fn subgraph(&self, id: SubgraphId) -> &Subgraph {
        &self.subgraphs[id.0]
    }

    /// `(link, neighbor piece)` pairs incident to a piece.
    pub fn incident(&self, piece: usize) -> &[(usize, usize)] {
        &self.adjacency[piece]
    }

    /// Link connecting a piece to its parent, `None` for the root piece.
    pub fn parent_link(&self, id: SubgraphId) -> Option<&MetaLink> {
        self.parent_link[id.0].map(|link| &self.links[link])
    }

    /// Links leading from a piece to its children.
    pub fn child_links(&self, id: SubgraphId) -> impl Iterator<Item = &MetaLink> {
        self.links.iter().filter(move |link| link.parent == id)
    }

    /// Pieces in breadth-first order from the root.
    pub fn ordered(&self) -> Vec<SubgraphId> {
        let mut order = Vec::with_capacity(self.subgraphs.len());
        let mut queue = VecDeque::from([self.root]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for link in self.child_links(id) {
                queue.push_back(link.child);
            }
        }
        order
    }
}

/// Split `network` at its bridges and link the pieces into a [`MetaGraph`].
///
/// Marks `is_bridge` on every pipe as a side effect. Junctions without a
/// path to `supply` are reported in [`MetaGraph::detached`].
pub fn decompose(network: &mut Network, supply: NodeIndex) -> PipeNetResult<MetaGraph> {
    let node_count = network.graph.node_count();
    if supply.index() >= node_count {
        return Err(PipeNetError::structural(format!(
            "supply junction {} is not part of the network",
            supply.index()
        )));
    }

    let full = SearchGraph::new(
        node_count,
        network
            .graph
            .edge_references()
            .map(|edge| SearchEdge {
                a: edge.source().index(),
                b: edge.target().index(),
                pipe: edge.weight().id,
                origin: edge.id(),
            })
            .collect(),
    )?;
    let split = find_bridges(&full, &full.full_mask());

    let mut bridge_mask = vec![false; full.edge_count()];
    for &edge in &split.bridges {
        bridge_mask[edge] = true;
    }
    for (local, info) in full.edges().iter().enumerate() {
        network.graph[info.origin].is_bridge = bridge_mask[local];
    }

    let reachable = full.reachable(&full.full_mask(), supply.index());
    let detached: Vec<NodeIndex> = (0..node_count)
        .filter(|&node| !reachable[node])
        .map(NodeIndex::new)
        .collect();
    if !detached.is_empty() {
        warn!(
            detached = detached.len(),
            "junctions without a path to the supply are excluded"
        );
    }

    // Flood-fill over non-bridge pipes, starting with the supply so the
    // root piece gets id 0.
    const UNASSIGNED: usize = usize::MAX;
    let mut owner = vec![UNASSIGNED; node_count];
    let mut pieces: Vec<Vec<usize>> = Vec::new();
    let starts = std::iter::once(supply.index()).chain(0..node_count);
    for start in starts {
        if !reachable[start] || owner[start] != UNASSIGNED {
            continue;
        }
        let piece = pieces.len();
        let mut members = vec![start];
        owner[start] = piece;
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for &(edge, neighbor) in full.incident(node) {
                if bridge_mask[edge] || owner[neighbor] != UNASSIGNED {
                    continue;
                }
                owner[neighbor] = piece;
                members.push(neighbor);
                queue.push_back(neighbor);
            }
        }
        members.sort_unstable();
        pieces.push(members);
    }

    if let Some(orphan) = (0..node_count).find(|&n| reachable[n] && owner[n] == UNASSIGNED) {
        return Err(PipeNetError::structural(format!(
            "junction {} was not assigned to any piece",
            orphan
        )));
    }

    let mut piece_edges: Vec<Vec<EdgeIndex>> = vec![Vec::new(); pieces.len()];
    let mut bridges = Vec::new();
    for (local, info) in full.edges().iter().enumerate() {
        if !reachable[info.a] {
            continue;
        }
        let (pa, pb) = (owner[info.a], owner[info.b]);
        if bridge_mask[local] {
            if pa == pb {
                return Err(PipeNetError::structural(format!(
                    "bridge {} has both ends in piece {}",
                    info.pipe, pa
                )));
            }
            bridges.push(local);
        } else {
            if pa != pb {
                return Err(PipeNetError::structural(format!(
                    "cycle pipe {} spans pieces {} and {}",
                    info.pipe, pa, pb
                )));
            }
            piece_edges[pa].push(info.origin);
        }
    }

    // Orient the bridge tree away from the supply piece.
    let mut piece_adjacency: Vec<Vec<(usize, usize)>> = vec![Vec::new(); pieces.len()];
    for &local in &bridges {
        let info = full.edge(local);
        piece_adjacency[owner[info.a]].push((local, owner[info.b]));
        piece_adjacency[owner[info.b]].push((local, owner[info.a]));
    }

    let mut links = Vec::with_capacity(bridges.len());
    let mut roots = vec![None; pieces.len()];
    let mut parent_link = vec![None; pieces.len()];
    let mut adjacency: Vec<Vec<(usize, usize)>> = vec![Vec::new(); pieces.len()];
    roots[0] = Some(supply);
    let mut queue = VecDeque::from([0usize]);
    while let Some(piece) = queue.pop_front() {
        for &(local, neighbor) in &piece_adjacency[piece] {
            if roots[neighbor].is_some() {
                continue;
            }
            let info = full.edge(local);
            let (parent_node, child_node) = if owner[info.a] == piece {
                (info.a, info.b)
            } else {
                (info.b, info.a)
            };
            let link = links.len();
            links.push(MetaLink {
                bridge: info.origin,
                pipe: info.pipe,
                parent: SubgraphId(piece),
                parent_node: NodeIndex::new(parent_node),
                child: SubgraphId(neighbor),
                child_node: NodeIndex::new(child_node),
            });
            adjacency[piece].push((link, neighbor));
            adjacency[neighbor].push((link, piece));
            parent_link[neighbor] = Some(link);
            roots[neighbor] = Some(NodeIndex::new(child_node));
            queue.push_back(neighbor);
        }
    }

    if links.len() != bridges.len() {
        return Err(PipeNetError::structural(format!(
            "bridge tree is not a tree: {} bridges but {} links",
            bridges.len(),
            links.len()
        )));
    }

    let subgraphs = pieces
        .into_iter()
        .zip(piece_edges)
        .enumerate()
        .map(|(piece, (members, mut edges))| {
            let root = roots[piece].ok_or_else(|| {
                PipeNetError::structural(format!("piece {} has no root", piece))
            })?;
            edges.sort_by_key(|&edge| network.graph[edge].id);
            Ok(Subgraph {
                id: SubgraphId(piece),
                nodes: members.into_iter().map(NodeIndex::new).collect(),
                edges,
                root,
                terminals: vec![root],
            })
        })
        .collect::<PipeNetResult<Vec<_>>>()?;

    debug!(
        pieces = subgraphs.len(),
        bridges = links.len(),
        detached = detached.len(),
        "network decomposed"
    );

    Ok(MetaGraph {
        root: SubgraphId(0),
        injected: vec![HashMap::new(); subgraphs.len()],
        subgraphs,
        links,
        detached,
        adjacency,
        parent_link,
    })
}
