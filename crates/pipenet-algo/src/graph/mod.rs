//! Graph structure: search views, bridges, and the piece decomposition.

pub mod bridges;
pub mod decompose;
pub mod search;
pub mod union_find;

pub use bridges::{find_bridges, BridgeSplit};
pub use decompose::{decompose, MetaGraph, MetaLink, Subgraph, SubgraphId};
pub use search::{SearchEdge, SearchGraph};
pub use union_find::UnionFind;
