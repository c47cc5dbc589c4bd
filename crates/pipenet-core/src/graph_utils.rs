use crate::Network;
use anyhow::{anyhow, Result};
use petgraph::algo::connected_components;

/// Connectivity summary of the candidate topology.
#[derive(Debug)]
pub struct GraphStats {
    pub connected_components: usize,
    /// Cyclomatic number `E - V + C`: independent cycles the optimizer has to break
    pub cycle_rank: usize,
}

/// Counts connected components and the cycle rank of the whole network.
pub fn graph_stats(network: &Network) -> Result<GraphStats> {
    let connected_components = connected_components(&network.graph);
    let cycle_rank = (network.graph.edge_count() + connected_components)
        .checked_sub(network.graph.node_count())
        .ok_or_else(|| anyhow!("edge/node counts are inconsistent"))?;
    Ok(GraphStats {
        connected_components,
        cycle_rank,
    })
}
