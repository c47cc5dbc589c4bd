//! Greedy pipe removal for pieces too large to enumerate.
//!
//! Starting from every pipe of the piece, each round prices the seed with one
//! non-bridge removed (all removals in parallel) and keeps the cheapest. The
//! non-bridge count drops every round, so the loop ends once the seed is a
//! forest. Required pipes are never removed. Dangling branches that serve no
//! terminal are then trimmed away.
//! The result is a local optimum, not necessarily the cheapest tree.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{CostError, OptimizeError, OptimizeResult};
use crate::evaluate::{CandidatePricer, FailurePolicy, PricedEdge};
use crate::graph::{find_bridges, SearchGraph};
use crate::steiner::{trim, SteinerTree};

#[derive(Debug, Clone)]
pub struct LocalSearchOutcome {
    pub tree: SteinerTree,
    pub total: f64,
    pub edges: Vec<PricedEdge>,
    /// Greedy removal rounds
    pub iterations: usize,
    /// Pipes removed by the final trim
    pub trimmed: usize,
}

/// `required` pipes must be acyclic, otherwise the seed never becomes a forest.
pub fn local_search(
    pricer: &CandidatePricer<'_>,
    terminals: &[usize],
    required: &[usize],
    policy: FailurePolicy,
    piece: usize,
) -> OptimizeResult<LocalSearchOutcome> {
    let graph = pricer.graph();
    let mut seed = graph.full_mask();
    let mut removable = graph.full_mask();
    for &edge in required {
        removable[edge] = false;
    }
    let mut iterations = 0;

    loop {
        let split = find_bridges(graph, &seed);
        if split.is_forest() {
            break;
        }

        let priced: Vec<(usize, Result<f64, CostError>)> = split
            .non_bridges
            .par_iter()
            .filter(|&&edge| removable[edge])
            .map(|&edge| {
                let mut reduced = seed.clone();
                reduced[edge] = false;
                (edge, pricer.price_mask(&reduced).map(|(total, _)| total))
            })
            .collect();

        let mut best: Option<(usize, f64)> = None;
        let mut failed = 0;
        for (edge, result) in priced {
            let total = match result {
                Ok(total) => total,
                Err(err) if policy == FailurePolicy::SkipCandidate => {
                    warn!(piece, error = %err, "skipping removal");
                    failed += 1;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            // Ascending edge order, so the first minimum has the smallest pipe id
            if best.map_or(true, |(_, current)| total < current) {
                best = Some((edge, total));
            }
        }
        let (edge, _) = best.ok_or(OptimizeError::NoPricedCandidate { piece, failed })?;
        seed[edge] = false;
        iterations += 1;
    }

    let mut is_terminal = vec![false; graph.node_count()];
    for &t in terminals {
        if let Some(flag) = is_terminal.get_mut(t) {
            *flag = true;
        }
    }
    let before = seed.iter().filter(|&&on| on).count();
    trim(graph, &mut seed, &is_terminal);
    let kept = SearchGraph::mask_edges(&seed);
    let trimmed = before - kept.len();

    let (total, edges) = pricer.price_mask(&seed)?;
    debug!(piece, iterations, trimmed, cost = total, "local search converged");
    Ok(LocalSearchOutcome {
        tree: SteinerTree::new(kept),
        total,
        edges,
        iterations,
        trimmed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::PriceRequest;
    use crate::sums::InjectedSums;
    use pipenet_core::{
        DemandProperty, Junction, JunctionId, Meters, Network, Pipe, PipeId, Sizing,
    };

    fn network(lengths: &[f64], pairs: &[(usize, usize)], nodes: usize) -> Network {
        let mut network = Network::new();
        let ids: Vec<_> = (0..nodes)
            .map(|i| network.add_junction(Junction::joint(JunctionId::new(i), format!("J{i}"))))
            .collect();
        for (id, &(a, b)) in pairs.iter().enumerate() {
            network
                .add_pipe(ids[a], ids[b], Pipe::new(PipeId::new(id), Meters(lengths[id])))
                .unwrap();
        }
        network
    }

    fn by_length(request: &PriceRequest) -> Result<Sizing, CostError> {
        Ok(Sizing::priced(request.length.value()))
    }

    #[test]
    fn test_square_drops_the_longest_side_then_trims() {
        // Square 0-1-2-3-0, terminals 0 and 1. Dropping the long side 3-0 leaves
        // the path 0-1-2-3, whose tail 1-2-3 serves no terminal.
        let pairs = [(0, 1), (1, 2), (2, 3), (3, 0)];
        let network = network(&[1.0, 1.0, 1.0, 5.0], &pairs, 4);
        let graph = SearchGraph::from_pairs(4, &pairs).unwrap();
        let injected = InjectedSums::new();
        let pricer = CandidatePricer::new(
            0,
            &graph,
            &network,
            0,
            &injected,
            &DemandProperty::ALL,
            &by_length,
        );
        let outcome = local_search(&pricer, &[0, 1], &[], FailurePolicy::Abort, 0).unwrap();
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.trimmed, 2);
        assert_eq!(outcome.tree, SteinerTree::new(vec![0]));
        assert_eq!(outcome.total, 1.0);
    }

    #[test]
    fn test_tree_piece_is_returned_unchanged() {
        let pairs = [(0, 1), (1, 2)];
        let network = network(&[2.0, 3.0], &pairs, 3);
        let graph = SearchGraph::from_pairs(3, &pairs).unwrap();
        let injected = InjectedSums::new();
        let pricer = CandidatePricer::new(
            0,
            &graph,
            &network,
            0,
            &injected,
            &DemandProperty::ALL,
            &by_length,
        );
        let outcome = local_search(&pricer, &[0, 2], &[], FailurePolicy::Abort, 0).unwrap();
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.trimmed, 0);
        assert_eq!(outcome.total, 5.0);
    }

    #[test]
    fn test_result_is_minimal() {
        // Two squares sharing the side 1-4
        let pairs = [(0, 1), (1, 2), (2, 5), (5, 4), (4, 3), (3, 0), (1, 4)];
        let network = network(&[1.0, 2.0, 1.0, 3.0, 1.0, 2.0, 1.0], &pairs, 6);
        let graph = SearchGraph::from_pairs(6, &pairs).unwrap();
        let injected = InjectedSums::new();
        let pricer = CandidatePricer::new(
            0,
            &graph,
            &network,
            0,
            &injected,
            &DemandProperty::ALL,
            &by_length,
        );
        let terminals = [0, 5];
        let outcome = local_search(&pricer, &terminals, &[], FailurePolicy::Abort, 0).unwrap();
        assert_eq!(outcome.iterations, 2);
        let mask = outcome.tree.mask(&graph);
        assert!(graph.connects(&mask, &terminals));
        assert!(graph.is_minimal(&mask, &terminals));
    }

    #[test]
    fn test_required_pipe_survives() {
        // Same square with terminals 0, 1, 3. Freely, the long side 3-0 would go
        // first; required, one of the short sides goes instead
        let pairs = [(0, 1), (1, 2), (2, 3), (3, 0)];
        let network = network(&[1.0, 1.0, 1.0, 5.0], &pairs, 4);
        let graph = SearchGraph::from_pairs(4, &pairs).unwrap();
        let injected = InjectedSums::new();
        let pricer = CandidatePricer::new(
            0,
            &graph,
            &network,
            0,
            &injected,
            &DemandProperty::ALL,
            &by_length,
        );
        let outcome = local_search(&pricer, &[0, 1, 3], &[3], FailurePolicy::Abort, 0).unwrap();
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.tree.contains(3));
        assert_eq!(outcome.tree, SteinerTree::new(vec![1, 2, 3]));
        assert_eq!(outcome.total, 7.0);
    }
}
