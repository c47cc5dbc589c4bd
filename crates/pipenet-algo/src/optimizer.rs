//! End-to-end layout optimization of a pipe network.
//!
//! ```text
//! validate -> decompose at bridges -> metagraph sums
//!          -> per piece: gate -> enumerate -> price & select
//!                                   \-> local search (too large / timed out)
//!          -> price loaded bridges -> write back
//! ```
//!
//! Pieces are independent once the metagraph pass has fixed the demand
//! entering each of them, so each is solved on its own and the results are
//! written onto the original network's pipes.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use pipenet_core::{
    graph_stats, Demand, EdgeIndex, Network, NodeIndex, PipeId, PipeNetError, Sizing,
};
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};
use web_time::Instant;

use crate::config::OptimizerConfig;
use crate::error::{OptimizeError, OptimizeResult};
use crate::evaluate::{CandidatePricer, CostFunction, FailurePolicy, MemoizedCost, PriceRequest};
use crate::graph::{decompose, MetaGraph, SearchGraph, SubgraphId, UnionFind};
use crate::local_search::local_search;
use crate::progress::ProgressObserver;
use crate::spanning::SpanningTreeCounter;
use crate::steiner::SteinerOutcome;
use crate::sums::{
    carries_flow, demand_from, loaded_edges, local_injected, propagate_metagraph,
};

/// Why a piece was solved by local search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// More pipes than `max_enumeration_edges`
    TooLarge,
    /// Spanning-tree count above the configured threshold
    TooManySpanningTrees,
    /// Enumeration ran out of time
    TimedOut,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::TooLarge => "too-large",
            FallbackReason::TooManySpanningTrees => "too-many-spanning-trees",
            FallbackReason::TimedOut => "timed-out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PieceMethod {
    /// Nothing to choose: no pipes, or nothing beyond the root to serve
    Trivial,
    Enumerated {
        candidates: usize,
        failed: usize,
    },
    LocalSearch {
        reason: FallbackReason,
        iterations: usize,
    },
}

#[derive(Debug, Clone)]
pub struct PieceReport {
    pub piece: SubgraphId,
    pub junctions: usize,
    pub pipes: usize,
    pub terminals: usize,
    pub method: PieceMethod,
    pub cost: f64,
    pub kept: Vec<PipeId>,
    pub dropped: Vec<PipeId>,
    pub elapsed: Duration,
}

/// Summary of one optimization run.
#[derive(Debug, Clone, Default)]
pub struct OptimizationReport {
    pub pieces: Vec<PieceReport>,
    /// Price of the bridges that carry demand
    pub bridge_cost: f64,
    pub loaded_bridges: usize,
    pub total_cost: f64,
    /// Independent cycles in the candidate network
    pub cycle_rank: usize,
    /// Junctions without a path to the supply
    pub detached: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub elapsed: Duration,
}

impl OptimizationReport {
    pub fn enumerated(&self) -> usize {
        self.pieces
            .iter()
            .filter(|p| matches!(p.method, PieceMethod::Enumerated { .. }))
            .count()
    }

    pub fn fallbacks(&self) -> usize {
        self.pieces
            .iter()
            .filter(|p| matches!(p.method, PieceMethod::LocalSearch { .. }))
            .count()
    }

    pub fn selected_pipes(&self) -> usize {
        self.loaded_bridges + self.pieces.iter().map(|p| p.kept.len()).sum::<usize>()
    }

    /// Human-readable multi-line summary.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Optimized {} pieces in {:.2?}: {} enumerated, {} local search, {} trivial",
            self.pieces.len(),
            self.elapsed,
            self.enumerated(),
            self.fallbacks(),
            self.pieces.len() - self.enumerated() - self.fallbacks()
        );
        let _ = writeln!(out, "Independent cycles: {}", self.cycle_rank);
        let _ = writeln!(
            out,
            "Selected pipes: {} ({} loaded bridges)",
            self.selected_pipes(),
            self.loaded_bridges
        );
        let _ = writeln!(
            out,
            "Total cost: {:.2} (bridges {:.2})",
            self.total_cost, self.bridge_cost
        );
        if self.detached > 0 {
            let _ = writeln!(out, "Detached junctions: {}", self.detached);
        }
        let _ = write!(
            out,
            "Cost cache: {} hits, {} misses",
            self.cache_hits, self.cache_misses
        );
        out
    }
}

/// Per-pipe results to write back onto the network.
struct Writeback {
    origin: EdgeIndex,
    flow: Demand,
    sizing: Option<Sizing>,
}

struct PieceResult {
    report: PieceReport,
    writes: Vec<Writeback>,
}

/// Chooses which candidate pipes to build.
pub struct NetworkOptimizer<F> {
    config: OptimizerConfig,
    cost: MemoizedCost<F>,
    observer: Arc<dyn ProgressObserver>,
}

impl<F: CostFunction> NetworkOptimizer<F> {
    pub fn new(config: OptimizerConfig, cost: F) -> Self {
        Self {
            config,
            cost: MemoizedCost::new(cost),
            observer: Arc::new(()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// The memoizing wrapper around the cost function.
    pub fn cost(&self) -> &MemoizedCost<F> {
        &self.cost
    }

    /// Select the layout rooted at `supply` and write it onto `network`.
    ///
    /// Every pipe's previous results are cleared first.
    pub fn optimize(
        &self,
        network: &mut Network,
        supply: NodeIndex,
    ) -> OptimizeResult<OptimizationReport> {
        self.config.validate()?;
        if self.config.workers == 0 {
            return self.run(network, supply);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .map_err(|err| OptimizeError::Config(format!("building thread pool: {err}")))?;
        pool.install(|| self.run(network, supply))
    }

    fn run(&self, network: &mut Network, supply: NodeIndex) -> OptimizeResult<OptimizationReport> {
        let started = Instant::now();
        let hits_before = self.cost.hits();
        let misses_before = self.cost.misses();

        let diagnostics = network.validate().into_result()?;
        for issue in diagnostics.warnings() {
            warn!("{}", issue);
        }
        network.reset_results();
        let stats = graph_stats(network).map_err(PipeNetError::from)?;

        let properties = &self.config.properties;
        let mut meta = decompose(network, supply)?;
        let link_totals = propagate_metagraph(&mut meta, network, properties);
        info!(
            pieces = meta.subgraphs.len(),
            bridges = meta.links.len(),
            components = stats.connected_components,
            cycle_rank = stats.cycle_rank,
            strategy = %self.config.strategy,
            "optimizing network"
        );

        let mut report = OptimizationReport {
            cycle_rank: stats.cycle_rank,
            detached: meta.detached.len(),
            ..OptimizationReport::default()
        };

        for id in meta.ordered() {
            let result = self.solve_piece(network, &meta, id)?;
            for write in result.writes {
                let pipe = &mut network.graph[write.origin];
                pipe.selected = true;
                pipe.flow = write.flow;
                pipe.price = write.sizing.map(|s| s.price);
                pipe.sizing = write.sizing;
            }
            report.total_cost += result.report.cost;
            report.pieces.push(result.report);
        }

        for (link, totals) in meta.links.iter().zip(&link_totals) {
            let flow = demand_from(properties, totals);
            network.graph[link.bridge].flow = flow;
            if !carries_flow(totals) {
                continue;
            }
            let pipe = &network.graph[link.bridge];
            let request = PriceRequest {
                pipe: pipe.id,
                segment: pipe.segment,
                length: pipe.length,
                flow,
            };
            let sizing = match self.price_bridge(&request) {
                Ok(sizing) => Some(sizing),
                Err(err) if self.config.on_cost_failure == FailurePolicy::SkipCandidate => {
                    warn!(pipe = %request.pipe, error = %err, "bridge left unpriced");
                    None
                }
                Err(err) => return Err(err),
            };
            let pipe = &mut network.graph[link.bridge];
            pipe.selected = true;
            pipe.price = sizing.map(|s| s.price);
            pipe.sizing = sizing;
            report.loaded_bridges += 1;
            report.bridge_cost += pipe.price.unwrap_or(0.0);
        }

        report.total_cost += report.bridge_cost;
        report.cache_hits = self.cost.hits() - hits_before;
        report.cache_misses = self.cost.misses() - misses_before;
        report.elapsed = started.elapsed();
        info!(
            cost = report.total_cost,
            enumerated = report.enumerated(),
            fallbacks = report.fallbacks(),
            "optimization finished"
        );
        Ok(report)
    }

    fn price_bridge(&self, request: &PriceRequest) -> OptimizeResult<Sizing> {
        let sizing = self.cost.price(request)?;
        if !sizing.price.is_finite() {
            return Err(crate::error::CostError::NonFinite {
                pipe: request.pipe,
                price: sizing.price,
            }
            .into());
        }
        Ok(sizing)
    }

    fn solve_piece(
        &self,
        network: &Network,
        meta: &MetaGraph,
        id: SubgraphId,
    ) -> OptimizeResult<PieceResult> {
        let started = Instant::now();
        let subgraph = meta.subgraph(id);
        let piece = id.value();
        let graph = subgraph.search_graph(network)?;
        let terminals = subgraph.local_terminals()?;
        let root = subgraph.local_root()?;
        let injected = local_injected(meta, piece);
        let required = loaded_edges(&graph, network, &self.config.properties);
        if let Some(edge) = closing_edge(&graph, &required) {
            return Err(OptimizeError::LoadedCycle {
                piece,
                pipe: graph.edge(edge).pipe,
            });
        }
        let pricer = CandidatePricer::new(
            piece,
            &graph,
            network,
            root,
            &injected,
            &self.config.properties,
            &self.cost,
        );

        let mut report = PieceReport {
            piece: id,
            junctions: graph.node_count(),
            pipes: graph.edge_count(),
            terminals: terminals.len(),
            method: PieceMethod::Trivial,
            cost: 0.0,
            kept: Vec::new(),
            dropped: Vec::new(),
            elapsed: Duration::ZERO,
        };

        let fallback = if graph.edge_count() == 0 || terminals.len() < 2 {
            None
        } else if graph.edge_count() > self.config.max_enumeration_edges {
            Some(FallbackReason::TooLarge)
        } else if self.too_many_spanning_trees(&graph) {
            Some(FallbackReason::TooManySpanningTrees)
        } else {
            let enumerator = self.config.strategy.build(self.config.workers);
            let outcome = enumerator.enumerate(&graph, &terminals, self.config.time_limit());
            debug!(piece, strategy = enumerator.id(), outcome = outcome.label(), "enumerated");
            match outcome {
                SteinerOutcome::Solved(trees) => {
                    // Both ends of a loaded pipe are terminals, so the trees
                    // keeping every loaded pipe are exactly the minimal ones
                    let trees: Vec<_> = trees
                        .into_iter()
                        .filter(|tree| required.iter().all(|&edge| tree.contains(edge)))
                        .collect();
                    let selection =
                        pricer.select(&trees, self.config.on_cost_failure, self.observer.as_ref())?;
                    report.method = PieceMethod::Enumerated {
                        candidates: trees.len(),
                        failed: selection.failed,
                    };
                    report.cost = selection.best.total;
                    return Ok(self.finish(report, &graph, selection.best.edges, started));
                }
                SteinerOutcome::TimedOut => {
                    warn!(piece, pipes = graph.edge_count(), "enumeration timed out");
                    Some(FallbackReason::TimedOut)
                }
                SteinerOutcome::Infeasible => return Err(OptimizeError::Infeasible { piece }),
            }
        };

        let Some(reason) = fallback else {
            return Ok(self.finish(report, &graph, Vec::new(), started));
        };
        let outcome = local_search(
            &pricer,
            &terminals,
            &required,
            self.config.on_cost_failure,
            piece,
        )?;
        report.method = PieceMethod::LocalSearch {
            reason,
            iterations: outcome.iterations,
        };
        report.cost = outcome.total;
        Ok(self.finish(report, &graph, outcome.edges, started))
    }

    fn too_many_spanning_trees(&self, graph: &SearchGraph) -> bool {
        let Some(threshold) = self.config.spanning_tree_threshold else {
            return false;
        };
        let counter = SpanningTreeCounter::new(self.config.determinant).with_threshold(threshold);
        let count = counter.count_with(graph, self.observer.as_ref());
        debug!(pipes = graph.edge_count(), %count, threshold, "spanning-tree gate");
        counter.exceeded(&count)
    }

    fn finish(
        &self,
        mut report: PieceReport,
        graph: &SearchGraph,
        edges: Vec<crate::evaluate::PricedEdge>,
        started: Instant,
    ) -> PieceResult {
        let mut chosen = vec![false; graph.edge_count()];
        let writes = edges
            .into_iter()
            .map(|priced| {
                chosen[priced.edge] = true;
                Writeback {
                    origin: graph.edge(priced.edge).origin,
                    flow: priced.flow,
                    sizing: Some(priced.sizing),
                }
            })
            .collect();
        for (edge, info) in graph.edges().iter().enumerate() {
            if chosen[edge] {
                report.kept.push(info.pipe);
            } else {
                report.dropped.push(info.pipe);
            }
        }
        report.elapsed = started.elapsed();
        debug!(
            piece = report.piece.value(),
            kept = report.kept.len(),
            dropped = report.dropped.len(),
            cost = report.cost,
            "piece solved"
        );
        PieceResult { report, writes }
    }
}

impl<F> std::fmt::Debug for NetworkOptimizer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkOptimizer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// First of `edges` that closes a cycle with the ones before it.
fn closing_edge(graph: &SearchGraph, edges: &[usize]) -> Option<usize> {
    let mut forest = UnionFind::new(graph.node_count());
    edges.iter().copied().find(|&edge| {
        let info = graph.edge(edge);
        !forest.union(info.a, info.b)
    })
}

/// Locate the supply junction, failing if there is none.
pub fn find_supply(network: &Network) -> OptimizeResult<NodeIndex> {
    network
        .supply()
        .ok_or_else(|| PipeNetError::structural("network has no supply junction").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CostError;
    use pipenet_core::{Junction, JunctionId, Kilowatts, Meters, Pipe};

    fn by_length(request: &PriceRequest) -> Result<Sizing, CostError> {
        Ok(Sizing::priced(request.length.value()))
    }

    /// Supply - feeder - triangle 1,2,3 - service pipe to a building at 4.
    fn triangle() -> Network {
        let mut network = Network::new();
        let s = network.add_junction(Junction::supply(JunctionId::new(0), "S"));
        let j: Vec<_> = (1..4)
            .map(|i| network.add_junction(Junction::joint(JunctionId::new(i), format!("J{i}"))))
            .collect();
        let b = network.add_junction(Junction::consumer(JunctionId::new(4), "House"));
        let pipe = |id: usize, len: f64| Pipe::new(PipeId::new(id), Meters(len));
        network.add_pipe(s, j[0], pipe(0, 10.0)).unwrap();
        network.add_pipe(j[0], j[1], pipe(1, 4.0)).unwrap();
        network.add_pipe(j[1], j[2], pipe(2, 4.0)).unwrap();
        network.add_pipe(j[0], j[2], pipe(3, 5.0)).unwrap();
        network
            .add_pipe(
                j[2],
                b,
                pipe(4, 2.0).with_load(Demand::new(1, 2, Kilowatts(15.0))),
            )
            .unwrap();
        network
    }

    #[test]
    fn test_triangle_takes_the_direct_side() {
        let mut network = triangle();
        let supply = find_supply(&network).unwrap();
        let optimizer = NetworkOptimizer::new(OptimizerConfig::default(), by_length);
        let report = optimizer.optimize(&mut network, supply).unwrap();

        assert_eq!(
            network.selected_pipes(),
            vec![PipeId::new(0), PipeId::new(3), PipeId::new(4)]
        );
        assert_eq!(report.total_cost, 17.0);
        assert_eq!(network.selected_cost(), 17.0);
        assert_eq!(report.enumerated(), 1);
        assert_eq!(report.loaded_bridges, 2);

        let feeder = network.find_pipe(PipeId::new(0)).unwrap();
        assert!(network.graph[feeder].is_bridge);
        assert_eq!(network.graph[feeder].flow.units, 2);
        assert_eq!(report.cycle_rank, 1);
        assert!(report.summary().contains("Total cost: 17.00"));
    }

    #[test]
    fn test_too_large_piece_uses_local_search() {
        let mut network = triangle();
        let supply = find_supply(&network).unwrap();
        let config = OptimizerConfig {
            max_enumeration_edges: 2,
            ..OptimizerConfig::default()
        };
        let report = NetworkOptimizer::new(config, by_length)
            .optimize(&mut network, supply)
            .unwrap();
        assert_eq!(report.fallbacks(), 1);
        let piece = report.pieces.iter().find(|p| p.pipes == 3).unwrap();
        assert_eq!(
            piece.method,
            PieceMethod::LocalSearch {
                reason: FallbackReason::TooLarge,
                iterations: 1
            }
        );
        // Greedy drops the single longest side and keeps the detour
        assert_eq!(piece.kept, vec![PipeId::new(1), PipeId::new(2)]);
        assert_eq!(report.total_cost, 20.0);
    }

    #[test]
    fn test_spanning_tree_gate() {
        let mut network = triangle();
        let supply = find_supply(&network).unwrap();
        let config = OptimizerConfig::default().with_spanning_tree_threshold(2);
        let report = NetworkOptimizer::new(config, by_length)
            .optimize(&mut network, supply)
            .unwrap();
        let piece = report.pieces.iter().find(|p| p.pipes == 3).unwrap();
        assert!(matches!(
            piece.method,
            PieceMethod::LocalSearch {
                reason: FallbackReason::TooManySpanningTrees,
                ..
            }
        ));
    }

    #[test]
    fn test_zero_time_limit_falls_back() {
        let mut network = triangle();
        let supply = find_supply(&network).unwrap();
        let config = OptimizerConfig::default().with_time_limit(0.0);
        let report = NetworkOptimizer::new(config, by_length)
            .optimize(&mut network, supply)
            .unwrap();
        let piece = report.pieces.iter().find(|p| p.pipes == 3).unwrap();
        assert!(matches!(
            piece.method,
            PieceMethod::LocalSearch {
                reason: FallbackReason::TimedOut,
                ..
            }
        ));
        assert_eq!(report.total_cost, 20.0);
    }

    #[test]
    fn test_invalid_network_is_rejected() {
        let mut network = Network::new();
        let optimizer = NetworkOptimizer::new(OptimizerConfig::default(), by_length);
        let err = optimizer
            .optimize(&mut network, NodeIndex::new(0))
            .unwrap_err();
        assert!(matches!(err, OptimizeError::Network(_)));
        assert!(find_supply(&network).is_err());
    }

    #[test]
    fn test_dedicated_pool() {
        let mut network = triangle();
        let supply = find_supply(&network).unwrap();
        let config = OptimizerConfig {
            workers: 2,
            strategy: crate::steiner::EnumerationStrategy::ParallelQueue,
            ..OptimizerConfig::default()
        };
        let report = NetworkOptimizer::new(config, by_length)
            .optimize(&mut network, supply)
            .unwrap();
        assert_eq!(report.total_cost, 17.0);
    }

    /// Supply - feeder - triangle 1,2,3 whose side 2-3 carries a building.
    fn loaded_triangle(loaded: &[usize]) -> Network {
        let mut network = Network::new();
        let s = network.add_junction(Junction::supply(JunctionId::new(0), "S"));
        let j: Vec<_> = (1..4)
            .map(|i| network.add_junction(Junction::joint(JunctionId::new(i), format!("J{i}"))))
            .collect();
        let sides = [
            (0, s, j[0], 10.0),
            (1, j[0], j[1], 4.0),
            (2, j[1], j[2], 4.0),
            (3, j[0], j[2], 5.0),
        ];
        for (id, a, b, len) in sides {
            let mut pipe = Pipe::new(PipeId::new(id), Meters(len));
            if loaded.contains(&id) {
                pipe = pipe.with_load(Demand::new(1, 1, Kilowatts(10.0)));
            }
            network.add_pipe(a, b, pipe).unwrap();
        }
        network
    }

    #[test]
    fn test_load_on_a_loop_is_served() {
        for config in [
            OptimizerConfig::default(),
            OptimizerConfig::default().with_time_limit(0.0),
        ] {
            let mut network = loaded_triangle(&[2]);
            let supply = find_supply(&network).unwrap();
            let report = NetworkOptimizer::new(config, by_length)
                .optimize(&mut network, supply)
                .unwrap();

            assert_eq!(
                network.selected_pipes(),
                vec![PipeId::new(0), PipeId::new(1), PipeId::new(2)]
            );
            assert_eq!(report.total_cost, 18.0);
            assert_eq!(report.loaded_bridges, 1);
            let piece = report.pieces.iter().find(|p| p.pipes == 3).unwrap();
            assert_eq!(piece.terminals, 3);
            for id in [0, 1, 2] {
                let edge = network.find_pipe(PipeId::new(id)).unwrap();
                assert_eq!(network.graph[edge].flow.buildings, 1, "pipe {id}");
            }
        }
    }

    #[test]
    fn test_enumeration_keeps_only_trees_with_the_loaded_pipe() {
        let mut network = loaded_triangle(&[2]);
        let supply = find_supply(&network).unwrap();
        let report = NetworkOptimizer::new(OptimizerConfig::default(), by_length)
            .optimize(&mut network, supply)
            .unwrap();
        let piece = report.pieces.iter().find(|p| p.pipes == 3).unwrap();
        // Three spanning trees of the triangle, one of them lacks pipe 2
        assert_eq!(
            piece.method,
            PieceMethod::Enumerated {
                candidates: 2,
                failed: 0
            }
        );
        assert_eq!(piece.dropped, vec![PipeId::new(3)]);
    }

    #[test]
    fn test_loaded_loop_is_rejected() {
        let mut network = loaded_triangle(&[1, 2, 3]);
        let supply = find_supply(&network).unwrap();
        let err = NetworkOptimizer::new(OptimizerConfig::default(), by_length)
            .optimize(&mut network, supply)
            .unwrap_err();
        match err {
            OptimizeError::LoadedCycle { pipe, .. } => assert_eq!(pipe, PipeId::new(3)),
            other => panic!("expected a loaded cycle, got {other:?}"),
        }
    }
}
