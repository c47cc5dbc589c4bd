//! Pricing of candidates and selection of the cheapest.
//!
//! A candidate's price depends on the flow through each of its pipes, and the
//! flow depends on which pipes are present, so every candidate gets its own
//! sum pass before the cost function is consulted pipe by pipe. Totals are
//! summed in local edge order, making the price of a candidate independent of
//! thread scheduling.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use pipenet_core::{Demand, DemandProperty, Meters, Network, PipeId, SegmentRef, Sizing};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CostError, OptimizeError, OptimizeResult};
use crate::graph::SearchGraph;
use crate::progress::ProgressObserver;
use crate::steiner::SteinerTree;
use crate::sums::{tree_flows, InjectedSums};

/// Everything the cost function needs to size one pipe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRequest {
    pub pipe: PipeId,
    pub segment: SegmentRef,
    pub length: Meters,
    /// Demand accumulated over everything downstream of the pipe
    pub flow: Demand,
}

/// External hydraulic cost model.
///
/// Must be safe to call repeatedly and concurrently with the same request.
pub trait CostFunction: Send + Sync {
    fn price(&self, request: &PriceRequest) -> Result<Sizing, CostError>;
}

impl<F> CostFunction for F
where
    F: Fn(&PriceRequest) -> Result<Sizing, CostError> + Send + Sync,
{
    fn price(&self, request: &PriceRequest) -> Result<Sizing, CostError> {
        self(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RequestKey {
    pipe: PipeId,
    segment: SegmentRef,
    length: u64,
    buildings: u32,
    units: u32,
    heat: u64,
}

impl From<&PriceRequest> for RequestKey {
    fn from(request: &PriceRequest) -> Self {
        Self {
            pipe: request.pipe,
            segment: request.segment,
            length: request.length.value().to_bits(),
            buildings: request.flow.buildings,
            units: request.flow.units,
            heat: request.flow.heat.value().to_bits(),
        }
    }
}

/// Memoizing adapter around a [`CostFunction`].
///
/// Keys are exact, so only bit-identical requests share an entry; rounding,
/// if wanted, is the wrapped function's business. Failures are not cached.
pub struct MemoizedCost<F> {
    inner: F,
    cache: DashMap<RequestKey, Sizing>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<F: CostFunction> MemoizedCost<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl<F: CostFunction> CostFunction for MemoizedCost<F> {
    fn price(&self, request: &PriceRequest) -> Result<Sizing, CostError> {
        let key = RequestKey::from(request);
        if let Some(sizing) = self.cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(*sizing);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let sizing = self.inner.price(request)?;
        self.cache.insert(key, sizing);
        Ok(sizing)
    }
}

/// Handling of candidates whose pricing fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// The first failure aborts the selection
    #[default]
    Abort,
    /// Failing candidates are left out of the comparison
    SkipCandidate,
}

/// One priced pipe of a candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricedEdge {
    /// Local edge index in the piece's [`SearchGraph`]
    pub edge: usize,
    pub flow: Demand,
    pub sizing: Sizing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedCandidate {
    pub tree: SteinerTree,
    pub signature: Vec<PipeId>,
    pub total: f64,
    pub edges: Vec<PricedEdge>,
}

/// Outcome of [`CandidatePricer::select`].
#[derive(Debug, Clone)]
pub struct Selection {
    pub best: PricedCandidate,
    pub priced: usize,
    pub failed: usize,
}

/// Prices edge subsets of one piece.
pub struct CandidatePricer<'a> {
    piece: usize,
    graph: &'a SearchGraph,
    network: &'a Network,
    root: usize,
    injected: &'a InjectedSums,
    properties: &'a [DemandProperty],
    cost: &'a dyn CostFunction,
    loads: Vec<Demand>,
}

impl<'a> CandidatePricer<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        piece: usize,
        graph: &'a SearchGraph,
        network: &'a Network,
        root: usize,
        injected: &'a InjectedSums,
        properties: &'a [DemandProperty],
        cost: &'a dyn CostFunction,
    ) -> Self {
        let loads = graph
            .edges()
            .iter()
            .map(|edge| network.graph[edge.origin].load)
            .collect();
        Self {
            piece,
            graph,
            network,
            root,
            injected,
            properties,
            cost,
            loads,
        }
    }

    pub fn graph(&self) -> &SearchGraph {
        self.graph
    }

    /// Total price and per-pipe results of the active edges.
    pub fn price_mask(&self, active: &[bool]) -> Result<(f64, Vec<PricedEdge>), CostError> {
        let flows = tree_flows(
            self.graph,
            active,
            &self.loads,
            self.root,
            self.properties,
            self.injected,
        );
        let mut total = 0.0;
        let mut edges = Vec::new();
        for (edge, info) in self.graph.edges().iter().enumerate() {
            if !active[edge] {
                continue;
            }
            let pipe = &self.network.graph[info.origin];
            let flow = flows[edge].unwrap_or_default();
            let request = PriceRequest {
                pipe: pipe.id,
                segment: pipe.segment,
                length: pipe.length,
                flow,
            };
            let sizing = self.cost.price(&request)?;
            if !sizing.price.is_finite() {
                return Err(CostError::NonFinite {
                    pipe: pipe.id,
                    price: sizing.price,
                });
            }
            total += sizing.price;
            edges.push(PricedEdge { edge, flow, sizing });
        }
        Ok((total, edges))
    }

    pub fn price(&self, tree: &SteinerTree) -> Result<PricedCandidate, CostError> {
        let (total, edges) = self.price_mask(&tree.mask(self.graph))?;
        Ok(PricedCandidate {
            tree: tree.clone(),
            signature: tree.signature(self.graph),
            total,
            edges,
        })
    }

    /// Price every candidate in parallel and keep the cheapest.
    ///
    /// Equal totals go to the lexicographically smallest pipe-id signature.
    pub fn select(
        &self,
        trees: &[SteinerTree],
        policy: FailurePolicy,
        observer: &dyn ProgressObserver,
    ) -> OptimizeResult<Selection> {
        let total = trees.len();
        let done = AtomicUsize::new(0);
        let results: Vec<Result<PricedCandidate, CostError>> = trees
            .par_iter()
            .map(|tree| {
                let priced = self.price(tree);
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                observer.candidate_priced(finished, total);
                priced
            })
            .collect();

        let mut failed = 0;
        let mut best: Option<PricedCandidate> = None;
        for result in results {
            let candidate = match result {
                Ok(candidate) => candidate,
                Err(err) => match policy {
                    FailurePolicy::Abort => return Err(err.into()),
                    FailurePolicy::SkipCandidate => {
                        warn!(piece = self.piece, error = %err, "skipping candidate");
                        failed += 1;
                        continue;
                    }
                },
            };
            let better = match &best {
                None => true,
                Some(current) => {
                    candidate.total < current.total
                        || (candidate.total == current.total
                            && candidate.signature < current.signature)
                }
            };
            if better {
                best = Some(candidate);
            }
        }

        let best = best.ok_or(OptimizeError::NoPricedCandidate {
            piece: self.piece,
            failed,
        })?;
        debug!(
            piece = self.piece,
            candidates = total,
            failed,
            cost = best.total,
            "cheapest candidate selected"
        );
        Ok(Selection {
            best,
            priced: total - failed,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipenet_core::{Junction, JunctionId, Kilowatts, Pipe};

    /// Square 0-1-2-3-0 whose pipes have the given lengths; 2 draws one building.
    fn square(lengths: [f64; 4]) -> (Network, SearchGraph) {
        let mut network = Network::new();
        let nodes: Vec<_> = (0..4)
            .map(|i| network.add_junction(Junction::joint(JunctionId::new(i), format!("J{i}"))))
            .collect();
        for (id, (a, b)) in [(0, 1), (1, 2), (2, 3), (3, 0)].into_iter().enumerate() {
            network
                .add_pipe(nodes[a], nodes[b], Pipe::new(PipeId::new(id), Meters(lengths[id])))
                .unwrap();
        }
        let graph = SearchGraph::from_pairs(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]).unwrap();
        (network, graph)
    }

    fn by_length(request: &PriceRequest) -> Result<Sizing, CostError> {
        Ok(Sizing::priced(request.length.value() * (1.0 + request.flow.heat.value())))
    }

    fn injected_at_two() -> InjectedSums {
        let mut injected = InjectedSums::new();
        injected.add(2, &[1.0, 1.0, 2.0]);
        injected
    }

    #[test]
    fn test_price_uses_accumulated_flow() {
        let (network, graph) = square([1.0, 1.0, 1.0, 1.0]);
        let injected = injected_at_two();
        let pricer = CandidatePricer::new(
            0,
            &graph,
            &network,
            0,
            &injected,
            &DemandProperty::ALL,
            &by_length,
        );
        let priced = pricer.price(&SteinerTree::new(vec![0, 1])).unwrap();
        // Both pipes carry 2 kW: 1 * (1 + 2) each
        assert_eq!(priced.total, 6.0);
        assert_eq!(priced.edges[0].flow.heat, Kilowatts(2.0));
        assert_eq!(priced.signature, vec![PipeId::new(0), PipeId::new(1)]);
    }

    #[test]
    fn test_select_prefers_cheaper_then_smaller_signature() {
        let (network, graph) = square([1.0, 1.0, 2.0, 2.0]);
        let injected = injected_at_two();
        let trees = vec![SteinerTree::new(vec![2, 3]), SteinerTree::new(vec![0, 1])];
        let pricer = CandidatePricer::new(
            0,
            &graph,
            &network,
            0,
            &injected,
            &DemandProperty::ALL,
            &by_length,
        );
        let selection = pricer.select(&trees, FailurePolicy::Abort, &()).unwrap();
        assert_eq!(selection.best.tree, SteinerTree::new(vec![0, 1]));
        assert_eq!(selection.priced, 2);

        let (network, graph) = square([1.0; 4]);
        let pricer = CandidatePricer::new(
            0,
            &graph,
            &network,
            0,
            &injected,
            &DemandProperty::ALL,
            &by_length,
        );
        let selection = pricer.select(&trees, FailurePolicy::Abort, &()).unwrap();
        assert_eq!(selection.best.tree, SteinerTree::new(vec![0, 1]));
    }

    #[test]
    fn test_failure_policies() {
        let (network, graph) = square([1.0; 4]);
        let injected = injected_at_two();
        let refuses_pipe_three = |request: &PriceRequest| {
            if request.pipe == PipeId::new(3) {
                Err(CostError::failed(request.pipe, "no diameter fits"))
            } else {
                Ok(Sizing::priced(request.length.value()))
            }
        };
        let pricer = CandidatePricer::new(
            0,
            &graph,
            &network,
            0,
            &injected,
            &DemandProperty::ALL,
            &refuses_pipe_three,
        );
        let trees = vec![SteinerTree::new(vec![0, 1]), SteinerTree::new(vec![2, 3])];

        let err = pricer.select(&trees, FailurePolicy::Abort, &()).unwrap_err();
        assert!(matches!(err, OptimizeError::Cost(_)));

        let selection = pricer
            .select(&trees, FailurePolicy::SkipCandidate, &())
            .unwrap();
        assert_eq!(selection.failed, 1);
        assert_eq!(selection.best.tree, SteinerTree::new(vec![0, 1]));

        let only_bad = vec![SteinerTree::new(vec![2, 3])];
        let err = pricer
            .select(&only_bad, FailurePolicy::SkipCandidate, &())
            .unwrap_err();
        assert!(matches!(err, OptimizeError::NoPricedCandidate { failed: 1, .. }));
    }

    #[test]
    fn test_non_finite_price_is_an_error() {
        let (network, graph) = square([1.0; 4]);
        let injected = InjectedSums::new();
        let nan = |_: &PriceRequest| Ok::<_, CostError>(Sizing::priced(f64::NAN));
        let pricer = CandidatePricer::new(
            0,
            &graph,
            &network,
            0,
            &injected,
            &DemandProperty::ALL,
            &nan,
        );
        let err = pricer.price(&SteinerTree::new(vec![0])).unwrap_err();
        assert!(matches!(err, CostError::NonFinite { .. }));
    }

    #[test]
    fn test_memoized_cost_reuses_results() {
        let calls = AtomicUsize::new(0);
        let counting = |request: &PriceRequest| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok::<_, CostError>(Sizing::priced(request.length.value()))
        };
        let cost = MemoizedCost::new(counting);
        let request = PriceRequest {
            pipe: PipeId::new(1),
            segment: SegmentRef::new(7),
            length: Meters(12.5),
            flow: Demand::new(1, 2, Kilowatts(3.0)),
        };
        let first = cost.price(&request).unwrap();
        let second = cost.price(&request).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!((cost.hits(), cost.misses(), cost.len()), (1, 1, 1));

        let other = PriceRequest {
            flow: Demand::new(1, 2, Kilowatts(3.5)),
            ..request
        };
        cost.price(&other).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }
}
