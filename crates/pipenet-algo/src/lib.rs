//! # pipenet-algo: Layout optimization for district heating networks
//!
//! Given a candidate pipe network with one supply and building loads on
//! service pipes, this crate picks the subset of pipes to build: the cheapest
//! tree that still reaches every loaded building, priced by an external
//! hydraulic cost function.
//!
//! ## Pipeline
//!
//! | Step | Module |
//! |------|--------|
//! | Split the network at its bridges into independent pieces | [`graph::decompose`] |
//! | Accumulate demand across the bridge tree | [`sums`] |
//! | Optionally gate large pieces by spanning-tree count | [`spanning`] |
//! | Enumerate every minimal Steiner tree of a piece (time-boxed) | [`steiner`] |
//! | Price candidates in parallel and select the cheapest | [`evaluate`] |
//! | Greedy fallback when enumeration is not possible | [`local_search`] |
//!
//! [`NetworkOptimizer`] chains the steps and writes the winning layout back
//! onto the network.
//!
//! ## Example
//!
//! ```ignore
//! use pipenet_algo::{find_supply, NetworkOptimizer, OptimizerConfig, PriceRequest};
//! use pipenet_core::Sizing;
//!
//! let optimizer = NetworkOptimizer::new(OptimizerConfig::default(), |req: &PriceRequest| {
//!     Ok(Sizing::priced(req.length.value() * 120.0))
//! });
//! let supply = find_supply(&network)?;
//! let report = optimizer.optimize(&mut network, supply)?;
//! println!("{}", report.summary());
//! ```

pub mod config;
pub mod error;
pub mod evaluate;
pub mod graph;
pub mod local_search;
pub mod optimizer;
pub mod progress;
pub mod rational;
pub mod spanning;
pub mod steiner;
pub mod sums;

pub use config::OptimizerConfig;
pub use error::{CostError, OptimizeError, OptimizeResult};
pub use evaluate::{
    CandidatePricer, CostFunction, FailurePolicy, MemoizedCost, PriceRequest, PricedCandidate,
    PricedEdge, Selection,
};
pub use graph::{decompose, find_bridges, BridgeSplit, MetaGraph, SearchGraph, Subgraph};
pub use local_search::{local_search, LocalSearchOutcome};
pub use optimizer::{
    find_supply, FallbackReason, NetworkOptimizer, OptimizationReport, PieceMethod, PieceReport,
};
pub use progress::ProgressObserver;
pub use rational::BigRational;
pub use spanning::{DeterminantMethod, SpanningTreeCounter};
pub use steiner::{
    Backtracking, Deadline, EnumerationStrategy, FrontierMemo, ParallelQueue, SteinerEnumerator,
    SteinerOutcome, SteinerTree,
};
pub use sums::{propagate, propagate_metagraph, InjectedSums, SumGraph};
