//! Cross-checks of the Steiner tree enumeration strategies.
//!
//! The three strategies search very differently, so agreement between them on
//! random small graphs is the main evidence that each one is complete.

use std::time::Duration;

use pipenet_algo::{
    Backtracking, EnumerationStrategy, FrontierMemo, ParallelQueue, SearchGraph,
    SteinerEnumerator, SteinerOutcome, SteinerTree,
};
use proptest::prelude::*;

const BUDGET: Duration = Duration::from_secs(60);

fn all_strategies() -> Vec<Box<dyn SteinerEnumerator>> {
    vec![
        Box::new(Backtracking),
        Box::new(FrontierMemo),
        Box::new(ParallelQueue::with_workers(3)),
    ]
}

/// Brute force over every edge subset; only usable for tiny graphs.
fn brute_force(graph: &SearchGraph, terminals: &[usize]) -> Vec<SteinerTree> {
    let m = graph.edge_count();
    let mut trees = Vec::new();
    for bits in 0u32..(1 << m) {
        let mask: Vec<bool> = (0..m).map(|e| bits & (1 << e) != 0).collect();
        if graph.connects(&mask, terminals) && graph.is_minimal(&mask, terminals) {
            trees.push(SteinerTree::new(SearchGraph::mask_edges(&mask)));
        }
    }
    trees.sort();
    trees
}

/// Random connected multigraph: a random spanning tree plus extra pipes.
fn connected_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..7).prop_flat_map(|nodes| {
        let parents: Vec<_> = (1..nodes).map(|child| 0..child).collect();
        let extra = prop::collection::vec((0..nodes, 0..nodes), 0..5);
        (Just(nodes), parents, extra).prop_map(|(nodes, parents, extra)| {
            let mut pairs: Vec<(usize, usize)> = parents
                .into_iter()
                .enumerate()
                .map(|(i, parent)| (parent, i + 1))
                .collect();
            pairs.extend(extra.into_iter().filter(|(a, b)| a != b));
            (nodes, pairs)
        })
    })
}

fn graph_with_terminals() -> impl Strategy<Value = (SearchGraph, Vec<usize>)> {
    connected_graph().prop_flat_map(|(nodes, pairs)| {
        let graph = SearchGraph::from_pairs(nodes, &pairs).unwrap();
        let terminals = prop::collection::vec(0..nodes, 1..=nodes);
        (Just(graph), terminals)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn strategies_agree_with_brute_force((graph, terminals) in graph_with_terminals()) {
        let expected = brute_force(&graph, &terminals);
        for strategy in all_strategies() {
            let outcome = strategy.enumerate(&graph, &terminals, BUDGET);
            prop_assert_eq!(
                outcome,
                SteinerOutcome::Solved(expected.clone()),
                "strategy {}",
                strategy.id()
            );
        }
    }

    #[test]
    fn every_candidate_is_feasible_and_minimal((graph, terminals) in graph_with_terminals()) {
        let trees = FrontierMemo.enumerate(&graph, &terminals, BUDGET).into_trees();
        prop_assert!(!trees.is_empty());
        for tree in &trees {
            let mask = tree.mask(&graph);
            prop_assert!(graph.connects(&mask, &terminals));
            prop_assert!(graph.is_minimal(&mask, &terminals));
        }
    }
}

#[test]
fn test_registry_builds_each_strategy() {
    let graph =
        SearchGraph::from_pairs(4, &[(0, 1), (1, 2), (2, 3), (3, 0), (0, 2)]).unwrap();
    let terminals = [1, 3];
    let reference = Backtracking.enumerate(&graph, &terminals, BUDGET);
    assert!(reference.is_solved());

    for name in EnumerationStrategy::available() {
        let enumerator = EnumerationStrategy::from_str(name).unwrap().build(2);
        assert_eq!(enumerator.id(), *name);
        assert_eq!(
            enumerator.enumerate(&graph, &terminals, BUDGET),
            reference,
            "strategy {name}"
        );
    }
}

#[test]
fn test_square_offers_both_sides_for_opposite_corners() {
    let graph = SearchGraph::from_pairs(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]).unwrap();
    let trees = Backtracking.enumerate(&graph, &[0, 2], BUDGET).into_trees();
    // Either side of the square, nothing else
    assert_eq!(
        trees,
        vec![SteinerTree::new(vec![0, 1]), SteinerTree::new(vec![2, 3])]
    );
}

#[test]
fn test_disconnected_terminals_are_infeasible_for_every_strategy() {
    let graph = SearchGraph::from_pairs(5, &[(0, 1), (1, 2), (3, 4)]).unwrap();
    for strategy in all_strategies() {
        // Infeasibility wins over an already expired budget
        assert_eq!(
            strategy.enumerate(&graph, &[0, 4], Duration::ZERO),
            SteinerOutcome::Infeasible,
            "strategy {}",
            strategy.id()
        );
    }
}

#[test]
fn test_zero_budget_times_out_for_every_strategy() {
    let graph =
        SearchGraph::from_pairs(4, &[(0, 1), (1, 2), (2, 3), (3, 0), (0, 2)]).unwrap();
    for strategy in all_strategies() {
        assert_eq!(
            strategy.enumerate(&graph, &[0, 2], Duration::ZERO),
            SteinerOutcome::TimedOut,
            "strategy {}",
            strategy.id()
        );
    }
}

#[test]
fn test_grid_is_all_or_nothing_under_a_tiny_budget() {
    // 6x6 grid: far too many candidates to finish within a microsecond
    let side = 6;
    let mut pairs = Vec::new();
    for r in 0..side {
        for c in 0..side {
            let node = r * side + c;
            if c + 1 < side {
                pairs.push((node, node + 1));
            }
            if r + 1 < side {
                pairs.push((node, node + side));
            }
        }
    }
    let graph = SearchGraph::from_pairs(side * side, &pairs).unwrap();
    let terminals = [0, side - 1, side * side - 1, side * (side - 1)];
    for strategy in all_strategies() {
        let outcome = strategy.enumerate(&graph, &terminals, Duration::from_micros(1));
        assert_eq!(outcome, SteinerOutcome::TimedOut, "strategy {}", strategy.id());
    }
}
