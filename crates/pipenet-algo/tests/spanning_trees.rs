//! Spanning-tree counts against Cayley's formula and brute force.

use num_bigint::BigInt;
use pipenet_algo::{DeterminantMethod, SearchGraph, SpanningTreeCounter};
use proptest::prelude::*;

fn complete(n: usize) -> SearchGraph {
    let mut pairs = Vec::new();
    for a in 0..n {
        for b in a + 1..n {
            pairs.push((a, b));
        }
    }
    SearchGraph::from_pairs(n, &pairs).unwrap()
}

/// Edge subsets of size n-1 that reach every node.
fn brute_force(graph: &SearchGraph) -> u64 {
    let n = graph.node_count();
    let m = graph.edge_count();
    let mut count = 0;
    for bits in 0u32..(1 << m) {
        if bits.count_ones() as usize != n - 1 {
            continue;
        }
        let mask: Vec<bool> = (0..m).map(|e| bits & (1 << e) != 0).collect();
        if graph.reachable(&mask, 0).iter().all(|&seen| seen) {
            count += 1;
        }
    }
    count
}

fn small_graph() -> impl Strategy<Value = SearchGraph> {
    (2usize..6).prop_flat_map(|nodes| {
        prop::collection::vec((0..nodes, 0..nodes), 0..10).prop_map(move |pairs| {
            let pairs: Vec<_> = pairs.into_iter().filter(|(a, b)| a != b).collect();
            SearchGraph::from_pairs(nodes, &pairs).unwrap()
        })
    })
}

#[test]
fn test_cayley_formula() {
    for n in 2..=8u32 {
        let expected = BigInt::from(n).pow(n - 2);
        for method in [DeterminantMethod::Bareiss, DeterminantMethod::Rational] {
            let count = SpanningTreeCounter::new(method).count(&complete(n as usize));
            assert_eq!(count, expected, "K{n} with {method}");
        }
    }
}

#[test]
fn test_large_complete_graph_needs_big_integers() {
    // 30^28 overflows u128
    let count = SpanningTreeCounter::default().count(&complete(30));
    assert_eq!(count, BigInt::from(30u32).pow(28));
}

#[test]
fn test_threshold_on_complete_graph() {
    let counter = SpanningTreeCounter::default().with_threshold(1000);
    // K6 has 1296 spanning trees
    let count = counter.count(&complete(6));
    assert_eq!(count, BigInt::from(1001));
    assert!(counter.exceeded(&count));
    // K5 has 125
    assert_eq!(counter.count(&complete(5)), BigInt::from(125));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn methods_match_brute_force(graph in small_graph()) {
        let expected = BigInt::from(brute_force(&graph));
        for method in [DeterminantMethod::Bareiss, DeterminantMethod::Rational] {
            prop_assert_eq!(SpanningTreeCounter::new(method).count(&graph), expected.clone());
        }
    }

    #[test]
    fn threshold_never_hides_a_large_count(graph in small_graph(), threshold in 0u64..40) {
        let exact = BigInt::from(brute_force(&graph));
        for method in [DeterminantMethod::Bareiss, DeterminantMethod::Rational] {
            let counter = SpanningTreeCounter::new(method).with_threshold(threshold);
            let count = counter.count(&graph);
            if exact > BigInt::from(threshold) {
                prop_assert!(counter.exceeded(&count));
            } else if !counter.exceeded(&count) {
                prop_assert_eq!(count, exact.clone());
            }
        }
    }
}
